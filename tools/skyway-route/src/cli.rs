//! CLI commands for skyway-route

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use skyway_common::{BoundingBox, Coordinate};

use skyway_route::formats::GraphFile;
use skyway_route::graph::builder::{DEFAULT_MAX_LEVELS, DEFAULT_NEIGHBORHOOD_SIZE};
use skyway_route::import::GraphInput;
use skyway_route::{verify, PathResult, RouteSegment, Router, RouterConfig, VertexId};

#[derive(Parser)]
#[command(name = "skyway-route")]
#[command(about = "Offline highway-hierarchy routing", long_about = None)]
pub struct Cli {
    /// Router settings (TOML); flags below override it
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Read buffer size for loading the graph file
    #[arg(long, global = true)]
    pub cache_size: Option<usize>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a hierarchy file from a JSON road network
    Build {
        /// Input road network (JSON)
        input: PathBuf,
        /// Output hierarchy file
        output: PathBuf,
        /// Maximum number of levels
        #[arg(long, default_value_t = DEFAULT_MAX_LEVELS)]
        max_levels: usize,
        /// Neighborhood size H used for the per-vertex radius
        #[arg(long, default_value_t = DEFAULT_NEIGHBORHOOD_SIZE)]
        neighborhood: usize,
    },
    /// Print header and per-level statistics
    Info {
        /// Hierarchy file
        graph: PathBuf,
    },
    /// Find a route between two coordinates
    Route {
        /// Hierarchy file
        graph: PathBuf,
        /// Start coordinate (lat,lon)
        #[arg(long)]
        from: String,
        /// End coordinate (lat,lon)
        #[arg(long)]
        to: String,
        /// Snapping radius in meters
        #[arg(long)]
        radius: Option<f64>,
        /// Print segments as JSON
        #[arg(long)]
        json: bool,
    },
    /// Find a route between two vertex ids
    RouteIds {
        /// Hierarchy file
        graph: PathBuf,
        source: VertexId,
        target: VertexId,
        /// Print segments as JSON
        #[arg(long)]
        json: bool,
    },
    /// Snap a coordinate to the nearest vertex and edge
    Nearest {
        /// Hierarchy file
        graph: PathBuf,
        /// Coordinate (lat,lon)
        #[arg(long)]
        at: String,
        /// Search radius in meters
        #[arg(long)]
        radius: Option<f64>,
    },
    /// List vertices inside a box spanned by two corners
    Within {
        /// Hierarchy file
        graph: PathBuf,
        /// One corner (lat,lon)
        #[arg(long)]
        from: String,
        /// Opposite corner (lat,lon)
        #[arg(long)]
        to: String,
    },
    /// Check random queries against plain Dijkstra and expand every shortcut
    Verify {
        /// Hierarchy file
        graph: PathBuf,
        /// Number of random query pairs
        #[arg(long, default_value = "1000")]
        pairs: usize,
        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

impl Cli {
    fn router_config(&self) -> Result<RouterConfig> {
        let mut config = match &self.config {
            Some(path) => RouterConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => RouterConfig::default(),
        };
        if let Some(cache_size) = self.cache_size {
            config.cache_size_bytes = cache_size;
        }
        Ok(config)
    }

    pub fn run(self) -> Result<()> {
        let config = self.router_config()?;

        match self.command {
            Commands::Build {
                input,
                output,
                max_levels,
                neighborhood,
            } => {
                println!("Reading road network from {}...", input.display());
                let start = Instant::now();
                let builder = GraphInput::from_file(&input)
                    .with_context(|| format!("reading {}", input.display()))?
                    .into_builder()?
                    .max_levels(max_levels)
                    .neighborhood_size(neighborhood);
                println!("  ✓ {} vertices", builder.vertex_count());

                println!("Building hierarchy...");
                let built = builder.build()?;
                print_levels(&built.graph);

                println!("Saving to {}...", output.display());
                GraphFile::write(&output, &built.graph)
                    .with_context(|| format!("writing {}", output.display()))?;
                println!("  ✓ Done in {:.2}s", start.elapsed().as_secs_f64());
                Ok(())
            }
            Commands::Info { graph } => {
                let header = GraphFile::read_header(&graph)
                    .with_context(|| format!("reading header of {}", graph.display()))?;
                println!("File:      {}", graph.display());
                match header.created() {
                    Some(created) => println!("Created:   {}", created.to_rfc3339()),
                    None => println!("Created:   (invalid timestamp {})", header.created_unix),
                }
                let bbox = header.bbox;
                println!(
                    "Bounds:    {} .. {}",
                    Coordinate::from_fixed(bbox.min_lat, bbox.min_lon),
                    Coordinate::from_fixed(bbox.max_lat, bbox.max_lon)
                );
                println!("Vertices:  {}", header.vertex_count());
                println!("Edges:     {}", header.edge_count());
                println!("Waypoints: {}", header.geometry_points);
                for (level, entry) in header.level_entries().iter().enumerate() {
                    println!(
                        "  level {:>2}: {:>10} vertices {:>10} edges",
                        level, entry.vertex_count, entry.edge_count
                    );
                }
                Ok(())
            }
            Commands::Route {
                graph,
                from,
                to,
                radius,
                json,
            } => {
                let router = open_router(&graph, config)?;
                let radius = radius.unwrap_or(router.config().nearest_radius_m);
                let from_coord: Coordinate = from.parse()?;
                let to_coord: Coordinate = to.parse()?;

                let source = router
                    .nearest_vertex(from_coord, radius)
                    .ok_or_else(|| anyhow::anyhow!("No vertex within {radius}m of {from}"))?;
                let target = router
                    .nearest_vertex(to_coord, radius)
                    .ok_or_else(|| anyhow::anyhow!("No vertex within {radius}m of {to}"))?;
                if !json {
                    println!("Snapped to vertices {source} -> {target}");
                }
                route(&router, source, target, json)
            }
            Commands::RouteIds {
                graph,
                source,
                target,
                json,
            } => {
                let router = open_router(&graph, config)?;
                route(&router, source, target, json)
            }
            Commands::Within { graph, from, to } => {
                let router = open_router(&graph, config)?;
                let corners: [Coordinate; 2] = [from.parse()?, to.parse()?];
                let bbox = BoundingBox::from_coords(&corners);
                let ids = router.vertices_within_box(&bbox);
                println!("{} vertices inside the box", ids.len());
                for id in ids {
                    let vertex = router.graph().vertex(id)?;
                    println!("  {} at {} (level {})", id, vertex.coordinate, vertex.level);
                }
                Ok(())
            }
            Commands::Nearest { graph, at, radius } => {
                let router = open_router(&graph, config)?;
                let radius = radius.unwrap_or(router.config().nearest_radius_m);
                let coordinate: Coordinate = at.parse()?;

                match router.nearest_vertex(coordinate, radius) {
                    Some(id) => {
                        let vertex = router.graph().vertex(id)?;
                        println!(
                            "Vertex {} at {} ({:.1}m, level {})",
                            id,
                            vertex.coordinate,
                            coordinate.distance_m(&vertex.coordinate),
                            vertex.level
                        );
                    }
                    None => println!("No vertex within {radius}m"),
                }
                match router.nearest_edge(coordinate, radius) {
                    Some(snap) => println!(
                        "Edge {} at {} ({:.1}m)",
                        snap.edge, snap.point, snap.distance_m
                    ),
                    None => println!("No edge within {radius}m"),
                }
                Ok(())
            }
            Commands::Verify { graph, pairs, seed } => {
                println!("Loading {}...", graph.display());
                let hierarchy = GraphFile::read(&graph, &config.load_options())
                    .with_context(|| format!("loading {}", graph.display()))?;
                println!(
                    "  ✓ {} vertices, {} edges, {} levels",
                    hierarchy.vertex_count(),
                    hierarchy.edge_count(),
                    hierarchy.level_count()
                );

                println!(
                    "\nRunning {} queries on {} threads (seed {})...",
                    pairs,
                    rayon::current_num_threads(),
                    seed
                );
                let start = Instant::now();
                let report = verify::verify(&hierarchy, pairs, seed)?;
                println!("  ✓ {:.2}s", start.elapsed().as_secs_f64());
                println!("  Reachable pairs:  {}/{}", report.reachable, report.pairs);
                println!("  Mismatches:       {}", report.mismatches.len());
                println!(
                    "  Shortcuts:        {} ({} broken)",
                    report.shortcuts,
                    report.broken_shortcuts.len()
                );

                for m in report.mismatches.iter().take(10) {
                    println!(
                        "    {} -> {}: hierarchy {:?}, reference {:?} {}",
                        m.source,
                        m.target,
                        m.hierarchy,
                        m.reference,
                        m.detail.as_deref().unwrap_or("")
                    );
                }
                for b in report.broken_shortcuts.iter().take(10) {
                    println!("    shortcut {}: {}", b.edge, b.error);
                }

                if !report.is_ok() {
                    anyhow::bail!(
                        "Verification failed: {} mismatches, {} broken shortcuts",
                        report.mismatches.len(),
                        report.broken_shortcuts.len()
                    );
                }
                Ok(())
            }
        }
    }
}

fn open_router(path: &Path, config: RouterConfig) -> Result<Router> {
    let start = Instant::now();
    let router = Router::with_config(path, config)
        .with_context(|| format!("opening {}", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "router ready"
    );
    Ok(router)
}

fn route(router: &Router, source: VertexId, target: VertexId, json: bool) -> Result<()> {
    let start = Instant::now();
    let Some(path) = router.shortest_path(source, target)? else {
        anyhow::bail!("No route from {source} to {target}");
    };
    let elapsed = start.elapsed();

    let segments = segments(router, &path);
    let cost = path.cost;
    router.release_path(path)?;
    let segments = segments?;

    if json {
        let body = serde_json::json!({ "cost": cost, "segments": segments });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!("\nRoute found in {:.3}ms", elapsed.as_secs_f64() * 1000.0);
    println!("Cost: {cost}");
    println!("Segments: {}", segments.len());
    for s in &segments {
        let label = match (&s.name, &s.reference) {
            (Some(name), Some(r)) => format!("{name} ({r})"),
            (Some(name), None) => name.clone(),
            (None, Some(r)) => r.clone(),
            (None, None) => "(unnamed)".to_string(),
        };
        let mut tags = Vec::new();
        if s.roundabout {
            tags.push("roundabout");
        }
        if s.motorway_link {
            tags.push("motorway link");
        }
        println!(
            "  edge {:>8} {:>8} {}{}",
            s.edge,
            s.weight,
            label,
            if tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", tags.join(", "))
            }
        );
    }
    Ok(())
}

fn segments(router: &Router, path: &PathResult) -> Result<Vec<RouteSegment>> {
    path.edges
        .iter()
        .map(|&h| router.segment(h).map_err(Into::into))
        .collect()
}

fn print_levels(graph: &skyway_route::HighwayHierarchyGraph) {
    for s in graph.summary() {
        println!(
            "  ✓ level {:>2}: {:>10} vertices {:>10} edges ({} shortcuts)",
            s.level, s.vertices, s.edges, s.shortcuts
        );
    }
}
