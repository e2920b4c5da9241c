use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use evac_common::{Point, Uid};
use evac_route::hazard::{self, load_regions};
use evac_route::planner::{load_users, plan_evacuation};
use evac_route::{load_graph, EdgeSnapper, Graph, PathEngine, PrecomputeEngine, RoutingConfig};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "evac-route")]
#[command(about = "Capacity-aware evacuation routing over a road network", long_about = None)]
struct Cli {
    /// Routing configuration (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route one origin to the nearest target vertex
    Route {
        /// Topology feed (JSON)
        #[arg(long)]
        topology: PathBuf,
        /// Origin coordinate (x,y)
        #[arg(long)]
        from: String,
        /// Regions whose vertices are targets
        #[arg(long, conflicts_with = "target")]
        to_region: Option<PathBuf>,
        /// Target coordinate (x,y), snapped to the nearest vertex; repeatable
        #[arg(long)]
        target: Vec<String>,
    },
    /// Route every user out of the hazard regions
    Plan {
        /// Topology feed (JSON)
        #[arg(long)]
        topology: PathBuf,
        /// Safe and hazard regions (JSON)
        #[arg(long)]
        regions: PathBuf,
        /// User locations (JSON)
        #[arg(long)]
        users: PathBuf,
        /// Output file for the routes; stdout when omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List vertices reachable from a coordinate
    Reach {
        /// Topology feed (JSON)
        #[arg(long)]
        topology: PathBuf,
        /// Origin coordinate (x,y)
        #[arg(long)]
        from: String,
        /// Cost radius around the vertex nearest to the origin
        #[arg(long)]
        limit: Option<f64>,
    },
}

fn parse_coord(s: &str) -> Result<Point> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        bail!("Coordinate must be in format 'x,y', got '{s}'");
    }
    let x = parts[0].trim().parse::<f64>()?;
    let y = parts[1].trim().parse::<f64>()?;
    Ok(Point::try_new(x, y)?)
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_graph(topology: &Path, config: &RoutingConfig) -> Result<Graph> {
    let start = Instant::now();
    let graph = load_graph(topology, config)
        .with_context(|| format!("Failed to load topology from {}", topology.display()))?;
    tracing::info!(elapsed_ms = start.elapsed().as_millis() as u64, "topology ready");
    Ok(graph)
}

fn write_json<T: serde::Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => println!("{text}"),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let config = match &cli.config {
        Some(path) => RoutingConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => RoutingConfig::default(),
    };

    match cli.command {
        Commands::Route {
            topology,
            from,
            to_region,
            target,
        } => {
            let mut graph = open_graph(&topology, &config)?;
            let snapper = EdgeSnapper::new(&graph);
            let origin = snapper.snap(parse_coord(&from)?)?;

            let mut targets: HashSet<Uid> = HashSet::new();
            if let Some(path) = to_region {
                let regions = load_regions(&path)
                    .with_context(|| format!("Failed to load regions from {}", path.display()))?;
                for region in &regions {
                    targets.extend(hazard::vertices_in_region(&graph, region));
                }
            }
            for coord in &target {
                let snapped = snapper.snap(parse_coord(coord)?)?;
                targets.extend(snapped.nearest_vertex(&graph));
            }
            if targets.is_empty() {
                bail!("No target vertices: pass --to-region or --target");
            }

            let mut engine = PathEngine::new(&mut graph, [], &config.search);
            let start = Instant::now();
            let route = engine.execute(&origin, &targets)?;
            tracing::info!(
                elapsed_us = start.elapsed().as_micros() as u64,
                targets = targets.len(),
                found = route.is_some(),
                "route query finished"
            );
            if route.is_none() {
                eprintln!("No target is reachable from {from}");
            }
            write_json(&route, None)?;
        }
        Commands::Plan {
            topology,
            regions,
            users,
            output,
        } => {
            let mut graph = open_graph(&topology, &config)?;
            let regions = load_regions(&regions)
                .with_context(|| format!("Failed to load regions from {}", regions.display()))?;
            let users = load_users(&users)
                .with_context(|| format!("Failed to load users from {}", users.display()))?;

            let start = Instant::now();
            let report = plan_evacuation(&mut graph, &regions, &users, &config.search)?;
            tracing::info!(elapsed_ms = start.elapsed().as_millis() as u64, "planning finished");

            // Routes are written even when some origins failed
            write_json(&report.routes, output.as_deref())?;
            report.into_result()?;
        }
        Commands::Reach {
            topology,
            from,
            limit,
        } => {
            let graph = open_graph(&topology, &config)?;
            let snapper = EdgeSnapper::new(&graph);
            let origin = snapper.snap(parse_coord(&from)?)?;
            let mut engine = PrecomputeEngine::new(&graph);

            let reach = match limit {
                Some(limit) => {
                    let source = origin
                        .nearest_vertex(&graph)
                        .context("Snapped edge vanished from the graph")?;
                    engine.within_radius(source, limit)?
                }
                None => engine.from_snap(&origin)?,
            };

            let mut reached: Vec<_> = reach.iter().collect();
            reached.sort_by(|a, b| a.1.cost.total_cmp(&b.1.cost));
            let vertices: Vec<_> = reached
                .into_iter()
                .filter_map(|(uid, r)| {
                    graph.vertex(uid).map(|v| {
                        serde_json::json!({
                            "uid": uid,
                            "point": v.point(),
                            "cost": r.cost,
                            "via": r.via,
                        })
                    })
                })
                .collect();

            write_json(
                &serde_json::json!({
                    "reached": reach.len(),
                    "vertices": vertices,
                }),
                None,
            )?;
        }
    }

    Ok(())
}
