use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use dungeon_dfs::bench::{compare, Bench};
use dungeon_dfs::config::SolverConfig;
use dungeon_dfs::config_space::ConfigSpaceLibrary;
use dungeon_dfs::core::NodeId;
use dungeon_dfs::graph::{Chain, LevelGraph};
use dungeon_dfs::shape_source::starter_set;

fn path(n: u32) -> color_eyre::Result<(LevelGraph, Vec<Chain>)> {
    let graph = LevelGraph::from_parts(
        (0..n).map(|i| (NodeId(i), "room".to_string())),
        (1..n).map(|i| ((NodeId(i - 1), NodeId(i)), "hall".to_string())),
    )?;
    let ids: Vec<u32> = (0..n).collect();
    Ok((graph, vec![Chain::path(&ids)]))
}

// A ring of n rooms: one chain around, closed back onto n0.
fn ring(n: u32) -> color_eyre::Result<(LevelGraph, Vec<Chain>)> {
    let graph = LevelGraph::from_parts(
        (0..n).map(|i| (NodeId(i), "room".to_string())),
        (0..n).map(|i| ((NodeId(i), NodeId((i + 1) % n)), "hall".to_string())),
    )?;
    let ids: Vec<u32> = (0..n).chain([0]).collect();
    Ok((graph, vec![Chain::path(&ids)]))
}

/// Usage: bench-solve [out.json] [baseline.json]
///
/// With a baseline, logs the change in time and success rate per case.
pub fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args: Vec<String> = std::env::args().collect();
    let out = args.get(1).cloned().unwrap_or_else(|| "stats/bench-solve.json".to_string());
    let (shapes, catalog) = starter_set().load()?;
    let mut bench = Bench::new();
    bench.time(10, "precompute_starter_set", || {
        ConfigSpaceLibrary::precompute_all(&shapes, false);
    });
    let library = ConfigSpaceLibrary::precompute_all(&shapes, false);
    let config = SolverConfig::default();
    let paths = [path(4)?, path(8)?, path(12)?];
    bench.solve_cases(10, "solve_paths", &shapes, &library, &catalog, &config, &paths);
    let rings = [ring(4)?, ring(6)?];
    bench.solve_cases(10, "solve_rings", &shapes, &library, &catalog, &config, &rings);

    if let Some(baseline) = args.get(2) {
        if Path::new(baseline).exists() {
            let before = Bench::load_json(baseline)?;
            for (name, delta) in compare(&before, bench.results()) {
                info!(name, seconds = delta.seconds, success_rate = delta.success_rate, "vs baseline");
            }
        } else {
            warn!(baseline, "no baseline to compare against");
        }
    }
    bench.save_json(&out)?;
    Ok(())
}
