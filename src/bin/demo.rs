use std::env;
use color_eyre::eyre::eyre;
use tracing::info;
use tracing_subscriber::EnvFilter;
use dungeon_dfs::config::SolverConfig;
use dungeon_dfs::config_space::ConfigSpaceLibrary;
use dungeon_dfs::core::NodeId;
use dungeon_dfs::debug::render_ascii;
use dungeon_dfs::engine::solve_attempts;
use dungeon_dfs::graph::{Chain, LevelGraph};
use dungeon_dfs::shape_source::{starter_set, AsciiShapeSource};

// A small tree: a hub (n1) with two branches and a side room off n0.
fn level() -> color_eyre::Result<(LevelGraph, Vec<Chain>)> {
    let graph = LevelGraph::from_parts(
        (0..6).map(|i| (NodeId(i), "room".to_string())),
        [(0, 1), (1, 2), (1, 3), (3, 4), (0, 5)]
            .into_iter()
            .map(|(a, b)| ((NodeId(a), NodeId(b)), "hall".to_string())),
    )?;
    let chains = vec![Chain::path(&[0, 1, 2]), Chain::path(&[1, 3, 4]), Chain::path(&[0, 5])];
    Ok((graph, chains))
}

/// Usage: demo [config.json] [templates.json]
pub fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args: Vec<String> = env::args().collect();
    let config = match args.get(1) {
        Some(path) => SolverConfig::from_json_file(path)?,
        None => SolverConfig::default().with_attempts(4),
    };
    let source = match args.get(2) {
        Some(path) => AsciiShapeSource::from_json(&std::fs::read_to_string(path)?)?,
        None => starter_set(),
    };
    let (shapes, catalog) = source.load()?;
    let library = ConfigSpaceLibrary::precompute_all(&shapes, config.count_rejections);
    info!(templates = shapes.len(), spaces = library.len(), "precomputed");
    let (graph, chains) = level()?;
    let solution = solve_attempts(&shapes, &library, &catalog, &config, &graph, &chains, None)
        .map_err(|e| eyre!("no layout: {}", e))?;
    info!(seed = solution.seed, steps = solution.steps, "solved");
    println!("{}", render_ascii(&solution.placements));
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_demo_level_is_covered_by_chains() {
        let (graph, chains) = level().unwrap();
        let covered: usize = chains.iter().map(|c| c.edges.len()).sum();
        assert_eq!(covered, graph.edge_count());
        assert!(graph.is_connected());
    }
}
