use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde_derive::{Deserialize, Serialize};
use tracing::info;
use crate::catalog::Catalog;
use crate::config::SolverConfig;
use crate::config_space::ConfigSpaceLibrary;
use crate::core::Error;
use crate::engine::PlacementEngine;
use crate::geometry::ShapeRegistry;
use crate::graph::{Chain, LevelGraph};

/// What one named case cost and how often its solves came back solved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseStats {
    pub seconds: f64,
    pub runs: usize,
    pub solved: usize,
    // Commit steps summed over the solved runs.
    pub steps: usize,
}

impl CaseStats {
    pub fn success_rate(&self) -> f64 {
        if self.runs == 0 { 0.0 } else { self.solved as f64 / self.runs as f64 }
    }
}

/// Change from a baseline run to the current one, per case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseDelta {
    pub seconds: f64,
    pub success_rate: f64,
}

/// Timings of named cases. Seeds for solves come from the bench's own RNG, so
/// two benches over the same cases draw the same seeds.
pub struct Bench {
    results: BTreeMap<String, CaseStats>,
    rng: ChaCha20Rng,
}

const SEED: u64 = 0x5d1f_0c3a_9b27_e441;

impl Bench {
    pub fn new() -> Self {
        Self { results: BTreeMap::new(), rng: ChaCha20Rng::seed_from_u64(SEED) }
    }

    /// Times `n` runs of a step that cannot fail, such as a precompute.
    pub fn time<F: FnMut()>(&mut self, n: usize, name: &str, mut f: F) {
        let start = Instant::now();
        for _ in 0..n {
            f();
        }
        let seconds = start.elapsed().as_secs_f64();
        info!(name, seconds, runs = n, "bench");
        self.results.insert(name.into(), CaseStats { seconds, runs: n, solved: n, steps: 0 });
    }

    /// Solves every level `n` times, each with a fresh seed layered onto
    /// `config`, and records time, successes and steps under `name`.
    pub fn solve_cases<C: Catalog>(
        &mut self, n: usize, name: &str, shapes: &ShapeRegistry, library: &ConfigSpaceLibrary, catalog: &C,
        config: &SolverConfig, levels: &[(LevelGraph, Vec<Chain>)],
    ) {
        let mut stats = CaseStats::default();
        let start = Instant::now();
        for _ in 0..n {
            for (graph, chains) in levels {
                let seed = self.rng.random();
                let engine = PlacementEngine::new(shapes, library, catalog, config.clone().with_seed(seed));
                stats.runs += 1;
                if let Ok(sol) = engine.solve(graph, chains, None) {
                    stats.solved += 1;
                    stats.steps += sol.steps;
                }
            }
        }
        stats.seconds = start.elapsed().as_secs_f64();
        info!(name, seconds = stats.seconds, runs = stats.runs, solved = stats.solved, steps = stats.steps, "bench");
        self.results.insert(name.into(), stats);
    }

    pub fn results(&self) -> &BTreeMap<String, CaseStats> { &self.results }

    pub fn save_json(&self, filename: &str) -> Result<(), Error> {
        std::fs::write(filename, serde_json::to_string_pretty(&self.results)?)?;
        Ok(())
    }

    pub fn load_json(filename: &str) -> Result<BTreeMap<String, CaseStats>, Error> {
        let s = std::fs::read_to_string(filename)?;
        Ok(serde_json::from_str(&s)?)
    }
}

/// Per-case change from `baseline` to `current`. A case missing on one side
/// counts as zero there.
pub fn compare(
    baseline: &BTreeMap<String, CaseStats>, current: &BTreeMap<String, CaseStats>,
) -> BTreeMap<String, CaseDelta> {
    let zero = CaseStats::default();
    let names: BTreeSet<&String> = baseline.keys().chain(current.keys()).collect();
    names.into_iter().map(|name| {
        let before = baseline.get(name).unwrap_or(&zero);
        let after = current.get(name).unwrap_or(&zero);
        (name.clone(), CaseDelta {
            seconds: after.seconds - before.seconds,
            success_rate: after.success_rate() - before.success_rate(),
        })
    }).collect()
}
