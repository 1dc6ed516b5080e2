// Copyright 2025 Resyn contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

#![deny(warnings)]
// Enable all clippy lints except for many of the pedantic ones. It's a shame this needs to be copied and pasted across crates, but there doesn't appear to be a way to include inner attributes from a common source.
#![deny(
    clippy::all,
    clippy::default_trait_access,
    clippy::expl_impl_clone_on_copy,
    clippy::if_not_else,
    clippy::needless_continue,
    clippy::unseparated_literal_suffix,
    clippy::used_underscore_binding
)]
// It is often more clear to show that nothing is being moved.
#![allow(clippy::match_ref_pats)]
// Subjective style.
#![allow(
    clippy::len_without_is_empty,
    clippy::redundant_field_names,
    clippy::too_many_arguments
)]
// Default isn't as big a deal as people seem to think it is.
#![allow(clippy::new_without_default, clippy::new_ret_no_self)]

//! A logic-synthesis engine that rewrites combinational And-Inverter networks to
//! reduce their two-input AND count while preserving Boolean behavior. Exploration is
//! redundancy-driven: an oracle decides which fan-in edges are removable, a
//! canonicalizer folds structurally equivalent results together, and a job scheduler
//! fans the search out over every structure not seen before.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};

pub use aig::{Action, AigNetwork, Edge, NodeId, NodeKind, CONST0};
pub use analyzer::{CostSimulator, PatternSimulator, RedundancyOracle, ThresholdAnalyzer};
pub use canonical::Canonicalizer;
pub use codec::aiger::{read_aiger, write_aiger};
pub use codec::{decode, encode};
pub use dedup::{DedupTable, EvictTable, Table};
pub use optimizer::{two_input_cost, Optimizer, OptimizerConfig, Stats};
pub use scheduler::{
    command_list, Edit, HistoryRecord, RewriteBackend, RewriteScheduler, Scheduler,
    SchedulerConfig, SingleTierScheduler,
};

#[cfg(test)]
mod tests;

///
/// The runtime knobs. Everything is optional in the sense of having a sensible
/// default; a driver fills in whatever its surface exposes.
///
#[derive(Clone, Debug)]
pub struct Params {
    pub seed: u64,
    pub timeout: Option<Duration>,
    pub num_threads: usize,
    /// Serialize job execution for reproducible output ordering.
    pub deterministic: bool,
    /// Emit the end-of-run summary at info level (otherwise debug).
    pub verbose: i32,
    /// Exploration depth: number of intermediate dedup tiers.
    pub num_tiers: usize,
    /// Refuse final-pool entries whose cost increased along their path.
    pub no_increase: bool,
    /// Fan-in ordering policy (see the optimizer); negative picks per run at random.
    pub sort_type: i32,
    pub sort_initial: bool,
    pub sort_per_node: bool,
    /// Discard enlarging edits that increased the cost.
    pub greedy: bool,
    /// Enlarging attempts per optimizer run.
    pub num_targets: usize,
    /// Approximate mode: admissible functional error, in simulation patterns.
    pub error_budget: Option<i64>,
    /// Threshold comparison direction of the analyzer.
    pub ascending: bool,
    /// 64-bit simulation words per pattern set.
    pub sim_words: usize,
    /// Hard cap on the final pool.
    pub final_cap: usize,
    pub table_size_pow: u32,
    pub table_max_pow: u32,
    /// Directory for intermediate AIGER dumps.
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for Params {
    fn default() -> Params {
        Params {
            seed: 0,
            timeout: None,
            num_threads: 1,
            deterministic: true,
            verbose: 0,
            num_tiers: 1,
            no_increase: true,
            sort_type: -1,
            sort_initial: false,
            sort_per_node: true,
            greedy: true,
            num_targets: 3,
            error_budget: None,
            ascending: true,
            sim_words: 16,
            final_cap: 200_000,
            table_size_pow: 16,
            table_max_pow: 22,
            snapshot_dir: None,
        }
    }
}

impl Params {
    fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            seed: self.seed,
            num_threads: self.num_threads,
            deterministic: self.deterministic,
            num_tiers: self.num_tiers,
            no_increase: self.no_increase,
            timeout: self.timeout,
            table_size_pow: self.table_size_pow,
            table_max_pow: self.table_max_pow,
            final_cap: self.final_cap,
        }
    }

    fn optimizer_config(&self) -> OptimizerConfig {
        OptimizerConfig {
            sort_type: self.sort_type,
            sort_initial: self.sort_initial,
            sort_per_node: self.sort_per_node,
            greedy: self.greedy,
            num_targets: self.num_targets,
            error_budget: self.error_budget,
            snapshot_dir: self.snapshot_dir.clone(),
        }
    }
}

///
/// Optimizes `ntk` in place (it is swept and collapsed) and returns every
/// Pareto-distinct network the exploration registered in the final pool, in
/// registration order.
///
pub fn run(ntk: &mut AigNetwork, params: &Params) -> Result<Vec<AigNetwork>, String> {
    let optimizer_config = params.optimizer_config();
    let seed = params.seed;
    let ascending = params.ascending;
    let sim_words = params.sim_words;
    let make_optimizer = move || {
        Optimizer::new(
            ThresholdAnalyzer::new(PatternSimulator::new(sim_words, seed), ascending),
            optimizer_config.clone(),
        )
    };
    let scheduler = Scheduler::new(params.scheduler_config(), make_optimizer);
    let results = scheduler.run(ntk)?;
    let best = results.iter().map(two_input_cost).min();
    if params.verbose > 0 {
        info!(
            "explored {} final networks, best cost {best:?}",
            results.len()
        );
    } else {
        debug!(
            "explored {} final networks, best cost {best:?}",
            results.len()
        );
    }
    Ok(results)
}

///
/// Reads a binary AIGER input, runs the exploration, and returns the final pool along
/// with the input's latch count (latches ride through as PI/PO pairs).
///
pub fn run_aiger(bytes: &[u8], params: &Params) -> Result<(Vec<AigNetwork>, usize), String> {
    let (mut ntk, latches) = read_aiger(bytes)?;
    let results = run(&mut ntk, params)?;
    Ok((results, latches))
}

pub fn run_aiger_file(path: &Path, params: &Params) -> Result<(Vec<AigNetwork>, usize), String> {
    let bytes =
        std::fs::read(path).map_err(|e| format!("could not read {}: {e}", path.display()))?;
    run_aiger(&bytes, params)
}
