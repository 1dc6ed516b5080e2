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

use std::cmp::Reverse;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use aig::{Action, AigNetwork, NodeId, SubscriberId};
use analyzer::RedundancyOracle;
use fnv::{FnvHashMap, FnvHashSet};
use log::{debug, trace, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};


/// Number of distinct fan-in ordering policies (ids 0..NUM_SORT_TYPES).
pub const NUM_SORT_TYPES: i32 = 18;

/// The cost function shared by the optimizer and the schedulers: the two-input AND
/// count of the network (a k-input AND contributes k - 1).
pub fn two_input_cost(ntk: &AigNetwork) -> usize {
    ntk.internals()
        .iter()
        .map(|&id| ntk.num_fanins(id).saturating_sub(1))
        .sum()
}

#[derive(Clone, Debug, Default)]
pub struct Stats {
    pub tried_nodes: usize,
    pub tried_fanins: usize,
    pub added_nodes: usize,
    pub added_fanins: usize,
    pub removed_fanins: usize,
    pub ups: usize,
    pub eqs: usize,
    pub downs: usize,
    pub duration_reduce: Duration,
    pub duration_add: Duration,
}

impl Stats {
    pub fn merge(&mut self, other: &Stats) {
        self.tried_nodes += other.tried_nodes;
        self.tried_fanins += other.tried_fanins;
        self.added_nodes += other.added_nodes;
        self.added_fanins += other.added_fanins;
        self.removed_fanins += other.removed_fanins;
        self.ups += other.ups;
        self.eqs += other.eqs;
        self.downs += other.downs;
        self.duration_reduce += other.duration_reduce;
        self.duration_add += other.duration_add;
    }
}

#[derive(Clone, Debug)]
pub struct OptimizerConfig {
    /// Fan-in ordering policy id; negative picks one at random per run.
    pub sort_type: i32,
    /// Sort every node's fan-ins once before the first pass.
    pub sort_initial: bool,
    /// Sort each node's fan-ins just before querying the oracle at that node.
    pub sort_per_node: bool,
    /// Discard enlarging edits whose final cost exceeds the starting cost.
    pub greedy: bool,
    /// Enlarging attempts per run when additions are allowed.
    pub num_targets: usize,
    /// Approximate mode: between runs the threshold may be promoted to the cached
    /// next-best cost, as long as it stays within this budget. `None` keeps the
    /// oracle exact.
    pub error_budget: Option<i64>,
    /// When set, every network that shrank during a pass is dumped here as AIGER.
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for OptimizerConfig {
    fn default() -> OptimizerConfig {
        OptimizerConfig {
            sort_type: -1,
            sort_initial: false,
            sort_per_node: true,
            greedy: true,
            num_targets: 3,
            error_budget: None,
            snapshot_dir: None,
        }
    }
}

///
/// The redundancy-driven optimizer: repeatedly asks the oracle which fan-in edges are
/// removable and removes them in a cost-reducing order, normalizing as it goes. One
/// `Optimizer` serves one worker; `assign` binds it to a job's network and `run` then
/// yields one edit sequence per call until it reports an empty one (converged).
///
pub struct Optimizer<O> {
    oracle: O,
    config: OptimizerConfig,
    sort_type: i32,
    rng: StdRng,
    rand_pi_order: Vec<usize>,
    rand_costs: Vec<u64>,
    deadline: Option<Instant>,
    first_run: bool,
    attempts_left: usize,
    module: usize,
    snapshot_count: usize,
    subscriber: Option<SubscriberId>,
    stats: Stats,
}

impl<O: RedundancyOracle> Optimizer<O> {
    pub fn new(oracle: O, config: OptimizerConfig) -> Optimizer<O> {
        Optimizer {
            oracle,
            sort_type: config.sort_type,
            config,
            rng: StdRng::seed_from_u64(0),
            rand_pi_order: Vec::new(),
            rand_costs: Vec::new(),
            deadline: None,
            first_run: true,
            attempts_left: 0,
            module: 0,
            snapshot_count: 0,
            subscriber: None,
            stats: Stats::default(),
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    ///
    /// Binds the optimizer (and its oracle) to a job's network. `module` tags snapshot
    /// dumps; `add_allowed` enables the enlarging flow on runs after the first.
    ///
    pub fn assign(&mut self, ntk: &mut AigNetwork, module: usize, add_allowed: bool, reuse: bool) {
        self.subscriber = Some(ntk.subscribe());
        self.oracle.assign(ntk, reuse);
        self.first_run = true;
        self.attempts_left = if add_allowed { self.config.num_targets } else { 0 };
        self.module = module;
    }

    ///
    /// One optimization step. The first call per assignment reduces to a fixed point;
    /// subsequent calls (with additions allowed) each try one enlarging move followed
    /// by reduction. Returns the applied fan-in edits, or an empty sequence once no
    /// further distinct result exists.
    ///
    pub fn run(
        &mut self,
        ntk: &mut AigNetwork,
        seed: u64,
        deadline: Option<Instant>,
    ) -> Result<Vec<Action>, String> {
        self.deadline = deadline;
        if self.first_run {
            self.first_run = false;
            self.rng = StdRng::seed_from_u64(seed);
            self.rand_pi_order.clear();
            self.rand_costs.clear();
            if self.config.sort_type < 0 {
                self.sort_type = self.rng.gen_range(0..NUM_SORT_TYPES);
                debug!("fanin ordering policy = {}", self.sort_type);
            }
            if self.config.sort_initial {
                let ids: Vec<NodeId> = ntk.internals().to_vec();
                for id in ids {
                    if ntk.is_int(id) {
                        self.sort_fanins(ntk, id);
                    }
                }
            }
        } else if let Some(budget) = self.config.error_budget {
            // Approximate mode: promote the threshold to the best candidate the
            // previous run failed, as long as the budget covers it.
            if let Some(next) = self.oracle.next() {
                if next > self.oracle.threshold() && next <= budget {
                    self.oracle.set_threshold(next);
                }
            }
        }
        self.drain(ntk);
        let reduced = self.remove_redundancy(ntk)?;
        let actions = self.drain(ntk);
        if reduced {
            return Ok(Self::edits(actions));
        }
        while self.attempts_left > 0 && !self.expired() {
            self.attempts_left -= 1;
            if let Some(actions) = self.try_enlarge(ntk)? {
                return Ok(actions);
            }
        }
        Ok(Vec::new())
    }

    /// Whether any fan-in of any node is removable, leaving the network unchanged.
    pub fn is_redundant(&mut self, ntk: &mut AigNetwork) -> Result<bool, String> {
        self.oracle.assign(ntk, false);
        let ids: Vec<NodeId> = ntk.internals().to_vec();
        for &id in ids.iter().rev() {
            for idx in 0..ntk.num_fanins(id) {
                if self.oracle.check_redundancy(ntk, id, idx)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn drain(&mut self, ntk: &mut AigNetwork) -> Vec<Action> {
        match self.subscriber {
            Some(subscriber) => ntk.drain_actions(subscriber),
            None => Vec::new(),
        }
    }

    // The edit sequence worth recording in exploration history.
    fn edits(actions: Vec<Action>) -> Vec<Action> {
        actions
            .into_iter()
            .filter(|action| {
                matches!(action, Action::RemoveFanin { .. } | Action::AddFanin { .. })
            })
            .collect()
    }

    fn remove_redundancy(&mut self, ntk: &mut AigNetwork) -> Result<bool, String> {
        let start = Instant::now();
        let mut reduced = false;
        while !self.expired() && self.one_traversal(ntk)? {
            reduced = true;
            self.oracle.reset_next();
        }
        self.stats.duration_reduce += start.elapsed();
        Ok(reduced)
    }

    // One pass over the internals in reverse topological order.
    fn one_traversal(&mut self, ntk: &mut AigNetwork) -> Result<bool, String> {
        let mut reduced = false;
        let ids: Vec<NodeId> = ntk.internals().to_vec();
        for &id in ids.iter().rev() {
            if !ntk.is_int(id) {
                continue;
            }
            if ntk.num_fanouts(id) == 0 {
                ntk.remove_unused(id, false);
                continue;
            }
            ntk.trivial_collapse(id);
            if self.config.sort_per_node {
                self.sort_fanins(ntk, id);
            }
            reduced |= self.remove_redundant_fanins(ntk, id)?;
            if ntk.num_fanins(id) <= 1 {
                ntk.propagate(Some(id));
            }
        }
        Ok(reduced)
    }

    fn remove_redundant_fanins(&mut self, ntk: &mut AigNetwork, id: NodeId) -> Result<bool, String> {
        debug_assert!(ntk.num_fanouts(id) > 0);
        self.stats.tried_nodes += 1;
        let mut reduced = false;
        let mut idx = 0;
        while idx < ntk.num_fanins(id) {
            self.stats.tried_fanins += 1;
            if self.oracle.check_redundancy(ntk, id, idx)? {
                let fanin = ntk.fanin(id, idx);
                ntk.remove_fanin(id, idx);
                self.stats.removed_fanins += 1;
                reduced = true;
                if ntk.is_int(fanin) && ntk.num_fanouts(fanin) == 0 {
                    ntk.remove_unused(fanin, true);
                }
                self.dump_snapshot(ntk);
            } else {
                idx += 1;
            }
        }
        Ok(reduced)
    }

    ///
    /// One enlarging move: add a feasible fan-in somewhere, re-reduce, and keep the
    /// result unless greedy mode rejects a cost increase. Returns the edit sequence on
    /// success, `None` when the attempt found nothing.
    ///
    fn try_enlarge(&mut self, ntk: &mut AigNetwork) -> Result<Option<Vec<Action>>, String> {
        let start = Instant::now();
        let targets: Vec<NodeId> = ntk.internals().to_vec();
        if targets.is_empty() {
            return Ok(None);
        }
        let target = targets[self.rng.gen_range(0..targets.len())];
        let mut cone = FnvHashSet::default();
        cone.insert(target);
        ntk.for_each_tfo(target, true, |n| {
            cone.insert(n);
        });
        for e in ntk.fanins(target) {
            cone.insert(e.node());
        }
        let candidates: Vec<NodeId> = ntk
            .pis()
            .iter()
            .chain(ntk.internals().iter())
            .copied()
            .filter(|n| !cone.contains(n))
            .collect();
        if candidates.is_empty() {
            self.stats.duration_add += start.elapsed();
            return Ok(None);
        }
        let fanin = candidates[self.rng.gen_range(0..candidates.len())];
        let complement = self.rng.gen_bool(0.5);
        if !self.oracle.check_feasibility(ntk, target, fanin, complement)? {
            self.stats.duration_add += start.elapsed();
            return Ok(None);
        }
        let cost_before = two_input_cost(ntk);
        let slot = ntk.save(None);
        self.drain(ntk);
        ntk.add_fanin(target, fanin, complement)?;
        self.stats.added_nodes += 1;
        self.stats.added_fanins += 1;
        self.remove_redundancy(ntk)?;
        let cost_after = two_input_cost(ntk);
        if cost_after > cost_before {
            self.stats.ups += 1;
        } else if cost_after == cost_before {
            self.stats.eqs += 1;
        } else {
            self.stats.downs += 1;
        }
        if self.config.greedy && cost_after > cost_before {
            ntk.load(slot);
            ntk.pop_back();
            self.drain(ntk);
            self.stats.duration_add += start.elapsed();
            return Ok(None);
        }
        ntk.pop_back();
        let actions = self.drain(ntk);
        self.stats.duration_add += start.elapsed();
        trace!(
            "enlarging move at node {target} kept: cost {cost_before} -> {cost_after}"
        );
        Ok(Some(Self::edits(actions)))
    }

    fn dump_snapshot(&mut self, ntk: &AigNetwork) {
        let Some(dir) = &self.config.snapshot_dir else {
            return;
        };
        let path = dir.join(format!("{}_{}.aig", self.module, self.snapshot_count));
        self.snapshot_count += 1;
        if let Err(e) = std::fs::write(&path, codec::aiger::write_aiger(ntk, 0)) {
            warn!("could not dump {}: {e}", path.display());
        }
    }

    // Policies order removal candidates; smaller keys are tried (and removed) first.
    fn sort_fanins(&mut self, ntk: &mut AigNetwork, id: NodeId) {
        if self.sort_type == 0 {
            return;
        }
        if matches!(self.sort_type, 3 | 7 | 10 | 13) {
            self.set_rand_pi_order(ntk);
        }
        if matches!(self.sort_type, 14..=17) {
            self.set_rand_costs(ntk);
        }
        let mut keys: FnvHashMap<NodeId, (bool, i64, i64, Reverse<u64>)> = FnvHashMap::default();
        for e in ntk.fanins(id) {
            let n = e.node();
            let pi = ntk.is_pi(n);
            let pidx = ntk.pi_index(n).map(|i| i as i64).unwrap_or(0);
            let rpi = if pi && !self.rand_pi_order.is_empty() {
                self.rand_pi_order[pidx as usize] as i64
            } else {
                0
            };
            let fo = ntk.num_fanouts(n) as i64;
            let ti = ntk.int_position(n).map(|i| i as i64).unwrap_or(0);
            let rc = self.rand_costs.get(n).copied().unwrap_or(0);
            let key = match self.sort_type {
                1 => (pi, 0, 0, Reverse(0)),
                2 => (pi, if pi { -pidx } else { 0 }, 0, Reverse(0)),
                3 => (pi, if pi { -rpi } else { 0 }, 0, Reverse(0)),
                4 => (false, fo, 0, Reverse(0)),
                5 => (pi, fo, 0, Reverse(0)),
                6 => (pi, if pi { -pidx } else { fo }, 0, Reverse(0)),
                7 => (pi, if pi { -rpi } else { fo }, 0, Reverse(0)),
                8 => (pi, if pi { 0 } else { -ti }, 0, Reverse(0)),
                9 => (pi, if pi { -pidx } else { -ti }, 0, Reverse(0)),
                10 => (pi, if pi { -rpi } else { -ti }, 0, Reverse(0)),
                11 => (pi, fo, if pi { 0 } else { -ti }, Reverse(0)),
                12 => (pi, if pi { 0 } else { fo }, if pi { -pidx } else { -ti }, Reverse(0)),
                13 => (pi, if pi { 0 } else { fo }, if pi { -rpi } else { -ti }, Reverse(0)),
                14 => (false, 0, 0, Reverse(rc)),
                15 => (pi, 0, 0, Reverse(rc)),
                16 => (false, fo, 0, Reverse(rc)),
                17 => (pi, fo, 0, Reverse(rc)),
                other => panic!("unknown fanin ordering policy {other}"),
            };
            keys.insert(n, key);
        }
        ntk.sort_fanins_by(id, |a, b| keys[&a.node()].cmp(&keys[&b.node()]));
    }

    fn set_rand_pi_order(&mut self, ntk: &AigNetwork) {
        if self.rand_pi_order.len() != ntk.num_pis() {
            self.rand_pi_order = (0..ntk.num_pis()).collect();
            self.rand_pi_order.shuffle(&mut self.rng);
        }
    }

    fn set_rand_costs(&mut self, ntk: &AigNetwork) {
        while self.rand_costs.len() < ntk.num_nodes() {
            self.rand_costs.push(self.rng.gen::<u64>());
        }
    }
}
