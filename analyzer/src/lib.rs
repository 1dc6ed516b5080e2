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

use aig::{Action, AigNetwork, NodeId, SubscriberId};
use log::trace;

mod sim;
#[cfg(test)]
mod sim_tests;
pub use crate::sim::PatternSimulator;


///
/// The redundancy oracle boundary. The optimizer drives one of these per run; anything
/// that can answer "does removing this fan-in edge preserve the network's functions"
/// sits behind it (here a pattern simulator; externally a SAT or BDD engine).
///
/// The oracle must be safe to query after any network edit: implementations observe
/// mutations through the network's action queue and re-derive whatever they cached.
///
pub trait RedundancyOracle: Send {
    fn assign(&mut self, ntk: &mut AigNetwork, reuse: bool);
    fn check_redundancy(
        &mut self,
        ntk: &mut AigNetwork,
        id: NodeId,
        idx: usize,
    ) -> Result<bool, String>;
    /// Whether adding the edge `(fanin, complement)` to `id` keeps the functional cost
    /// within the threshold.
    fn check_feasibility(
        &mut self,
        ntk: &mut AigNetwork,
        id: NodeId,
        fanin: NodeId,
        complement: bool,
    ) -> Result<bool, String>;
    fn reset_next(&mut self);
    fn threshold(&self) -> i64;
    fn set_threshold(&mut self, threshold: i64);
    /// The best cost seen that did not pass the current threshold, if any.
    fn next(&self) -> Option<i64>;
    fn next_pair(&self) -> Option<(NodeId, usize)>;
}

///
/// A simulator that prices a hypothetical edit as a scalar functional cost (here, the
/// number of input patterns on which the edited network would disagree with the
/// reference captured at `assign` time). `Ok(None)` means indeterminate: the caller
/// must treat the edit as not redundant and carry on with degraded completeness.
///
pub trait CostSimulator: Send {
    fn assign(&mut self, ntk: &mut AigNetwork, reuse: bool);
    fn removal_cost(
        &mut self,
        ntk: &mut AigNetwork,
        id: NodeId,
        idx: usize,
    ) -> Result<Option<i64>, String>;
    fn addition_cost(
        &mut self,
        ntk: &mut AigNetwork,
        id: NodeId,
        fanin: NodeId,
        complement: bool,
    ) -> Result<Option<i64>, String>;
    fn default_threshold(&self) -> i64;
}

///
/// Wraps a cost simulator with monotone threshold semantics. In ascending mode an edit
/// passes when its cost is at most the threshold, and the analyzer caches the smallest
/// cost that failed, together with the (node, fanin index) that produced it; descending
/// mode mirrors this. Promoting the threshold to the cached next-best value between
/// runs gives approximate optimization with bounded error growth.
///
pub struct ThresholdAnalyzer<S> {
    sim: S,
    ascending: bool,
    threshold: i64,
    next: i64,
    next_pair: Option<(NodeId, usize)>,
    subscriber: Option<SubscriberId>,
}

impl<S: CostSimulator> ThresholdAnalyzer<S> {
    pub fn new(sim: S, ascending: bool) -> ThresholdAnalyzer<S> {
        let next = if ascending { i64::MAX } else { i64::MIN };
        ThresholdAnalyzer {
            sim,
            ascending,
            threshold: 0,
            next,
            next_pair: None,
            subscriber: None,
        }
    }

    fn drain(&mut self, ntk: &mut AigNetwork) {
        let Some(subscriber) = self.subscriber else {
            return;
        };
        for action in ntk.drain_actions(subscriber) {
            match action {
                // The cached candidate indexed a fan-in list that just changed.
                Action::RemoveFanin { .. }
                | Action::AddFanin { .. }
                | Action::Read
                | Action::Load { .. } => self.reset_next(),
                _ => {}
            }
        }
    }

    fn judge(&mut self, cost: i64, id: NodeId, idx: usize) -> bool {
        if self.ascending {
            if cost <= self.threshold {
                return true;
            }
            if cost < self.next {
                self.next = cost;
                self.next_pair = Some((id, idx));
            }
        } else {
            if cost >= self.threshold {
                return true;
            }
            if cost > self.next {
                self.next = cost;
                self.next_pair = Some((id, idx));
            }
        }
        false
    }
}

impl<S: CostSimulator> RedundancyOracle for ThresholdAnalyzer<S> {
    fn assign(&mut self, ntk: &mut AigNetwork, reuse: bool) {
        self.subscriber = Some(ntk.subscribe());
        self.reset_next();
        self.sim.assign(ntk, reuse);
        self.threshold = self.sim.default_threshold();
    }

    fn check_redundancy(
        &mut self,
        ntk: &mut AigNetwork,
        id: NodeId,
        idx: usize,
    ) -> Result<bool, String> {
        self.drain(ntk);
        match self.sim.removal_cost(ntk, id, idx)? {
            // Indeterminate: not redundant, with degraded completeness.
            None => Ok(false),
            Some(cost) => Ok(self.judge(cost, id, idx)),
        }
    }

    fn check_feasibility(
        &mut self,
        ntk: &mut AigNetwork,
        id: NodeId,
        fanin: NodeId,
        complement: bool,
    ) -> Result<bool, String> {
        self.drain(ntk);
        match self.sim.addition_cost(ntk, id, fanin, complement)? {
            None => Ok(false),
            Some(cost) => {
                let feasible = if self.ascending {
                    cost <= self.threshold
                } else {
                    cost >= self.threshold
                };
                Ok(feasible)
            }
        }
    }

    fn reset_next(&mut self) {
        self.next = if self.ascending { i64::MAX } else { i64::MIN };
        self.next_pair = None;
    }

    fn threshold(&self) -> i64 {
        self.threshold
    }

    fn set_threshold(&mut self, threshold: i64) {
        trace!("threshold set to {threshold}");
        self.threshold = threshold;
    }

    fn next(&self) -> Option<i64> {
        self.next_pair.map(|_| self.next)
    }

    fn next_pair(&self) -> Option<(NodeId, usize)> {
        self.next_pair
    }
}
