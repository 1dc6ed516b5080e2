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

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use aig::{Action, AigNetwork, NodeId};
use analyzer::RedundancyOracle;
use bytes::Bytes;
use canonical::Canonicalizer;
use dedup::{DedupTable, EvictTable, Table};
use log::{debug, error, info};
use optimizer::{two_input_cost, Optimizer};
use parking_lot::{Condvar, Mutex};

mod rewrite;
mod single;

pub use crate::rewrite::{command_list, RewriteBackend, RewriteRecord, RewriteScheduler};
pub use crate::single::SingleTierScheduler;


///
/// One applied edit, as recorded in exploration history. A registered network's history
/// names its predecessor entry and the edit sequence that produced it, so any discovered
/// network can be replayed from the seed.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Edit {
    Remove { id: NodeId, idx: usize },
    Add { id: NodeId, fanin: NodeId },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HistoryRecord {
    /// `(tier, index)` of the predecessor entry; `None` for the seed network.
    pub source: Option<(usize, usize)>,
    pub edits: Vec<Edit>,
}

pub(crate) fn edits_of(actions: &[Action]) -> Vec<Edit> {
    actions
        .iter()
        .filter_map(|action| match action {
            Action::RemoveFanin { id, idx, .. } => Some(Edit::Remove { id: *id, idx: *idx }),
            Action::AddFanin { id, fanin, .. } => Some(Edit::Add {
                id: *id,
                fanin: *fanin,
            }),
            _ => None,
        })
        .collect()
}

// Canonicalize a copy and serialize it: the signature under which networks dedup.
pub(crate) fn canonical_bytes(ntk: &AigNetwork) -> Result<Bytes, String> {
    let mut copy = ntk.duplicate();
    Canonicalizer::new().run(&mut copy)?;
    Ok(codec::encode(&copy))
}

// A job's random seed is a function of the configured seed and the job's input bytes,
// never of the (race-dependent) job id, so the explored set is reproducible across
// thread counts.
pub(crate) fn job_seed(seed: u64, payload: &[u8]) -> u64 {
    use std::hash::Hasher;
    let mut hasher = fnv::FnvHasher::with_key(seed);
    hasher.write(payload);
    hasher.finish()
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub seed: u64,
    /// Worker threads; 1 (or `deterministic`) serializes the whole exploration.
    pub num_threads: usize,
    pub deterministic: bool,
    /// Exploration depth N: tiers 1..=N hold intermediates, tier 0 the final pool.
    pub num_tiers: usize,
    /// Only admit a network into the final pool if its cost did not increase along the
    /// path that produced it.
    pub no_increase: bool,
    pub timeout: Option<Duration>,
    /// Initial and maximum bucket-array size (log2) of the dedup tables.
    pub table_size_pow: u32,
    pub table_max_pow: u32,
    /// Stop creating final-pool jobs once this many final networks exist.
    pub final_cap: usize,
}

impl Default for SchedulerConfig {
    fn default() -> SchedulerConfig {
        SchedulerConfig {
            seed: 0,
            num_threads: 1,
            deterministic: true,
            num_tiers: 1,
            no_increase: true,
            timeout: None,
            table_size_pow: 16,
            table_max_pow: 22,
            final_cap: 200_000,
        }
    }
}

impl SchedulerConfig {
    /// One worker per available core, giving up reproducible output ordering.
    pub fn parallel() -> SchedulerConfig {
        SchedulerConfig {
            num_threads: num_cpus::get(),
            deterministic: false,
            ..SchedulerConfig::default()
        }
    }
}

#[derive(Clone, Debug)]
struct Job {
    id: usize,
    src_tab: usize,
    src_idx: usize,
    cost: usize,
    n_add: usize,
}

struct Pending {
    // queues[N - src_tab]: deeper sources pop first, favouring converging work.
    queues: Vec<VecDeque<Job>>,
    created: usize,
    terminate: bool,
}

struct Shared<'a> {
    config: &'a SchedulerConfig,
    deadline: Option<Instant>,
    tiers: Vec<Mutex<Box<dyn DedupTable<HistoryRecord>>>>,
    pending: Mutex<Pending>,
    cond_pending: Condvar,
    finished: Mutex<usize>,
    cond_finished: Condvar,
}

impl<'a> Shared<'a> {
    fn new(config: &'a SchedulerConfig) -> Shared<'a> {
        let mut tiers: Vec<Mutex<Box<dyn DedupTable<HistoryRecord>>>> = Vec::new();
        tiers.push(Mutex::new(Box::new(Table::new(config.table_size_pow))));
        for _ in 0..config.num_tiers {
            tiers.push(Mutex::new(Box::new(EvictTable::new(
                config.table_size_pow,
                config.table_max_pow,
            ))));
        }
        Shared {
            config,
            deadline: config.timeout.map(|t| Instant::now() + t),
            tiers,
            pending: Mutex::new(Pending {
                queues: vec![VecDeque::new(); config.num_tiers + 1],
                created: 0,
                terminate: false,
            }),
            cond_pending: Condvar::new(),
            finished: Mutex::new(0),
            cond_finished: Condvar::new(),
        }
    }

    fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    ///
    /// Registers a canonicalized network in `next_tab` and, when it is new, creates its
    /// exploration job while still holding the table lock, so no worker can observe the
    /// entry before its job exists. Lock order is always table, then pending queue.
    ///
    fn register(
        &self,
        ntk: &AigNetwork,
        source: Option<(usize, usize)>,
        edits: Vec<Edit>,
        next_tab: usize,
        job: Option<(usize, usize)>,
    ) -> Result<(bool, usize), String> {
        let bytes = canonical_bytes(ntk)?;
        let record = HistoryRecord { source, edits };
        let mut table = self.tiers[next_tab].lock();
        let (new, index) = table.register(bytes, record);
        if new {
            let saturated = next_tab == 0 && table.len() > self.config.final_cap;
            if saturated {
                debug!("final pool saturated at {} entries", table.len());
            } else if let Some((cost, n_add)) = job {
                self.create_job(next_tab, index, cost, n_add);
            }
        }
        Ok((new, index))
    }

    fn create_job(&self, src_tab: usize, src_idx: usize, cost: usize, n_add: usize) {
        let mut pending = self.pending.lock();
        let id = pending.created;
        pending.created += 1;
        let priority = self.config.num_tiers - src_tab;
        pending.queues[priority].push_back(Job {
            id,
            src_tab,
            src_idx,
            cost,
            n_add,
        });
        self.cond_pending.notify_one();
    }

    fn finish_job(&self) {
        let mut finished = self.finished.lock();
        *finished += 1;
        self.cond_finished.notify_one();
    }

    // Blocks until every created job has finished.
    fn wait(&self) {
        loop {
            let created = {
                let pending = self.pending.lock();
                let finished = self.finished.lock();
                if pending.created == *finished {
                    return;
                }
                pending.created
            };
            let mut finished = self.finished.lock();
            while created > *finished {
                self.cond_finished.wait(&mut finished);
            }
        }
    }
}

fn pop_job(pending: &mut Pending) -> Option<Job> {
    pending.queues.iter_mut().find_map(|q| q.pop_front())
}

///
/// The multi-tier exploration scheduler. Tier 0 is the final-answer pool; tiers 1..=N
/// hold (evictable) intermediates. A job optimizes one registered network; every
/// structurally distinct result is canonicalized and registered, and each newly seen
/// structure fans out one further job until the tiers drain.
///
pub struct Scheduler<F> {
    config: SchedulerConfig,
    make_optimizer: F,
}

impl<F, O> Scheduler<F>
where
    F: Fn() -> Optimizer<O> + Sync,
    O: RedundancyOracle,
{
    pub fn new(config: SchedulerConfig, make_optimizer: F) -> Scheduler<F> {
        Scheduler {
            config,
            make_optimizer,
        }
    }

    ///
    /// Explores from `original` until the job queues drain (or the deadline passes),
    /// returning the final pool in registration order. The input network is normalized
    /// (swept and collapsed) in place.
    ///
    pub fn run(&self, original: &mut AigNetwork) -> Result<Vec<AigNetwork>, String> {
        original.sweep(true);
        original.trivial_collapse_all();
        let mut seed_optimizer = (self.make_optimizer)();
        let redundant = seed_optimizer.is_redundant(original)?;
        let shared = Shared::new(&self.config);
        let cost = two_input_cost(original);
        shared.register(original, None, Vec::new(), 0, Some((cost, 0)))?;
        let parallel = self.config.num_threads > 1 && !self.config.deterministic;
        if parallel {
            std::thread::scope(|scope| {
                for _ in 0..self.config.num_threads {
                    scope.spawn(|| self.worker(&shared));
                }
                shared.wait();
                let mut pending = shared.pending.lock();
                pending.terminate = true;
                shared.cond_pending.notify_all();
            });
        } else {
            let mut opt = seed_optimizer;
            loop {
                let job = pop_job(&mut shared.pending.lock());
                match job {
                    Some(job) => run_job(&shared, &mut opt, job),
                    None => break,
                }
            }
        }
        let (results, unique, entries) = {
            let table = shared.tiers[0].lock();
            let mut results = Vec::with_capacity(table.len());
            for i in 0..table.len() {
                results.push(codec::decode(&table.get(i))?);
            }
            let unique = table.len() - redundant as usize;
            (results, unique, table.len())
        };
        let finished = *shared.finished.lock();
        info!("unique = {unique} ({entries} entries), jobs = {finished}");
        Ok(results)
    }

    fn worker(&self, shared: &Shared<'_>) {
        let mut opt = (self.make_optimizer)();
        loop {
            let job = {
                let mut pending = shared.pending.lock();
                loop {
                    if pending.terminate {
                        return;
                    }
                    if let Some(job) = pop_job(&mut pending) {
                        break job;
                    }
                    shared.cond_pending.wait(&mut pending);
                }
            };
            run_job(shared, &mut opt, job);
        }
    }
}

fn run_job<O: RedundancyOracle>(shared: &Shared<'_>, opt: &mut Optimizer<O>, job: Job) {
    let payload = shared.tiers[job.src_tab].lock().get(job.src_idx);
    let num_tiers = shared.config.num_tiers;
    match codec::decode(&payload) {
        Ok(mut ntk) => {
            opt.assign(&mut ntk, job.id, job.n_add < num_tiers, true);
            let seed = job_seed(shared.config.seed, &payload);
            let mut first = true;
            loop {
                if shared.expired() {
                    debug!("job {}: deadline reached, skipping registration", job.id);
                    break;
                }
                let actions = match opt.run(&mut ntk, seed, shared.deadline) {
                    Ok(actions) => actions,
                    Err(e) => {
                        error!("job {}: optimizer aborted: {e}", job.id);
                        break;
                    }
                };
                let cost = two_input_cost(&ntk);
                if actions.is_empty() {
                    if first && job.n_add == num_tiers {
                        let admissible = !shared.config.no_increase || cost <= job.cost;
                        if admissible {
                            match shared.register(
                                &ntk,
                                Some((job.src_tab, job.src_idx)),
                                Vec::new(),
                                0,
                                Some((cost, 0)),
                            ) {
                                Ok((true, index)) => {
                                    debug!("job {}: final cost {cost} at entry {index}", job.id);
                                }
                                Ok((false, _)) => {}
                                Err(e) => error!("job {}: registration failed: {e}", job.id),
                            }
                        }
                    }
                    break;
                }
                let next_tab = (job.n_add + 1).min(num_tiers);
                let result = shared.register(
                    &ntk,
                    Some((job.src_tab, job.src_idx)),
                    edits_of(&actions),
                    next_tab,
                    Some((job.cost.min(cost), next_tab)),
                );
                match result {
                    Ok((true, index)) => {
                        debug!(
                            "job {}: cost {cost} registered at tier {next_tab} entry {index}",
                            job.id
                        );
                    }
                    Ok((false, _)) => {}
                    Err(e) => {
                        error!("job {}: registration failed: {e}", job.id);
                        break;
                    }
                }
                first = false;
            }
        }
        Err(e) => error!("job {}: undecodable payload: {e}", job.id),
    }
    shared.tiers[job.src_tab].lock().deref(job.src_idx);
    shared.finish_job();
}
