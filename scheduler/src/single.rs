// Copyright 2025 Resyn contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::VecDeque;
use std::time::Instant;

use aig::AigNetwork;
use analyzer::RedundancyOracle;
use dedup::{DedupTable, Table};
use log::{debug, error, info};
use optimizer::{two_input_cost, Optimizer};

use crate::{canonical_bytes, edits_of, HistoryRecord, SchedulerConfig};

struct Job {
    id: usize,
    src: usize,
    add: bool,
}

///
/// The single-table variant: one non-evicting pool, jobs carry only their source entry
/// and whether enlarging moves are allowed. Every distinct intermediate an optimizer
/// run reports is registered and, when new, fans out one further job. Runs serially.
///
pub struct SingleTierScheduler<F> {
    config: SchedulerConfig,
    make_optimizer: F,
}

impl<F, O> SingleTierScheduler<F>
where
    F: Fn() -> Optimizer<O>,
    O: RedundancyOracle,
{
    pub fn new(config: SchedulerConfig, make_optimizer: F) -> SingleTierScheduler<F> {
        SingleTierScheduler {
            config,
            make_optimizer,
        }
    }

    pub fn run(&self, original: &mut AigNetwork) -> Result<Vec<AigNetwork>, String> {
        original.sweep(true);
        original.trivial_collapse_all();
        let mut opt = (self.make_optimizer)();
        let redundant = opt.is_redundant(original)?;
        let deadline = self.config.timeout.map(|t| Instant::now() + t);
        let mut table: Table<HistoryRecord> = Table::new(self.config.table_size_pow);
        let mut queue: VecDeque<Job> = VecDeque::new();
        let mut created = 0;
        let (_, seed_index) = table.register(
            canonical_bytes(original)?,
            HistoryRecord {
                source: None,
                edits: Vec::new(),
            },
        );
        queue.push_back(Job {
            id: created,
            src: seed_index,
            add: !redundant,
        });
        created += 1;
        let mut finished = 0;
        while let Some(job) = queue.pop_front() {
            let payload = table.get(job.src);
            let mut ntk = codec::decode(&payload)?;
            opt.assign(&mut ntk, job.id, job.add, true);
            let seed = crate::job_seed(self.config.seed, &payload);
            loop {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    debug!("job {}: deadline reached", job.id);
                    break;
                }
                let actions = match opt.run(&mut ntk, seed, deadline) {
                    Ok(actions) => actions,
                    Err(e) => {
                        error!("job {}: optimizer aborted: {e}", job.id);
                        break;
                    }
                };
                if actions.is_empty() {
                    break;
                }
                let record = HistoryRecord {
                    source: Some((0, job.src)),
                    edits: edits_of(&actions),
                };
                let (new, index) = table.register(canonical_bytes(&ntk)?, record);
                if new {
                    debug!(
                        "job {}: cost {} registered at entry {index}",
                        job.id,
                        two_input_cost(&ntk)
                    );
                    if table.len() <= self.config.final_cap {
                        queue.push_back(Job {
                            id: created,
                            src: index,
                            add: true,
                        });
                        created += 1;
                    }
                }
            }
            finished += 1;
        }
        assert_eq!(created, finished);
        info!("unique = {}, jobs = {finished}", table.len());
        let mut results = Vec::with_capacity(table.len());
        for i in 0..table.len() {
            results.push(codec::decode(&table.get(i))?);
        }
        Ok(results)
    }
}
