// Copyright 2025 Resyn contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::VecDeque;
use std::time::Instant;

use aig::AigNetwork;
use codec::aiger::{read_aiger, write_aiger};
use dedup::{DedupTable, Table};
use log::{debug, info, warn};

use crate::{canonical_bytes, SchedulerConfig};

///
/// An external rewriting back end, treated as a pure Boolean-equivalence-preserving
/// transformation oracle over AIGER bytes. The scheduler makes no assumption about a
/// command beyond that: a failing command is skipped, not fatal.
///
pub trait RewriteBackend: Send + Sync {
    fn execute(&self, aiger: &[u8], command: &str) -> Result<Vec<u8>, String>;
}

/// The fixed command vocabulary handed to the back end.
pub fn command_list() -> Vec<String> {
    let mut commands: Vec<String> = [
        "balance",
        "balance -l",
        "rewrite -z",
        "rewrite -zl",
        "refactor -z",
        "refactor -zl",
    ]
    .iter()
    .map(|s| (*s).to_owned())
    .collect();
    for k in 4..=16 {
        for n in 0..=3 {
            commands.push(format!("resub -N {n} -K {k} -z"));
            commands.push(format!("resub -N {n} -K {k} -zl"));
        }
    }
    commands
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RewriteRecord {
    /// Source entry index; `None` for the seed network.
    pub source: Option<usize>,
    /// Index into `command_list` of the command that produced this entry.
    pub command: Option<usize>,
}

///
/// Exploration driven entirely by the external back end: each job replays every command
/// against its source network, registers each canonicalized result, and fans out a job
/// for every structure not seen before.
///
pub struct RewriteScheduler<'a, B> {
    config: SchedulerConfig,
    backend: &'a B,
}

impl<'a, B: RewriteBackend> RewriteScheduler<'a, B> {
    pub fn new(config: SchedulerConfig, backend: &'a B) -> RewriteScheduler<'a, B> {
        RewriteScheduler { config, backend }
    }

    pub fn run(&self, original: &mut AigNetwork) -> Result<Vec<AigNetwork>, String> {
        original.sweep(true);
        original.trivial_collapse_all();
        let commands = command_list();
        let deadline = self.config.timeout.map(|t| Instant::now() + t);
        let mut table: Table<RewriteRecord> = Table::new(self.config.table_size_pow);
        let (_, seed_index) = table.register(
            canonical_bytes(original)?,
            RewriteRecord {
                source: None,
                command: None,
            },
        );
        let mut queue: VecDeque<usize> = VecDeque::new();
        queue.push_back(seed_index);
        let mut jobs = 0;
        while let Some(src) = queue.pop_front() {
            let payload = table.get(src);
            for (i, command) in commands.iter().enumerate() {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    debug!("rewrite job {jobs}: deadline reached");
                    break;
                }
                let ntk = codec::decode(&payload)?;
                let aiger = write_aiger(&ntk, 0);
                let rewritten = match self.backend.execute(&aiger, command) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!("command {command:?} failed: {e}");
                        continue;
                    }
                };
                let (mut result, _) = read_aiger(&rewritten)?;
                result.sweep(true);
                result.trivial_collapse_all();
                let record = RewriteRecord {
                    source: Some(src),
                    command: Some(i),
                };
                let (new, index) = table.register(canonical_bytes(&result)?, record);
                if new && table.len() <= self.config.final_cap {
                    queue.push_back(index);
                }
            }
            jobs += 1;
        }
        info!("unique = {}, jobs = {jobs}", table.len());
        let mut results = Vec::with_capacity(table.len());
        for i in 0..table.len() {
            results.push(codec::decode(&table.get(i))?);
        }
        Ok(results)
    }
}
