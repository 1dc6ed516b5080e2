// Copyright 2025 Resyn contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use aig::{Action, AigNetwork, NodeId, SubscriberId, CONST0};
use fnv::FnvHashMap;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::CostSimulator;

// Cofactor patterns for the six PI indices that fit within one 64-bit word.
const WORD_PATTERNS: [u64; 6] = [
    0xaaaa_aaaa_aaaa_aaaa,
    0xcccc_cccc_cccc_cccc,
    0xf0f0_f0f0_f0f0_f0f0,
    0xff00_ff00_ff00_ff00,
    0xffff_0000_ffff_0000,
    0xffff_ffff_0000_0000,
];

///
/// Word-parallel truth-table simulation over the network. With few enough PIs the
/// pattern set is exhaustive (every assignment, so costs are exact); otherwise it is a
/// seeded random sample of `64 * max_words` assignments. The reference PO values are
/// captured at `assign`; a cost is the number of sampled assignments on which the
/// hypothetically edited network would disagree with that reference on any PO,
/// evaluated through the transitive fan-out cone of the edited node only.
///
pub struct PatternSimulator {
    max_words: usize,
    seed: u64,
    exhaustive: bool,
    num_words: usize,
    last_mask: u64,
    pi_patterns: Vec<Vec<u64>>,
    values: Vec<Vec<u64>>,
    reference: Vec<Vec<u64>>,
    dirty: bool,
    subscriber: Option<SubscriberId>,
}

impl PatternSimulator {
    pub fn new(max_words: usize, seed: u64) -> PatternSimulator {
        assert!(max_words > 0);
        PatternSimulator {
            max_words,
            seed,
            exhaustive: false,
            num_words: 0,
            last_mask: !0,
            pi_patterns: Vec::new(),
            values: Vec::new(),
            reference: Vec::new(),
            dirty: false,
            subscriber: None,
        }
    }

    pub fn num_patterns(&self) -> usize {
        if self.last_mask == !0 {
            self.num_words * 64
        } else {
            (self.num_words - 1) * 64 + self.last_mask.count_ones() as usize
        }
    }

    fn build_patterns(&mut self, num_pis: usize) {
        self.exhaustive = num_pis < usize::BITS as usize && (1_usize << num_pis) <= 64 * self.max_words;
        self.pi_patterns.clear();
        if self.exhaustive {
            let bits = 1_usize << num_pis;
            self.num_words = bits.div_ceil(64);
            self.last_mask = if bits % 64 == 0 {
                !0
            } else {
                (1_u64 << bits) - 1
            };
            for i in 0..num_pis {
                let pattern = if i < 6 {
                    vec![WORD_PATTERNS[i]; self.num_words]
                } else {
                    (0..self.num_words)
                        .map(|w| if (w >> (i - 6)) & 1 == 1 { !0 } else { 0 })
                        .collect()
                };
                self.pi_patterns.push(pattern);
            }
        } else {
            self.num_words = self.max_words;
            self.last_mask = !0;
            let mut rng = StdRng::seed_from_u64(self.seed);
            for _ in 0..num_pis {
                self.pi_patterns
                    .push((0..self.num_words).map(|_| rng.gen::<u64>()).collect());
            }
        }
        debug!(
            "simulating {} patterns over {} PIs ({})",
            self.num_patterns(),
            num_pis,
            if self.exhaustive {
                "exhaustive"
            } else {
                "sampled"
            }
        );
    }

    fn conjunction(&self, ntk: &AigNetwork, id: NodeId, overlay: &FnvHashMap<NodeId, Vec<u64>>) -> Vec<u64> {
        let mut acc = vec![!0_u64; self.num_words];
        for e in ntk.fanins(id) {
            let value = overlay.get(&e.node()).unwrap_or(&self.values[e.node()]);
            let flip = if e.complement() { !0 } else { 0 };
            for (a, &v) in acc.iter_mut().zip(value) {
                *a &= v ^ flip;
            }
        }
        acc
    }

    fn simulate_full(&mut self, ntk: &AigNetwork) {
        self.values.clear();
        self.values.resize(ntk.num_nodes(), Vec::new());
        self.values[CONST0] = vec![0; self.num_words];
        for (idx, &pi) in ntk.pis().iter().enumerate() {
            self.values[pi] = self.pi_patterns[idx].clone();
        }
        let empty = FnvHashMap::default();
        for &id in ntk.internals() {
            self.values[id] = self.conjunction(ntk, id, &empty);
        }
        for &po in ntk.pos() {
            self.values[po] = self.conjunction(ntk, po, &empty);
        }
        self.dirty = false;
    }

    fn refresh(&mut self, ntk: &mut AigNetwork) {
        if let Some(subscriber) = self.subscriber {
            for action in ntk.drain_actions(subscriber) {
                match action {
                    Action::RemoveFanin { .. }
                    | Action::AddFanin { .. }
                    | Action::TrivialDecompose { .. }
                    | Action::Read
                    | Action::Load { .. } => self.dirty = true,
                    // The remaining mutations preserve every live node's function.
                    _ => {}
                }
            }
        }
        if self.dirty {
            self.simulate_full(ntk);
        }
    }

    // Counts the sampled assignments where any PO of the network-with-`candidate`
    // substituted at `id` disagrees with the reference.
    fn cost_of(&mut self, ntk: &mut AigNetwork, id: NodeId, candidate: Vec<u64>) -> i64 {
        let mut cone = Vec::new();
        ntk.for_each_tfo(id, true, |n| cone.push(n));
        let mut overlay: FnvHashMap<NodeId, Vec<u64>> = FnvHashMap::default();
        overlay.insert(id, candidate);
        for n in cone {
            let value = self.conjunction(ntk, n, &overlay);
            overlay.insert(n, value);
        }
        let mut errors = 0_i64;
        for w in 0..self.num_words {
            let mut diff = 0_u64;
            for (po_idx, &po) in ntk.pos().iter().enumerate() {
                let out = overlay.get(&po).unwrap_or(&self.values[po]);
                diff |= out[w] ^ self.reference[po_idx][w];
            }
            if w + 1 == self.num_words {
                diff &= self.last_mask;
            }
            errors += i64::from(diff.count_ones());
        }
        errors
    }
}

impl CostSimulator for PatternSimulator {
    fn assign(&mut self, ntk: &mut AigNetwork, reuse: bool) {
        self.subscriber = Some(ntk.subscribe());
        if !reuse || self.pi_patterns.len() != ntk.num_pis() {
            self.build_patterns(ntk.num_pis());
        }
        self.simulate_full(ntk);
        self.reference = ntk.pos().iter().map(|&po| self.values[po].clone()).collect();
    }

    fn removal_cost(
        &mut self,
        ntk: &mut AigNetwork,
        id: NodeId,
        idx: usize,
    ) -> Result<Option<i64>, String> {
        self.refresh(ntk);
        let mut candidate = vec![!0_u64; self.num_words];
        for (j, e) in ntk.fanins(id).iter().enumerate() {
            if j == idx {
                continue;
            }
            let flip = if e.complement() { !0 } else { 0 };
            for (a, &v) in candidate.iter_mut().zip(&self.values[e.node()]) {
                *a &= v ^ flip;
            }
        }
        Ok(Some(self.cost_of(ntk, id, candidate)))
    }

    fn addition_cost(
        &mut self,
        ntk: &mut AigNetwork,
        id: NodeId,
        fanin: NodeId,
        complement: bool,
    ) -> Result<Option<i64>, String> {
        self.refresh(ntk);
        let flip = if complement { !0 } else { 0 };
        let candidate = self.values[id]
            .iter()
            .zip(&self.values[fanin])
            .map(|(&a, &b)| a & (b ^ flip))
            .collect();
        Ok(Some(self.cost_of(ntk, id, candidate)))
    }

    fn default_threshold(&self) -> i64 {
        0
    }
}
