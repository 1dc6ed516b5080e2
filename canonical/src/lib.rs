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

use aig::{AigNetwork, NodeId, CONST0};
use log::trace;

#[cfg(test)]
mod tests;

const MASK: usize = 0xFF;

// The mixing table: 256 32-bit primes. The exact values are part of the signature
// format; any change invalidates every stored signature.
#[rustfmt::skip]
const PRIMES: [u32; MASK + 1] = [
    0x984b6ad9, 0x18a6eed3, 0x950353e2, 0x6222f6eb, 0xdfbedd47, 0xef0f9023, 0xac932a26, 0x590eaf55,
    0x97d0a034, 0xdc36cd2e, 0x22736b37, 0xdc9066b0, 0x2eb2f98b, 0x5d9c7baf, 0x85747c9e, 0x8aca1055,
    0x50d66b74, 0x2f01ae9e, 0xa1a80123, 0x3e1ce2dc, 0xebedbc57, 0x4e68bc34, 0x855ee0cf, 0x17275120,
    0x2ae7f2df, 0xf71039eb, 0x7c283eec, 0x70cd1137, 0x7cf651f3, 0xa87bfa7a, 0x14d87f02, 0xe82e197d,
    0x8d8a5ebe, 0x1e6a15dc, 0x197d49db, 0x5bab9c89, 0x4b55dea7, 0x55dede49, 0x9a6a8080, 0xe5e51035,
    0xe148d658, 0x8a17eb3b, 0xe22e4b38, 0xe5be2a9a, 0xbe938cbb, 0x3b981069, 0x7f9c0c8e, 0xf756df10,
    0x8fa783f7, 0x252062ce, 0x3dc46b4b, 0xf70f6432, 0x3f378276, 0x44b137a1, 0x2bf74b77, 0x04892ed6,
    0xfd318de1, 0xd58c235e, 0x94c6d25b, 0x7aa5f218, 0x35c9e921, 0x5732fbbb, 0x06026481, 0xf584a44f,
    0x946e1b5f, 0x8463d5b2, 0x4ebca7b2, 0x54887b15, 0x08d1e804, 0x5b22067d, 0x794580f6, 0xb351ea43,
    0xbce555b9, 0x19ae2194, 0xd32f1396, 0x6fc1a7f1, 0x1fd8a867, 0x3a89fdb0, 0xea49c61c, 0x25f8a879,
    0xde1e6437, 0x7c74afca, 0x8ba63e50, 0xb1572074, 0xe4655092, 0xdb6f8b1c, 0xc2955f3c, 0x327f85ba,
    0x60a17021, 0x95bd261d, 0xdea94f28, 0x04528b65, 0xbe0109cc, 0x26dd5688, 0x6ab2729d, 0xc4f029ce,
    0xacf7a0be, 0x4c912f55, 0x34c06e65, 0x4fbb938e, 0x1533fb5f, 0x03da06bd, 0x48262889, 0xc2523d7d,
    0x28a71d57, 0x89f9713a, 0xf574c551, 0x7a99deb5, 0x52834d91, 0x5a6f4484, 0xc67ba946, 0x13ae698f,
    0x3e390f34, 0x34fc9593, 0x894c7932, 0x6cf414a3, 0xdb7928ab, 0x13a3b8a3, 0x4b381c1d, 0xa10b54cb,
    0x55359d9d, 0x35a3422a, 0x58d1b551, 0x0fd4de20, 0x199eb3f4, 0x167e09e2, 0x3ee6a956, 0x5371a7fa,
    0xd424efda, 0x74f521c5, 0xcb899ff6, 0x4a42e4f4, 0x747917b6, 0x4b08df0b, 0x090c7a39, 0x11e909e4,
    0x258e2e32, 0xd9fad92d, 0x48fe5f69, 0x0545cde6, 0x55937b37, 0x9b4ae4e4, 0x1332b40e, 0xc3792351,
    0xaff982ef, 0x4dba132a, 0x38b81ef1, 0x28e641bf, 0x227208c1, 0xec4bbe37, 0xc4e1821c, 0x512c9d09,
    0xdaef1257, 0xb63e7784, 0x043e04d7, 0x9c2cea47, 0x45a0e59a, 0x281315ca, 0x849f0aac, 0xa4071ed3,
    0x0ef707b3, 0xfe8dac02, 0x12173864, 0x471f6d46, 0x24a53c0a, 0x35ab9265, 0xbbf77406, 0xa2144e79,
    0xb39a884a, 0x0baf5b6d, 0xcccee3dd, 0x12c77584, 0x2907325b, 0xfd1adcd2, 0xd16ee972, 0x345ad6c1,
    0x315ebe66, 0xc7ad2b8d, 0x99e82c8d, 0xe52da8c8, 0xba50f1d3, 0x66689cd8, 0x2e8e9138, 0x43e15e74,
    0xf1ced14d, 0x188ec52a, 0xe0ef3cbb, 0xa958aedc, 0x4107a1bc, 0x5a9e7a3e, 0x3bde939f, 0xb5b28d5a,
    0x596fe848, 0xe85ad00c, 0x0b6b3aae, 0x44503086, 0x25b5695c, 0xc0c31dcd, 0x5ee617f0, 0x74d40c3a,
    0xd2cb2b9f, 0x1e19f5fa, 0x81e24faf, 0xa01ed68f, 0xcee172fc, 0x7fdf2e4d, 0x002f4774, 0x664f82dd,
    0xc569c39a, 0xa2d4dcbe, 0xaadea306, 0xa4c947bf, 0xa413e4e3, 0x81fb5486, 0x8a404970, 0x752c980c,
    0x98d1d881, 0x5c932c1e, 0xeee65dfb, 0x37592cdd, 0x0fd4e65b, 0xad1d383f, 0x62a1452f, 0x8872f68d,
    0xb58c919b, 0x345c8ee3, 0xb583a6d6, 0x43d72cb3, 0x77aaa0aa, 0xeb508242, 0xf2db64f8, 0x86294328,
    0x82211731, 0x1239a9d5, 0x673ba5de, 0xaf4af007, 0x44203b19, 0x2399d955, 0xa175cd12, 0x595928a7,
    0x6918928b, 0xde3126bb, 0x6c99835c, 0x63ba1fa2, 0xdebbdff0, 0x3d02e541, 0xd6f7aac6, 0xe80b4cd0,
    0xd0fa29f1, 0x804cac5e, 0x2c226798, 0x462f624c, 0xad05b377, 0x22924fcd, 0xfbea205c, 0x1b47586d,
];

///
/// Deterministic structural canonicalizer. Rewrites a swept, trivially collapsed network
/// into a form that is invariant under internal id renaming, fan-in reordering and
/// internal-order permutation, by iterative colour refinement over a fixed prime table
/// (a Weisfeiler-Lehman-style partition refinement with a deterministic tie break).
///
pub struct Canonicalizer {
    max_level: usize,
    levels: Vec<usize>,
    num_uniques: usize,
    uniques: Vec<usize>,
    // Flat class list: (begin, size) pairs indexing into `store`, kept ordered by the
    // initial (level, fanin-count) key.
    classes: Vec<usize>,
    classes_next: Vec<usize>,
    store: Vec<(u32, NodeId)>,
    num_sims: usize,
    values: Vec<u32>,
    old_to_new: Vec<Option<NodeId>>,
}

impl Canonicalizer {
    pub fn new() -> Canonicalizer {
        Canonicalizer {
            max_level: 0,
            levels: Vec::new(),
            num_uniques: 0,
            uniques: Vec::new(),
            classes: Vec::new(),
            classes_next: Vec::new(),
            store: Vec::new(),
            num_sims: 0,
            values: Vec::new(),
            old_to_new: Vec::new(),
        }
    }

    fn compute_levels(&mut self, ntk: &AigNetwork) {
        self.levels.clear();
        self.levels.resize(ntk.num_nodes(), 0);
        for &id in ntk.internals() {
            let mut level = 0;
            for e in ntk.fanins(id) {
                level = level.max(self.levels[e.node()]);
            }
            self.levels[id] = level + 1;
        }
        self.max_level = 0;
        for &po in ntk.pos() {
            self.levels[po] = self.levels[ntk.fanin(po, 0)] + 1;
            self.max_level = self.max_level.max(self.levels[po]);
        }
    }

    fn mix(v: usize, complement: bool) -> u32 {
        let index = ((v << 1) | (complement as usize)) & MASK;
        (v as u32).wrapping_add(1).wrapping_mul(PRIMES[index])
    }

    fn gen_value(&self, ntk: &AigNetwork, id: NodeId, complement: bool) -> u32 {
        if self.num_sims == 0 {
            return Self::mix(
                self.levels[id] + self.max_level * ntk.num_fanins(id),
                complement,
            );
        }
        if self.uniques[id] != 0 {
            return Self::mix(self.uniques[id], complement);
        }
        0
    }

    fn simulate(&mut self, ntk: &AigNetwork) {
        // Seed the constant and the PIs so the accumulation is PI-order sensitive.
        self.values[CONST0] = self.values[CONST0].wrapping_add(PRIMES[MASK]);
        for (idx, &pi) in ntk.pis().iter().enumerate() {
            let seed = PRIMES[MASK.wrapping_sub(idx).wrapping_sub(1) & MASK];
            self.values[pi] = self.values[pi].wrapping_add(seed);
        }
        for &id in ntk.internals() {
            for e in ntk.fanins(id) {
                let add = self.values[e.node()]
                    .wrapping_add(self.gen_value(ntk, e.node(), e.complement()));
                self.values[id] = self.values[id].wrapping_add(add);
            }
        }
        for &po in ntk.pos() {
            let e = ntk.fanin_edge(po, 0);
            let add = self.values[e.node()]
                .wrapping_add(self.gen_value(ntk, e.node(), e.complement()));
            self.values[po] = self.values[po].wrapping_add(add);
        }
        self.num_sims += 1;
    }

    fn simulate_back(&mut self, ntk: &AigNetwork) {
        for &po in ntk.pos() {
            let e = ntk.fanin_edge(po, 0);
            let add = self.values[po].wrapping_add(self.gen_value(ntk, po, e.complement()));
            self.values[e.node()] = self.values[e.node()].wrapping_add(add);
        }
        for &id in ntk.internals() {
            for e in ntk.fanins(id) {
                let add = self.values[id].wrapping_add(self.gen_value(ntk, id, e.complement()));
                self.values[e.node()] = self.values[e.node()].wrapping_add(add);
            }
        }
        self.num_sims += 1;
    }

    fn initialize_classes(&mut self, ntk: &AigNetwork) {
        // Group internals by (level, fanin count); singletons are coloured immediately.
        let mut nodes: Vec<Vec<Vec<NodeId>>> = vec![Vec::new(); self.max_level + 1];
        for &id in ntk.internals() {
            let num_fanins = ntk.num_fanins(id);
            debug_assert!(num_fanins > 1);
            let level = &mut nodes[self.levels[id]];
            if level.len() <= num_fanins {
                level.resize(num_fanins + 1, Vec::new());
            }
            level[num_fanins].push(id);
        }
        let mut num_items = 0;
        self.classes.clear();
        for by_fanins in nodes {
            for group in by_fanins {
                if group.is_empty() {
                    continue;
                }
                if group.len() == 1 {
                    self.uniques[group[0]] = self.num_uniques;
                    self.num_uniques += 1;
                } else {
                    self.classes.push(num_items);
                    self.classes.push(group.len());
                    for id in group {
                        self.store[num_items].1 = id;
                        num_items += 1;
                    }
                }
            }
        }
    }

    // Re-sorts every class by accumulated value and subdivides where adjacent values
    // differ. Returns whether anything refined.
    fn sort(&mut self) -> bool {
        let mut refined = false;
        self.classes_next.clear();
        for i in (0..self.classes.len()).step_by(2) {
            let begin = self.classes[i];
            let size = self.classes[i + 1];
            let mut same_value = true;
            let v0 = self.values[self.store[begin].1];
            for j in 0..size {
                let v = self.values[self.store[begin + j].1];
                self.store[begin + j].0 = v;
                if v != v0 {
                    same_value = false;
                }
            }
            if same_value {
                self.classes_next.push(begin);
                self.classes_next.push(size);
                continue;
            }
            refined = true;
            self.store[begin..begin + size].sort_unstable();
            let mut begin_old = begin;
            let mut v0 = self.values[self.store[begin].1];
            for j in 1..size {
                let v = self.values[self.store[begin + j].1];
                if v == v0 {
                    continue;
                }
                let size_new = begin + j - begin_old;
                if size_new == 1 {
                    self.uniques[self.store[begin_old].1] = self.num_uniques;
                    self.num_uniques += 1;
                } else {
                    self.classes_next.push(begin_old);
                    self.classes_next.push(size_new);
                }
                begin_old = begin + j;
                v0 = v;
            }
            let size_new = begin + size - begin_old;
            if size_new == 1 {
                self.uniques[self.store[begin_old].1] = self.num_uniques;
                self.num_uniques += 1;
            } else {
                self.classes_next.push(begin_old);
                self.classes_next.push(size_new);
            }
        }
        std::mem::swap(&mut self.classes, &mut self.classes_next);
        refined
    }

    // One round of simulation passes, alternating directions until two consecutive
    // passes stop refining.
    fn classify(&mut self, ntk: &AigNetwork, forward_first: bool) -> bool {
        const FIXED_POINT: usize = 1;
        let mut refined = false;
        if forward_first {
            let mut c = 1;
            while c <= FIXED_POINT + 1 {
                self.simulate(ntk);
                if self.sort() {
                    c = 0;
                    refined = true;
                }
                c += 1;
            }
        }
        let mut c = 1;
        while c <= FIXED_POINT + 1 {
            self.simulate_back(ntk);
            if self.sort() {
                c = 0;
                refined = true;
            }
            c += 1;
        }
        if !forward_first {
            let mut c = 1;
            while c <= FIXED_POINT + 1 {
                self.simulate(ntk);
                if self.sort() {
                    c = 0;
                    refined = true;
                }
                c += 1;
            }
        }
        refined
    }

    ///
    /// Deterministic tie break for a stuck fixed point: every class sharing the highest
    /// (level, fanin-count) key receives fresh colours in its current sorted order.
    ///
    fn assign_one_class(&mut self, ntk: &AigNetwork) {
        assert!(!self.classes.is_empty());
        let begin0 = self.classes[self.classes.len() - 2];
        let mut i = self.classes.len();
        while i >= 4 {
            let begin = self.classes[i - 4];
            if self.levels[self.store[begin].1] != self.levels[self.store[begin0].1] {
                break;
            }
            if ntk.num_fanins(self.store[begin].1) != ntk.num_fanins(self.store[begin0].1) {
                break;
            }
            i -= 2;
        }
        let shrink = i - 2;
        for j in (shrink..self.classes.len()).step_by(2) {
            let begin = self.classes[j];
            let size = self.classes[j + 1];
            for k in 0..size {
                self.uniques[self.store[begin + k].1] = self.num_uniques;
                self.num_uniques += 1;
            }
        }
        self.classes.truncate(shrink);
    }

    fn construct_rec(
        &mut self,
        ntk: &AigNetwork,
        out: &mut AigNetwork,
        id: NodeId,
    ) -> Result<NodeId, String> {
        if let Some(new_id) = self.old_to_new[id] {
            return Ok(new_id);
        }
        let mut by_colour: Vec<(usize, usize)> = ntk
            .fanins(id)
            .iter()
            .enumerate()
            .map(|(idx, e)| (self.uniques[e.node()], idx))
            .collect();
        by_colour.sort_unstable();
        let mut edges = Vec::with_capacity(by_colour.len());
        for (_, idx) in by_colour {
            let e = ntk.fanin_edge(id, idx);
            let new_fanin = self.construct_rec(ntk, out, e.node())?;
            edges.push(aig::Edge::new(new_fanin, e.complement()));
        }
        let new_id = out.add_and(&edges)?;
        self.old_to_new[id] = Some(new_id);
        Ok(new_id)
    }

    ///
    /// Canonicalizes the network in place. The input must be swept and trivially
    /// collapsed (no dead nodes, no single-fanout non-complemented internal fan-ins).
    ///
    pub fn run(&mut self, ntk: &mut AigNetwork) -> Result<(), String> {
        if ntk.num_pis() == 0 {
            assert_eq!(ntk.num_ints(), 0);
            return Ok(());
        }
        assert!(ntk.num_pos() > 0);
        self.compute_levels(ntk);
        self.num_uniques = ntk.num_pis() + 1;
        self.uniques.clear();
        self.uniques.resize(ntk.num_nodes(), 0);
        self.store.clear();
        self.store.resize(ntk.num_nodes(), (0, 0));
        self.initialize_classes(ntk);
        self.num_sims = 0;
        self.values.clear();
        self.values.resize(ntk.num_nodes(), 0);
        while !self.classes.is_empty() && self.classify(ntk, true) {}
        while !self.classes.is_empty() {
            if !self.classify(ntk, false) {
                self.assign_one_class(ntk);
            }
        }
        trace!(
            "canonicalized into {} colours over {} nodes",
            self.num_uniques,
            ntk.num_nodes()
        );
        let mut out = AigNetwork::new(ntk.num_nodes());
        self.old_to_new.clear();
        self.old_to_new.resize(ntk.num_nodes(), None);
        self.old_to_new[CONST0] = Some(CONST0);
        for (idx, &pi) in ntk.pis().iter().enumerate() {
            self.old_to_new[pi] = Some(out.add_pi());
            self.uniques[pi] = idx + 1;
        }
        let mut drivers = Vec::with_capacity(ntk.num_pos());
        for &po in ntk.pos() {
            let e = ntk.fanin_edge(po, 0);
            let new_driver = self.construct_rec(ntk, &mut out, e.node())?;
            drivers.push((new_driver, e.complement()));
        }
        for (driver, complement) in drivers {
            out.add_po(driver, complement)?;
        }
        ntk.assign_from(&out);
        Ok(())
    }
}
