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

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt;

use itertools::Itertools;
use log::trace;

#[cfg(test)]
mod tests;

///
/// Identifier of a node within one network. Ids are allocated append-only and are never
/// reused: removal is logical (fan-ins cleared, refcount zeroed, dropped from the
/// internal order).
///
pub type NodeId = usize;

/// The constant-0 node. Every network has exactly one, always at id 0.
pub const CONST0: NodeId = 0;

///
/// A complementable edge: a fan-in id together with an inversion bit, packed as
/// `id << 1 | complement`. The packed form is also the literal representation used by the
/// codec, so it is exposed via `raw`/`from_raw`.
///
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct Edge(usize);

impl Edge {
    pub fn new(node: NodeId, complement: bool) -> Edge {
        Edge((node << 1) | (complement as usize))
    }

    pub fn from_raw(raw: usize) -> Edge {
        Edge(raw)
    }

    pub fn node(self) -> NodeId {
        self.0 >> 1
    }

    pub fn complement(self) -> bool {
        self.0 & 1 != 0
    }

    pub fn raw(self) -> usize {
        self.0
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.complement() {
            write!(f, "!{}", self.node())
        } else {
            write!(f, "{}", self.node())
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeKind {
    Const0,
    Pi,
    And,
    Po,
}

///
/// A record of one mutation, dispatched to every subscriber exactly once, in program
/// order. Fan-in/fan-out lists captured here reflect the state at the time of the
/// mutation (fan-ins before removal, fan-outs before rewrite).
///
#[derive(Clone, Debug)]
pub enum Action {
    AddFanin {
        id: NodeId,
        idx: usize,
        fanin: NodeId,
        complement: bool,
    },
    RemoveFanin {
        id: NodeId,
        idx: usize,
        fanin: NodeId,
        complement: bool,
    },
    RemoveUnused {
        id: NodeId,
        fanins: Vec<NodeId>,
    },
    RemoveBuffer {
        id: NodeId,
        fanin: NodeId,
        complement: bool,
        fanouts: Vec<NodeId>,
    },
    RemoveConst {
        id: NodeId,
        fanins: Vec<NodeId>,
        fanouts: Vec<NodeId>,
    },
    TrivialCollapse {
        id: NodeId,
        idx: usize,
        fanin: NodeId,
        fanins: Vec<NodeId>,
    },
    TrivialDecompose {
        id: NodeId,
        idx: usize,
        fanin: NodeId,
        fanins: Vec<NodeId>,
    },
    SortFanins {
        id: NodeId,
    },
    Read,
    Save {
        slot: usize,
    },
    Load {
        slot: usize,
    },
    PopBack {
        slot: usize,
    },
}

/// Handle returned by `AigNetwork::subscribe`, used to drain that subscriber's queue.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SubscriberId(usize);

///
/// The core graph fields, bulk-copied into the snapshot stack. Deliberately excludes the
/// traversal stamps, subscriber queues and the snapshot stack itself, so that
/// save/load/assign move only the structure.
///
#[derive(Clone)]
struct State {
    num_nodes: usize,
    pis: Vec<NodeId>,
    // Internal nodes in a valid topological order: every fan-in appears earlier.
    internals: Vec<NodeId>,
    is_int: Vec<bool>,
    pos: Vec<NodeId>,
    fanins: Vec<Vec<Edge>>,
    refs: Vec<usize>,
    kinds: Vec<NodeKind>,
}

impl State {
    fn with_capacity(reserve: usize) -> State {
        let mut state = State {
            num_nodes: 0,
            pis: Vec::new(),
            internals: Vec::new(),
            is_int: Vec::with_capacity(reserve),
            pos: Vec::new(),
            fanins: Vec::with_capacity(reserve),
            refs: Vec::with_capacity(reserve),
            kinds: Vec::with_capacity(reserve),
        };
        // The constant-0 node.
        state.alloc(NodeKind::Const0);
        state
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        self.fanins.push(Vec::new());
        self.refs.push(0);
        self.kinds.push(kind);
        self.is_int.push(false);
        let id = self.num_nodes;
        self.num_nodes += 1;
        id
    }

    fn int_position(&self, id: NodeId) -> Option<usize> {
        self.internals.iter().position(|&n| n == id)
    }
}

///
/// A combinational And-Inverter network: one constant-0 node, primary inputs, multi-input
/// AND nodes over complementable edges, and single-fanin primary outputs.
///
/// Internal nodes are kept in a topological order which every mutation preserves. Fan-out
/// edges are not stored; they are recovered by a forward scan over the internal order
/// bounded by the refcount of the queried node.
///
pub struct AigNetwork {
    state: State,
    // Traversal stamps: a node is "visited" iff stamps[id] == epoch.
    epoch: u64,
    stamps: Vec<u64>,
    trav_locked: bool,
    propagating: bool,
    subscribers: Vec<VecDeque<Action>>,
    backups: Vec<State>,
}

impl AigNetwork {
    pub fn new(reserve: usize) -> AigNetwork {
        AigNetwork {
            state: State::with_capacity(reserve.max(1)),
            epoch: 0,
            stamps: Vec::new(),
            trav_locked: false,
            propagating: false,
            subscribers: Vec::new(),
            backups: Vec::new(),
        }
    }

    ///
    /// A structural copy: core graph state only. Subscribers, stamps and snapshots are
    /// not carried over.
    ///
    pub fn duplicate(&self) -> AigNetwork {
        AigNetwork {
            state: self.state.clone(),
            epoch: 0,
            stamps: Vec::new(),
            trav_locked: false,
            propagating: false,
            subscribers: Vec::new(),
            backups: Vec::new(),
        }
    }

    /// Replaces this network's structure with a copy of `other`'s.
    pub fn assign_from(&mut self, other: &AigNetwork) {
        self.state = other.state.clone();
        self.notify(Action::Read);
    }

    pub fn const0(&self) -> NodeId {
        CONST0
    }

    pub fn num_nodes(&self) -> usize {
        self.state.num_nodes
    }

    pub fn num_pis(&self) -> usize {
        self.state.pis.len()
    }

    pub fn num_ints(&self) -> usize {
        self.state.internals.len()
    }

    pub fn num_pos(&self) -> usize {
        self.state.pos.len()
    }

    pub fn pi(&self, idx: usize) -> NodeId {
        self.state.pis[idx]
    }

    pub fn pis(&self) -> &[NodeId] {
        &self.state.pis
    }

    pub fn internals(&self) -> &[NodeId] {
        &self.state.internals
    }

    pub fn pos(&self) -> &[NodeId] {
        &self.state.pos
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.state.kinds[id]
    }

    pub fn is_pi(&self, id: NodeId) -> bool {
        self.state.kinds[id] == NodeKind::Pi
    }

    /// True iff `id` is a live internal node (an AND present in the internal order).
    pub fn is_int(&self, id: NodeId) -> bool {
        self.state.is_int[id]
    }

    pub fn is_po(&self, id: NodeId) -> bool {
        self.state.kinds[id] == NodeKind::Po
    }

    pub fn is_po_driver(&self, id: NodeId) -> bool {
        self.state
            .pos
            .iter()
            .any(|&po| self.state.fanins[po][0].node() == id)
    }

    pub fn num_fanins(&self, id: NodeId) -> usize {
        self.state.fanins[id].len()
    }

    pub fn num_fanouts(&self, id: NodeId) -> usize {
        self.state.refs[id]
    }

    pub fn fanins(&self, id: NodeId) -> &[Edge] {
        &self.state.fanins[id]
    }

    pub fn fanin_edge(&self, id: NodeId, idx: usize) -> Edge {
        self.state.fanins[id][idx]
    }

    pub fn fanin(&self, id: NodeId, idx: usize) -> NodeId {
        self.state.fanins[id][idx].node()
    }

    pub fn complement(&self, id: NodeId, idx: usize) -> bool {
        self.state.fanins[id][idx].complement()
    }

    pub fn find_fanin(&self, id: NodeId, fanin: NodeId) -> Option<usize> {
        self.state.fanins[id].iter().position(|e| e.node() == fanin)
    }

    /// Index of `id` within the PI order, if it is a PI.
    pub fn pi_index(&self, id: NodeId) -> Option<usize> {
        self.state.pis.iter().position(|&pi| pi == id)
    }

    /// Position of `id` within the topological internal order, if it is live.
    pub fn int_position(&self, id: NodeId) -> Option<usize> {
        self.state.int_position(id)
    }

    pub fn add_pi(&mut self) -> NodeId {
        let id = self.state.alloc(NodeKind::Pi);
        self.state.pis.push(id);
        id
    }

    pub fn add_and(&mut self, fanins: &[Edge]) -> Result<NodeId, String> {
        for (i, e) in fanins.iter().enumerate() {
            if e.node() >= self.state.num_nodes {
                return Err(format!("fanin {} does not exist", e.node()));
            }
            if e.node() == CONST0 && e.complement() {
                return Err("literal constant-1 fanin is forbidden".to_owned());
            }
            if fanins[..i].iter().any(|o| o.node() == e.node()) {
                return Err(format!("duplicate fanin {}", e.node()));
            }
        }
        let id = self.state.alloc(NodeKind::And);
        for e in fanins {
            self.state.refs[e.node()] += 1;
        }
        self.state.fanins[id] = fanins.to_vec();
        self.state.internals.push(id);
        self.state.is_int[id] = true;
        Ok(id)
    }

    pub fn add_and2(
        &mut self,
        f0: NodeId,
        c0: bool,
        f1: NodeId,
        c1: bool,
    ) -> Result<NodeId, String> {
        self.add_and(&[Edge::new(f0, c0), Edge::new(f1, c1)])
    }

    pub fn add_po(&mut self, fanin: NodeId, complement: bool) -> Result<NodeId, String> {
        if fanin >= self.state.num_nodes {
            return Err(format!("po driver {fanin} does not exist"));
        }
        let id = self.state.alloc(NodeKind::Po);
        self.state.refs[fanin] += 1;
        self.state.fanins[id] = vec![Edge::new(fanin, complement)];
        self.state.pos.push(id);
        Ok(id)
    }

    ///
    /// Adds a fan-in edge to an internal node. If the proposed fan-in currently appears
    /// after the target in the topological order, the fan-in and its transitive cone are
    /// re-sorted to precede the target. Rejected (with no state change) if the edge would
    /// duplicate an existing fan-in, introduce the literal constant-1, or close a cycle.
    ///
    pub fn add_fanin(&mut self, id: NodeId, fanin: NodeId, complement: bool) -> Result<(), String> {
        assert!(self.is_int(id));
        if self.find_fanin(id, fanin).is_some() {
            return Err(format!("duplicate fanin {fanin} at node {id}"));
        }
        if fanin == CONST0 && complement {
            return Err("literal constant-1 fanin is forbidden".to_owned());
        }
        let pos = self.state.int_position(id).expect("target is internal");
        if let Some(j) = self.state.internals[pos..]
            .iter()
            .position(|&n| n == fanin)
        {
            // The fanin currently sits at or after the target; moving it up is only
            // sound if the target is not in its cone.
            let mut cyclic = false;
            self.for_each_tfo(id, false, |n| {
                if n == fanin {
                    cyclic = true;
                }
            });
            if cyclic {
                return Err(format!("fanin {fanin} would close a cycle at node {id}"));
            }
            self.state.internals.remove(pos + j);
            self.state.internals.insert(pos, fanin);
            self.sort_cone(fanin);
        }
        let idx = self.state.fanins[id].len();
        self.state.refs[fanin] += 1;
        self.state.fanins[id].push(Edge::new(fanin, complement));
        self.notify(Action::AddFanin {
            id,
            idx,
            fanin,
            complement,
        });
        Ok(())
    }

    // `id` was just moved earlier in the internal order; pull any of its fan-ins that now
    // follow it (and their cones) up in front of it.
    fn sort_cone(&mut self, id: NodeId) {
        let fanins: Vec<NodeId> = self.state.fanins[id].iter().map(|e| e.node()).collect();
        for fi in fanins {
            let pos = self.state.int_position(id).expect("node is internal");
            if let Some(j) = self.state.internals[pos..].iter().position(|&n| n == fi) {
                self.state.internals.remove(pos + j);
                self.state.internals.insert(pos, fi);
                self.sort_cone(fi);
            }
        }
    }

    pub fn remove_fanin(&mut self, id: NodeId, idx: usize) {
        let e = self.state.fanins[id][idx];
        self.state.refs[e.node()] -= 1;
        self.state.fanins[id].remove(idx);
        self.notify(Action::RemoveFanin {
            id,
            idx,
            fanin: e.node(),
            complement: e.complement(),
        });
    }

    ///
    /// Deletes a node with no fan-outs. With `recursive`, any internal fan-in whose
    /// refcount drops to zero is deleted as well.
    ///
    pub fn remove_unused(&mut self, id: NodeId, recursive: bool) {
        assert_eq!(self.state.refs[id], 0, "node {id} still has fanouts");
        let fanins: Vec<NodeId> = self.state.fanins[id].iter().map(|e| e.node()).collect();
        for &fi in &fanins {
            self.state.refs[fi] -= 1;
        }
        self.state.fanins[id].clear();
        let pos = self.state.int_position(id).expect("node is internal");
        self.state.internals.remove(pos);
        self.state.is_int[id] = false;
        self.notify(Action::RemoveUnused {
            id,
            fanins: fanins.clone(),
        });
        if recursive {
            for fi in fanins {
                if self.state.is_int[fi] && self.state.refs[fi] == 0 {
                    self.remove_unused(fi, true);
                }
            }
        }
    }

    ///
    /// Eliminates a single-fanin node by rewriting each fan-out edge onto the node's own
    /// fan-in, folding inversions. Structural duplicates within a fan-out cancel
    /// (`x AND x => x`, `x AND !x => 0`), and constant-0 fan-ins propagate literally.
    ///
    pub fn remove_buffer(&mut self, id: NodeId) {
        assert_eq!(self.num_fanins(id), 1);
        assert!(!self.propagating || self.trav_locked);
        let e = self.state.fanins[id][0];
        let (fi, c) = (e.node(), e.complement());
        let fanouts = self.collect_fanouts(id);
        for &fo in &fanouts {
            let idx = self.find_fanin(fo, id).expect("fanout lists the node");
            let foc = self.state.fanins[fo][idx].complement();
            if let Some(idx2) = self.find_fanin(fo, fi) {
                if self.state.fanins[fo][idx2].complement() == (c ^ foc) {
                    // The rewritten edge already exists: drop the duplicate.
                    self.state.fanins[fo].remove(idx);
                    if self.propagating && self.num_fanins(fo) == 1 {
                        self.stamps[fo] = self.epoch;
                    }
                } else {
                    // x AND !x cancels to the constant.
                    self.state.refs[fi] -= 1;
                    self.state.refs[CONST0] += 1;
                    if idx < idx2 {
                        self.state.fanins[fo][idx] = Edge::new(CONST0, false);
                        self.state.fanins[fo].remove(idx2);
                    } else {
                        self.state.fanins[fo][idx2] = Edge::new(CONST0, false);
                        self.state.fanins[fo].remove(idx);
                    }
                    if self.propagating {
                        self.stamps[fo] = self.epoch;
                    }
                }
                continue;
            }
            if fi == CONST0 {
                assert!(!c);
                if foc {
                    // A constant-1 fanin is neutral; drop the edge.
                    self.state.fanins[fo].remove(idx);
                    if self.num_fanins(fo) == 0 && self.is_po(fo) {
                        // POs keep an explicit constant literal.
                        self.state.refs[CONST0] += 1;
                        self.state.fanins[fo].push(Edge::new(CONST0, true));
                    }
                    if self.propagating && self.num_fanins(fo) <= 1 {
                        self.stamps[fo] = self.epoch;
                    }
                } else {
                    self.state.refs[CONST0] += 1;
                    self.state.fanins[fo][idx] = Edge::new(CONST0, false);
                    if self.propagating {
                        self.stamps[fo] = self.epoch;
                    }
                }
                continue;
            }
            self.state.fanins[fo][idx] = Edge::new(fi, c ^ foc);
            self.state.refs[fi] += 1;
        }
        self.state.refs[id] = 0;
        self.state.refs[fi] -= 1;
        self.state.fanins[id].clear();
        if !self.propagating {
            let pos = self.state.int_position(id).expect("node is internal");
            self.state.internals.remove(pos);
        }
        self.state.is_int[id] = false;
        self.notify(Action::RemoveBuffer {
            id,
            fanin: fi,
            complement: c,
            fanouts,
        });
    }

    ///
    /// Eliminates a structurally constant node: zero fan-ins (constant 1) or an
    /// unnegated constant-0 fan-in (constant 0). Fan-outs are rewritten by literal
    /// constant propagation; a PO that loses its driver keeps an explicit constant
    /// literal.
    ///
    pub fn remove_const(&mut self, id: NodeId) {
        assert!(self.num_fanins(id) == 0 || self.find_fanin(id, CONST0).is_some());
        assert!(!self.propagating || self.trav_locked);
        let fanins: Vec<NodeId> = self.state.fanins[id].iter().map(|e| e.node()).collect();
        for e in &self.state.fanins[id] {
            assert!(e.node() != CONST0 || !e.complement());
        }
        for &fi in &fanins {
            self.state.refs[fi] -= 1;
        }
        self.state.fanins[id].clear();
        // An empty AND is the constant 1; one with a constant-0 fanin is the constant 0.
        let c = fanins.is_empty();
        let fanouts = self.collect_fanouts(id);
        for &fo in &fanouts {
            let idx = self.find_fanin(fo, id).expect("fanout lists the node");
            let foc = self.state.fanins[fo][idx].complement();
            if c ^ foc {
                self.state.fanins[fo].remove(idx);
                if self.num_fanins(fo) == 0 && self.is_po(fo) {
                    self.state.refs[CONST0] += 1;
                    self.state.fanins[fo].push(Edge::new(CONST0, true));
                }
                if self.propagating && self.num_fanins(fo) <= 1 {
                    self.stamps[fo] = self.epoch;
                }
            } else {
                self.state.refs[CONST0] += 1;
                self.state.fanins[fo][idx] = Edge::new(CONST0, false);
                if self.propagating {
                    self.stamps[fo] = self.epoch;
                }
            }
        }
        self.state.refs[id] = 0;
        if !self.propagating {
            let pos = self.state.int_position(id).expect("node is internal");
            self.state.internals.remove(pos);
        }
        self.state.is_int[id] = false;
        self.notify(Action::RemoveConst {
            id,
            fanins,
            fanouts,
        });
    }

    ///
    /// Scans the internal order (or the subgraph downstream of `start`) and repeatedly
    /// eliminates buffers and structural constants until none remain. Nodes that become
    /// buffers or constants during the pass are discovered via the traversal stamp set
    /// by `remove_buffer`/`remove_const`.
    ///
    pub fn propagate(&mut self, start: Option<NodeId>) {
        assert!(!self.trav_locked);
        self.trav_locked = true;
        self.start_traversal();
        let mut i = match start {
            None => {
                let mut first = self.state.internals.len();
                for (pos, &id) in self.state.internals.iter().enumerate() {
                    if self.state.fanins[id].len() <= 1
                        || self.state.fanins[id].iter().any(|e| e.node() == CONST0)
                    {
                        self.stamps[id] = self.epoch;
                        if first == self.state.internals.len() {
                            first = pos;
                        }
                    }
                }
                first
            }
            Some(id) => {
                self.stamps[id] = self.epoch;
                self.state.int_position(id).expect("node is internal")
            }
        };
        self.propagating = true;
        while i < self.state.internals.len() {
            let id = self.state.internals[i];
            if self.stamps[id] == self.epoch {
                if self.num_fanins(id) == 1 {
                    self.remove_buffer(id);
                } else {
                    self.remove_const(id);
                }
                self.state.internals.remove(i);
            } else {
                i += 1;
            }
        }
        self.propagating = false;
        self.trav_locked = false;
    }

    ///
    /// Optionally propagates, then removes every internal node with no fan-outs, in
    /// reverse topological order so that cascades resolve in one pass.
    ///
    pub fn sweep(&mut self, do_propagate: bool) {
        if do_propagate {
            self.propagate(None);
        }
        let mut i = self.state.internals.len();
        while i > 0 {
            i -= 1;
            let id = self.state.internals[i];
            if self.state.refs[id] == 0 {
                self.remove_unused(id, false);
            }
        }
    }

    ///
    /// Inlines every non-complemented internal fan-in with a single fan-out into `id`,
    /// repeating until none remains. Structural duplicates introduced by inlining cancel
    /// as in `remove_buffer`.
    ///
    pub fn trivial_collapse(&mut self, id: NodeId) {
        let mut idx = 0;
        while idx < self.num_fanins(id) {
            let e = self.state.fanins[id][idx];
            let (fi, c) = (e.node(), e.complement());
            if !self.state.is_int[fi] || c || self.state.refs[fi] != 1 {
                idx += 1;
                continue;
            }
            let inlined: Vec<NodeId> = self.state.fanins[fi].iter().map(|e| e.node()).collect();
            let incoming: Vec<Edge> = self.state.fanins[fi].clone();
            self.state.fanins[id].remove(idx);
            let mut insert_at = idx;
            for e2 in incoming {
                match self.find_fanin(id, e2.node()) {
                    None => {
                        self.state.fanins[id].insert(insert_at, e2);
                        insert_at += 1;
                    }
                    Some(j) if self.state.fanins[id][j].complement() == e2.complement() => {
                        // Already present; the transferred reference is dropped.
                        self.state.refs[e2.node()] -= 1;
                    }
                    Some(_) => {
                        // x AND !x cancels to the constant.
                        self.state.refs[e2.node()] -= 1;
                        if self.find_fanin(id, CONST0).is_none() {
                            self.state.refs[CONST0] += 1;
                            self.state.fanins[id].insert(insert_at, Edge::new(CONST0, false));
                            insert_at += 1;
                        }
                    }
                }
            }
            self.state.refs[fi] = 0;
            self.state.fanins[fi].clear();
            let pos = self.state.int_position(fi).expect("fanin is internal");
            self.state.internals.remove(pos);
            self.state.is_int[fi] = false;
            self.notify(Action::TrivialCollapse {
                id,
                idx,
                fanin: fi,
                fanins: inlined,
            });
        }
    }

    /// `trivial_collapse` over every live internal node.
    pub fn trivial_collapse_all(&mut self) {
        let ids: Vec<NodeId> = self.state.internals.clone();
        for id in ids {
            if self.state.is_int[id] {
                self.trivial_collapse(id);
            }
        }
    }

    ///
    /// Re-expresses a wide AND over two-input nodes: repeatedly extracts the last two
    /// fan-ins into a fresh AND whose output replaces them, until the arity is 2.
    ///
    pub fn trivial_decompose(&mut self, id: NodeId) {
        while self.num_fanins(id) > 2 {
            let idx = self.state.fanins[id].len() - 2;
            let new_id = self.state.alloc(NodeKind::And);
            let e1 = self.state.fanins[id].pop().expect("arity > 2");
            let e0 = self.state.fanins[id].pop().expect("arity > 2");
            self.state.fanins[new_id].push(e0);
            self.state.fanins[new_id].push(e1);
            self.state.fanins[id].push(Edge::new(new_id, false));
            self.state.refs[new_id] += 1;
            let pos = self.state.int_position(id).expect("target is internal");
            self.state.internals.insert(pos, new_id);
            self.state.is_int[new_id] = true;
            self.notify(Action::TrivialDecompose {
                id,
                idx,
                fanin: new_id,
                fanins: vec![e0.node(), e1.node()],
            });
        }
    }

    ///
    /// Stable sort of a node's fan-in sequence. The comparator only sees edges; callers
    /// that sort by network properties snapshot those properties first.
    ///
    pub fn sort_fanins_by<F>(&mut self, id: NodeId, mut cmp: F)
    where
        F: FnMut(Edge, Edge) -> Ordering,
    {
        self.state.fanins[id].sort_by(|&a, &b| cmp(a, b));
        self.notify(Action::SortFanins { id });
    }

    ///
    /// Enumerates fan-outs of `id` in topological order, with the complement of each
    /// fan-out's edge back to `id`. Fan-outs are recovered by a forward scan bounded by
    /// the refcount; POs come last.
    ///
    pub fn for_each_fanout<F>(&self, id: NodeId, mut f: F)
    where
        F: FnMut(NodeId, bool),
    {
        for fo in self.collect_fanouts(id) {
            let idx = self.find_fanin(fo, id).expect("fanout lists the node");
            f(fo, self.state.fanins[fo][idx].complement());
        }
    }

    fn collect_fanouts(&self, id: NodeId) -> Vec<NodeId> {
        let mut fanouts = Vec::new();
        if self.state.refs[id] == 0 {
            return fanouts;
        }
        let begin = match self.state.int_position(id) {
            Some(pos) => pos + 1,
            None => 0,
        };
        let mut remaining = self.state.refs[id];
        for &n in &self.state.internals[begin..] {
            if remaining == 0 {
                break;
            }
            if self.find_fanin(n, id).is_some() {
                fanouts.push(n);
                remaining -= 1;
            }
        }
        if remaining > 0 {
            for &po in &self.state.pos {
                if self.state.fanins[po][0].node() == id {
                    fanouts.push(po);
                    remaining -= 1;
                    if remaining == 0 {
                        break;
                    }
                }
            }
        }
        assert_eq!(remaining, 0, "refcount of {id} disagrees with edges");
        fanouts
    }

    ///
    /// Enumerates all nodes reachable from `id` via the fan-out relation, in topological
    /// order, using a fresh traversal epoch. Does not include `id` itself; POs are
    /// included only when `include_pos` is set.
    ///
    pub fn for_each_tfo<F>(&mut self, id: NodeId, include_pos: bool, mut f: F)
    where
        F: FnMut(NodeId),
    {
        if self.state.refs[id] == 0 {
            return;
        }
        assert!(!self.trav_locked);
        self.trav_locked = true;
        self.start_traversal();
        self.stamps[id] = self.epoch;
        let begin = match self.state.int_position(id) {
            Some(pos) => pos + 1,
            None => 0,
        };
        for &n in &self.state.internals[begin..] {
            if self.state.fanins[n]
                .iter()
                .any(|e| self.stamps[e.node()] == self.epoch)
            {
                f(n);
                self.stamps[n] = self.epoch;
            }
        }
        if include_pos {
            for &po in &self.state.pos {
                if self.stamps[self.state.fanins[po][0].node()] == self.epoch {
                    f(po);
                    self.stamps[po] = self.epoch;
                }
            }
        }
        self.trav_locked = false;
    }

    // Starts a traversal: bump the epoch, and when it wraps, clear the stamps once so
    // stale marks cannot alias the new epoch.
    fn start_traversal(&mut self) {
        self.stamps.resize(self.state.num_nodes, 0);
        self.epoch = self.epoch.wrapping_add(1);
        if self.epoch == 0 {
            for stamp in &mut self.stamps {
                *stamp = 0;
            }
            self.epoch = 1;
        }
    }

    ///
    /// Saves a whole-structure snapshot. Without an explicit slot a new one is
    /// allocated; with one, that slot is overwritten.
    ///
    pub fn save(&mut self, slot: Option<usize>) -> usize {
        let slot = match slot {
            None => {
                self.backups.push(self.state.clone());
                self.backups.len() - 1
            }
            Some(slot) => {
                assert!(slot < self.backups.len());
                self.backups[slot] = self.state.clone();
                slot
            }
        };
        self.notify(Action::Save { slot });
        slot
    }

    pub fn load(&mut self, slot: usize) {
        assert!(slot < self.backups.len());
        self.state = self.backups[slot].clone();
        self.notify(Action::Load { slot });
    }

    pub fn pop_back(&mut self) {
        assert!(!self.backups.is_empty());
        let slot = self.backups.len() - 1;
        self.backups.pop();
        self.notify(Action::PopBack { slot });
    }

    pub fn num_backups(&self) -> usize {
        self.backups.len()
    }

    ///
    /// Registers an action receiver. Actions are queued per receiver, exactly once and
    /// in program order; the receiver drains them with `drain_actions`.
    ///
    pub fn subscribe(&mut self) -> SubscriberId {
        self.subscribers.push(VecDeque::new());
        SubscriberId(self.subscribers.len() - 1)
    }

    pub fn drain_actions(&mut self, subscriber: SubscriberId) -> Vec<Action> {
        self.subscribers[subscriber.0].drain(..).collect()
    }

    fn notify(&mut self, action: Action) {
        trace!("action: {action:?}");
        if let Some((last, rest)) = self.subscribers.split_last_mut() {
            for queue in rest {
                queue.push_back(action.clone());
            }
            last.push_back(action);
        }
    }

    ///
    /// Validates the structural invariants; used by tests after every public operation.
    ///
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut position = vec![usize::MAX; self.state.num_nodes];
        for (i, &pi) in self.state.pis.iter().enumerate() {
            position[pi] = i;
        }
        let offset = self.state.pis.len();
        for (i, &id) in self.state.internals.iter().enumerate() {
            if self.state.kinds[id] != NodeKind::And {
                return Err(format!("non-AND node {id} in the internal order"));
            }
            position[id] = offset + i;
        }
        position[CONST0] = 0;
        let mut counted = vec![0_usize; self.state.num_nodes];
        for (&id, list) in self
            .state
            .internals
            .iter()
            .chain(self.state.pos.iter())
            .map(|id| (id, &self.state.fanins[*id]))
        {
            for (i, e) in list.iter().enumerate() {
                if e.node() >= self.state.num_nodes {
                    return Err(format!("node {id} lists nonexistent fanin {}", e.node()));
                }
                if e.node() == CONST0 && e.complement() && !self.is_po(id) {
                    return Err(format!("node {id} lists the literal constant-1"));
                }
                if e.node() != CONST0 {
                    if position[e.node()] == usize::MAX {
                        return Err(format!("node {id} lists a dead fanin {}", e.node()));
                    }
                    if !self.is_po(id) && position[e.node()] >= position[id] {
                        return Err(format!("node {id} precedes its fanin {}", e.node()));
                    }
                }
                if list[..i].iter().any(|o| o.node() == e.node()) {
                    return Err(format!("node {id} lists fanin {} twice", e.node()));
                }
                counted[e.node()] += 1;
            }
        }
        for id in 0..self.state.num_nodes {
            if self.state.is_int[id] != (position[id] != usize::MAX
                && self.state.kinds[id] == NodeKind::And)
            {
                return Err(format!("internal membership of {id} is inconsistent"));
            }
            if counted[id] != self.state.refs[id] {
                return Err(format!(
                    "refcount of {id} is {} but {} edges target it",
                    self.state.refs[id], counted[id]
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for AigNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "pi: {}", self.state.pis.iter().join(", "))?;
        for &id in &self.state.internals {
            writeln!(
                f,
                "node {id}: {} (ref = {})",
                self.state.fanins[id].iter().join(", "),
                self.state.refs[id]
            )?;
        }
        write!(
            f,
            "po: {}",
            self.state
                .pos
                .iter()
                .map(|&po| self.state.fanins[po][0])
                .join(", ")
        )
    }
}
