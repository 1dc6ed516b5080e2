// Copyright 2025 Resyn contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use crate::{Action, AigNetwork, Edge, NodeKind, CONST0};

fn check(ntk: &AigNetwork) {
    if let Err(e) = ntk.check_invariants() {
        panic!("invariant violated: {e}\n{ntk}");
    }
}

// pi1 AND pi2 driving one PO: the smallest interesting network.
fn single_and() -> (AigNetwork, usize) {
    let mut ntk = AigNetwork::new(8);
    let a = ntk.add_pi();
    let b = ntk.add_pi();
    let n = ntk.add_and2(a, false, b, false).unwrap();
    ntk.add_po(n, false).unwrap();
    check(&ntk);
    (ntk, n)
}

#[test]
fn construction() {
    let (ntk, n) = single_and();
    assert_eq!(ntk.num_pis(), 2);
    assert_eq!(ntk.num_ints(), 1);
    assert_eq!(ntk.num_pos(), 1);
    assert_eq!(ntk.kind(CONST0), NodeKind::Const0);
    assert_eq!(ntk.kind(n), NodeKind::And);
    assert!(ntk.is_int(n));
    assert!(ntk.is_po_driver(n));
    assert_eq!(ntk.num_fanouts(ntk.pi(0)), 1);
}

#[test]
fn add_and_rejects_bad_edges() {
    let mut ntk = AigNetwork::new(4);
    let a = ntk.add_pi();
    assert!(ntk.add_and(&[Edge::new(a, false), Edge::new(a, true)]).is_err());
    assert!(ntk.add_and(&[Edge::new(a, false), Edge::new(99, false)]).is_err());
    assert!(ntk
        .add_and(&[Edge::new(a, false), Edge::new(CONST0, true)])
        .is_err());
    // Nothing was allocated by the rejected attempts.
    assert_eq!(ntk.num_nodes(), 2);
    check(&ntk);
}

#[test]
fn remove_fanin_updates_refcounts() {
    let (mut ntk, n) = single_and();
    let a = ntk.pi(0);
    ntk.remove_fanin(n, 0);
    check(&ntk);
    assert_eq!(ntk.num_fanins(n), 1);
    assert_eq!(ntk.num_fanouts(a), 0);
}

#[test]
fn remove_buffer_retargets_fanouts() {
    let mut ntk = AigNetwork::new(8);
    let a = ntk.add_pi();
    let b = ntk.add_pi();
    let buf = ntk.add_and(&[Edge::new(a, true)]).unwrap();
    let n = ntk.add_and2(buf, true, b, false).unwrap();
    ntk.add_po(n, false).unwrap();
    ntk.remove_buffer(buf);
    check(&ntk);
    // !buf = !!a = a.
    assert_eq!(ntk.fanin_edge(n, 0), Edge::new(a, false));
    assert!(!ntk.is_int(buf));
    assert_eq!(ntk.num_fanouts(buf), 0);
}

#[test]
fn remove_buffer_cancels_duplicate_pair() {
    // n = buf(a) AND !a, so eliminating the buffer leaves a AND !a = 0.
    let mut ntk = AigNetwork::new(8);
    let a = ntk.add_pi();
    let buf = ntk.add_and(&[Edge::new(a, false)]).unwrap();
    let n = ntk.add_and2(buf, false, a, true).unwrap();
    ntk.add_po(n, false).unwrap();
    ntk.remove_buffer(buf);
    check(&ntk);
    assert_eq!(ntk.num_fanins(n), 1);
    assert_eq!(ntk.fanin_edge(n, 0), Edge::new(CONST0, false));
}

#[test]
fn remove_buffer_merges_duplicate_same_polarity() {
    let mut ntk = AigNetwork::new(8);
    let a = ntk.add_pi();
    let b = ntk.add_pi();
    let buf = ntk.add_and(&[Edge::new(a, false)]).unwrap();
    let n = ntk.add_and(&[Edge::new(buf, false), Edge::new(a, false), Edge::new(b, false)]).unwrap();
    ntk.add_po(n, false).unwrap();
    ntk.remove_buffer(buf);
    check(&ntk);
    assert_eq!(ntk.num_fanins(n), 2);
    assert_eq!(ntk.find_fanin(n, a), Some(0));
    assert_eq!(ntk.num_fanouts(a), 1);
}

#[test]
fn propagate_resolves_constant_conflict_to_po() {
    // PO driven by x AND !x through a buffer: propagation must leave (const0, false).
    let mut ntk = AigNetwork::new(8);
    let x = ntk.add_pi();
    let buf = ntk.add_and(&[Edge::new(x, false)]).unwrap();
    let n = ntk.add_and2(buf, false, x, true).unwrap();
    ntk.add_po(n, false).unwrap();
    ntk.propagate(None);
    check(&ntk);
    let po = ntk.pos()[0];
    assert_eq!(ntk.fanin_edge(po, 0), Edge::new(CONST0, false));
    assert_eq!(ntk.num_ints(), 0);
}

#[test]
fn propagate_collapses_buffer_chain_to_pi() {
    let mut ntk = AigNetwork::new(8);
    let x = ntk.add_pi();
    let b0 = ntk.add_and(&[Edge::new(x, true)]).unwrap();
    let b1 = ntk.add_and(&[Edge::new(b0, true)]).unwrap();
    ntk.add_po(b1, false).unwrap();
    ntk.propagate(None);
    check(&ntk);
    let po = ntk.pos()[0];
    assert_eq!(ntk.fanin_edge(po, 0), Edge::new(x, false));
    assert_eq!(ntk.num_ints(), 0);
}

#[test]
fn propagate_discovers_nodes_created_mid_pass() {
    // Removing the constant turns n into a buffer mid-pass; one propagate resolves both.
    let mut ntk = AigNetwork::new(8);
    let x = ntk.add_pi();
    let c = ntk.add_and(&[Edge::new(CONST0, false), Edge::new(x, false)]).unwrap();
    let n = ntk.add_and2(c, true, x, false).unwrap();
    ntk.add_po(n, false).unwrap();
    ntk.propagate(None);
    check(&ntk);
    let po = ntk.pos()[0];
    // c = 0, so n = !0 AND x = x.
    assert_eq!(ntk.fanin_edge(po, 0), Edge::new(x, false));
    assert_eq!(ntk.num_ints(), 0);
}

#[test]
fn propagate_is_idempotent() {
    let mut ntk = AigNetwork::new(8);
    let x = ntk.add_pi();
    let y = ntk.add_pi();
    let b = ntk.add_and(&[Edge::new(x, false)]).unwrap();
    let n = ntk.add_and2(b, false, y, false).unwrap();
    ntk.add_po(n, false).unwrap();
    ntk.propagate(None);
    check(&ntk);
    let before = format!("{ntk}");
    ntk.propagate(None);
    check(&ntk);
    assert_eq!(before, format!("{ntk}"));
}

#[test]
fn sweep_removes_dead_cones_and_is_idempotent() {
    let mut ntk = AigNetwork::new(8);
    let a = ntk.add_pi();
    let b = ntk.add_pi();
    let dead_inner = ntk.add_and2(a, false, b, false).unwrap();
    let _dead = ntk.add_and2(dead_inner, false, b, true).unwrap();
    let live = ntk.add_and2(a, true, b, false).unwrap();
    ntk.add_po(live, false).unwrap();
    ntk.sweep(false);
    check(&ntk);
    assert_eq!(ntk.num_ints(), 1);
    for &id in ntk.internals() {
        assert!(ntk.num_fanouts(id) > 0);
    }
    let before = format!("{ntk}");
    ntk.sweep(false);
    check(&ntk);
    assert_eq!(before, format!("{ntk}"));
}

#[test]
fn trivial_collapse_inlines_single_fanout_fanins() {
    // (a AND b) AND (c AND d), inner nodes single-fanout: collapses to one 4-input AND.
    let mut ntk = AigNetwork::new(8);
    let pis: Vec<_> = (0..4).map(|_| ntk.add_pi()).collect();
    let l = ntk.add_and2(pis[0], false, pis[1], false).unwrap();
    let r = ntk.add_and2(pis[2], false, pis[3], true).unwrap();
    let top = ntk.add_and2(l, false, r, false).unwrap();
    ntk.add_po(top, false).unwrap();
    ntk.trivial_collapse(top);
    check(&ntk);
    assert_eq!(ntk.num_ints(), 1);
    assert_eq!(ntk.num_fanins(top), 4);
    assert_eq!(ntk.fanin_edge(top, 3), Edge::new(pis[3], true));
}

#[test]
fn trivial_collapse_skips_shared_and_complemented_fanins() {
    let mut ntk = AigNetwork::new(8);
    let pis: Vec<_> = (0..3).map(|_| ntk.add_pi()).collect();
    let shared = ntk.add_and2(pis[0], false, pis[1], false).unwrap();
    let top = ntk.add_and2(shared, false, pis[2], false).unwrap();
    let other = ntk.add_and2(shared, true, pis[2], true).unwrap();
    ntk.add_po(top, false).unwrap();
    ntk.add_po(other, false).unwrap();
    ntk.trivial_collapse(top);
    check(&ntk);
    // `shared` has two fanouts and `other` sees it complemented; both survive.
    assert!(ntk.is_int(shared));
    assert_eq!(ntk.num_fanins(top), 2);
}

#[test]
fn trivial_decompose_restores_two_input_arity() {
    let mut ntk = AigNetwork::new(8);
    let pis: Vec<_> = (0..4).map(|_| ntk.add_pi()).collect();
    let wide = ntk
        .add_and(&[
            Edge::new(pis[0], false),
            Edge::new(pis[1], true),
            Edge::new(pis[2], false),
            Edge::new(pis[3], false),
        ])
        .unwrap();
    ntk.add_po(wide, true).unwrap();
    ntk.trivial_decompose(wide);
    check(&ntk);
    assert_eq!(ntk.num_ints(), 3);
    for &id in ntk.internals() {
        assert_eq!(ntk.num_fanins(id), 2);
    }
}

#[test]
fn add_fanin_reorders_the_cone() {
    let mut ntk = AigNetwork::new(8);
    let a = ntk.add_pi();
    let b = ntk.add_pi();
    let first = ntk.add_and2(a, false, b, false).unwrap();
    let second = ntk.add_and2(a, true, b, true).unwrap();
    ntk.add_po(first, false).unwrap();
    ntk.add_po(second, false).unwrap();
    // `second` currently follows `first`; adding it as a fanin must move it up.
    ntk.add_fanin(first, second, true).unwrap();
    check(&ntk);
    assert_eq!(ntk.internals(), &[second, first]);
    assert_eq!(ntk.fanin_edge(first, 2), Edge::new(second, true));
}

#[test]
fn add_fanin_rejections_leave_state_untouched() {
    let (mut ntk, n) = single_and();
    let a = ntk.pi(0);
    assert!(ntk.add_fanin(n, a, true).is_err()); // duplicate
    assert!(ntk.add_fanin(n, CONST0, true).is_err()); // literal constant-1
    check(&ntk);
    assert_eq!(ntk.num_fanins(n), 2);

    // A downstream node can never become a fanin of its own cone.
    let b = ntk.pi(1);
    let down = ntk.add_and2(n, false, b, true).unwrap();
    ntk.add_po(down, false).unwrap();
    assert!(ntk.add_fanin(n, down, false).is_err());
    check(&ntk);
    assert_eq!(ntk.internals(), &[n, down]);
}

#[test]
fn fanout_enumeration_is_bounded_and_ordered() {
    let mut ntk = AigNetwork::new(8);
    let a = ntk.add_pi();
    let b = ntk.add_pi();
    let n0 = ntk.add_and2(a, false, b, false).unwrap();
    let n1 = ntk.add_and2(n0, true, b, false).unwrap();
    let n2 = ntk.add_and2(n0, false, a, false).unwrap();
    ntk.add_po(n1, false).unwrap();
    ntk.add_po(n2, false).unwrap();
    ntk.add_po(n0, true).unwrap();
    let mut seen = Vec::new();
    ntk.for_each_fanout(n0, |fo, c| seen.push((fo, c)));
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0], (n1, true));
    assert_eq!(seen[1], (n2, false));
    assert!(seen[2].1); // the PO edge
}

#[test]
fn tfo_walk_is_topological() {
    let mut ntk = AigNetwork::new(8);
    let a = ntk.add_pi();
    let b = ntk.add_pi();
    let n0 = ntk.add_and2(a, false, b, false).unwrap();
    let n1 = ntk.add_and2(n0, false, b, true).unwrap();
    let n2 = ntk.add_and2(n1, false, a, false).unwrap();
    let other = ntk.add_and2(a, true, b, true).unwrap();
    ntk.add_po(n2, false).unwrap();
    ntk.add_po(other, false).unwrap();
    let mut seen = Vec::new();
    ntk.for_each_tfo(n0, true, |id| seen.push(id));
    assert_eq!(seen, vec![n1, n2, ntk.pos()[0]]);
}

#[test]
fn snapshots_restore_structure() {
    let (mut ntk, n) = single_and();
    let slot = ntk.save(None);
    ntk.remove_fanin(n, 0);
    ntk.propagate(Some(n));
    check(&ntk);
    assert_eq!(ntk.num_ints(), 0);
    ntk.load(slot);
    check(&ntk);
    assert_eq!(ntk.num_ints(), 1);
    assert_eq!(ntk.num_fanins(n), 2);
    ntk.pop_back();
    assert_eq!(ntk.num_backups(), 0);
}

#[test]
fn subscribers_see_every_action_in_order() {
    let (mut ntk, n) = single_and();
    let early = ntk.subscribe();
    let late = ntk.subscribe();
    ntk.remove_fanin(n, 1);
    ntk.propagate(Some(n));
    let drained = ntk.drain_actions(early);
    assert!(matches!(
        drained[0],
        Action::RemoveFanin { id, idx: 1, .. } if id == n
    ));
    assert!(matches!(drained[1], Action::RemoveBuffer { id, .. } if id == n));
    assert_eq!(drained.len(), ntk.drain_actions(late).len());
    // Draining consumed the queue.
    assert!(ntk.drain_actions(early).is_empty());
}

#[test]
fn duplicate_and_assign_round_trip() {
    let (ntk, _) = single_and();
    let copy = ntk.duplicate();
    assert_eq!(format!("{ntk}"), format!("{copy}"));
    let mut other = AigNetwork::new(4);
    other.add_pi();
    other.assign_from(&ntk);
    check(&other);
    assert_eq!(format!("{ntk}"), format!("{other}"));
}
