// Copyright 2025 Resyn contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use aig::{AigNetwork, Edge, NodeId};
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::Canonicalizer;

fn signature(ntk: &AigNetwork) -> Bytes {
    let mut copy = ntk.duplicate();
    Canonicalizer::new().run(&mut copy).unwrap();
    copy.check_invariants().unwrap();
    codec::encode(&copy)
}

#[test]
fn invariant_under_fanin_order() {
    let mut a = AigNetwork::new(16);
    let pis: Vec<_> = (0..3).map(|_| a.add_pi()).collect();
    let n0 = a.add_and2(pis[0], false, pis[1], true).unwrap();
    let n1 = a.add_and2(n0, false, pis[2], false).unwrap();
    a.add_po(n1, true).unwrap();

    let mut b = AigNetwork::new(16);
    let pis: Vec<_> = (0..3).map(|_| b.add_pi()).collect();
    let n0 = b.add_and2(pis[1], true, pis[0], false).unwrap();
    let n1 = b.add_and2(pis[2], false, n0, false).unwrap();
    b.add_po(n1, true).unwrap();

    assert_eq!(signature(&a), signature(&b));
}

#[test]
fn invariant_under_internal_order() {
    let mut a = AigNetwork::new(16);
    let pis: Vec<_> = (0..4).map(|_| a.add_pi()).collect();
    let left = a.add_and2(pis[0], false, pis[1], false).unwrap();
    let right = a.add_and2(pis[2], true, pis[3], false).unwrap();
    let top = a.add_and2(left, false, right, true).unwrap();
    a.add_po(top, false).unwrap();

    let mut b = AigNetwork::new(16);
    let pis: Vec<_> = (0..4).map(|_| b.add_pi()).collect();
    let right = b.add_and2(pis[2], true, pis[3], false).unwrap();
    let left = b.add_and2(pis[0], false, pis[1], false).unwrap();
    let top = b.add_and2(left, false, right, true).unwrap();
    b.add_po(top, false).unwrap();

    assert_eq!(signature(&a), signature(&b));
}

#[test]
fn distinguishes_functions() {
    let mut a = AigNetwork::new(8);
    let x = a.add_pi();
    let y = a.add_pi();
    let n = a.add_and2(x, false, y, false).unwrap();
    a.add_po(n, false).unwrap();

    let mut b = AigNetwork::new(8);
    let x = b.add_pi();
    let y = b.add_pi();
    let n = b.add_and2(x, false, y, true).unwrap();
    b.add_po(n, false).unwrap();

    assert_ne!(signature(&a), signature(&b));
}

#[test]
fn sensitive_to_pi_labels() {
    let mut a = AigNetwork::new(8);
    let x = a.add_pi();
    let y = a.add_pi();
    let n = a.add_and2(x, false, y, true).unwrap();
    a.add_po(n, false).unwrap();

    let mut b = AigNetwork::new(8);
    let x = b.add_pi();
    let y = b.add_pi();
    let n = b.add_and2(x, true, y, false).unwrap();
    b.add_po(n, false).unwrap();

    assert_ne!(signature(&a), signature(&b));
}

#[test]
fn canonical_form_is_a_fixed_point() {
    let mut ntk = AigNetwork::new(16);
    let pis: Vec<_> = (0..3).map(|_| ntk.add_pi()).collect();
    let n0 = ntk.add_and2(pis[1], true, pis[2], false).unwrap();
    let n1 = ntk.add_and2(n0, false, pis[0], false).unwrap();
    ntk.add_po(n1, false).unwrap();
    let mut once = ntk.duplicate();
    Canonicalizer::new().run(&mut once).unwrap();
    let first = codec::encode(&once);
    Canonicalizer::new().run(&mut once).unwrap();
    assert_eq!(first, codec::encode(&once));
}

#[test]
fn automorphic_twins_break_ties_consistently() {
    // Two byte-identical cones force the refinement to a stuck fixed point; the
    // deterministic tie break must still produce one signature for both orders.
    let build = |swap: bool| {
        let mut ntk = AigNetwork::new(16);
        let a = ntk.add_pi();
        let b = ntk.add_pi();
        let (first, second) = if swap { (b, a) } else { (a, b) };
        let twin0 = ntk.add_and2(first, false, second, false).unwrap();
        let twin1 = ntk.add_and2(first, false, second, false).unwrap();
        ntk.add_po(twin0, false).unwrap();
        ntk.add_po(twin1, false).unwrap();
        ntk
    };
    // a AND b is symmetric, so building with swapped fanins is the same function.
    assert_eq!(signature(&build(false)), signature(&build(true)));
}

// A reproducible random DAG: every AND reads two distinct earlier nodes.
fn random_network(rng: &mut StdRng, num_pis: usize, num_ands: usize) -> AigNetwork {
    let mut ntk = AigNetwork::new(num_pis + num_ands + 4);
    let mut nodes: Vec<NodeId> = (0..num_pis).map(|_| ntk.add_pi()).collect();
    for _ in 0..num_ands {
        let f0 = nodes[rng.gen_range(0..nodes.len())];
        let mut f1 = f0;
        while f1 == f0 {
            f1 = nodes[rng.gen_range(0..nodes.len())];
        }
        let id = ntk
            .add_and2(f0, rng.gen_bool(0.5), f1, rng.gen_bool(0.5))
            .unwrap();
        nodes.push(id);
    }
    let driver = *nodes.last().unwrap();
    ntk.add_po(driver, false).unwrap();
    ntk.sweep(false);
    ntk
}

// Rebuilds `ntk` with internals created in a random (valid) topological order and each
// fanin list shuffled.
fn permuted_copy(ntk: &AigNetwork, rng: &mut StdRng) -> AigNetwork {
    let mut out = AigNetwork::new(ntk.num_nodes());
    let mut map = vec![0_usize; ntk.num_nodes()];
    for &pi in ntk.pis() {
        map[pi] = out.add_pi();
    }
    let mut pending: Vec<NodeId> = ntk.internals().to_vec();
    let mut built = vec![false; ntk.num_nodes()];
    while !pending.is_empty() {
        let ready: Vec<usize> = (0..pending.len())
            .filter(|&i| {
                ntk.fanins(pending[i])
                    .iter()
                    .all(|e| !ntk.is_int(e.node()) || built[e.node()])
            })
            .collect();
        let pick = ready[rng.gen_range(0..ready.len())];
        let id = pending.swap_remove(pick);
        let mut edges: Vec<Edge> = ntk
            .fanins(id)
            .iter()
            .map(|e| Edge::new(map[e.node()], e.complement()))
            .collect();
        edges.shuffle(rng);
        map[id] = out.add_and(&edges).unwrap();
        built[id] = true;
    }
    for &po in ntk.pos() {
        let e = ntk.fanin_edge(po, 0);
        out.add_po(map[e.node()], e.complement()).unwrap();
    }
    out
}

#[test]
fn stable_under_random_permutations() {
    let mut rng = StdRng::seed_from_u64(7);
    for round in 0..10 {
        let ntk = random_network(&mut rng, 5, 12);
        let expected = signature(&ntk);
        for _ in 0..4 {
            let shuffled = permuted_copy(&ntk, &mut rng);
            shuffled.check_invariants().unwrap();
            assert_eq!(expected, signature(&shuffled), "round {round}\n{ntk}");
        }
    }
}
