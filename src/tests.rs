// Copyright 2025 Resyn contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use bytes::Bytes;

use crate::{
    encode, read_aiger, run, run_aiger, two_input_cost, AigNetwork, Canonicalizer, Edge, Params,
    CONST0,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// Exhaustive truth tables, one bit vector per PO, for networks small enough to
// enumerate. Results must match these bit-for-bit under exact optimization.
fn truth_tables(ntk: &AigNetwork) -> Vec<Vec<bool>> {
    assert!(ntk.num_pis() <= 12);
    let assignments = 1_usize << ntk.num_pis();
    let mut tables = vec![Vec::with_capacity(assignments); ntk.num_pos()];
    for m in 0..assignments {
        let mut values = vec![false; ntk.num_nodes()];
        for (i, &pi) in ntk.pis().iter().enumerate() {
            values[pi] = (m >> i) & 1 == 1;
        }
        for &id in ntk.internals() {
            values[id] = ntk
                .fanins(id)
                .iter()
                .all(|e| values[e.node()] ^ e.complement());
        }
        for (k, &po) in ntk.pos().iter().enumerate() {
            let e = ntk.fanin_edge(po, 0);
            tables[k].push(values[e.node()] ^ e.complement());
        }
    }
    tables
}

fn signature(ntk: &AigNetwork) -> Bytes {
    let mut copy = ntk.duplicate();
    Canonicalizer::new().run(&mut copy).unwrap();
    encode(&copy)
}

fn signatures(results: &[AigNetwork]) -> Vec<Bytes> {
    let mut sigs: Vec<Bytes> = results.iter().map(signature).collect();
    sigs.sort();
    sigs
}

// The smallest interesting input: "aig 3 2 0 1 1" with one AND of both inputs.
fn tiny_aiger() -> Vec<u8> {
    let mut bytes = b"aig 3 2 0 1 1\n6\n".to_vec();
    bytes.extend_from_slice(&[2, 2]);
    bytes
}

#[test]
fn single_and_input_yields_one_deterministic_network() {
    init_logging();
    let params = Params::default();
    let (results, latches) = run_aiger(&tiny_aiger(), &params).unwrap();
    assert_eq!(latches, 0);
    assert_eq!(results.len(), 1);
    assert_eq!(two_input_cost(&results[0]), 1);
    // Codec output is byte-equal across runs.
    let (results2, _) = run_aiger(&tiny_aiger(), &params).unwrap();
    assert_eq!(encode(&results[0]), encode(&results2[0]));
}

#[test]
fn buffer_paths_collapse_onto_the_pi() {
    let mut ntk = AigNetwork::new(8);
    let x = ntk.add_pi();
    let b0 = ntk.add_and(&[Edge::new(x, true)]).unwrap();
    let b1 = ntk.add_and(&[Edge::new(b0, true)]).unwrap();
    ntk.add_po(b1, false).unwrap();
    let results = run(&mut ntk, &Params::default()).unwrap();
    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.num_ints(), 0);
    let po = result.pos()[0];
    assert_eq!(result.fanin_edge(po, 0), Edge::new(result.pi(0), false));
}

#[test]
fn contradictions_propagate_to_a_constant_po() {
    // x AND !x through a buffer.
    let mut ntk = AigNetwork::new(8);
    let x = ntk.add_pi();
    let buf = ntk.add_and(&[Edge::new(x, false)]).unwrap();
    let n = ntk.add_and2(buf, false, x, true).unwrap();
    ntk.add_po(n, false).unwrap();
    let results = run(&mut ntk, &Params::default()).unwrap();
    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.num_ints(), 0);
    let po = result.pos()[0];
    assert_eq!(result.fanin_edge(po, 0), Edge::new(CONST0, false));
}

#[test]
fn fanin_order_does_not_affect_exploration() {
    let build = |flip: bool| {
        let mut ntk = AigNetwork::new(16);
        let a = ntk.add_pi();
        let b = ntk.add_pi();
        let c = ntk.add_pi();
        let n = if flip {
            ntk.add_and2(b, true, a, false).unwrap()
        } else {
            ntk.add_and2(a, false, b, true).unwrap()
        };
        let top = if flip {
            ntk.add_and2(c, false, n, false).unwrap()
        } else {
            ntk.add_and2(n, false, c, false).unwrap()
        };
        ntk.add_po(top, false).unwrap();
        ntk.add_po(n, true).unwrap();
        ntk
    };
    let mut first = build(false);
    let mut second = build(true);
    assert_eq!(signature(&first), signature(&second));
    let params = Params::default();
    let results1 = run(&mut first, &params).unwrap();
    let results2 = run(&mut second, &params).unwrap();
    assert_eq!(signatures(&results1), signatures(&results2));
}

// Eight PIs, thirty two-input ANDs, with redundancy of several shapes: shared-input
// conjunction trees, a contradiction cone, and a directly re-read fan-in.
fn redundant_30() -> AigNetwork {
    let mut ntk = AigNetwork::new(64);
    let p: Vec<_> = (0..8).map(|_| ntk.add_pi()).collect();
    // (p0 AND p1) AND (p0 AND p2) AND ... as a chain of conjunction pairs.
    let g: Vec<_> = (1..8)
        .map(|i| ntk.add_and2(p[0], false, p[i], false).unwrap())
        .collect();
    let mut ta = ntk.add_and2(g[0], false, g[1], false).unwrap();
    for &gi in &g[2..] {
        ta = ntk.add_and2(ta, false, gi, false).unwrap();
    }
    ntk.add_po(ta, false).unwrap();
    ntk.add_po(g[0], false).unwrap();
    let h: Vec<_> = (2..8)
        .map(|i| ntk.add_and2(p[1], false, p[i], false).unwrap())
        .collect();
    let mut tb = ntk.add_and2(h[0], false, h[1], false).unwrap();
    for &hi in &h[2..] {
        tb = ntk.add_and2(tb, false, hi, false).unwrap();
    }
    ntk.add_po(tb, false).unwrap();
    ntk.add_po(h[0], false).unwrap();
    // A functionally constant cone.
    let c1 = ntk.add_and2(p[6], false, p[7], false).unwrap();
    let c2 = ntk.add_and2(c1, false, p[5], true).unwrap();
    let c3 = ntk.add_and2(c2, false, p[5], false).unwrap();
    ntk.add_po(c3, false).unwrap();
    // A directly re-read fan-in under a shared conjunction.
    let d1 = ntk.add_and2(p[2], false, p[3], false).unwrap();
    let d2 = ntk.add_and2(d1, false, p[2], false).unwrap();
    ntk.add_po(d2, false).unwrap();
    ntk.add_po(d1, false).unwrap();
    let e1 = ntk.add_and2(p[4], false, p[6], true).unwrap();
    ntk.add_po(e1, false).unwrap();
    assert_eq!(ntk.num_ints(), 30);
    ntk
}

#[test]
fn known_redundancies_shrink_without_changing_the_function() {
    init_logging();
    let mut ntk = redundant_30();
    let reference = truth_tables(&ntk);
    let seed_cost = two_input_cost(&ntk);
    assert_eq!(seed_cost, 30);
    let results = run(&mut ntk, &Params::default()).unwrap();
    assert!(!results.is_empty());
    for result in &results {
        result.check_invariants().unwrap();
        assert_eq!(truth_tables(result), reference);
        assert!(two_input_cost(result) <= seed_cost);
    }
    let best = results.iter().map(two_input_cost).min().unwrap();
    assert!(best < seed_cost);
}

#[test]
fn four_threads_match_one_thread() {
    let mut serial_input = redundant_30();
    let serial = run(&mut serial_input, &Params::default()).unwrap();
    let mut threaded_input = redundant_30();
    let threaded = run(
        &mut threaded_input,
        &Params {
            num_threads: 4,
            deterministic: false,
            ..Params::default()
        },
    )
    .unwrap();
    assert_eq!(signatures(&serial), signatures(&threaded));
}

#[test]
fn latches_ride_through_as_pi_po_pairs() {
    // One input, one latch driven by the complement of that input.
    let bytes = b"aig 2 1 1 0 0\n3\n".to_vec();
    let (results, latches) = run_aiger(&bytes, &Params::default()).unwrap();
    assert_eq!(latches, 1);
    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.num_pis(), 2);
    assert_eq!(result.num_pos(), 1);
}

#[test]
fn snapshot_directory_receives_intermediate_dumps() {
    let dir = tempfile::tempdir().unwrap();
    let mut ntk = redundant_30();
    let params = Params {
        snapshot_dir: Some(dir.path().to_path_buf()),
        ..Params::default()
    };
    run(&mut ntk, &params).unwrap();
    let dumps = std::fs::read_dir(dir.path()).unwrap().count();
    assert!(dumps > 0, "redundancy removal should have dumped AIGER files");
    // And each dump parses back.
    for entry in std::fs::read_dir(dir.path()).unwrap() {
        let bytes = std::fs::read(entry.unwrap().path()).unwrap();
        read_aiger(&bytes).unwrap().0.check_invariants().unwrap();
    }
}
