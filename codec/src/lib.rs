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

use aig::{AigNetwork, Edge};
use bytes::{BufMut, Bytes, BytesMut};

pub mod aiger;


pub(crate) fn put_varint(out: &mut BytesMut, mut x: usize) {
    while x & !0x7f != 0 {
        out.put_u8(((x & 0x7f) | 0x80) as u8);
        x >>= 7;
    }
    out.put_u8(x as u8);
}

pub(crate) fn get_varint(input: &mut &[u8]) -> Result<usize, String> {
    let mut x = 0_usize;
    let mut shift = 0_u32;
    loop {
        let (&byte, rest) = input
            .split_first()
            .ok_or_else(|| "truncated varint".to_owned())?;
        *input = rest;
        if shift >= usize::BITS {
            return Err("varint overflows".to_owned());
        }
        x |= ((byte & 0x7f) as usize) << shift;
        if byte & 0x80 == 0 {
            return Ok(x);
        }
        shift += 7;
    }
}

///
/// Serializes a network into the compact delta form: varint PI/PO/internal counts, then
/// per internal node its arity followed by the fan-in edges in reverse order as
/// differences against a moving base (seeded from `node_id << 1`), then one edge varint
/// per PO. Deltas stay small after the canonical fan-in sort; differences are taken
/// wrapping so pathological orders still round-trip.
///
pub fn encode(ntk: &AigNetwork) -> Bytes {
    let mut out = BytesMut::new();
    put_varint(&mut out, ntk.num_pis());
    put_varint(&mut out, ntk.num_pos());
    put_varint(&mut out, ntk.num_ints());
    for &id in ntk.internals() {
        put_varint(&mut out, ntk.num_fanins(id));
        let mut base = id << 1;
        for e in ntk.fanins(id).iter().rev() {
            put_varint(&mut out, base.wrapping_sub(e.raw()));
            base = e.raw();
        }
    }
    for &po in ntk.pos() {
        put_varint(&mut out, ntk.fanin_edge(po, 0).raw());
    }
    out.freeze()
}

///
/// Reconstructs a network from `encode`'s output. The encoding assumes the compact id
/// assignment (PIs 1..=n, internals following), which is what canonical networks have.
/// Malformed input is fatal to this call.
///
pub fn decode(bytes: &[u8]) -> Result<AigNetwork, String> {
    let mut input = bytes;
    let num_pis = get_varint(&mut input)?;
    let num_pos = get_varint(&mut input)?;
    let num_ints = get_varint(&mut input)?;
    let mut ntk = AigNetwork::new(num_pis + num_ints + num_pos + 1);
    for _ in 0..num_pis {
        ntk.add_pi();
    }
    for k in 0..num_ints {
        let id = num_pis + 1 + k;
        let arity = get_varint(&mut input)?;
        let mut fanins = vec![Edge::from_raw(0); arity];
        let mut base = id << 1;
        for idx in (0..arity).rev() {
            let diff = get_varint(&mut input)?;
            let raw = base.wrapping_sub(diff);
            fanins[idx] = Edge::from_raw(raw);
            base = raw;
        }
        ntk.add_and(&fanins)?;
    }
    for _ in 0..num_pos {
        let e = Edge::from_raw(get_varint(&mut input)?);
        ntk.add_po(e.node(), e.complement())?;
    }
    Ok(ntk)
}
