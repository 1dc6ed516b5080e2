// Copyright 2025 Resyn contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use aig::AigNetwork;
use bytes::{BufMut, BytesMut};
use log::debug;

use crate::get_varint;

fn get_line<'a>(input: &mut &'a [u8]) -> Result<&'a str, String> {
    let end = input
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| "truncated AIGER input".to_owned())?;
    let line = std::str::from_utf8(&input[..end]).map_err(|e| format!("bad AIGER text: {e}"))?;
    *input = &input[end + 1..];
    Ok(line)
}

fn parse_count(token: Option<&str>) -> Result<usize, String> {
    token
        .ok_or_else(|| "short AIGER header".to_owned())?
        .parse::<usize>()
        .map_err(|e| format!("bad AIGER count: {e}"))
}

///
/// Reads the binary AIGER variant (`aig M I L O A`). Latches are lowered into PI/PO
/// pairs with matching index: latch inputs are appended after the primary inputs and
/// latch drivers become the leading primary outputs. Returns the network together with
/// the latch count so a caller can restore the sequential view on output.
///
pub fn read_aiger(bytes: &[u8]) -> Result<(AigNetwork, usize), String> {
    let mut input = bytes;
    let header = get_line(&mut input)?;
    let mut tokens = header.split(' ');
    if tokens.next() != Some("aig") {
        return Err(format!("not a binary AIGER header: {header:?}"));
    }
    let num_objs = parse_count(tokens.next())?;
    let num_pis = parse_count(tokens.next())?;
    let num_latches = parse_count(tokens.next())?;
    let num_pos = parse_count(tokens.next())?;
    let num_ands = parse_count(tokens.next())?;
    if num_objs != num_pis + num_latches + num_ands {
        return Err(format!(
            "inconsistent AIGER header: {num_objs} objects vs {num_pis} + {num_latches} + {num_ands}"
        ));
    }
    let mut ntk = AigNetwork::new(num_objs + 1);
    for _ in 0..num_pis {
        ntk.add_pi();
    }
    let mut latches = Vec::with_capacity(num_latches);
    for _ in 0..num_latches {
        latches.push(get_line(&mut input)?.parse::<usize>().map_err(|e| {
            format!("bad latch literal: {e}")
        })?);
        ntk.add_pi();
    }
    let mut outputs = Vec::with_capacity(num_pos);
    for _ in 0..num_pos {
        outputs.push(get_line(&mut input)?.parse::<usize>().map_err(|e| {
            format!("bad output literal: {e}")
        })?);
    }
    for i in (num_pis + num_latches + 1)..(num_objs + 1) {
        let lit0 = (2 * i)
            .checked_sub(get_varint(&mut input)?)
            .ok_or_else(|| format!("gate {i} delta out of range"))?;
        let lit1 = lit0
            .checked_sub(get_varint(&mut input)?)
            .ok_or_else(|| format!("gate {i} delta out of range"))?;
        ntk.add_and2(lit1 >> 1, lit1 & 1 != 0, lit0 >> 1, lit0 & 1 != 0)?;
    }
    for lit in latches {
        ntk.add_po(lit >> 1, lit & 1 != 0)?;
    }
    for lit in outputs {
        ntk.add_po(lit >> 1, lit & 1 != 0)?;
    }
    debug!(
        "read AIGER: {} PIs, {} latches, {} POs, {} ANDs",
        num_pis, num_latches, num_pos, num_ands
    );
    Ok((ntk, num_latches))
}

///
/// Writes the binary AIGER variant. Multi-input ANDs are decomposed into two-input
/// chains on the fly; buffers and structurally constant nodes resolve to literals, so
/// networks mid-normalization still produce well-formed output.
///
pub fn write_aiger(ntk: &AigNetwork, num_latches: usize) -> Vec<u8> {
    let mut values = vec![0_usize; ntk.num_nodes()];
    let mut num_objs = 1_usize;
    for &pi in ntk.pis() {
        values[pi] = num_objs << 1;
        num_objs += 1;
    }
    for &id in ntk.internals() {
        match ntk.num_fanins(id) {
            // An empty AND is the constant 1.
            0 => values[id] = 1,
            1 => values[id] = values[ntk.fanin(id, 0)] ^ (ntk.complement(id, 0) as usize),
            n => {
                values[id] = num_objs << 1;
                num_objs += n - 1;
            }
        }
    }
    let mut gates = BytesMut::new();
    for &id in ntk.internals() {
        if ntk.num_fanins(id) < 2 {
            continue;
        }
        let mut i = ntk.num_fanins(id) - 1;
        let mut lit0 = values[ntk.fanin(id, i)] ^ (ntk.complement(id, i) as usize);
        i -= 1;
        let mut lit1 = values[ntk.fanin(id, i)] ^ (ntk.complement(id, i) as usize);
        if lit0 < lit1 {
            std::mem::swap(&mut lit0, &mut lit1);
        }
        crate::put_varint(&mut gates, values[id] - lit0);
        crate::put_varint(&mut gates, lit0 - lit1);
        while i > 0 {
            i -= 1;
            crate::put_varint(&mut gates, 2);
            let lit = values[ntk.fanin(id, i)] ^ (ntk.complement(id, i) as usize);
            crate::put_varint(&mut gates, values[id] - lit);
            values[id] += 2;
        }
    }
    let mut out = BytesMut::new();
    let header = format!(
        "aig {} {} {} {} {}\n",
        num_objs - 1,
        ntk.num_pis() - num_latches,
        num_latches,
        ntk.num_pos() - num_latches,
        num_objs - ntk.num_pis() - 1
    );
    out.put_slice(header.as_bytes());
    for &po in ntk.pos() {
        let e = ntk.fanin_edge(po, 0);
        let lit = values[e.node()] ^ (e.complement() as usize);
        out.put_slice(format!("{lit}\n").as_bytes());
    }
    out.put_slice(&gates);
    out.to_vec()
}
