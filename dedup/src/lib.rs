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

use std::hash::Hasher;

use bytes::Bytes;
use fnv::FnvHasher;
use log::trace;


///
/// A content-addressed store of canonical signatures. The signature bytes are the
/// payload (a canonical serialized network is its own key); each entry additionally
/// accumulates the history records of every registration that mapped to it.
///
/// `register` is the only insertion path: on a hit it appends the history record and
/// returns `(false, index)`; on a miss it allocates (or, in the evicting variant,
/// reuses) an entry and returns `(true, index)`. Indices are monotone until eviction
/// occurs.
///
pub trait DedupTable<H>: Send {
    fn register(&mut self, signature: Bytes, history: H) -> (bool, usize);
    /// Clears the referenced flag, making the entry eligible for eviction (no-op on
    /// tables that never evict).
    fn deref(&mut self, index: usize);
    fn get(&self, index: usize) -> Bytes;
    fn history(&self, index: usize) -> &[H];
    fn len(&self) -> usize;
}

// Intrusive hash chains over entry indices: power-of-two buckets, each holding the head
// of a singly linked list through `next`.
struct Chains {
    buckets: Vec<Option<usize>>,
    next: Vec<Option<usize>>,
}

impl Chains {
    fn new(size_pow: u32) -> Chains {
        Chains {
            buckets: vec![None; 1 << size_pow],
            next: Vec::new(),
        }
    }

    fn bucket_of(&self, signature: &[u8]) -> usize {
        let mut hasher = FnvHasher::default();
        hasher.write(signature);
        (hasher.finish() as usize) & (self.buckets.len() - 1)
    }

    fn unlink(&mut self, bucket: usize, prev: Option<usize>, index: usize) {
        match prev {
            None => self.buckets[bucket] = self.next[index],
            Some(prev) => self.next[prev] = self.next[index],
        }
    }

    // Access promotion: recently registered entries move to the head of their chain.
    fn promote(&mut self, bucket: usize, prev: Option<usize>, index: usize) {
        self.unlink(bucket, prev, index);
        self.next[index] = self.buckets[bucket];
        self.buckets[bucket] = Some(index);
    }

    fn push_front(&mut self, bucket: usize, index: usize) {
        debug_assert_eq!(index, self.next.len());
        self.next.push(self.buckets[bucket]);
        self.buckets[bucket] = Some(index);
    }

    fn grow(&mut self, data: &[Bytes]) {
        let doubled = self.buckets.len() << 1;
        self.buckets = vec![None; doubled];
        for (i, signature) in data.iter().enumerate() {
            let h = self.bucket_of(signature);
            self.next[i] = self.buckets[h];
            self.buckets[h] = Some(i);
        }
    }

    fn num_buckets(&self) -> usize {
        self.buckets.len()
    }
}

const RESIZE_FACTOR: usize = 2;

///
/// The non-evicting table: entries live forever and indices are stable. Used for the
/// final-answer tier.
///
pub struct Table<H> {
    chains: Chains,
    data: Vec<Bytes>,
    record: Vec<Vec<H>>,
}

impl<H> Table<H> {
    pub fn new(size_pow: u32) -> Table<H> {
        Table {
            chains: Chains::new(size_pow),
            data: Vec::new(),
            record: Vec::new(),
        }
    }
}

impl<H: Send> DedupTable<H> for Table<H> {
    fn register(&mut self, signature: Bytes, history: H) -> (bool, usize) {
        let h = self.chains.bucket_of(&signature);
        let mut prev = None;
        let mut cursor = self.chains.buckets[h];
        while let Some(i) = cursor {
            if self.data[i] == signature {
                self.record[i].push(history);
                self.chains.promote(h, prev, i);
                return (false, i);
            }
            prev = Some(i);
            cursor = self.chains.next[i];
        }
        let index = self.data.len();
        self.chains.push_front(h, index);
        self.data.push(signature);
        self.record.push(vec![history]);
        if self.data.len() >= self.chains.num_buckets() * RESIZE_FACTOR {
            trace!("growing table past {} entries", self.data.len());
            self.chains.grow(&self.data);
        }
        (true, index)
    }

    fn deref(&mut self, _index: usize) {}

    fn get(&self, index: usize) -> Bytes {
        self.data[index].clone()
    }

    fn history(&self, index: usize) -> &[H] {
        &self.record[index]
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

///
/// The evicting table for intermediate tiers. Once the bucket array can no longer
/// double within `max_pow`, an insertion that finds an unreferenced entry on its chain
/// reuses that entry, preferring the one furthest from the chain head (the least
/// recently promoted). `deref` re-arms evictability after the entry's job completes.
///
pub struct EvictTable<H> {
    chains: Chains,
    max_buckets: usize,
    data: Vec<Bytes>,
    record: Vec<Vec<H>>,
    referenced: Vec<bool>,
}

impl<H> EvictTable<H> {
    pub fn new(size_pow: u32, max_pow: u32) -> EvictTable<H> {
        assert!(size_pow <= max_pow);
        EvictTable {
            chains: Chains::new(size_pow),
            max_buckets: 1 << max_pow,
            data: Vec::new(),
            record: Vec::new(),
            referenced: Vec::new(),
        }
    }
}

impl<H: Send> DedupTable<H> for EvictTable<H> {
    fn register(&mut self, signature: Bytes, history: H) -> (bool, usize) {
        let h = self.chains.bucket_of(&signature);
        let mut prev = None;
        let mut cursor = self.chains.buckets[h];
        let mut last_unused: Option<(Option<usize>, usize)> = None;
        while let Some(i) = cursor {
            if self.data[i] == signature {
                self.record[i].push(history);
                self.referenced[i] = true;
                self.chains.promote(h, prev, i);
                return (false, i);
            }
            if !self.referenced[i] {
                last_unused = Some((prev, i));
            }
            prev = Some(i);
            cursor = self.chains.next[i];
        }
        let at_capacity = (self.chains.num_buckets() << 1) > self.max_buckets;
        if at_capacity {
            if let Some((unused_prev, index)) = last_unused {
                trace!("evicting entry {index}");
                self.data[index] = signature;
                self.record[index].clear();
                self.record[index].push(history);
                self.referenced[index] = true;
                self.chains.promote(h, unused_prev, index);
                return (true, index);
            }
        }
        let index = self.data.len();
        self.chains.push_front(h, index);
        self.data.push(signature);
        self.record.push(vec![history]);
        self.referenced.push(true);
        if self.data.len() >= self.chains.num_buckets() * RESIZE_FACTOR
            && (self.chains.num_buckets() << 1) <= self.max_buckets
        {
            self.chains.grow(&self.data);
        }
        (true, index)
    }

    fn deref(&mut self, index: usize) {
        self.referenced[index] = false;
    }

    fn get(&self, index: usize) -> Bytes {
        self.data[index].clone()
    }

    fn history(&self, index: usize) -> &[H] {
        &self.record[index]
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}
