// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Open-addressed set of tensor identities.
//!
//! Graph passes attach per-tensor state through *slots*: the set maps a
//! [`TensorId`] to a stable slot index, and callers keep parallel arrays
//! indexed by slot. The table size is a prime at least as large as the
//! requested capacity, and collisions use linear probing, so lookups stay
//! short as long as the set is sized to the graph it indexes.

use crate::graph::Validated;
use crate::{ComputeGraph, GraphError, TensorId};

/// Prime table sizes, roughly doubling.
const PRIMES: &[usize] = &[
    2, 3, 5, 11, 17, 37, 67, 131, 257, 521, 1031, 2053, 4099, 8209, 16411, 32771, 65537, 131101,
    262147, 524309, 1048583, 2097169, 4194319, 8388617, 16777259, 33554467, 67108879, 134217757,
    268435459, 536870923, 1073741827,
];

/// Smallest table size from [`PRIMES`] that holds at least `min` entries.
///
/// Falls back to `min | 1` past the end of the table.
pub fn hash_size(min: usize) -> usize {
    match PRIMES.binary_search(&min) {
        Ok(i) => PRIMES[i],
        Err(i) if i < PRIMES.len() => PRIMES[i],
        Err(_) => min | 1,
    }
}

/// A fixed-size open-addressed set of tensor ids.
#[derive(Debug, Clone)]
pub struct TensorHashSet {
    keys: Vec<Option<TensorId>>,
    len: usize,
}

impl TensorHashSet {
    /// Creates a set able to hold at least `min_size` tensors.
    pub fn with_capacity(min_size: usize) -> Self {
        Self {
            keys: vec![None; hash_size(min_size.max(1))],
            len: 0,
        }
    }

    /// Creates a set sized to `n_nodes + n_leafs` of `graph` holding all of
    /// its tensors.
    pub fn for_graph(graph: &ComputeGraph<Validated>) -> Result<Self, GraphError> {
        let mut set = Self::with_capacity(graph.n_nodes() + graph.n_leafs());
        for &id in graph.nodes().iter().chain(graph.leafs()) {
            set.insert(id)?;
        }
        Ok(set)
    }

    /// Total number of slots.
    pub fn size(&self) -> usize {
        self.keys.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Slot holding `id`, if present.
    pub fn find(&self, id: TensorId) -> Option<usize> {
        let size = self.keys.len();
        let start = id.index() % size;
        let mut i = start;
        loop {
            match self.keys[i] {
                Some(k) if k == id => return Some(i),
                None => return None,
                Some(_) => {}
            }
            i = (i + 1) % size;
            if i == start {
                return None;
            }
        }
    }

    pub fn contains(&self, id: TensorId) -> bool {
        self.find(id).is_some()
    }

    /// Inserts `id` and returns its slot. Inserting a present id returns
    /// the existing slot.
    pub fn insert(&mut self, id: TensorId) -> Result<usize, GraphError> {
        let size = self.keys.len();
        let start = id.index() % size;
        let mut i = start;
        loop {
            match self.keys[i] {
                Some(k) if k == id => return Ok(i),
                None => {
                    self.keys[i] = Some(id);
                    self.len += 1;
                    return Ok(i);
                }
                Some(_) => {}
            }
            i = (i + 1) % size;
            if i == start {
                return Err(GraphError::HashSetFull { size });
            }
        }
    }
}
