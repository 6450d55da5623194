//! The `_DIC` name dictionary paired with resource arrays.
//!
//! | off | type | field |
//! | --- | --- | --- |
//! | 0x0 | [u8; 4] | `_DIC` |
//! | 0x4 | u32 | node count `n` |
//! | 0x8 | [Node; n + 1] | nodes, node 0 is the root |
//!
//! Each node is a reference bit `u32`, left and right child `u16` indices, and a 64 bit string offset.
//! The nodes form a patricia tree, but names are resolved with a binary search
//! over a sorted index, which gives the same results.
use crate::{ByteCursor, DecodeError};

#[cfg(feature = "derive_serde")]
use serde::{Deserialize, Serialize};

const NODE_SIZE: u64 = 16;

/// A single named entry in a [ResDict].
#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictNode {
    pub reference: u32,
    pub left: u16,
    pub right: u16,
    pub key: String,
}

#[cfg_attr(feature = "derive_serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResDict {
    /// The entries in array order without the root node.
    pub nodes: Vec<DictNode>,
    sorted: Vec<usize>,
}

impl ResDict {
    /// Reads a dictionary at the current position.
    pub fn load(reader: &mut ByteCursor) -> Result<Self, DecodeError> {
        reader.read_signature(b"_DIC")?;
        let count = reader.read_u32()? as u64;

        // The root node isn't part of the entries.
        let remaining = reader.len().saturating_sub(reader.position());
        if (count + 1) * NODE_SIZE > remaining {
            return Err(DecodeError::MalformedFile(format!(
                "Dictionary with {} entries at offset 0x{:X} exceeds the file size.",
                count,
                reader.position()
            )));
        }
        reader.skip(NODE_SIZE)?;

        let mut nodes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let reference = reader.read_u32()?;
            let left = reader.read_u16()?;
            let right = reader.read_u16()?;
            let key = reader.read_name()?;
            nodes.push(DictNode {
                reference,
                left,
                right,
                key,
            });
        }

        Ok(Self::from_nodes(nodes))
    }

    pub fn from_nodes(nodes: Vec<DictNode>) -> Self {
        let mut sorted: Vec<usize> = (0..nodes.len()).collect();
        sorted.sort_by(|a, b| nodes[*a].key.cmp(&nodes[*b].key));
        Self { nodes, sorted }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.key.as_str())
    }

    pub fn key(&self, index: usize) -> Option<&str> {
        self.nodes.get(index).map(|n| n.key.as_str())
    }

    /// Finds the array index for `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.sorted
            .binary_search_by(|i| self.nodes[*i].key.as_str().cmp(name))
            .ok()
            .map(|i| self.sorted[i])
    }

    /// Resolves `name` to the byte offset of its element in an array of
    /// `stride` byte elements starting at `array_offset`.
    pub fn resolve_offset(&self, name: &str, array_offset: u64, stride: u64) -> Option<u64> {
        self.index_of(name)
            .map(|i| array_offset + i as u64 * stride)
    }
}
