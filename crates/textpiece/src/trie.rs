//! # Byte-Keyed Prefix Trie
//!
//! Arena-backed trie over byte strings. Nodes are addressed by stable
//! integer handles, so traversal cursors stay valid across inserts and
//! the unigram Viterbi loop can walk children without borrow gymnastics.

use crate::types::{TokenId, TpHashMap};

/// Handle of the root node.
pub const ROOT: u32 = 0;

#[derive(Default, Debug, Clone)]
struct TrieNode {
    children: TpHashMap<u8, u32>,
    token: Option<TokenId>,
}

/// Prefix trie mapping byte strings to token ids.
#[derive(Debug, Clone)]
pub struct ByteTrie {
    nodes: Vec<TrieNode>,
}

impl Default for ByteTrie {
    fn default() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
        }
    }
}

impl ByteTrie {
    /// Insert `key` with the given token id, replacing any previous value.
    pub fn insert(
        &mut self,
        key: &[u8],
        token: TokenId,
    ) {
        let mut node = ROOT;
        for &byte in key {
            node = match self.nodes[node as usize].children.get(&byte) {
                Some(&child) => child,
                None => {
                    let child = self.nodes.len() as u32;
                    self.nodes.push(TrieNode::default());
                    self.nodes[node as usize].children.insert(byte, child);
                    child
                }
            };
        }
        self.nodes[node as usize].token = Some(token);
    }

    /// Step from `node` along `byte`, if such a child exists.
    #[inline]
    pub fn child(
        &self,
        node: u32,
        byte: u8,
    ) -> Option<u32> {
        self.nodes[node as usize].children.get(&byte).copied()
    }

    /// The token id stored at `node`, if the path to it is a complete key.
    #[inline]
    pub fn token(
        &self,
        node: u32,
    ) -> Option<TokenId> {
        self.nodes[node as usize].token
    }

    /// Length of the longest traversable prefix of `key`.
    ///
    /// Counts how deep the trie can be walked, whether or not the final
    /// node completes an inserted key.
    pub fn longest_prefix_len(
        &self,
        key: &[u8],
    ) -> usize {
        let mut node = ROOT;
        for (depth, &byte) in key.iter().enumerate() {
            match self.child(node, byte) {
                Some(child) => node = child,
                None => return depth,
            }
        }
        key.len()
    }
}
