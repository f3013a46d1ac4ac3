//! Sorted set: a member dictionary and an order-statistic tree over the
//! same nodes. The dictionary answers by-name lookups, the tree answers
//! range and rank queries; both address members through tree node ids.

use crate::algorithm::avl::{AvlTree, NodeId};
use crate::algorithm::dict::{hash_bytes, Dict};

#[derive(Debug)]
pub(crate) struct ZNode {
    pub(crate) name: Vec<u8>,
    pub(crate) score: f64,
}

/// Total order over members: score ascending, then name bytes ascending.
fn zless(a: &ZNode, b: &ZNode) -> bool {
    if a.score != b.score {
        return a.score < b.score;
    }
    a.name < b.name
}

/// Whether `node` sorts strictly before the query point `(score, name)`.
fn precedes(node: &ZNode, score: f64, name: &[u8]) -> bool {
    if node.score != score {
        return node.score < score;
    }
    node.name.as_slice() < name
}

#[derive(Debug)]
pub(crate) struct ZSet {
    tree: AvlTree<ZNode>,
    index: Dict<NodeId>,
}

impl ZSet {
    pub(crate) fn new() -> Self {
        Self {
            tree: AvlTree::new(),
            index: Dict::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn node(&self, id: NodeId) -> &ZNode {
        self.tree.get(id)
    }

    /// Inserts a member or moves an existing one to its new score.
    /// Returns true when the member is new.
    pub(crate) fn insert(&mut self, name: &[u8], score: f64) -> bool {
        match self.lookup(name) {
            Some(id) => {
                self.update_score(id, score);
                false
            }
            None => {
                let id = self.tree.insert_by(
                    ZNode {
                        name: name.to_vec(),
                        score,
                    },
                    zless,
                );
                self.index.insert(hash_bytes(name), id);
                true
            }
        }
    }

    pub(crate) fn lookup(&mut self, name: &[u8]) -> Option<NodeId> {
        let Self { tree, index } = self;
        index.lookup(hash_bytes(name), |&id| tree.get(id).name.as_slice() == name)
    }

    pub(crate) fn remove(&mut self, id: NodeId) {
        let Self { tree, index } = self;
        let hcode = hash_bytes(&tree.get(id).name);
        let unlinked = index.remove(hcode, |&candidate| candidate == id);
        debug_assert!(unlinked.is_some());
        tree.remove(id);
    }

    /// First member at or after the query point `(score, name)`.
    pub(crate) fn seek_ge(&self, score: f64, name: &[u8]) -> Option<NodeId> {
        self.tree.lower_bound(|node| precedes(node, score, name))
    }

    /// Rank navigation relative to a member.
    pub(crate) fn offset(&self, id: NodeId, delta: i64) -> Option<NodeId> {
        self.tree.offset(id, delta)
    }

    /// A changed score means a changed position: the node is pulled out of
    /// the tree and re-attached where the new score sorts.
    fn update_score(&mut self, id: NodeId, score: f64) {
        if self.tree.get(id).score == score {
            return;
        }
        self.tree.detach(id);
        self.tree.get_mut(id).score = score;
        self.tree.attach(id, zless);
    }
}
