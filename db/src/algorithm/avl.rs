//! Order-statistic AVL tree over an index arena. Nodes live in a dense
//! vector owned by the tree; parent and child links are slot indices, so a
//! node id stays valid until the node is removed, no matter how the tree
//! rebalances around it.

/// Slot index of a node inside an [`AvlTree`] arena.
pub(crate) type NodeId = usize;

#[derive(Debug)]
struct AvlNode<T> {
    parent: Option<NodeId>,
    left: Option<NodeId>,
    right: Option<NodeId>,
    height: u32,
    count: u32,
    value: Option<T>,
}

#[derive(Debug)]
pub(crate) struct AvlTree<T> {
    nodes: Vec<AvlNode<T>>,
    free: Vec<NodeId>,
    root: Option<NodeId>,
}

impl<T> AvlTree<T> {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.count_of(self.root) as usize
    }

    pub(crate) fn get(&self, id: NodeId) -> &T {
        self.nodes[id].value.as_ref().expect("read of a freed tree slot")
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> &mut T {
        self.nodes[id].value.as_mut().expect("write to a freed tree slot")
    }

    /// Allocates a node for `value` and links it at its sorted position.
    /// Equal values land to the right of their equals, keeping insertion
    /// order stable under the comparator.
    pub(crate) fn insert_by(&mut self, value: T, less: impl Fn(&T, &T) -> bool) -> NodeId {
        let id = self.alloc(value);
        self.attach(id, less);
        id
    }

    /// Re-links a detached node at the position its (possibly updated)
    /// value sorts to.
    pub(crate) fn attach(&mut self, id: NodeId, less: impl Fn(&T, &T) -> bool) {
        let mut link: Option<(NodeId, bool)> = None;
        let mut cursor = self.root;
        while let Some(cur) = cursor {
            let goes_left = less(self.get(id), self.get(cur));
            link = Some((cur, goes_left));
            cursor = if goes_left {
                self.nodes[cur].left
            } else {
                self.nodes[cur].right
            };
        }
        match link {
            None => self.nodes[id].parent = None,
            Some((parent, true)) => {
                self.nodes[parent].left = Some(id);
                self.nodes[id].parent = Some(parent);
            }
            Some((parent, false)) => {
                self.nodes[parent].right = Some(id);
                self.nodes[id].parent = Some(parent);
            }
        }
        self.root = Some(self.fix(id));
    }

    /// Unlinks a node from the tree but keeps its slot alive, so the value
    /// can be updated in place and re-attached.
    pub(crate) fn detach(&mut self, id: NodeId) {
        self.root = self.unlink(id);
        let node = &mut self.nodes[id];
        node.parent = None;
        node.left = None;
        node.right = None;
        node.height = 1;
        node.count = 1;
    }

    /// Unlinks a node and releases its slot, returning the value.
    pub(crate) fn remove(&mut self, id: NodeId) -> T {
        self.root = self.unlink(id);
        let node = &mut self.nodes[id];
        node.parent = None;
        node.left = None;
        node.right = None;
        self.free.push(id);
        node.value.take().expect("double free of a tree slot")
    }

    /// Walks `offset` positions through the in-order sequence, relative to
    /// `start`. Runs in O(log n) by skipping whole subtrees via their
    /// counts instead of stepping node by node.
    pub(crate) fn offset(&self, start: NodeId, offset: i64) -> Option<NodeId> {
        let mut node = start;
        let mut pos = 0i64;
        while pos != offset {
            let left = self.nodes[node].left;
            let right = self.nodes[node].right;
            if pos < offset && pos + self.count_of(right) as i64 >= offset {
                // target is inside the right subtree
                node = right?;
                pos += self.count_of(self.nodes[node].left) as i64 + 1;
            } else if pos > offset && pos - self.count_of(left) as i64 <= offset {
                // target is inside the left subtree
                node = left?;
                pos -= self.count_of(self.nodes[node].right) as i64 + 1;
            } else {
                // target is outside this subtree entirely, climb
                let parent = self.nodes[node].parent?;
                if self.nodes[parent].right == Some(node) {
                    pos -= self.count_of(left) as i64 + 1;
                } else {
                    pos += self.count_of(right) as i64 + 1;
                }
                node = parent;
            }
        }
        Some(node)
    }

    /// The least node for which `is_less` is false, i.e. the lower bound of
    /// whatever query `is_less` encodes.
    pub(crate) fn lower_bound(&self, is_less: impl Fn(&T) -> bool) -> Option<NodeId> {
        let mut candidate = None;
        let mut cursor = self.root;
        while let Some(cur) = cursor {
            if is_less(self.get(cur)) {
                cursor = self.nodes[cur].right;
            } else {
                candidate = Some(cur);
                cursor = self.nodes[cur].left;
            }
        }
        candidate
    }

    fn alloc(&mut self, value: T) -> NodeId {
        let node = AvlNode {
            parent: None,
            left: None,
            right: None,
            height: 1,
            count: 1,
            value: Some(value),
        };
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = node;
                id
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn height_of(&self, id: Option<NodeId>) -> u32 {
        id.map_or(0, |id| self.nodes[id].height)
    }

    fn count_of(&self, id: Option<NodeId>) -> u32 {
        id.map_or(0, |id| self.nodes[id].count)
    }

    fn update(&mut self, id: NodeId) {
        let height = 1 + self
            .height_of(self.nodes[id].left)
            .max(self.height_of(self.nodes[id].right));
        let count = 1 + self.count_of(self.nodes[id].left) + self.count_of(self.nodes[id].right);
        let node = &mut self.nodes[id];
        node.height = height;
        node.count = count;
    }

    /// Rotates `id`'s right child over `id`. The parent's child link is
    /// left for the caller to patch.
    fn rotate_left(&mut self, id: NodeId) -> NodeId {
        let parent = self.nodes[id].parent;
        let pivot = self.nodes[id].right.expect("left rotation without a right child");
        let inner = self.nodes[pivot].left;

        self.nodes[id].right = inner;
        if let Some(inner) = inner {
            self.nodes[inner].parent = Some(id);
        }
        self.nodes[pivot].parent = parent;
        self.nodes[pivot].left = Some(id);
        self.nodes[id].parent = Some(pivot);

        self.update(id);
        self.update(pivot);
        pivot
    }

    fn rotate_right(&mut self, id: NodeId) -> NodeId {
        let parent = self.nodes[id].parent;
        let pivot = self.nodes[id].left.expect("right rotation without a left child");
        let inner = self.nodes[pivot].right;

        self.nodes[id].left = inner;
        if let Some(inner) = inner {
            self.nodes[inner].parent = Some(id);
        }
        self.nodes[pivot].parent = parent;
        self.nodes[pivot].right = Some(id);
        self.nodes[id].parent = Some(pivot);

        self.update(id);
        self.update(pivot);
        pivot
    }

    fn fix_left(&mut self, id: NodeId) -> NodeId {
        let left = self.nodes[id].left.expect("left-heavy node without a left child");
        if self.height_of(self.nodes[left].left) < self.height_of(self.nodes[left].right) {
            let rotated = self.rotate_left(left);
            self.nodes[id].left = Some(rotated);
        }
        self.rotate_right(id)
    }

    fn fix_right(&mut self, id: NodeId) -> NodeId {
        let right = self.nodes[id].right.expect("right-heavy node without a right child");
        if self.height_of(self.nodes[right].right) < self.height_of(self.nodes[right].left) {
            let rotated = self.rotate_right(right);
            self.nodes[id].right = Some(rotated);
        }
        self.rotate_left(id)
    }

    /// Restores the height and count fields and the balance invariant on
    /// the path from `id` to the root. Returns the new root.
    fn fix(&mut self, mut id: NodeId) -> NodeId {
        loop {
            let parent = self.nodes[id].parent;
            let was_left_child = parent.map(|p| self.nodes[p].left == Some(id));

            self.update(id);
            let left_height = self.height_of(self.nodes[id].left);
            let right_height = self.height_of(self.nodes[id].right);
            let subtree = if left_height == right_height + 2 {
                self.fix_left(id)
            } else if left_height + 2 == right_height {
                self.fix_right(id)
            } else {
                id
            };

            match parent {
                None => return subtree,
                Some(parent) => {
                    if was_left_child == Some(true) {
                        self.nodes[parent].left = Some(subtree);
                    } else {
                        self.nodes[parent].right = Some(subtree);
                    }
                    id = parent;
                }
            }
        }
    }

    /// Removes a node with at most one child by splicing that child into
    /// its place, then rebalances upward. Returns the new tree root.
    fn unlink_half_leaf(&mut self, id: NodeId) -> Option<NodeId> {
        let node = &self.nodes[id];
        debug_assert!(node.left.is_none() || node.right.is_none());
        let child = node.left.or(node.right);
        let parent = node.parent;

        if let Some(child) = child {
            self.nodes[child].parent = parent;
        }
        match parent {
            None => child,
            Some(parent) => {
                if self.nodes[parent].left == Some(id) {
                    self.nodes[parent].left = child;
                } else {
                    self.nodes[parent].right = child;
                }
                Some(self.fix(parent))
            }
        }
    }

    /// Removes `id` from the tree structure without touching its slot.
    /// Returns the new tree root.
    fn unlink(&mut self, id: NodeId) -> Option<NodeId> {
        if self.nodes[id].left.is_none() || self.nodes[id].right.is_none() {
            return self.unlink_half_leaf(id);
        }

        // two children: splice out the in-order successor, then let it take
        // over this node's place in the tree
        let mut victim = self.nodes[id].right.expect("checked right child");
        while let Some(left) = self.nodes[victim].left {
            victim = left;
        }
        let root = self.unlink_half_leaf(victim);

        // the rebalance above may have moved `id`, so reread its links
        let (parent, left, right, height, count) = {
            let node = &self.nodes[id];
            (node.parent, node.left, node.right, node.height, node.count)
        };
        {
            let node = &mut self.nodes[victim];
            node.parent = parent;
            node.left = left;
            node.right = right;
            node.height = height;
            node.count = count;
        }
        if let Some(left) = left {
            self.nodes[left].parent = Some(victim);
        }
        if let Some(right) = right {
            self.nodes[right].parent = Some(victim);
        }
        match parent {
            None => Some(victim),
            Some(parent) => {
                if self.nodes[parent].left == Some(id) {
                    self.nodes[parent].left = Some(victim);
                } else {
                    self.nodes[parent].right = Some(victim);
                }
                root
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::prelude::*;

    fn less(a: &u32, b: &u32) -> bool {
        a < b
    }

    /// Recursively checks parent links, height, count, balance, and the
    /// ordering invariant, returning the in-order sequence.
    fn verify(tree: &AvlTree<u32>) -> Vec<u32> {
        fn walk(
            tree: &AvlTree<u32>,
            id: Option<NodeId>,
            parent: Option<NodeId>,
            out: &mut Vec<u32>,
        ) {
            let id = match id {
                Some(id) => id,
                None => return,
            };
            let node = &tree.nodes[id];
            assert_eq!(node.parent, parent);

            walk(tree, node.left, Some(id), out);
            out.push(*tree.get(id));
            walk(tree, node.right, Some(id), out);

            let left_height = tree.height_of(node.left);
            let right_height = tree.height_of(node.right);
            assert!(left_height.abs_diff(right_height) <= 1);
            assert_eq!(node.height, 1 + left_height.max(right_height));
            assert_eq!(
                node.count,
                1 + tree.count_of(node.left) + tree.count_of(node.right)
            );
        }

        let mut out = Vec::new();
        walk(tree, tree.root, None, &mut out);
        for pair in out.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert_eq!(out.len(), tree.len());
        out
    }

    fn find(tree: &AvlTree<u32>, val: u32) -> Option<NodeId> {
        let mut cursor = tree.root;
        while let Some(cur) = cursor {
            match val.cmp(tree.get(cur)) {
                std::cmp::Ordering::Equal => return Some(cur),
                std::cmp::Ordering::Less => cursor = tree.nodes[cur].left,
                std::cmp::Ordering::Greater => cursor = tree.nodes[cur].right,
            }
        }
        None
    }

    #[test]
    fn insert_keeps_the_tree_balanced_and_ordered() {
        let mut tree = AvlTree::new();
        assert_eq!(verify(&tree), vec![]);

        for val in 0..200 {
            tree.insert_by(val, less);
            verify(&tree);
        }
        assert_eq!(verify(&tree), (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn duplicate_values_are_kept() {
        let mut tree = AvlTree::new();
        for val in [5u32, 3, 5, 5, 1] {
            tree.insert_by(val, less);
        }
        assert_eq!(verify(&tree), vec![1, 3, 5, 5, 5]);
    }

    #[test]
    fn remove_rebalances_every_shape() {
        for removed in 0..64u32 {
            let mut tree = AvlTree::new();
            for val in 0..64 {
                tree.insert_by(val, less);
            }
            let id = find(&tree, removed).unwrap();
            assert_eq!(tree.remove(id), removed);
            let expected: Vec<u32> = (0..64).filter(|v| *v != removed).collect();
            assert_eq!(verify(&tree), expected);
        }
    }

    #[test]
    fn random_insert_remove_against_reference() {
        let mut rng = StdRng::seed_from_u64(0xa71);
        let mut tree = AvlTree::new();
        let mut reference: Vec<u32> = Vec::new();

        for _ in 0..400 {
            let val = rng.gen_range(0..100u32);
            if rng.gen_bool(0.6) {
                tree.insert_by(val, less);
                let at = reference.partition_point(|v| *v <= val);
                reference.insert(at, val);
            } else if let Some(id) = find(&tree, val) {
                tree.remove(id);
                let at = reference.binary_search(&val).unwrap();
                reference.remove(at);
            }
            assert_eq!(verify(&tree), reference);
        }
    }

    #[test]
    fn detach_and_attach_relocates_a_node() {
        let mut tree = AvlTree::new();
        let ids: Vec<NodeId> = (0..10u32).map(|v| tree.insert_by(v * 10, less)).collect();

        tree.detach(ids[2]);
        verify(&tree);
        *tree.get_mut(ids[2]) = 95;
        tree.attach(ids[2], less);
        assert_eq!(verify(&tree), vec![0, 10, 30, 40, 50, 60, 70, 80, 90, 95]);
    }

    #[test]
    fn offset_navigates_by_rank() {
        for size in 1..60u32 {
            let mut tree = AvlTree::new();
            for val in 0..size {
                tree.insert_by(val, less);
            }
            let first = find(&tree, 0).unwrap();
            for i in 0..size {
                let node = tree.offset(first, i as i64).unwrap();
                assert_eq!(*tree.get(node), i);
                for j in 0..size {
                    let hop = tree.offset(node, j as i64 - i as i64).unwrap();
                    assert_eq!(*tree.get(hop), j);
                }
                assert_eq!(tree.offset(node, -(i as i64) - 1), None);
                assert_eq!(tree.offset(node, (size - i) as i64), None);
            }
        }
    }

    #[test]
    fn offset_round_trips() {
        let mut tree = AvlTree::new();
        for val in 0..100u32 {
            tree.insert_by(val, less);
        }
        let start = find(&tree, 40).unwrap();
        for delta in [-40i64, -7, 0, 13, 59] {
            let there = tree.offset(start, delta).unwrap();
            assert_eq!(tree.offset(there, -delta), Some(start));
        }
    }

    #[test]
    fn lower_bound_finds_the_tightest_candidate() {
        let mut tree = AvlTree::new();
        for val in [10u32, 20, 30, 40] {
            tree.insert_by(val, less);
        }
        let at = |query: u32| {
            tree.lower_bound(|v| *v < query)
                .map(|id| *tree.get(id))
        };
        assert_eq!(at(0), Some(10));
        assert_eq!(at(20), Some(20));
        assert_eq!(at(25), Some(30));
        assert_eq!(at(41), None);
    }

    #[test]
    fn slots_are_reused_after_remove() {
        let mut tree = AvlTree::new();
        let a = tree.insert_by(1, less);
        tree.remove(a);
        let b = tree.insert_by(2, less);
        assert_eq!(a, b);
        assert_eq!(verify(&tree), vec![2]);
    }
}
