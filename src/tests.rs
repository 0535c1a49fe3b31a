extern crate std;

use std::{cell::Cell, ops::Range, prelude::v1::*, ptr::NonNull, rc::Rc, string::String};

use cordyceps::Linked;
use proptest::prelude::*;

use crate::{model, model::TestNode, AvlSet, AvlTree, Key, Links, TreeNode};

fn insert_find_all(keys: &[Key]) {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for &key in keys {
        assert!(tree.insert(TestNode::new(key)).is_none());
        tree.assert_invariants();
    }

    for &key in keys {
        let node = tree.get_raw(key).expect("item not found");
        assert_eq!(unsafe { node.as_ref().key() }, key);
    }

    assert_eq!(tree.len(), keys.len());
}

fn insert_remove_all(keys: &[Key]) {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for &key in keys {
        tree.insert(TestNode::new(key));
        tree.assert_invariants();
    }

    for &key in keys {
        let node = tree.get_raw(key).expect("item not found");
        let removed = unsafe { tree.remove_at(node) };
        assert_eq!(removed.key, key);
        tree.assert_invariants();
    }

    assert!(tree.is_empty());

    for &key in keys {
        tree.insert(TestNode::new(key));
        tree.assert_invariants();
    }

    for &key in keys.iter().rev() {
        assert_eq!(tree.remove(key).map(|node| node.key), Some(key));
        tree.assert_invariants();
    }

    assert!(tree.is_empty());
}

// Calls `f` with every permutation of `0..n`.
fn for_each_permutation(n: Key, mut f: impl FnMut(&[Key])) {
    fn permute(keys: &mut Vec<Key>, k: usize, f: &mut dyn FnMut(&[Key])) {
        if k == keys.len() {
            f(keys);
            return;
        }

        for i in k..keys.len() {
            keys.swap(k, i);
            permute(keys, k + 1, f);
            keys.swap(k, i);
        }
    }

    let mut keys: Vec<Key> = (0..n).collect();
    permute(&mut keys, 0, &mut f);
}

#[test]
fn zero_elems_find() {
    insert_find_all(&[]);
}

#[test]
fn single_elem_find() {
    insert_find_all(&[0]);
}

#[test]
fn up_to_six_elems_find() {
    for n in 2..=6 {
        for_each_permutation(n, insert_find_all);
    }
}

#[test]
fn remove_one() {
    insert_remove_all(&[0]);
}

#[test]
fn remove_up_to_six() {
    for n in 2..=6 {
        for_each_permutation(n, insert_remove_all);
    }
}

#[test]
fn duplicate_insert_returns_item() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    assert!(tree.insert(TestNode::new(7)).is_none());
    let rejected = tree.insert(TestNode::new(7)).expect("duplicate must be rejected");

    assert_eq!(rejected.key, 7);
    assert_eq!(tree.len(), 1);
    tree.assert_invariants();
}

#[test]
fn remove_missing_is_noop() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    assert!(tree.remove(3).is_none());

    tree.insert(TestNode::new(1));
    tree.insert(TestNode::new(2));
    assert!(tree.remove(3).is_none());
    assert_eq!(tree.len(), 2);
    tree.assert_invariants();
}

#[test]
fn first_and_last() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    assert!(tree.first().is_none());
    assert!(tree.last().is_none());

    for key in [5, -3, 12, 0, 8] {
        tree.insert(TestNode::new(key));
    }

    assert_eq!(tree.first().map(|n| n.key), Some(-3));
    assert_eq!(tree.last().map(|n| n.key), Some(12));
}

#[test]
fn removed_node_can_be_reinserted() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for key in 0..8 {
        tree.insert(TestNode::new(key));
    }

    let node = tree.remove(3).unwrap();
    assert!(tree.insert(node).is_none());
    assert!(tree.contains_key(3));
    tree.assert_invariants();
}

// A node that bumps a shared counter when it is dropped.
#[repr(C)]
struct CountedNode {
    links: Links<CountedNode>,
    key: Key,
    drops: Rc<Cell<usize>>,
}

impl CountedNode {
    fn new(key: Key, drops: &Rc<Cell<usize>>) -> Box<CountedNode> {
        Box::new(CountedNode {
            links: Links::new(),
            key,
            drops: drops.clone(),
        })
    }
}

impl Drop for CountedNode {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

unsafe impl Linked<Links<CountedNode>> for CountedNode {
    type Handle = Box<CountedNode>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::new(Box::into_raw(r)).unwrap()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<CountedNode>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<CountedNode>> for CountedNode {
    fn key(&self) -> Key {
        self.key
    }
}

fn counted_tree(keys: Range<Key>, drops: &Rc<Cell<usize>>) -> AvlTree<CountedNode> {
    let mut tree = AvlTree::new();
    for key in keys {
        assert!(tree.insert(CountedNode::new(key, drops)).is_none());
    }
    tree
}

#[test]
fn remove_frees_only_the_removed_node() {
    let drops = Rc::new(Cell::new(0));
    let mut tree = counted_tree(0..15, &drops);

    // Ascending inserts of 2^4 - 1 keys build a perfect tree rooted at 7.
    let root = tree.root.expect("tree is empty");
    unsafe {
        assert_eq!(root.as_ref().key, 7);
        let links = CountedNode::links(root);
        assert!(links.as_ref().left().is_some() && links.as_ref().right().is_some());
    }

    let removed = tree.remove(7).expect("item not found");
    assert_eq!(drops.get(), 0);
    assert_eq!(removed.key, 7);
    assert_eq!(tree.len(), 14);
    assert!(tree.contains_key(3));
    assert!(tree.contains_key(11));

    drop(removed);
    assert_eq!(drops.get(), 1);

    assert!(tree.remove(7).is_none());
    assert_eq!(drops.get(), 1);

    drop(tree);
    assert_eq!(drops.get(), 15);
}

#[test]
fn rejected_duplicate_is_owned_by_caller() {
    let drops = Rc::new(Cell::new(0));
    let mut tree = counted_tree(0..3, &drops);

    let rejected = tree.insert(CountedNode::new(1, &drops)).expect("duplicate must be rejected");
    assert_eq!(drops.get(), 0);

    drop(rejected);
    assert_eq!(drops.get(), 1);
    assert_eq!(tree.len(), 3);
    assert!(tree.contains_key(1));

    drop(tree);
    assert_eq!(drops.get(), 4);
}

#[test]
fn clear_and_drop_free_every_node_once() {
    let drops = Rc::new(Cell::new(0));
    let mut tree = counted_tree(0..64, &drops);

    tree.clear();
    assert_eq!(drops.get(), 64);
    assert!(tree.is_empty());

    for key in 64..128 {
        tree.insert(CountedNode::new(key, &drops));
    }
    assert_eq!(drops.get(), 64);

    drop(tree);
    assert_eq!(drops.get(), 128);
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn set_of(keys: &[Key]) -> AvlSet {
    let mut set = AvlSet::new();
    for &key in keys {
        set.add(key);
        set.assert_invariants();
    }
    set
}

fn root_key(set: &AvlSet) -> Option<Key> {
    set.tree.root.map(|root| unsafe { root.as_ref().key() })
}

fn balance_of(set: &AvlSet, key: Key) -> i8 {
    set.search(key).expect("key not found").balance_factor()
}

fn render(set: &AvlSet) -> String {
    let mut out = String::new();
    set.dotgraph("shape", &mut out).unwrap();
    out
}

// Upper bound on the number of levels of an AVL tree holding `len` keys.
fn max_height(len: usize) -> usize {
    (1.44 * ((len + 2) as f64).log2()).ceil() as usize
}

#[test]
fn ascending_inserts_then_remove_min() {
    init_logging();

    let mut set = set_of(&[10, 20, 30]);
    assert_eq!(root_key(&set), Some(20));

    set.add(40);
    set.add(50);
    assert_eq!(root_key(&set), Some(20));
    assert_eq!(set.keys(), [10, 20, 30, 40, 50]);
    set.assert_invariants();

    set.remove(10);
    assert_eq!(set.keys(), [20, 30, 40, 50]);
    let shape = set.check_invariants().unwrap();
    assert_eq!(shape.len, 4);
    assert_eq!(shape.height, 3);

    // The right subtree was balanced, so one rotation kept the height.
    assert_eq!(root_key(&set), Some(40));
    assert_eq!(balance_of(&set, 40), -1);
    assert_eq!(balance_of(&set, 20), 1);
}

#[test]
fn insert_single_rotations() {
    init_logging();

    // Left-left.
    let set = set_of(&[3, 2, 1]);
    assert_eq!(root_key(&set), Some(2));
    assert_eq!(balance_of(&set, 2), 0);
    assert_eq!(balance_of(&set, 3), 0);

    // Right-right.
    let set = set_of(&[1, 2, 3]);
    assert_eq!(root_key(&set), Some(2));
    assert_eq!(balance_of(&set, 1), 0);
}

#[test]
fn insert_double_rotations() {
    init_logging();

    // Left-right.
    let set = set_of(&[3, 1, 2]);
    assert_eq!(root_key(&set), Some(2));
    assert_eq!(set.keys(), [1, 2, 3]);

    // Right-left.
    let set = set_of(&[1, 3, 2]);
    assert_eq!(root_key(&set), Some(2));
    assert_eq!(set.keys(), [1, 2, 3]);
}

#[test]
fn insert_double_rotation_with_leaning_pivot() {
    init_logging();

    // 50 is left-heavy and 20 right-heavy; the pivot 30 leans left after 25 arrives.
    let set = set_of(&[50, 20, 70, 10, 30, 25]);

    assert_eq!(root_key(&set), Some(30));
    assert_eq!(balance_of(&set, 30), 0);
    assert_eq!(balance_of(&set, 20), 0);
    assert_eq!(balance_of(&set, 50), 1);

    // Mirror image.
    let set = set_of(&[50, 20, 80, 60, 90, 65]);

    assert_eq!(root_key(&set), Some(60));
    assert_eq!(balance_of(&set, 60), 0);
    assert_eq!(balance_of(&set, 50), -1);
    assert_eq!(balance_of(&set, 80), 0);
}

#[test]
fn remove_rotation_absorbs_shrinkage() {
    init_logging();

    let mut set = set_of(&[2, 1, 4, 3, 5]);
    set.remove(1);

    // The sibling was balanced: the rotated subtree keeps its height.
    assert_eq!(root_key(&set), Some(4));
    assert_eq!(balance_of(&set, 4), -1);
    assert_eq!(balance_of(&set, 2), 1);
    set.assert_invariants();
}

#[test]
fn remove_single_rotation_shrinks() {
    init_logging();

    let mut set = set_of(&[2, 1, 3, 4]);
    set.remove(1);

    assert_eq!(root_key(&set), Some(3));
    assert_eq!(balance_of(&set, 3), 0);
    assert_eq!(balance_of(&set, 2), 0);
    assert_eq!(balance_of(&set, 4), 0);
    set.assert_invariants();
}

#[test]
fn remove_double_rotation_shrinks() {
    init_logging();

    let mut set = set_of(&[2, 1, 4, 3]);
    set.remove(1);

    assert_eq!(root_key(&set), Some(3));
    assert_eq!(set.keys(), [2, 3, 4]);
    assert_eq!(balance_of(&set, 3), 0);
    set.assert_invariants();
}

#[test]
fn remove_double_rotation_with_leaning_pivot() {
    init_logging();

    //       5
    //     /   \
    //    2     8
    //   /     / \
    //  1     7   9
    //       /
    //      6
    let mut set = set_of(&[5, 2, 8, 1, 7, 9, 6]);
    assert_eq!(balance_of(&set, 7), -1);

    set.remove(1);

    assert_eq!(root_key(&set), Some(7));
    assert_eq!(set.keys(), [2, 5, 6, 7, 8, 9]);
    assert_eq!(balance_of(&set, 5), 0);
    assert_eq!(balance_of(&set, 8), 1);
    assert_eq!(balance_of(&set, 7), 0);
    set.assert_invariants();
}

#[test]
fn remove_rebalances_past_first_rotation() {
    init_logging();

    //         5
    //      /     \
    //     2       9
    //    / \     / \
    //   1   3   7   11
    //        \ / \  / \
    //        4 6 8 10  12
    //                    \
    //                     13
    let mut set = set_of(&[5, 2, 9, 1, 3, 7, 11, 4, 6, 8, 10, 12, 13]);
    assert_eq!(root_key(&set), Some(5));
    assert_eq!(balance_of(&set, 2), 1);
    assert_eq!(balance_of(&set, 5), 1);

    // Rotating at 2 shortens the left subtree, which then unbalances the root.
    set.remove(1);

    assert_eq!(root_key(&set), Some(9));
    assert_eq!(balance_of(&set, 9), 0);
    assert_eq!(balance_of(&set, 5), 0);
    assert_eq!(balance_of(&set, 3), 0);
    assert_eq!(balance_of(&set, 11), 1);
    assert_eq!(set.check_invariants().unwrap().height, 4);
}

#[test]
fn remove_two_children_with_direct_successor() {
    init_logging();

    let mut set = set_of(&[4, 2, 6, 1, 3, 5, 7]);
    set.remove(6);

    // 7 takes 6's place and inherits its balance factor before rebalancing.
    assert_eq!(set.keys(), [1, 2, 3, 4, 5, 7]);
    assert_eq!(balance_of(&set, 7), -1);
    set.assert_invariants();
}

#[test]
fn remove_two_children_with_deep_successor() {
    init_logging();

    let mut set = set_of(&[4, 2, 8, 1, 3, 6, 9, 5, 7, 10]);
    set.remove(4);

    // The successor 5 replaces the root.
    assert_eq!(root_key(&set), Some(5));
    assert_eq!(set.keys(), [1, 2, 3, 5, 6, 7, 8, 9, 10]);
    set.assert_invariants();
}

#[test]
fn remove_root_until_empty() {
    init_logging();

    let mut set = set_of(&(0..64).collect::<Vec<_>>());

    while let Some(root) = root_key(&set) {
        assert!(set.remove(root));
        set.assert_invariants();
    }

    assert!(set.is_empty());
    assert_eq!(set.first(), None);
}

#[test]
fn remove_missing_key_is_noop() {
    let mut set = set_of(&[1, 2, 3]);
    let before = render(&set);

    assert!(!set.remove(7));
    assert_eq!(render(&set), before);
}

#[test]
fn clear_and_reuse() {
    let mut set = set_of(&[5, 3, 8, 1]);
    set.clear();

    assert!(set.is_empty());
    set.assert_invariants();

    set.add(2);
    assert_eq!(set.keys(), [2]);
}

#[test]
fn extreme_keys() {
    let mut set = set_of(&[Key::MIN, 0, Key::MAX]);

    assert!(set.contains(Key::MIN));
    assert_eq!(set.first(), Some(Key::MIN));
    assert_eq!(set.last(), Some(Key::MAX));

    set.remove(Key::MAX);
    assert_eq!(set.last(), Some(0));
}

#[test]
fn sequential_inserts_stay_shallow() {
    let mut set = AvlSet::new();

    for key in 0..4096 {
        set.add(key);
    }

    let shape = set.check_invariants().unwrap();
    assert_eq!(shape.len, 4096);
    assert!(shape.height <= max_height(shape.len));

    for key in (0..4096).step_by(2) {
        set.remove(key);
    }

    let shape = set.check_invariants().unwrap();
    assert_eq!(shape.len, 2048);
    assert!(shape.height <= max_height(shape.len));
}

#[cfg(miri)]
const FUZZ_RANGE: Range<usize> = 0..10;

#[cfg(not(miri))]
const FUZZ_RANGE: Range<usize> = 0..1000;

proptest::proptest! {
    #![proptest_config(ProptestConfig {
        max_shrink_iters: 65536,
        .. ProptestConfig::default()
    })]

    #[test]
    fn btree_equivalence(ops in proptest::collection::vec(model::op_strategy(), FUZZ_RANGE)) {
        model::run_btree_equivalence(ops);
    }

    #[test]
    fn height_is_logarithmic(
        adds in proptest::collection::vec(-1000 as Key..1000, 0..500),
        removes in proptest::collection::vec(-1000 as Key..1000, 0..500)
    ) {
        let mut set: AvlSet = adds.iter().copied().collect();
        for key in removes {
            set.remove(key);
        }

        let shape = set.check_invariants().unwrap();
        prop_assert!(shape.height <= max_height(shape.len));
    }

    #[test]
    fn add_then_remove_round_trips(
        keys in proptest::collection::vec(any::<Key>(), 0..200),
        key in any::<Key>()
    ) {
        let mut set: AvlSet = keys.into_iter().collect();

        set.add(key);
        prop_assert_eq!(set.search(key).map(|node| node.key()), Some(key));

        set.remove(key);
        prop_assert!(set.search(key).is_none());
        set.assert_invariants();
    }

    #[test]
    fn add_is_idempotent(
        keys in proptest::collection::vec(-200 as Key..200, 1..200),
        pick in any::<usize>()
    ) {
        let key = keys[pick % keys.len()];
        let mut set: AvlSet = keys.iter().copied().collect();

        let before = render(&set);
        prop_assert!(!set.add(key));
        prop_assert_eq!(render(&set), before);

        let mut fresh = AvlSet::new();
        fresh.add(key);
        let once = render(&fresh);
        fresh.add(key);
        prop_assert_eq!(render(&fresh), once);
    }
}
