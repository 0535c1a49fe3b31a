extern crate std;

use std::{collections::BTreeSet, prelude::v1::*, ptr::NonNull};

use arbitrary::Arbitrary;
use cordyceps::Linked;
use proptest::strategy::{Just, Strategy};

use crate::{AvlSet, Key, Links, TreeNode};

#[derive(Debug)]
#[repr(C)]
pub struct TestNode {
    pub links: Links<TestNode>,
    pub key: Key,
}

impl TestNode {
    pub fn new(key: Key) -> Box<TestNode> {
        Box::new(TestNode {
            links: Links::new(),
            key,
        })
    }
}

unsafe impl Linked<Links<TestNode>> for TestNode {
    type Handle = Box<TestNode>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::new(Box::into_raw(r)).unwrap()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<TestNode>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<TestNode>> for TestNode {
    fn key(&self) -> Key {
        self.key
    }
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum ItemValue {
    /// Picks an existing key by position, so removals and lookups usually hit.
    Index(usize),
    Random(Key),
}

proptest::prop_compose! {
    fn index_strategy()(
        index in 0usize..1000,
    ) -> ItemValue {
        ItemValue::Index(index)
    }
}

proptest::prop_compose! {
    fn random_strategy()(
        random in -500 as Key..500,
    ) -> ItemValue {
        ItemValue::Random(random)
    }
}

fn value_strategy() -> impl Strategy<Value = ItemValue> {
    proptest::prop_oneof![index_strategy(), random_strategy()]
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum Op {
    Add(ItemValue),
    Search(ItemValue),
    Remove(ItemValue),
    First,
    Last,
}

impl Op {
    fn finalize(self, model: &BTreeSet<Key>) -> FinalOp {
        fn get_value(model: &BTreeSet<Key>, i: ItemValue) -> Key {
            match i {
                ItemValue::Index(idx) => match model.len() {
                    0 => idx as Key,
                    len => model.iter().nth(idx % len).copied().unwrap_or_default(),
                },
                ItemValue::Random(v) => v,
            }
        }

        match self {
            Op::Add(item) => FinalOp::Add(get_value(model, item)),
            Op::Search(item) => FinalOp::Search(get_value(model, item)),
            Op::Remove(item) => FinalOp::Remove(get_value(model, item)),
            Op::First => FinalOp::First,
            Op::Last => FinalOp::Last,
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum FinalOp {
    Add(Key),
    Search(Key),
    Remove(Key),
    First,
    Last,
}

pub fn op_strategy() -> impl Strategy<Value = Op> {
    proptest::prop_oneof![
        4 => value_strategy().prop_map(Op::Add),
        2 => value_strategy().prop_map(Op::Search),
        3 => value_strategy().prop_map(Op::Remove),
        1 => Just(Op::First),
        1 => Just(Op::Last),
    ]
}

/// Replays `ops` against both an [`AvlSet`] and a [`BTreeSet`], checking after every step that
/// they agree and that the tree's invariants hold.
pub fn run_btree_equivalence(ops: Vec<Op>) {
    let mut btree = BTreeSet::new();
    let mut avl = AvlSet::new();

    for (op_id, op) in ops.into_iter().enumerate() {
        let final_op = op.finalize(&btree);

        match final_op {
            FinalOp::Add(value) => {
                let from_btree = btree.insert(value);
                let from_avl = avl.add(value);

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Search(value) => {
                let from_btree = btree.get(&value).copied();
                let from_avl = avl.search(value).map(|node| node.key());

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Remove(value) => {
                let from_btree = btree.remove(&value);
                let from_avl = avl.remove(value);

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::First => {
                let from_btree = btree.first().copied();
                let from_avl = avl.first();

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Last => {
                let from_btree = btree.last().copied();
                let from_avl = avl.last();

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }
        }

        avl.assert_invariants();
        assert_eq!(btree.len(), avl.len());
        assert!(btree.iter().copied().eq(avl.keys()));
    }
}
