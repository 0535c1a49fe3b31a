use core::{cmp::Ordering, ptr::NonNull};

use thiserror::Error;

use crate::{AvlTree, Dir, Key, Links, TreeNode};

/// A broken tree invariant, as reported by [`AvlTree::check_invariants`].
///
/// These indicate a bug in the tree (or memory corruption), never a recoverable condition.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("root node {root} has a parent link")]
    RootHasParent { root: Key },

    #[error("child {child} of node {parent} does not link back to its parent")]
    ParentMismatch { parent: Key, child: Key },

    #[error("node {key} is unbalanced: left height {left_height}, right height {right_height}")]
    Unbalanced {
        key: Key,
        left_height: usize,
        right_height: usize,
    },

    #[error("node {key} records balance factor {recorded}, but its actual balance is {actual}")]
    BalanceMismatch { key: Key, recorded: i8, actual: i8 },

    #[error("in-order walk visited key {next} after key {prev}")]
    OutOfOrder { prev: Key, next: Key },

    #[error("tree records {recorded} elements, but {counted} are reachable")]
    LengthMismatch { recorded: usize, counted: usize },
}

/// Summary of a tree that passed [`AvlTree::check_invariants`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeShape {
    /// Number of elements.
    pub len: usize,
    /// Number of levels; an empty tree has height 0 and a single node has height 1.
    pub height: usize,
}

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Verifies every structural invariant of the tree.
    ///
    /// This walks the whole tree and runs in _O(n)_ time.
    pub fn check_invariants(&self) -> Result<TreeShape, InvariantViolation> {
        let Some(root) = self.root else {
            return match self.len {
                0 => Ok(TreeShape::default()),
                recorded => Err(InvariantViolation::LengthMismatch {
                    recorded,
                    counted: 0,
                }),
            };
        };

        unsafe {
            if T::links(root).as_ref().parent().is_some() {
                return Err(InvariantViolation::RootHasParent {
                    root: root.as_ref().key(),
                });
            }

            // Parent links must be sound before the in-order walk can follow them.
            let height = self.check_subtree(root)?;
            let counted = self.check_order(root)?;

            if counted != self.len {
                return Err(InvariantViolation::LengthMismatch {
                    recorded: self.len,
                    counted,
                });
            }

            Ok(TreeShape {
                len: counted,
                height,
            })
        }
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        if let Err(violation) = self.check_invariants() {
            panic!("AVL tree invariant violated: {violation}");
        }
    }

    /// Returns every key in the tree, in ascending order.
    #[cfg(feature = "alloc")]
    #[doc(hidden)]
    pub fn keys(&self) -> alloc::vec::Vec<Key> {
        let mut keys = alloc::vec::Vec::with_capacity(self.len);

        let Some(root) = self.root else {
            return keys;
        };

        unsafe {
            let mut opt_cur = Some(self.min_in_subtree(root).0);
            while let Some(cur) = opt_cur {
                keys.push(cur.as_ref().key());
                opt_cur = self.successor(cur);
            }
        }

        keys
    }

    // Checks parent links and balance factors below `node`, returning the subtree height.
    #[allow(clippy::only_used_in_recursion)]
    unsafe fn check_subtree(&self, node: NonNull<T>) -> Result<usize, InvariantViolation> {
        unsafe {
            let mut heights = [0; 2];

            for dir in [Dir::Left, Dir::Right] {
                let Some(child) = T::links(node).as_ref().child(dir) else {
                    continue;
                };

                if T::links(child).as_ref().parent() != Some(node) {
                    return Err(InvariantViolation::ParentMismatch {
                        parent: node.as_ref().key(),
                        child: child.as_ref().key(),
                    });
                }

                heights[dir as usize] = self.check_subtree(child)?;
            }

            let [left_height, right_height] = heights;
            let key = node.as_ref().key();

            if left_height.abs_diff(right_height) > 1 {
                return Err(InvariantViolation::Unbalanced {
                    key,
                    left_height,
                    right_height,
                });
            }

            let actual = match right_height.cmp(&left_height) {
                Ordering::Less => -1,
                Ordering::Equal => 0,
                Ordering::Greater => 1,
            };
            let recorded = T::links(node).as_ref().balance();
            if recorded != actual {
                return Err(InvariantViolation::BalanceMismatch {
                    key,
                    recorded,
                    actual,
                });
            }

            Ok(1 + left_height.max(right_height))
        }
    }

    // Walks the successor chain from the minimum of `root`, returning the number of nodes visited.
    unsafe fn check_order(&self, root: NonNull<T>) -> Result<usize, InvariantViolation> {
        unsafe {
            let (mut cur, _) = self.min_in_subtree(root);
            let mut counted = 1;

            while let Some(next) = self.successor(cur) {
                let (prev, next_key) = (cur.as_ref().key(), next.as_ref().key());
                if prev >= next_key {
                    return Err(InvariantViolation::OutOfOrder {
                        prev,
                        next: next_key,
                    });
                }

                counted += 1;
                cur = next;
            }

            Ok(counted)
        }
    }
}
