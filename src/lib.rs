//! An intrusive AVL tree keyed by integers.
#![cfg_attr(not(feature = "std"), no_std)]

// Conventions used in comments:
// - The height of a node `x` is denoted `h(x)`; an empty subtree has height -1.
// - The parent of a node `x` is denoted `p(x)`.
// - The balance factor of a node `x` is `b(x) = h(right(x)) - h(left(x))`.
// - A node is left-heavy if `b(x) = -1` and right-heavy if `b(x) = +1`.
//
// The fundamental invariants of an AVL tree are:
// 1. Every key in the left subtree of `x` is less than `x`'s key, and every key in the right
//    subtree is greater.
// 2. `b(x) ∈ {-1, 0, +1}` for every node, and the stored factor is exactly the height difference.
// 3. For every child `c` of `x`, `p(c) = x`, and the root has no parent.
//
// Corollary:
// 4. A tree of `n` nodes has at most `1.44 * log2(n + 2)` levels.
//
//    Proof sketch: the smallest AVL tree with `k` levels is a Fibonacci tree with `F(k + 2) - 1`
//    nodes, and `F(k)` grows as `φ^k`.
//
// Insertion grows exactly one subtree by one level, so the walk back up stops as soon as a node
// absorbs the growth, either by becoming balanced or by being rotated. Removal shrinks a subtree,
// and a rotation only absorbs the shrinkage when the sibling subtree was balanced; otherwise the
// rotated subtree is one level shorter and the walk continues.

#[cfg(feature = "alloc")]
extern crate alloc;

use core::{
    cell::UnsafeCell, cmp::Ordering, fmt, marker::PhantomPinned, mem, ops::Not, pin::Pin,
    ptr::NonNull,
};

use cordyceps::Linked;
use log::trace;

mod check;
#[cfg(feature = "alloc")]
mod debug;
mod rotate;
#[cfg(feature = "alloc")]
pub mod set;

#[cfg(any(feature = "model", all(test, feature = "std")))]
pub mod model;
#[cfg(all(test, feature = "std"))]
mod tests;

pub use check::{InvariantViolation, TreeShape};
#[cfg(feature = "alloc")]
pub use set::{AvlSet, Node};

/// The key type stored in the tree.
pub type Key = i64;

pub trait TreeNode<L>: Linked<L> {
    fn key(&self) -> Key;
}

/// An intrusive AVL tree.
///
/// Nodes are handed to the tree as [`Linked`] handles and handed back when removed, so the tree
/// owns every node it contains. Parent links are plain back-references and never own anything.
pub struct AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    root: Link<T>,
    len: usize,
}

/// The links embedded in every node of an [`AvlTree`].
pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Dir {
    Left = 0,
    Right = 1,
}

impl Dir {
    /// The change in balance factor when the subtree on this side grows by one level.
    #[inline]
    fn sign(self) -> i8 {
        match self {
            Dir::Left => -1,
            Dir::Right => 1,
        }
    }
}

impl Not for Dir {
    type Output = Dir;

    fn not(self) -> Self::Output {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

#[repr(C)]
struct LinksInner<T: ?Sized> {
    parent: Link<T>,
    children: [Link<T>; 2],
    balance: i8,
    _unpin: PhantomPinned,
}

type Link<T> = Option<NonNull<T>>;

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns a new empty tree.
    pub const fn new() -> AvlTree<T> {
        AvlTree { root: None, len: 0 }
    }

    /// Returns `true` if the tree contains no elements.
    pub const fn is_empty(&self) -> bool {
        let empty = self.len() == 0;

        if cfg!(debug_assertions) {
            // Can't use assert_eq!() in const fn.
            assert!(empty == self.root.is_none());
        }

        empty
    }

    /// Returns the number of elements in the tree.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns a reference to the node corresponding to `key`.
    pub fn get(&self, key: Key) -> Option<Pin<&T>> {
        let ptr = self.get_raw(key)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_ref())) }
    }

    /// Returns `true` if the tree contains a node with the given key.
    pub fn contains_key(&self, key: Key) -> bool {
        self.get_raw(key).is_some()
    }

    fn get_raw(&self, key: Key) -> Link<T> {
        let mut opt_cur = self.root;

        loop {
            let cur = opt_cur?;

            unsafe {
                match key.cmp(&cur.as_ref().key()) {
                    Ordering::Less => opt_cur = T::links(cur).as_ref().left(),
                    Ordering::Equal => return Some(cur),
                    Ordering::Greater => opt_cur = T::links(cur).as_ref().right(),
                }
            }
        }
    }

    /// Returns the minimum element of the tree.
    pub fn first(&self) -> Option<Pin<&T>> {
        let root = self.root?;

        unsafe {
            let (first, _) = self.min_in_subtree(root);
            Some(Pin::new_unchecked(first.as_ref()))
        }
    }

    /// Returns the maximum element of the tree.
    pub fn last(&self) -> Option<Pin<&T>> {
        let mut cur = self.root?;

        unsafe {
            while let Some(right) = T::links(cur).as_ref().right() {
                cur = right;
            }

            Some(Pin::new_unchecked(cur.as_ref()))
        }
    }

    /// Inserts an item into the tree.
    ///
    /// If the tree already holds a node with the same key, the tree is left untouched and `item`
    /// is handed back.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn insert(&mut self, item: T::Handle) -> Option<T::Handle> {
        let ptr = T::into_ptr(item);

        unsafe {
            // A new node is always attached as a balanced leaf.
            T::links(ptr).as_mut().clear();

            let key = ptr.as_ref().key();

            let Some(root) = self.root else {
                // Tree is empty. Set `item` as the root and return.
                self.root = Some(ptr);
                self.len += 1;
                self.debug_check();
                return None;
            };

            // Descend the tree, looking for an empty child slot.
            let mut parent = root;
            let dir = loop {
                let dir = match key.cmp(&parent.as_ref().key()) {
                    Ordering::Less => Dir::Left,
                    Ordering::Equal => {
                        trace!("insert: key {key} is already present");
                        return Some(T::from_ptr(ptr));
                    }
                    Ordering::Greater => Dir::Right,
                };

                match T::links(parent).as_ref().child(dir) {
                    Some(child) => parent = child,
                    None => break dir,
                }
            };

            T::links(parent).as_mut().set_child(dir, Some(ptr));
            T::links(ptr).as_mut().set_parent(Some(parent));
            self.len += 1;

            self.rebalance_inserted(ptr);
        }

        self.debug_check();
        None
    }

    // Performs a bottom-up rebalance of the tree after `node` was attached as a leaf.
    //
    // Every ancestor reached has a subtree that just grew by one level on the side we came from.
    unsafe fn rebalance_inserted(&mut self, node: NonNull<T>) {
        let mut child = node;

        while let Some(parent) = T::links(child).as_ref().parent() {
            let dir = self.which_child(parent, child);
            let grew = dir.sign();
            let balance = T::links(parent).as_ref().balance();

            if balance == 0 {
                // `parent` now leans toward `child`, and its own height grew.
                T::links(parent).as_mut().set_balance(grew);
                child = parent;
            } else if balance == -grew {
                // The lighter side caught up; the height of `parent` is unchanged.
                T::links(parent).as_mut().set_balance(0);
                trace!("insert: growth absorbed at key {}", parent.as_ref().key());
                return;
            } else {
                // The heavier side grew again. A rotation restores the subtree's previous height.
                self.fix_inserted_imbalance(parent, child, dir);
                return;
            }
        }
    }

    // Rotates at `parent`, whose `dir` subtree rooted at `child` is two levels taller than its
    // sibling.
    unsafe fn fix_inserted_imbalance(&mut self, parent: NonNull<T>, child: NonNull<T>, dir: Dir) {
        let grew = dir.sign();
        let child_balance = T::links(child).as_ref().balance();
        debug_assert_ne!(child_balance, 0, "a grown child cannot be balanced");

        if child_balance == grew {
            // Left-left or right-right: a single rotation promotes `child`.
            self.rotate(child);
            T::links(child).as_mut().set_balance(0);
            T::links(parent).as_mut().set_balance(0);
        } else {
            // Left-right or right-left: the inner grandchild is promoted twice.
            let pivot = T::links(child)
                .as_ref()
                .child(!dir)
                .expect("child leaning inward must have an inner child");
            let pivot_balance = T::links(pivot).as_ref().balance();

            self.rotate_double(pivot);
            self.set_double_rotation_balances(parent, child, pivot, pivot_balance, grew);
        }
    }

    // Returns the minimum node in the subtree.
    //
    // If the subtree root is not the minimum, also returns the minimum node's parent.
    #[inline]
    unsafe fn min_in_subtree(&self, root: NonNull<T>) -> (NonNull<T>, Option<NonNull<T>>) {
        let mut parent = None;
        let mut cur = root;

        while let Some(left) = unsafe { T::links(cur).as_ref().left() } {
            parent = Some(cur);
            cur = left;
        }

        (cur, parent)
    }

    // Returns the in-order successor of `node`, if any.
    unsafe fn successor(&self, node: NonNull<T>) -> Link<T> {
        if let Some(right) = T::links(node).as_ref().right() {
            return Some(self.min_in_subtree(right).0);
        }

        // Ascend until we leave a left subtree.
        let mut cur = node;
        while let Some(parent) = T::links(cur).as_ref().parent() {
            if self.which_child(parent, cur) == Dir::Left {
                return Some(parent);
            }

            cur = parent;
        }

        None
    }

    /// Removes the node with the given key from the tree and returns it.
    ///
    /// Returns `None` and leaves the tree untouched if no node has that key.
    pub fn remove(&mut self, key: Key) -> Option<T::Handle> {
        let node = self.get_raw(key)?;
        Some(unsafe { self.remove_at(node) })
    }

    /// Removes an arbitrary node from the tree.
    ///
    /// # Safety
    ///
    /// It is the caller's responsibility to ensure that `node` is an element of `self`, and not any
    /// other tree.
    pub unsafe fn remove_at(&mut self, node: NonNull<T>) -> T::Handle {
        // There are three possible cases:
        //
        // 1. `node` is a leaf. It is detached from its parent.
        // 2. `node` has one child. The child takes `node`'s place.
        // 3. `node` has two children. `node`'s successor[^1] is detached from its position and
        //    takes `node`'s place and balance factor. The successor by definition has no left
        //    child, so its right child (if any) is elevated to replace it.
        //
        // In every case exactly one subtree lost one level of height. That subtree is identified
        // by its parent and the side it hangs on, and the rebalancing walk starts there.
        //
        // [^1]: The successor of a node `a` is the least node in `a`'s right subtree.
        unsafe {
            let parent = T::links(node).as_ref().parent();
            let left = T::links(node).as_ref().left();
            let right = T::links(node).as_ref().right();

            let shrunk = match (left, right) {
                (Some(left), Some(right)) => {
                    trace!("remove: key {} has two children", node.as_ref().key());
                    Some(self.splice_successor(node, left, right))
                }

                (Some(child), None) | (None, Some(child)) => {
                    trace!("remove: key {} has one child", node.as_ref().key());
                    let shrunk = parent.map(|p| (p, self.which_child(p, node)));

                    self.replace_child_or_set_root(parent, node, Some(child));
                    T::links(child).as_mut().set_parent(parent);

                    shrunk
                }

                (None, None) => {
                    trace!("remove: key {} is a leaf", node.as_ref().key());
                    let shrunk = parent.map(|p| (p, self.which_child(p, node)));

                    self.replace_child_or_set_root(parent, node, None);

                    shrunk
                }
            };

            if let Some((parent, dir)) = shrunk {
                self.rebalance_removed(parent, dir);
            }

            self.len -= 1;
            T::links(node).as_mut().clear();
            self.debug_check();

            T::from_ptr(node)
        }
    }

    // Puts the successor of `node` in `node`'s place.
    //
    // The successor inherits `node`'s parent, children and balance factor. Returns the node whose
    // subtree lost height and the side of that subtree.
    unsafe fn splice_successor(
        &mut self,
        node: NonNull<T>,
        left: NonNull<T>,
        right: NonNull<T>,
    ) -> (NonNull<T>, Dir) {
        let (successor, successor_parent) = self.min_in_subtree(right);
        debug_assert!(T::links(successor).as_ref().left().is_none());

        // Detach the successor first; its right link is overwritten below.
        let shrunk = match successor_parent {
            Some(successor_parent) => {
                let successor_right = T::links(successor).as_ref().right();

                // Elevate the successor's right child to replace it.
                self.replace_child(successor_parent, successor, successor_right);
                self.maybe_set_parent(successor_right, Some(successor_parent));

                T::links(successor).as_mut().set_right(Some(right));
                T::links(right).as_mut().set_parent(Some(successor));

                (successor_parent, Dir::Left)
            }

            // The successor is `node`'s right child and keeps its own right subtree, which is
            // one level shorter than the subtree it replaces.
            None => (successor, Dir::Right),
        };

        let parent = T::links(node).as_ref().parent();
        self.replace_child_or_set_root(parent, node, Some(successor));

        let balance = T::links(node).as_ref().balance();
        let links = T::links(successor).as_mut();
        links.set_parent(parent);
        links.set_left(Some(left));
        links.set_balance(balance);

        T::links(left).as_mut().set_parent(Some(successor));

        shrunk
    }

    // Performs a bottom-up rebalance of the tree after the `dir` subtree of `parent` lost a level.
    unsafe fn rebalance_removed(&mut self, mut parent: NonNull<T>, mut dir: Dir) {
        loop {
            let shrank = dir.sign();
            let balance = T::links(parent).as_ref().balance();

            let subtree = if balance == 0 {
                // `parent` now leans away from the shrunk side, but its height is unchanged.
                T::links(parent).as_mut().set_balance(-shrank);
                trace!("remove: shrinkage absorbed at key {}", parent.as_ref().key());
                return;
            } else if balance == shrank {
                // `parent` was heavy on the shrunk side and is now balanced, one level shorter.
                T::links(parent).as_mut().set_balance(0);
                parent
            } else {
                // `parent` was already heavy on the other side and is now two levels off.
                let heavy = T::links(parent)
                    .as_ref()
                    .child(!dir)
                    .expect("heavy side of an unbalanced node must not be empty");
                let heavy_balance = T::links(heavy).as_ref().balance();

                if heavy_balance == 0 {
                    // A single rotation keeps the subtree's height.
                    self.rotate(heavy);
                    T::links(parent).as_mut().set_balance(-shrank);
                    T::links(heavy).as_mut().set_balance(shrank);
                    trace!(
                        "remove: rotation absorbed shrinkage at key {}",
                        heavy.as_ref().key()
                    );
                    return;
                } else if heavy_balance == -shrank {
                    // `heavy` leans outward: a single rotation, one level shorter.
                    self.rotate(heavy);
                    T::links(parent).as_mut().set_balance(0);
                    T::links(heavy).as_mut().set_balance(0);
                    heavy
                } else {
                    // `heavy` leans inward: a double rotation, one level shorter.
                    let pivot = T::links(heavy)
                        .as_ref()
                        .child(dir)
                        .expect("child leaning inward must have an inner child");
                    let pivot_balance = T::links(pivot).as_ref().balance();

                    self.rotate_double(pivot);
                    self.set_double_rotation_balances(
                        parent,
                        heavy,
                        pivot,
                        pivot_balance,
                        -shrank,
                    );
                    pivot
                }
            };

            // `subtree` is one level shorter than before; continue with its parent.
            match T::links(subtree).as_ref().parent() {
                Some(next) => {
                    dir = self.which_child(next, subtree);
                    parent = next;
                }
                None => return,
            }
        }
    }

    /// Clears the tree, removing all elements.
    pub fn clear(&mut self) {
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            unsafe {
                // Descend to the minimum node.
                let (cur, parent) = self.min_in_subtree(cur);
                let parent = parent.or_else(|| T::links(cur).as_ref().parent());

                let right = T::links(cur).as_ref().right();

                // Elevate the node's right child (which may be None).
                self.replace_child_or_set_root(parent, cur, right);
                self.maybe_set_parent(right, parent);

                // Drop the node.
                T::links(cur).as_mut().clear();
                drop(T::from_ptr(cur));
                self.len -= 1;

                // If the node had no right child, climb to the parent. If the node had no parent,
                // the tree is empty.
                opt_cur = right.or(parent);
            }
        }

        debug_assert!(self.root.is_none());
        debug_assert_eq!(self.len(), 0);
    }

    // Support methods ========================================================

    #[inline]
    fn debug_check(&self) {
        #[cfg(any(test, feature = "check-invariants"))]
        self.assert_invariants();
    }

    unsafe fn maybe_set_parent(&mut self, opt_node: Link<T>, parent: Link<T>) {
        let Some(node) = opt_node else {
            return;
        };

        unsafe { T::links(node).as_mut().set_parent(parent) };
    }

    #[inline]
    unsafe fn replace_child_or_set_root(
        &mut self,
        parent: Link<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        match parent {
            Some(parent) => self.replace_child(parent, old_child, new_child),
            None => self.root = new_child,
        }
    }

    // Replaces the child pointer of `parent` pointing at `old_child` with `new_child`.
    //
    // `new_child`'s parent pointer is not updated.
    //
    // # Safety
    //
    // The caller must ensure that the following conditions hold:
    // - `old_child` is a child node of `parent`.
    // - `new_child` is not a child node of `parent`.
    unsafe fn replace_child(
        &mut self,
        parent: NonNull<T>,
        old_child: NonNull<T>,
        new_child: Option<NonNull<T>>,
    ) {
        unsafe {
            let dir = self.which_child(parent, old_child);

            debug_assert_eq!(
                T::links(parent).as_ref().child(dir),
                Some(old_child),
                "`old_child` must be a child of `parent`"
            );
            debug_assert!(
                new_child.is_none() || T::links(parent).as_ref().child(!dir) != new_child,
                "`new_child` must not be a child of `parent`"
            );

            T::links(parent).as_mut().set_child(dir, new_child);
        }
    }

    unsafe fn which_child(&self, parent: NonNull<T>, child: NonNull<T>) -> Dir {
        if T::links(parent).as_ref().left() == Some(child) {
            Dir::Left
        } else {
            Dir::Right
        }
    }
}

impl<T> Default for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: ?Sized> Links<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                parent: None,
                children: [None; 2],
                balance: 0,
                _unpin: PhantomPinned,
            }),
        }
    }

    /// Returns the balance factor of the node, `h(right) - h(left)`.
    #[inline]
    pub(crate) fn balance(&self) -> i8 {
        unsafe { (*self.inner.get()).balance }
    }

    #[inline]
    fn parent(&self) -> Link<T> {
        unsafe { (*self.inner.get()).parent }
    }

    #[inline]
    fn child(&self, dir: Dir) -> Link<T> {
        unsafe { (*self.inner.get()).children[dir as usize] }
    }

    #[inline]
    fn left(&self) -> Link<T> {
        self.child(Dir::Left)
    }

    #[inline]
    fn right(&self) -> Link<T> {
        self.child(Dir::Right)
    }

    #[inline]
    fn set_parent(&mut self, parent: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().parent, parent)
    }

    #[inline]
    fn set_child(&mut self, dir: Dir, child: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().children[dir as usize], child)
    }

    #[inline]
    fn set_left(&mut self, left: Link<T>) -> Link<T> {
        self.set_child(Dir::Left, left)
    }

    #[inline]
    fn set_right(&mut self, right: Link<T>) -> Link<T> {
        self.set_child(Dir::Right, right)
    }

    #[inline]
    fn set_balance(&mut self, balance: i8) {
        debug_assert!((-1..=1).contains(&balance));
        self.inner.get_mut().balance = balance;
    }

    // Resets the links to those of a detached, balanced leaf.
    #[inline]
    fn clear(&mut self) {
        let inner = self.inner.get_mut();
        inner.parent = None;
        inner.children = [None; 2];
        inner.balance = 0;
    }
}

impl<T: ?Sized> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("parent", &self.parent())
            .field("left", &self.left())
            .field("right", &self.right())
            .field("balance", &self.balance())
            .finish()
    }
}
