use alloc::{boxed::Box, vec::Vec};
use core::{fmt, marker::PhantomPinned, pin::Pin, ptr::NonNull};

use cordyceps::Linked;

use crate::{AvlTree, InvariantViolation, Key, Links, TreeNode, TreeShape};

/// An ordered set of integer keys based on an [AVL tree].
///
/// [AVL tree]: https://en.wikipedia.org/wiki/AVL_tree
pub struct AvlSet {
    pub(crate) tree: AvlTree<Node>,
}

/// A node of an [`AvlSet`], as returned by [`AvlSet::search`].
pub struct Node {
    links: Links<Node>,
    key: Key,
    _unpin: PhantomPinned,
}

impl Node {
    fn new(key: Key) -> Box<Node> {
        Box::new(Node {
            links: Links::new(),
            key,
            _unpin: PhantomPinned,
        })
    }

    /// Returns the key stored in this node.
    pub fn key(&self) -> Key {
        self.key
    }

    /// Returns the height of this node's right subtree minus the height of its left subtree.
    ///
    /// This is always -1, 0 or 1.
    pub fn balance_factor(&self) -> i8 {
        self.links.balance()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("key", &self.key)
            .field("balance_factor", &self.balance_factor())
            .finish()
    }
}

unsafe impl Linked<Links<Node>> for Node {
    type Handle = Box<Self>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        Box::leak(r).into()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<Node>> {
        let ptr = ptr.as_ptr();
        unsafe { NonNull::new_unchecked(core::ptr::addr_of_mut!((*ptr).links)) }
    }
}

impl TreeNode<Links<Node>> for Node {
    fn key(&self) -> Key {
        self.key
    }
}

impl AvlSet {
    /// Creates a new, empty `AvlSet`.
    pub const fn new() -> Self {
        Self {
            tree: AvlTree::new(),
        }
    }

    /// Returns `true` if the set contains no keys.
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns the number of keys in the set.
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    /// Adds `key` to the set.
    ///
    /// Returns `false`, leaving the set unchanged, if the key was already present.
    pub fn add(&mut self, key: Key) -> bool {
        self.tree.insert(Node::new(key)).is_none()
    }

    /// Returns the node holding `key`, if any.
    #[inline]
    pub fn search(&self, key: Key) -> Option<&Node> {
        self.tree.get(key).map(Pin::get_ref)
    }

    /// Returns `true` if the set contains `key`.
    #[inline]
    pub fn contains(&self, key: Key) -> bool {
        self.tree.contains_key(key)
    }

    /// Removes `key` from the set.
    ///
    /// Returns `false` if the key was not present.
    pub fn remove(&mut self, key: Key) -> bool {
        self.tree.remove(key).is_some()
    }

    /// Returns the minimum key in the set.
    #[inline]
    pub fn first(&self) -> Option<Key> {
        self.tree.first().map(|node| node.key)
    }

    /// Returns the maximum key in the set.
    #[inline]
    pub fn last(&self) -> Option<Key> {
        self.tree.last().map(|node| node.key)
    }

    /// Clears the set, removing all keys.
    #[inline]
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// Verifies every structural invariant of the underlying tree.
    pub fn check_invariants(&self) -> Result<TreeShape, InvariantViolation> {
        self.tree.check_invariants()
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        self.tree.assert_invariants();
    }

    #[doc(hidden)]
    pub fn keys(&self) -> Vec<Key> {
        self.tree.keys()
    }

    /// Renders the set's tree in Graphviz DOT format.
    pub fn dotgraph<W: fmt::Write>(&self, name: &str, w: W) -> fmt::Result {
        self.tree.dotgraph(name, w)
    }
}

impl Default for AvlSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AvlSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.keys()).finish()
    }
}

impl Extend<Key> for AvlSet {
    fn extend<I: IntoIterator<Item = Key>>(&mut self, iter: I) {
        for key in iter {
            self.add(key);
        }
    }
}

impl FromIterator<Key> for AvlSet {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        let mut set = AvlSet::new();
        set.extend(iter);
        set
    }
}
