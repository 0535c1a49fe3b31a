use core::ptr::NonNull;

use log::trace;

use crate::{AvlTree, Dir, Links, TreeNode};

// Rotation primitives shared by insertion and removal.
//
// Rotations only relink nodes. Callers fix up balance factors afterward.
impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Promotes `node`, the right child of its parent, by rotating left.
    pub(crate) unsafe fn rotate_left(&mut self, node: NonNull<T>) {
        debug_assert_eq!(self.side_of(node), Dir::Right);
        self.rotate_at(node, Dir::Right);
    }

    /// Promotes `node`, the left child of its parent, by rotating right.
    pub(crate) unsafe fn rotate_right(&mut self, node: NonNull<T>) {
        debug_assert_eq!(self.side_of(node), Dir::Left);
        self.rotate_at(node, Dir::Left);
    }

    /// Promotes `node`, the right child of a left child, over both its parent and grandparent.
    pub(crate) unsafe fn rotate_left_right(&mut self, node: NonNull<T>) {
        self.rotate_left(node);
        self.rotate_right(node);
    }

    /// Promotes `node`, the left child of a right child, over both its parent and grandparent.
    pub(crate) unsafe fn rotate_right_left(&mut self, node: NonNull<T>) {
        self.rotate_right(node);
        self.rotate_left(node);
    }

    // Promotes `node` over its parent in whichever direction applies.
    pub(crate) unsafe fn rotate(&mut self, node: NonNull<T>) {
        match self.side_of(node) {
            Dir::Left => self.rotate_right(node),
            Dir::Right => self.rotate_left(node),
        }
    }

    // Promotes `node` over its parent and grandparent. `node` must be an inner grandchild.
    pub(crate) unsafe fn rotate_double(&mut self, node: NonNull<T>) {
        match self.side_of(node) {
            Dir::Right => self.rotate_left_right(node),
            Dir::Left => self.rotate_right_left(node),
        }
    }

    // After a double rotation, sets the balance factors of `outer` (the old subtree root), `inner`
    // (its former heavy child) and `pivot` (the promoted grandchild). `lean` is the balance factor
    // sign pointing from `outer` toward `inner`, and `pivot_balance` is the pivot's factor from
    // before the rotation.
    pub(crate) unsafe fn set_double_rotation_balances(
        &mut self,
        outer: NonNull<T>,
        inner: NonNull<T>,
        pivot: NonNull<T>,
        pivot_balance: i8,
        lean: i8,
    ) {
        // The pivot's taller subtree went to whichever of `outer` and `inner` it leaned toward;
        // the other one is left leaning away from the pivot.
        let (outer_balance, inner_balance) = match pivot_balance {
            b if b == lean => (-lean, 0),
            b if b == -lean => (0, lean),
            _ => (0, 0),
        };

        T::links(outer).as_mut().set_balance(outer_balance);
        T::links(inner).as_mut().set_balance(inner_balance);
        T::links(pivot).as_mut().set_balance(0);
    }

    // Performs a rotation, moving `up` into the position of its parent.
    //
    // `side` is the side `up` hangs on. The parent becomes the `!side` child of `up`, and `up`'s
    // former `!side` child moves across to become the parent's `side` child.
    unsafe fn rotate_at(&mut self, up: NonNull<T>, side: Dir) {
        let down = T::links(up)
            .as_ref()
            .parent()
            .expect("rotated node must not be the tree root");

        trace!(
            "rotate_{}: promoting key {} over key {}",
            match side {
                Dir::Left => "right",
                Dir::Right => "left",
            },
            up.as_ref().key(),
            down.as_ref().key()
        );

        let across = T::links(up).as_ref().child(!side);
        T::links(down).as_mut().set_child(side, across);
        self.maybe_set_parent(across, Some(down));

        T::links(up).as_mut().set_child(!side, Some(down));
        let parent = T::links(down).as_mut().set_parent(Some(up));
        T::links(up).as_mut().set_parent(parent);

        self.replace_child_or_set_root(parent, down, Some(up));
    }

    unsafe fn side_of(&self, node: NonNull<T>) -> Dir {
        let parent = T::links(node)
            .as_ref()
            .parent()
            .expect("node must not be the tree root");

        self.which_child(parent, node)
    }
}
