//! Filesystem primitives shared across features.

pub mod copy;
pub mod tree_hash;

pub use copy::{copy_file, copy_path, set_mode, write_with_mode};
pub use tree_hash::hash_tree;
