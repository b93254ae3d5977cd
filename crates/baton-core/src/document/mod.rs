//! The shared document: a small markup tree, its parser, the markup
//! vocabulary (containers, entries, lock marker, footer), and the merger.

pub mod markup;
pub mod merge;
pub mod node;
pub mod parse;

pub use self::merge::{DocumentMerger, MergeAction, Merged};
pub use self::node::{Element, Node};
pub use self::parse::parse;
