//! Defines the core data structures for the derivation graph.
pub mod dag;
pub mod node;

pub use dag::{DerivationGraph, GraphError};
pub use node::{Derivation, DerivationNode, NodeId, Op, Stage};
