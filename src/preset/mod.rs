//! Kick preset documents: parsing, the parameter schema, template merging
//! and summaries.

pub mod index;
pub use index::*;
pub mod model;
pub use model::*;
pub mod schema;
pub mod params;
pub use params::ParameterSet;
pub mod tree;
pub use tree::{DocumentFormat, PresetTree, Topology};
pub mod merge;
pub use merge::{Overrides, merge};
pub mod legacy;
pub mod recipe;
pub use recipe::QuickKick;
pub mod summary;
pub use summary::PresetSummary;

#[cfg(test)]
pub(crate) mod fixtures;
