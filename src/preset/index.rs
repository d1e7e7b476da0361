//! Index conventions and envelope resolution mapping.
//!
//! The flat parameter set numbers slots from 1 (`Slot1Type`), the data
//! section numbers them from 0 (`Slot0_PitchEnvelope`). Effect chains follow
//! the same rule (`FXInsert1Slot2Type` ⇄ `insert0_1`). Coarse envelopes are
//! always derived from detailed ones, never the other way round.

use std::fmt;

use crate::dsp::envelope::Curve;
use crate::error::{KickError, Result};
use crate::preset::model::EnvelopeNode;

/// Number of oscillator slots in a preset.
pub const SLOT_COUNT: usize = 5;
/// Number of nodes in the coarse (flat parameter) envelope form.
pub const COARSE_NODE_COUNT: usize = 8;
/// Number of insert effect chains.
pub const INSERT_CHAIN_COUNT: usize = 2;
/// Effect slots per insert chain and in the master chain.
pub const EFFECT_SLOTS_PER_CHAIN: usize = 2;
/// Number of macro-settings entries.
pub const MACRO_COUNT: usize = 4;

/// Tree (0-based) slot index → flat (1-based) slot index.
pub fn to_flat_slot_index(tree: usize) -> Result<usize> {
    to_flat_index("tree slot", tree, SLOT_COUNT)
}

/// Flat (1-based) slot index → tree (0-based) slot index.
pub fn to_tree_slot_index(flat: usize) -> Result<usize> {
    to_tree_index("flat slot", flat, SLOT_COUNT)
}

pub(crate) fn to_flat_index(what: &'static str, tree: usize, count: usize) -> Result<usize> {
    if tree < count {
        Ok(tree + 1)
    } else {
        Err(KickError::range(what, tree, 0, count - 1))
    }
}

pub(crate) fn to_tree_index(what: &'static str, flat: usize, count: usize) -> Result<usize> {
    if (1..=count).contains(&flat) {
        Ok(flat - 1)
    } else {
        Err(KickError::range(what, flat, 1, count))
    }
}

/// A validated oscillator slot. Stores the tree index; both numberings are
/// available through [`SlotIndex::tree`] and [`SlotIndex::flat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotIndex(u8);

impl SlotIndex {
    pub fn from_tree(tree: usize) -> Result<Self> {
        to_flat_slot_index(tree)?;
        Ok(SlotIndex(tree as u8))
    }

    pub fn from_flat(flat: usize) -> Result<Self> {
        Ok(SlotIndex(to_tree_slot_index(flat)? as u8))
    }

    pub fn tree(self) -> usize {
        self.0 as usize
    }

    pub fn flat(self) -> usize {
        self.0 as usize + 1
    }

    /// All slots in ascending order.
    pub fn all() -> impl Iterator<Item = SlotIndex> {
        (0..SLOT_COUNT as u8).map(SlotIndex)
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.flat())
    }
}

/// Resample a detailed envelope to exactly `n` nodes by evaluating its curve
/// at `n` evenly spaced positions, both endpoints included.
pub fn coarse_from_detailed(nodes: &[EnvelopeNode], n: usize) -> Result<Vec<EnvelopeNode>> {
    if n < 2 {
        return Err(KickError::InvalidEnvelope(format!(
            "cannot resample to {n} nodes, need at least 2"
        )));
    }
    let curve = Curve::new(nodes)?;
    let last = (n - 1) as f64;
    Ok((0..n)
        .map(|i| {
            let x = i as f64 / last;
            EnvelopeNode::new(x, curve.value_at(x), 0.0)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_index_round_trip() {
        for flat in 1..=5 {
            assert_eq!(to_flat_slot_index(to_tree_slot_index(flat).unwrap()).unwrap(), flat);
        }
        for tree in 0..=4 {
            assert_eq!(to_tree_slot_index(to_flat_slot_index(tree).unwrap()).unwrap(), tree);
        }
    }

    #[test]
    fn out_of_domain_is_range_error() {
        assert!(matches!(to_tree_slot_index(0), Err(KickError::Range { .. })));
        assert!(matches!(to_tree_slot_index(6), Err(KickError::Range { .. })));
        assert!(matches!(to_flat_slot_index(5), Err(KickError::Range { .. })));
        assert!(SlotIndex::from_flat(0).is_err());
        assert!(SlotIndex::from_tree(5).is_err());
    }

    #[test]
    fn slot_index_exposes_both_numberings() {
        let slot = SlotIndex::from_flat(3).unwrap();
        assert_eq!(slot.tree(), 2);
        assert_eq!(slot.flat(), 3);
        assert_eq!(SlotIndex::all().count(), SLOT_COUNT);
        assert_eq!(slot.to_string(), "slot 3");
    }

    #[test]
    fn coarse_resample_hits_endpoints() {
        let nodes = vec![
            EnvelopeNode::new(0.0, 0.79, 0.0),
            EnvelopeNode::new(0.3, 0.4, -0.2),
            EnvelopeNode::new(1.0, 0.09, 0.0),
        ];
        let coarse = coarse_from_detailed(&nodes, COARSE_NODE_COUNT).unwrap();
        assert_eq!(coarse.len(), 8);
        assert_eq!(coarse[0].x, 0.0);
        assert_eq!(coarse[0].y, 0.79);
        assert_eq!(coarse[7].x, 1.0);
        assert_eq!(coarse[7].y, 0.09);
        assert!(coarse.windows(2).all(|w| w[0].x < w[1].x));
    }

    #[test]
    fn coarse_resample_of_linear_ramp_is_linear() {
        let nodes = vec![EnvelopeNode::new(0.0, 0.0, 0.0), EnvelopeNode::new(1.0, 1.0, 0.0)];
        let coarse = coarse_from_detailed(&nodes, 5).unwrap();
        for node in &coarse {
            assert!((node.y - node.x).abs() < 1e-12, "expected y == x, got {node:?}");
        }
    }

    #[test]
    fn coarse_resample_rejects_bad_input() {
        let one = vec![EnvelopeNode::new(0.0, 1.0, 0.0)];
        assert!(matches!(coarse_from_detailed(&one, 8), Err(KickError::InvalidEnvelope(_))));
        let ok = vec![EnvelopeNode::new(0.0, 1.0, 0.0), EnvelopeNode::new(1.0, 0.0, 0.0)];
        assert!(matches!(coarse_from_detailed(&ok, 1), Err(KickError::InvalidEnvelope(_))));
    }
}
