//! Typed values of the preset model: envelope nodes, slot and effect
//! vocabulary, and the read-only views built from a [`PresetTree`].
//!
//! [`PresetTree`]: crate::preset::tree::PresetTree

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KickError, Result};
use crate::preset::index::{EFFECT_SLOTS_PER_CHAIN, INSERT_CHAIN_COUNT, SLOT_COUNT, SlotIndex};

// ── Envelopes ───────────────────────────────────────────────

/// One control point of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EnvelopeNode {
    /// Normalized position in [0, 1].
    pub x: f64,
    /// Pitch: fraction of the slot's max frequency. Amp: level in [0, 1].
    pub y: f64,
    /// Curve tension of the segment starting at this node, in [-1, 1].
    #[serde(default)]
    pub c: f64,
    #[serde(default)]
    pub is_keytracked: bool,
    #[serde(default)]
    pub is_phase_locked: bool,
    #[serde(default)]
    pub locked_phase_value: f64,
}

impl EnvelopeNode {
    pub fn new(x: f64, y: f64, c: f64) -> Self {
        EnvelopeNode {
            x,
            y,
            c,
            ..Default::default()
        }
    }
}

/// Which of a slot's two envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Pitch,
    Amp,
}

impl EnvelopeKind {
    pub const ALL: [EnvelopeKind; 2] = [EnvelopeKind::Pitch, EnvelopeKind::Amp];

    /// Name used in the data section: `Slot0_PitchEnvelope`.
    pub fn tag_suffix(self) -> &'static str {
        match self {
            EnvelopeKind::Pitch => "PitchEnvelope",
            EnvelopeKind::Amp => "AmpEnvelope",
        }
    }

    /// Prefix used by the coarse nodes: `Slot1PitchNode3_x`.
    pub fn coarse_prefix(self) -> &'static str {
        match self {
            EnvelopeKind::Pitch => "PitchNode",
            EnvelopeKind::Amp => "AmpNode",
        }
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeKind::Pitch => write!(f, "pitch"),
            EnvelopeKind::Amp => write!(f, "amp"),
        }
    }
}

/// An ordered sequence of envelope nodes.
///
/// Parsed envelopes are kept as found; [`Envelope::validate`] (and every
/// consumer that evaluates the curve) checks the shape.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Envelope {
    pub nodes: Vec<EnvelopeNode>,
}

impl Envelope {
    pub fn from_nodes(nodes: Vec<EnvelopeNode>) -> Self {
        Envelope { nodes }
    }

    /// Build from `(x, y, c)` triples.
    pub fn from_points(points: &[(f64, f64, f64)]) -> Self {
        Envelope {
            nodes: points
                .iter()
                .map(|&(x, y, c)| EnvelopeNode::new(x, y, c))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// At least two nodes, first at x = 0, last at x = 1, positions
    /// non-decreasing and finite.
    pub fn validate(&self) -> Result<()> {
        validate_nodes(&self.nodes)
    }
}

/// Classic psy sweep a sine slot falls back to when it has no pitch nodes.
pub const DEFAULT_PITCH_NODES: [(f64, f64, f64); 6] = [
    (0.0, 0.79, 0.0),
    (0.037, 0.52, -0.1),
    (0.156, 0.36, 0.0),
    (0.49, 0.21, 0.0),
    (0.827, 0.094, -0.04),
    (1.0, 0.09, 0.0),
];

/// Punchy amplitude contour a sine slot falls back to.
pub const DEFAULT_AMP_NODES: [(f64, f64, f64); 12] = [
    (0.0, 0.23, 0.0),
    (0.005, 0.62, 0.0),
    (0.012, 0.83, 0.0),
    (0.02, 0.70, 0.0),
    (0.18, 0.37, 0.0),
    (0.31, 0.70, 0.0),
    (0.45, 0.73, 0.0),
    (0.80, 0.71, 0.0),
    (0.88, 0.42, 0.0),
    (0.90, 0.01, 0.0),
    (0.91, 0.0, 0.0),
    (1.0, 0.0, 0.0),
];

/// Flat pitch used by sample layers.
pub const SAMPLE_PITCH_NODES: [(f64, f64, f64); 2] = [(0.0, 1.0, 0.0), (1.0, 1.0, 0.0)];

/// Sample layer decay: full level down to silence by the midpoint.
pub const SAMPLE_AMP_NODES: [(f64, f64, f64); 3] = [(0.0, 1.0, 0.0), (0.5, 0.0, 0.0), (1.0, 0.0, 0.0)];

impl Envelope {
    /// The envelope a slot of `slot_type` falls back to when the document
    /// carries neither a detailed nor a coarse form. Off slots get none.
    pub fn fallback(slot_type: SlotType, kind: EnvelopeKind) -> Option<Envelope> {
        let points: &[(f64, f64, f64)] = match (slot_type, kind) {
            (SlotType::Off, _) => return None,
            (SlotType::Sine, EnvelopeKind::Pitch) => &DEFAULT_PITCH_NODES,
            (SlotType::Sine, EnvelopeKind::Amp) => &DEFAULT_AMP_NODES,
            (SlotType::Sample, EnvelopeKind::Pitch) => &SAMPLE_PITCH_NODES,
            (SlotType::Sample, EnvelopeKind::Amp) => &SAMPLE_AMP_NODES,
        };
        Some(Envelope::from_points(points))
    }
}

pub(crate) fn validate_nodes(nodes: &[EnvelopeNode]) -> Result<()> {
    if nodes.len() < 2 {
        return Err(KickError::InvalidEnvelope(format!(
            "{} node(s), need at least 2",
            nodes.len()
        )));
    }
    if let Some(bad) = nodes.iter().find(|n| !(n.x.is_finite() && n.y.is_finite() && n.c.is_finite())) {
        return Err(KickError::InvalidEnvelope(format!("non-finite node {bad:?}")));
    }
    let first = nodes[0].x;
    let last = nodes[nodes.len() - 1].x;
    if first != 0.0 || last != 1.0 {
        return Err(KickError::InvalidEnvelope(format!(
            "endpoints at x = {first} and x = {last}, expected 0 and 1"
        )));
    }
    if let Some(i) = nodes.windows(2).position(|w| w[1].x < w[0].x) {
        return Err(KickError::InvalidEnvelope(format!(
            "node {} at x = {} comes before node {} at x = {}",
            i + 1,
            nodes[i + 1].x,
            i,
            nodes[i].x
        )));
    }
    Ok(())
}

// ── Slots ───────────────────────────────────────────────────

/// Oscillator slot type, stored as 0/1/2 in `Slot{n}Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotType {
    Off,
    Sine,
    Sample,
}

impl SlotType {
    pub fn from_value(value: f64) -> Option<SlotType> {
        match value {
            v if v == 0.0 => Some(SlotType::Off),
            v if v == 1.0 => Some(SlotType::Sine),
            v if v == 2.0 => Some(SlotType::Sample),
            _ => None,
        }
    }

    pub fn value(self) -> f64 {
        match self {
            SlotType::Off => 0.0,
            SlotType::Sine => 1.0,
            SlotType::Sample => 2.0,
        }
    }
}

/// Read-only view of one oscillator slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub index: SlotIndex,
    pub slot_type: SlotType,
    pub gain_db: f64,
    pub pan: f64,
    pub muted: bool,
    pub soloed: bool,
    /// Frequency reached by a pitch envelope value of 1.0.
    pub pitch_max_hz: f64,
    pub pitch_semitones: f64,
    pub pitch_range_max: f64,
    /// Length in ms spanned by the normalized envelope time axis.
    pub amp_max_len_ms: f64,
    /// Authoritative pitch envelope (detailed when present, else coarse).
    pub pitch: Option<Envelope>,
    /// Authoritative amplitude envelope (detailed when present, else coarse).
    pub amp: Option<Envelope>,
    /// `Slot{n}Harm*` values in identifier order.
    pub harmonics: Vec<(String, f64)>,
}

impl Slot {
    /// The slot produces sound: not off and not muted.
    pub fn is_active(&self) -> bool {
        self.slot_type != SlotType::Off && !self.muted
    }
}

// ── Master section ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Master {
    pub length_ms: f64,
    pub single_length_mode: bool,
    pub output_gain_db: f64,
    pub output_gain_position: f64,
    pub pan: f64,
    pub tuning_semitones: f64,
    pub pitch_wheel_range: f64,
    pub processing_mode: f64,
    pub gate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Limiter {
    pub enabled: bool,
    pub threshold_db: f64,
    pub lookahead: f64,
    pub release: f64,
}

/// Master EQ, gathered from every `EQ*` identifier.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MasterEq {
    pub bands: Vec<(String, f64)>,
}

// ── Effects ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectChainKind {
    Master,
    Insert,
}

/// Identifies one effect slot. Indices are 0-based as in the data section
/// ids `master{slot}` and `insert{chain}_{slot}`; the master chain has
/// `chain == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectId {
    pub kind: EffectChainKind,
    pub chain: u8,
    pub slot: u8,
}

impl EffectId {
    pub fn master(slot: usize) -> Result<Self> {
        check_effect_slot(slot)?;
        Ok(EffectId {
            kind: EffectChainKind::Master,
            chain: 0,
            slot: slot as u8,
        })
    }

    pub fn insert(chain: usize, slot: usize) -> Result<Self> {
        if chain >= INSERT_CHAIN_COUNT {
            return Err(KickError::range("insert chain", chain, 0, INSERT_CHAIN_COUNT - 1));
        }
        check_effect_slot(slot)?;
        Ok(EffectId {
            kind: EffectChainKind::Insert,
            chain: chain as u8,
            slot: slot as u8,
        })
    }

    /// The fixed vocabulary, in document order.
    pub fn all() -> Vec<EffectId> {
        let mut ids = Vec::with_capacity(6);
        for slot in 0..EFFECT_SLOTS_PER_CHAIN as u8 {
            ids.push(EffectId {
                kind: EffectChainKind::Master,
                chain: 0,
                slot,
            });
        }
        for chain in 0..INSERT_CHAIN_COUNT as u8 {
            for slot in 0..EFFECT_SLOTS_PER_CHAIN as u8 {
                ids.push(EffectId {
                    kind: EffectChainKind::Insert,
                    chain,
                    slot,
                });
            }
        }
        ids
    }

    /// Parse a data-section id such as `master1` or `insert0_1`.
    pub fn parse(id: &str) -> Result<Self> {
        let mismatch = || KickError::SchemaMismatch(format!("unknown effect settings id '{id}'"));
        if let Some(rest) = id.strip_prefix("master") {
            let slot: usize = rest.parse().map_err(|_| mismatch())?;
            return EffectId::master(slot).map_err(|_| mismatch());
        }
        if let Some(rest) = id.strip_prefix("insert") {
            let (chain, slot) = rest.split_once('_').ok_or_else(mismatch)?;
            let chain: usize = chain.parse().map_err(|_| mismatch())?;
            let slot: usize = slot.parse().map_err(|_| mismatch())?;
            return EffectId::insert(chain, slot).map_err(|_| mismatch());
        }
        Err(mismatch())
    }
}

fn check_effect_slot(slot: usize) -> Result<()> {
    if slot < EFFECT_SLOTS_PER_CHAIN {
        Ok(())
    } else {
        Err(KickError::range("effect slot", slot, 0, EFFECT_SLOTS_PER_CHAIN - 1))
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EffectChainKind::Master => write!(f, "master{}", self.slot),
            EffectChainKind::Insert => write!(f, "insert{}_{}", self.chain, self.slot),
        }
    }
}

/// Bit set of oscillator slots feeding an effect chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoutingMask(u8);

impl RoutingMask {
    pub const ALL: RoutingMask = RoutingMask((1 << SLOT_COUNT) - 1);

    pub fn with(self, slot: SlotIndex, routed: bool) -> Self {
        let bit = 1 << slot.tree();
        if routed {
            RoutingMask(self.0 | bit)
        } else {
            RoutingMask(self.0 & !bit)
        }
    }

    pub fn contains(self, slot: SlotIndex) -> bool {
        self.0 & (1 << slot.tree()) != 0
    }

    pub fn slots(self) -> impl Iterator<Item = SlotIndex> {
        SlotIndex::all().filter(move |s| self.contains(*s))
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Read-only view of one effect slot.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectSlot {
    pub id: EffectId,
    pub effect_type: f64,
    pub gain_db: f64,
    pub enabled: bool,
    pub routing: RoutingMask,
    /// Attributes of the matching data-section entry, `id` excluded.
    pub settings: Vec<(String, String)>,
}
