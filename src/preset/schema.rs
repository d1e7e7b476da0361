//! The modeled part of the flat parameter schema.
//!
//! A preset carries roughly a thousand identifiers. The ones the crate reads
//! or writes are described here once, in a process-wide table; everything
//! else is kept verbatim in the parameter set's opaque bag.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::preset::index::{COARSE_NODE_COUNT, EFFECT_SLOTS_PER_CHAIN, INSERT_CHAIN_COUNT, SLOT_COUNT, SlotIndex};
use crate::preset::model::{EffectChainKind, EffectId, EnvelopeKind};

/// How a field's value is constrained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    Continuous,
    /// Boolean stored as 0 / 1.
    Toggle,
    /// Integer choice in `0..count`.
    Choice(u8),
}

/// Coarse node coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
}

/// Which part of the preset a field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldGroup {
    Master,
    Limiter,
    Slot(SlotIndex),
    CoarseNode {
        slot: SlotIndex,
        kind: EnvelopeKind,
        node: u8,
        axis: Axis,
    },
    Routing {
        chain: u8,
        slot: SlotIndex,
    },
    Effect(EffectId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDescriptor {
    pub group: FieldGroup,
    pub kind: FieldKind,
    pub default: f64,
}

impl FieldDescriptor {
    /// Does `value` satisfy this field's kind?
    pub fn accepts(&self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match self.kind {
            FieldKind::Continuous => true,
            FieldKind::Toggle => value == 0.0 || value == 1.0,
            FieldKind::Choice(count) => value.fract() == 0.0 && value >= 0.0 && value < count as f64,
        }
    }
}

// ── Identifiers ─────────────────────────────────────────────

pub const MASTER_LENGTH: &str = "masterLength";
pub const SINGLE_LENGTH_MODE: &str = "singleLengthMode";
pub const OUT_GAIN: &str = "outGain";
pub const OUT_GAIN_POSITION: &str = "outGainPosition";
pub const MASTER_PAN: &str = "masterPan";
pub const TUNING: &str = "tuning";
pub const PITCH_WHEEL_RANGE: &str = "pitchWheelRange";
pub const PROCESSING_MODE: &str = "processingMode";
pub const GATE: &str = "gate";

pub const LIM_ENABLE: &str = "Lim_Enable";
pub const LIM_THRESHOLD: &str = "Lim_Threshold";
pub const LIM_LOOKAHEAD: &str = "Lim_Lookahead";
pub const LIM_RELEASE: &str = "Lim_Release";

/// Prefix of the master EQ identifiers.
pub const EQ_PREFIX: &str = "EQ";

// Per-slot field suffixes: `Slot{n}{suffix}`.
pub const SLOT_TYPE: &str = "Type";
pub const SLOT_GAIN: &str = "Gain";
pub const SLOT_PAN: &str = "Pan";
pub const SLOT_MUTE: &str = "Mute";
pub const SLOT_SOLO: &str = "Solo";
pub const SLOT_PITCH_MAX: &str = "PitchEnvMax";
pub const SLOT_PITCH_RANGE_MAX: &str = "PitchEnvRangeMax";
pub const SLOT_PITCH_SEMI: &str = "PitchSemi";
pub const SLOT_AMP_MAX_LEN: &str = "AmpEnvMaxLen";
pub const SLOT_HARMONIC_PREFIX: &str = "Harm";

pub const EFFECT_TYPE: &str = "Type";
pub const EFFECT_GAIN: &str = "Gain";

const MASTER_FIELDS: [(&str, FieldKind, f64); 9] = [
    (MASTER_LENGTH, FieldKind::Continuous, 300.0),
    (SINGLE_LENGTH_MODE, FieldKind::Toggle, 0.0),
    (OUT_GAIN, FieldKind::Continuous, 0.0),
    (OUT_GAIN_POSITION, FieldKind::Continuous, 1.0),
    (MASTER_PAN, FieldKind::Continuous, 0.0),
    (TUNING, FieldKind::Continuous, 0.0),
    (PITCH_WHEEL_RANGE, FieldKind::Continuous, 7.0),
    (PROCESSING_MODE, FieldKind::Continuous, 1.0),
    (GATE, FieldKind::Continuous, 0.0),
];

const LIMITER_FIELDS: [(&str, FieldKind, f64); 4] = [
    (LIM_ENABLE, FieldKind::Toggle, 0.0),
    (LIM_THRESHOLD, FieldKind::Continuous, 0.0),
    (LIM_LOOKAHEAD, FieldKind::Continuous, 1.0),
    (LIM_RELEASE, FieldKind::Continuous, 1.0),
];

const SLOT_FIELDS: [(&str, FieldKind, f64); 9] = [
    (SLOT_TYPE, FieldKind::Choice(3), 0.0),
    (SLOT_GAIN, FieldKind::Continuous, 0.0),
    (SLOT_PAN, FieldKind::Continuous, 0.0),
    (SLOT_MUTE, FieldKind::Toggle, 0.0),
    (SLOT_SOLO, FieldKind::Toggle, 0.0),
    (SLOT_PITCH_MAX, FieldKind::Continuous, 20000.0),
    (SLOT_PITCH_RANGE_MAX, FieldKind::Continuous, 100.0),
    (SLOT_PITCH_SEMI, FieldKind::Continuous, 0.0),
    (SLOT_AMP_MAX_LEN, FieldKind::Continuous, 300.0),
];

/// `Slot{flat}{field}`.
pub fn slot_param(slot: SlotIndex, field: &str) -> String {
    format!("Slot{}{}", slot.flat(), field)
}

/// `Slot{flat}{Pitch|Amp}Node{k}_{x|y}` with `node` 0-based.
pub fn coarse_node_param(slot: SlotIndex, kind: EnvelopeKind, node: usize, axis: Axis) -> String {
    let axis = match axis {
        Axis::X => "x",
        Axis::Y => "y",
    };
    format!("Slot{}{}{}_{}", slot.flat(), kind.coarse_prefix(), node + 1, axis)
}

/// `FXInsert{chain+1}Osc{flat}Routed` with `chain` 0-based.
pub fn routing_param(chain: usize, slot: SlotIndex) -> String {
    format!("FXInsert{}Osc{}Routed", chain + 1, slot.flat())
}

/// `FXInsert{c}Slot{s}{field}` or `MstrFXSlot{s}{field}`, 1-based.
pub fn effect_param(id: EffectId, field: &str) -> String {
    match id.kind {
        EffectChainKind::Insert => format!("FXInsert{}Slot{}{}", id.chain + 1, id.slot + 1, field),
        EffectChainKind::Master => format!("MstrFXSlot{}{}", id.slot + 1, field),
    }
}

/// Data-section tag of a detailed envelope: `Slot{tree}_{Kind}Envelope`.
pub fn envelope_tag(slot: SlotIndex, kind: EnvelopeKind) -> String {
    format!("Slot{}_{}", slot.tree(), kind.tag_suffix())
}

/// Inverse of [`envelope_tag`]. Returns the raw tree number so callers can
/// report out-of-range slots.
pub fn parse_envelope_tag(tag: &str) -> Option<(usize, EnvelopeKind)> {
    let rest = tag.strip_prefix("Slot")?;
    let (number, suffix) = rest.split_once('_')?;
    let kind = EnvelopeKind::ALL.into_iter().find(|k| k.tag_suffix() == suffix)?;
    Some((number.parse().ok()?, kind))
}

// ── Schema table ────────────────────────────────────────────

/// Identifier → field descriptor for every modeled identifier.
#[derive(Debug)]
pub struct Schema {
    fields: HashMap<String, FieldDescriptor>,
}

static SCHEMA: LazyLock<Schema> = LazyLock::new(Schema::build);

/// The process-wide schema table.
pub fn schema() -> &'static Schema {
    &SCHEMA
}

impl Schema {
    fn build() -> Self {
        let mut fields = HashMap::new();
        let mut add = |id: String, group: FieldGroup, kind: FieldKind, default: f64| {
            fields.insert(id, FieldDescriptor { group, kind, default });
        };

        for (id, kind, default) in MASTER_FIELDS {
            add(id.to_string(), FieldGroup::Master, kind, default);
        }
        for (id, kind, default) in LIMITER_FIELDS {
            add(id.to_string(), FieldGroup::Limiter, kind, default);
        }

        for slot in SlotIndex::all() {
            for (field, kind, default) in SLOT_FIELDS {
                add(slot_param(slot, field), FieldGroup::Slot(slot), kind, default);
            }
            for kind in EnvelopeKind::ALL {
                for node in 0..COARSE_NODE_COUNT {
                    for (axis, default) in [(Axis::X, 1.0), (Axis::Y, 0.0)] {
                        let group = FieldGroup::CoarseNode {
                            slot,
                            kind,
                            node: node as u8,
                            axis,
                        };
                        add(coarse_node_param(slot, kind, node, axis), group, FieldKind::Continuous, default);
                    }
                }
            }
            for chain in 0..INSERT_CHAIN_COUNT {
                let group = FieldGroup::Routing {
                    chain: chain as u8,
                    slot,
                };
                add(routing_param(chain, slot), group, FieldKind::Toggle, 0.0);
            }
        }

        for id in EffectId::all() {
            add(effect_param(id, EFFECT_TYPE), FieldGroup::Effect(id), FieldKind::Continuous, 0.0);
            add(effect_param(id, EFFECT_GAIN), FieldGroup::Effect(id), FieldKind::Continuous, 0.0);
        }

        Schema { fields }
    }

    pub fn get(&self, id: &str) -> Option<&FieldDescriptor> {
        self.fields.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.fields.contains_key(id)
    }

    /// Default value of a modeled identifier, 0 for unknown ones.
    pub fn default_of(&self, id: &str) -> f64 {
        self.get(id).map_or(0.0, |d| d.default)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Describe why an identifier falls outside the fixed topology (slot 6,
    /// insert chain 3, …), or `None` when it fits.
    pub fn topology_violation(&self, id: &str) -> Option<String> {
        if let Some(rest) = id.strip_prefix("FXInsert") {
            let (chain, rest) = leading_number(rest)?;
            if !(1..=INSERT_CHAIN_COUNT).contains(&chain) {
                return Some(format!("'{id}' names insert chain {chain}"));
            }
            if let Some((osc, _)) = rest.strip_prefix("Osc").and_then(leading_number) {
                if !(1..=SLOT_COUNT).contains(&osc) {
                    return Some(format!("'{id}' routes oscillator {osc}"));
                }
            }
            if let Some((slot, _)) = rest.strip_prefix("Slot").and_then(leading_number) {
                if !(1..=EFFECT_SLOTS_PER_CHAIN).contains(&slot) {
                    return Some(format!("'{id}' names insert slot {slot}"));
                }
            }
            return None;
        }
        if let Some(rest) = id.strip_prefix("MstrFXSlot") {
            let (slot, _) = leading_number(rest)?;
            return (!(1..=EFFECT_SLOTS_PER_CHAIN).contains(&slot))
                .then(|| format!("'{id}' names master effect slot {slot}"));
        }
        if let Some(rest) = id.strip_prefix("Slot") {
            let (slot, _) = leading_number(rest)?;
            return (!(1..=SLOT_COUNT).contains(&slot)).then(|| format!("'{id}' names oscillator slot {slot}"));
        }
        None
    }
}

fn leading_number(s: &str) -> Option<(usize, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    Some((s[..end].parse().ok()?, &s[end..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(flat: usize) -> SlotIndex {
        SlotIndex::from_flat(flat).unwrap()
    }

    #[test]
    fn table_has_every_modeled_identifier() {
        let s = schema();
        // 9 master + 4 limiter + 5 × (9 slot + 32 coarse + 2 routing) + 6 × 2 effect
        assert_eq!(s.len(), 9 + 4 + 5 * (9 + 32 + 2) + 12);
        for id in ["masterLength", "Lim_Threshold", "Slot5AmpEnvMaxLen", "Slot1PitchNode8_y"] {
            assert!(s.contains(id), "missing {id}");
        }
        for id in ["FXInsert2Osc5Routed", "FXInsert1Slot2Gain", "MstrFXSlot2Type"] {
            assert!(s.contains(id), "missing {id}");
        }
        assert!(!s.contains("Slot6Type"));
        assert!(!s.contains("Slot0Type"));
    }

    #[test]
    fn defaults_match_plugin_defaults() {
        let s = schema();
        assert_eq!(s.default_of("masterLength"), 300.0);
        assert_eq!(s.default_of("pitchWheelRange"), 7.0);
        assert_eq!(s.default_of("Slot3PitchEnvMax"), 20000.0);
        assert_eq!(s.default_of("Slot2PitchNode4_x"), 1.0);
        assert_eq!(s.default_of("SomethingUnknown"), 0.0);
    }

    #[test]
    fn field_kinds_constrain_values() {
        let s = schema();
        let toggle = s.get("Slot1Mute").unwrap();
        assert!(toggle.accepts(1.0));
        assert!(!toggle.accepts(0.5));
        let choice = s.get("Slot1Type").unwrap();
        assert!(choice.accepts(2.0));
        assert!(!choice.accepts(3.0));
        assert!(!choice.accepts(1.5));
        assert!(!s.get("masterLength").unwrap().accepts(f64::NAN));
    }

    #[test]
    fn identifier_builders() {
        assert_eq!(slot_param(slot(1), SLOT_TYPE), "Slot1Type");
        assert_eq!(coarse_node_param(slot(2), EnvelopeKind::Amp, 0, Axis::X), "Slot2AmpNode1_x");
        assert_eq!(routing_param(1, slot(5)), "FXInsert2Osc5Routed");
        assert_eq!(effect_param(EffectId::insert(0, 1).unwrap(), EFFECT_GAIN), "FXInsert1Slot2Gain");
        assert_eq!(effect_param(EffectId::master(0).unwrap(), EFFECT_TYPE), "MstrFXSlot1Type");
        assert_eq!(envelope_tag(slot(1), EnvelopeKind::Pitch), "Slot0_PitchEnvelope");
    }

    #[test]
    fn envelope_tags_parse() {
        assert_eq!(parse_envelope_tag("Slot4_AmpEnvelope"), Some((4, EnvelopeKind::Amp)));
        assert_eq!(parse_envelope_tag("Slot9_PitchEnvelope"), Some((9, EnvelopeKind::Pitch)));
        assert_eq!(parse_envelope_tag("Slot0_FilterEnvelope"), None);
        assert_eq!(parse_envelope_tag("GLOBALFX"), None);
    }

    #[test]
    fn topology_violations() {
        let s = schema();
        assert!(s.topology_violation("Slot6Type").is_some());
        assert!(s.topology_violation("Slot0Gain").is_some());
        assert!(s.topology_violation("FXInsert3Osc1Routed").is_some());
        assert!(s.topology_violation("FXInsert1Osc6Routed").is_some());
        assert!(s.topology_violation("FXInsert1Slot3Type").is_some());
        assert!(s.topology_violation("MstrFXSlot3Gain").is_some());
        assert!(s.topology_violation("Slot5Drive").is_none());
        assert!(s.topology_violation("SlotLinkMode").is_none());
        assert!(s.topology_violation("masterLength").is_none());
    }
}
