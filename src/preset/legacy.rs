//! Legacy Kick 2 presets built from scratch.
//!
//! A template is the usual starting point for a new preset. When none is at
//! hand, [`PresetTree::new_kick2`] writes a complete legacy document: every
//! master, limiter, slot and effect parameter with its default, fallback
//! envelopes for sounding slots, then the overrides on top.

use tracing::{info, instrument};

use crate::error::Result;
use crate::preset::index::{EFFECT_SLOTS_PER_CHAIN, INSERT_CHAIN_COUNT, SlotIndex};
use crate::preset::merge::{self, Overrides};
use crate::preset::model::{EffectId, Envelope, EnvelopeKind, SlotType};
use crate::preset::schema::{self, schema};
use crate::preset::tree::PresetTree;

/// Plugin version written into generated legacy documents.
pub const KICK2_PLUGIN_VERSION: &str = "1.5.3";

const MASTER_DEFAULTS: [(&str, f64); 9] = [
    (schema::MASTER_LENGTH, 300.0),
    (schema::SINGLE_LENGTH_MODE, 1.0),
    (schema::OUT_GAIN, 0.0),
    (schema::OUT_GAIN_POSITION, 1.0),
    (schema::MASTER_PAN, 0.0),
    (schema::TUNING, 0.0),
    (schema::PITCH_WHEEL_RANGE, 7.0),
    (schema::PROCESSING_MODE, 1.0),
    (schema::GATE, 0.0),
];

const LIMITER_DEFAULTS: [(&str, f64); 4] = [
    (schema::LIM_ENABLE, 1.0),
    (schema::LIM_THRESHOLD, 0.0),
    (schema::LIM_LOOKAHEAD, 1.0),
    (schema::LIM_RELEASE, 1.0),
];

impl PresetTree {
    /// Build a complete legacy Kick 2 preset from `overrides` alone.
    ///
    /// Defaults are written first, in the legacy section order. A sine or
    /// sample slot whose override carries no nodes gets the fallback
    /// envelopes for its type. The overrides are then validated and applied
    /// exactly as [`merge`](crate::preset::merge::merge) applies them.
    #[instrument(skip_all, fields(slots = overrides.slots.len()))]
    pub fn new_kick2(overrides: &Overrides) -> Result<PresetTree> {
        let mut tree = PresetTree::empty_kick2(KICK2_PLUGIN_VERSION);
        for (id, value) in MASTER_DEFAULTS.iter().chain(&LIMITER_DEFAULTS) {
            tree.set_param(id, *value)?;
        }

        let length_ms = overrides.master.length_ms.unwrap_or(MASTER_DEFAULTS[0].1);
        for slot in SlotIndex::all() {
            write_slot_defaults(&mut tree, slot, requested_type(overrides, slot), length_ms)?;
        }

        for chain in 0..INSERT_CHAIN_COUNT {
            for slot in SlotIndex::all() {
                tree.set_param_bool(&schema::routing_param(chain, slot), false)?;
            }
            for slot in 0..EFFECT_SLOTS_PER_CHAIN {
                write_effect_defaults(&mut tree, EffectId::insert(chain, slot)?)?;
            }
        }
        for slot in 0..EFFECT_SLOTS_PER_CHAIN {
            write_effect_defaults(&mut tree, EffectId::master(slot)?)?;
        }

        merge::apply(&mut tree, overrides)?;
        info!(params = tree.params().len(), "built legacy preset");
        Ok(tree)
    }
}

/// The type the last override for `slot` asks for, else off.
fn requested_type(overrides: &Overrides, slot: SlotIndex) -> SlotType {
    overrides
        .slots
        .iter()
        .rev()
        .filter(|o| o.slot_number == slot.flat())
        .find_map(|o| o.slot_type)
        .unwrap_or(SlotType::Off)
}

fn write_slot_defaults(tree: &mut PresetTree, slot: SlotIndex, slot_type: SlotType, length_ms: f64) -> Result<()> {
    let id = |field: &str| schema::slot_param(slot, field);
    tree.set_param(&id(schema::SLOT_TYPE), slot_type.value())?;
    for field in [schema::SLOT_GAIN, schema::SLOT_PITCH_MAX, schema::SLOT_PITCH_RANGE_MAX, schema::SLOT_PITCH_SEMI] {
        let param = id(field);
        tree.set_param(&param, schema().default_of(&param))?;
    }
    if let Some(pitch) = Envelope::fallback(slot_type, EnvelopeKind::Pitch) {
        tree.set_detailed_envelope(slot, EnvelopeKind::Pitch, pitch)?;
    }
    tree.set_param(&id(schema::SLOT_AMP_MAX_LEN), length_ms)?;
    if let Some(amp) = Envelope::fallback(slot_type, EnvelopeKind::Amp) {
        tree.set_detailed_envelope(slot, EnvelopeKind::Amp, amp)?;
    }
    Ok(())
}

fn write_effect_defaults(tree: &mut PresetTree, id: EffectId) -> Result<()> {
    tree.set_param(&schema::effect_param(id, schema::EFFECT_TYPE), 0.0)?;
    tree.set_param(&schema::effect_param(id, schema::EFFECT_GAIN), 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::renderer::{RenderOptions, render_preset};
    use crate::error::KickError;
    use crate::preset::merge::SlotOverrides;
    use crate::preset::model::{DEFAULT_AMP_NODES, DEFAULT_PITCH_NODES};
    use crate::preset::recipe::QuickKick;
    use crate::preset::summary::PresetSummary;
    use crate::preset::tree::DocumentFormat;

    fn slot(flat: usize) -> SlotIndex {
        SlotIndex::from_flat(flat).unwrap()
    }

    #[test]
    fn empty_overrides_write_every_default() {
        let tree = PresetTree::new_kick2(&Overrides::default()).unwrap();
        assert_eq!(tree.format(), DocumentFormat::Kick2);
        assert_eq!(tree.plugin_version(), Some(KICK2_PLUGIN_VERSION));
        assert!(tree.master().single_length_mode);
        assert!(tree.limiter().enabled);
        for id in ["FXInsert1Osc5Routed", "FXInsert2Slot2Type", "FXInsert1Slot1Gain", "MstrFXSlot2Gain", "Slot5PitchEnvMax"] {
            assert!(tree.params().contains(id), "{id} missing");
        }
        for s in SlotIndex::all() {
            assert_eq!(tree.slot(s).slot_type, SlotType::Off);
            assert!(tree.detailed_envelope(s, EnvelopeKind::Pitch).is_none());
        }

        let text = tree.to_document();
        assert!(text.contains(r#"<Kick2PresetFile pluginVersion="1.5.3">"#));
        assert!(text.contains(r#"<PARAM id="masterLength" value="300.0"/>"#));
        assert!(text.contains("<EnvelopeData/>"));
    }

    #[test]
    fn sounding_slots_without_nodes_get_default_envelopes() {
        let mut sine = SlotOverrides::new(3);
        sine.slot_type = Some(SlotType::Sine);
        let mut sample = SlotOverrides::new(4);
        sample.slot_type = Some(SlotType::Sample);
        let overrides = Overrides {
            slots: vec![sine, sample],
            ..Default::default()
        };
        let tree = PresetTree::new_kick2(&overrides).unwrap();

        assert_eq!(
            tree.detailed_envelope(slot(3), EnvelopeKind::Pitch),
            Some(&Envelope::from_points(&DEFAULT_PITCH_NODES))
        );
        assert_eq!(
            tree.detailed_envelope(slot(3), EnvelopeKind::Amp),
            Some(&Envelope::from_points(&DEFAULT_AMP_NODES))
        );
        assert_eq!(tree.detailed_envelope(slot(4), EnvelopeKind::Amp).map(Envelope::len), Some(3));
        assert_eq!(tree.slot(slot(3)).amp_max_len_ms, 300.0);

        let text = tree.to_document();
        assert!(text.contains(r#"<Envelope id="Slot2_PitchEnvelope">"#));
        assert!(text.contains(r#"<Envelope id="Slot3_AmpEnvelope">"#));
    }

    #[test]
    fn override_nodes_replace_the_defaults() {
        let mut main = SlotOverrides::new(1);
        main.slot_type = Some(SlotType::Sine);
        main.amp_envelope.nodes = Envelope::from_points(&[(0.0, 1.0, 0.0), (1.0, 0.0, 0.0)]).nodes;
        let overrides = Overrides {
            slots: vec![main],
            ..Default::default()
        };
        let tree = PresetTree::new_kick2(&overrides).unwrap();
        assert_eq!(tree.detailed_envelope(slot(1), EnvelopeKind::Amp).map(Envelope::len), Some(2));
        assert_eq!(tree.detailed_envelope(slot(1), EnvelopeKind::Pitch).map(Envelope::len), Some(6));
    }

    #[test]
    fn bad_overrides_are_rejected() {
        let overrides = Overrides::from_json(r#"{"slots": [{"slot_number": 6, "type": "sine"}]}"#).unwrap();
        assert!(matches!(PresetTree::new_kick2(&overrides), Err(KickError::Range { .. })));
    }

    #[test]
    fn parse_render_regenerate_round_trip() {
        let first = QuickKick::default().build_kick2().unwrap();
        let parsed = PresetTree::parse(&first.to_document()).unwrap();
        assert_eq!(parsed.format(), DocumentFormat::Kick2);

        let wave = render_preset(&parsed, &RenderOptions::default()).unwrap();
        assert!(wave.peak() > 0.0, "rendered silence");

        let summary = PresetSummary::from_tree(&parsed);
        let overrides = Overrides::from_json(&summary.to_json().unwrap()).unwrap();
        let regenerated = PresetTree::new_kick2(&overrides).unwrap();
        let again = PresetSummary::from_tree(&PresetTree::parse(&regenerated.to_document()).unwrap());

        assert_eq!(again.master, summary.master);
        assert_eq!(again.limiter, summary.limiter);
        assert_eq!(again.slots, summary.slots);
        assert_eq!(again.fx_routing, summary.fx_routing);
        assert_eq!(render_preset(&regenerated, &RenderOptions::default()).unwrap(), wave);
    }
}
