//! Template-based generation: a complete template plus sparse overrides.
//!
//! The template is never touched. Overrides are validated up front, then
//! applied to a deep copy in a fixed order: master, slot basics, slot
//! envelopes, limiter, FX routing, sample file references. Anything no
//! override names keeps the template's value and text.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::{KickError, Result};
use crate::preset::index::{INSERT_CHAIN_COUNT, SlotIndex, to_tree_index};
use crate::preset::model::{Envelope, EnvelopeKind, EnvelopeNode, SlotType};
use crate::preset::schema;
use crate::preset::tree::{DocumentFormat, PresetTree, Topology};

/// Sparse changes to apply to a template. Every field is optional; the
/// JSON form uses the same names as the preset summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Overrides {
    pub master: MasterOverrides,
    pub limiter: LimiterOverrides,
    pub slots: Vec<SlotOverrides>,
    /// `{"insert1": {"osc1": true}}`: insert chain and oscillator, 1-based.
    pub fx_routing: BTreeMap<String, BTreeMap<String, bool>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterOverrides {
    pub length_ms: Option<f64>,
    pub output_gain_db: Option<f64>,
    pub pan: Option<f64>,
    pub tuning_semitones: Option<f64>,
    pub single_length_mode: Option<bool>,
    pub processing_mode: Option<f64>,
    pub gate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterOverrides {
    pub enabled: Option<bool>,
    pub threshold_db: Option<f64>,
    pub lookahead: Option<f64>,
    pub release: Option<f64>,
}

/// Changes to one oscillator slot, addressed by its 1-based number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotOverrides {
    pub slot_number: usize,
    #[serde(default, rename = "type")]
    pub slot_type: Option<SlotType>,
    #[serde(default)]
    pub gain_db: Option<f64>,
    #[serde(default)]
    pub pan: Option<f64>,
    #[serde(default)]
    pub muted: Option<bool>,
    #[serde(default)]
    pub soloed: Option<bool>,
    #[serde(default)]
    pub pitch_envelope: PitchEnvelopeOverrides,
    #[serde(default)]
    pub amp_envelope: AmpEnvelopeOverrides,
    /// Reset the slot's file references and raise its dirty flags.
    #[serde(default)]
    pub clear_sample: bool,
}

impl SlotOverrides {
    pub fn new(slot_number: usize) -> Self {
        SlotOverrides {
            slot_number,
            slot_type: None,
            gain_db: None,
            pan: None,
            muted: None,
            soloed: None,
            pitch_envelope: PitchEnvelopeOverrides::default(),
            amp_envelope: AmpEnvelopeOverrides::default(),
            clear_sample: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchEnvelopeOverrides {
    pub max_freq_hz: Option<f64>,
    pub semitone_offset: Option<f64>,
    pub range_max: Option<f64>,
    /// Detailed nodes. An empty list means no change.
    pub nodes: Vec<EnvelopeNode>,
    /// Coarse nodes, used only when `nodes` is empty.
    pub coarse_nodes: Vec<EnvelopeNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmpEnvelopeOverrides {
    pub max_length_ms: Option<f64>,
    pub nodes: Vec<EnvelopeNode>,
    pub coarse_nodes: Vec<EnvelopeNode>,
}

/// One envelope change after validation.
enum EnvelopeChange {
    Detailed(Envelope),
    Coarse(Envelope),
}

impl EnvelopeChange {
    fn from_nodes(detailed: &[EnvelopeNode], coarse: &[EnvelopeNode]) -> Result<Option<Self>> {
        if !detailed.is_empty() {
            let envelope = Envelope::from_nodes(detailed.to_vec());
            envelope.validate()?;
            return Ok(Some(EnvelopeChange::Detailed(envelope)));
        }
        if !coarse.is_empty() {
            let envelope = Envelope::from_nodes(coarse.to_vec());
            envelope.validate()?;
            return Ok(Some(EnvelopeChange::Coarse(envelope)));
        }
        Ok(None)
    }

    fn apply(self, tree: &mut PresetTree, slot: SlotIndex, kind: EnvelopeKind) -> Result<()> {
        match self {
            EnvelopeChange::Detailed(envelope) => tree.set_detailed_envelope(slot, kind, envelope),
            EnvelopeChange::Coarse(envelope) => tree.set_coarse_envelope(slot, kind, &envelope),
        }
    }
}

/// Validated slot overrides with their resolved index and envelope changes.
struct SlotPlan<'a> {
    slot: SlotIndex,
    overrides: &'a SlotOverrides,
    pitch: Option<EnvelopeChange>,
    amp: Option<EnvelopeChange>,
}

struct Route {
    chain: usize,
    slot: SlotIndex,
    routed: bool,
}

impl Overrides {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn is_empty(&self) -> bool {
        *self == Overrides::default()
    }

    fn plan_slots(&self) -> Result<Vec<SlotPlan<'_>>> {
        self.slots
            .iter()
            .map(|o| {
                let slot = SlotIndex::from_flat(o.slot_number)?;
                let pitch = EnvelopeChange::from_nodes(&o.pitch_envelope.nodes, &o.pitch_envelope.coarse_nodes)?;
                let amp = EnvelopeChange::from_nodes(&o.amp_envelope.nodes, &o.amp_envelope.coarse_nodes)?;
                Ok(SlotPlan {
                    slot,
                    overrides: o,
                    pitch,
                    amp,
                })
            })
            .collect()
    }

    fn plan_routes(&self) -> Result<Vec<Route>> {
        let mut routes = Vec::new();
        for (chain_key, oscillators) in &self.fx_routing {
            let chain = routing_number(chain_key, "insert")?;
            let chain = to_tree_index("insert chain", chain, INSERT_CHAIN_COUNT)?;
            for (osc_key, &routed) in oscillators {
                let osc = routing_number(osc_key, "osc")?;
                routes.push(Route {
                    chain,
                    slot: SlotIndex::from_flat(osc)?,
                    routed,
                });
            }
        }
        Ok(routes)
    }
}

/// The number in a routing key such as `insert1` or `osc3`. Malformed keys
/// are schema errors; the caller range-checks the number.
fn routing_number(key: &str, prefix: &str) -> Result<usize> {
    key.strip_prefix(prefix)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| KickError::SchemaMismatch(format!("routing key '{key}' is not {prefix}<number>")))
}

/// Refuse templates that lack any part of the fixed topology.
pub fn check_template(template: &PresetTree) -> Result<()> {
    if template.format() != DocumentFormat::Kick3 {
        return Err(KickError::TemplateMismatch(format!(
            "<{}> is a legacy preset, templates must use the current layout",
            template.root_name()
        )));
    }
    let found = template.topology();
    if found != Topology::EXPECTED {
        return Err(KickError::TemplateMismatch(format!(
            "template has {found}, expected {}",
            Topology::EXPECTED
        )));
    }
    Ok(())
}

/// Apply `overrides` to a copy of `template`.
#[instrument(skip_all, fields(slots = overrides.slots.len(), routes = overrides.fx_routing.len()))]
pub fn merge(template: &PresetTree, overrides: &Overrides) -> Result<PresetTree> {
    check_template(template)?;
    let mut tree = template.clone();
    apply(&mut tree, overrides)?;
    info!(
        slots = overrides.slots.len(),
        routes = overrides.fx_routing.len(),
        params = tree.params().len(),
        "merged overrides into template"
    );
    Ok(tree)
}

/// Validate `overrides`, then apply them to `tree` in the fixed order.
/// Nothing is written when validation fails.
pub(crate) fn apply(tree: &mut PresetTree, overrides: &Overrides) -> Result<()> {
    let slots = overrides.plan_slots()?;
    let routes = overrides.plan_routes()?;

    apply_master(tree, &overrides.master)?;

    for plan in &slots {
        apply_slot_basics(tree, plan.slot, plan.overrides)?;
    }

    for plan in slots {
        let o = plan.overrides;
        let id = |field: &str| schema::slot_param(plan.slot, field);
        set_opt(tree, &id(schema::SLOT_PITCH_MAX), o.pitch_envelope.max_freq_hz)?;
        set_opt(tree, &id(schema::SLOT_PITCH_SEMI), o.pitch_envelope.semitone_offset)?;
        set_opt(tree, &id(schema::SLOT_PITCH_RANGE_MAX), o.pitch_envelope.range_max)?;
        set_opt(tree, &id(schema::SLOT_AMP_MAX_LEN), o.amp_envelope.max_length_ms)?;
        if let Some(change) = plan.pitch {
            change.apply(tree, plan.slot, EnvelopeKind::Pitch)?;
        }
        if let Some(change) = plan.amp {
            change.apply(tree, plan.slot, EnvelopeKind::Amp)?;
        }
    }

    apply_limiter(tree, &overrides.limiter)?;

    for route in &routes {
        tree.set_param_bool(&schema::routing_param(route.chain, route.slot), route.routed)?;
    }

    for slot in overrides
        .slots
        .iter()
        .filter(|o| o.clear_sample)
        .filter_map(|o| SlotIndex::from_flat(o.slot_number).ok())
    {
        tree.clear_sample(slot);
    }

    Ok(())
}

fn set_opt(tree: &mut PresetTree, id: &str, value: Option<f64>) -> Result<()> {
    match value {
        Some(v) => tree.set_param(id, v),
        None => Ok(()),
    }
}

fn set_opt_bool(tree: &mut PresetTree, id: &str, value: Option<bool>) -> Result<()> {
    match value {
        Some(v) => tree.set_param_bool(id, v),
        None => Ok(()),
    }
}

fn apply_master(tree: &mut PresetTree, m: &MasterOverrides) -> Result<()> {
    set_opt(tree, schema::MASTER_LENGTH, m.length_ms)?;
    set_opt(tree, schema::OUT_GAIN, m.output_gain_db)?;
    set_opt(tree, schema::MASTER_PAN, m.pan)?;
    set_opt(tree, schema::TUNING, m.tuning_semitones)?;
    set_opt_bool(tree, schema::SINGLE_LENGTH_MODE, m.single_length_mode)?;
    set_opt(tree, schema::PROCESSING_MODE, m.processing_mode)?;
    set_opt(tree, schema::GATE, m.gate)
}

fn apply_slot_basics(tree: &mut PresetTree, slot: SlotIndex, o: &SlotOverrides) -> Result<()> {
    let id = |field: &str| schema::slot_param(slot, field);
    set_opt(tree, &id(schema::SLOT_TYPE), o.slot_type.map(SlotType::value))?;
    set_opt(tree, &id(schema::SLOT_GAIN), o.gain_db)?;
    set_opt(tree, &id(schema::SLOT_PAN), o.pan)?;
    set_opt_bool(tree, &id(schema::SLOT_MUTE), o.muted)?;
    set_opt_bool(tree, &id(schema::SLOT_SOLO), o.soloed)?;
    debug!(slot = slot.flat(), "applied slot settings");
    Ok(())
}

fn apply_limiter(tree: &mut PresetTree, l: &LimiterOverrides) -> Result<()> {
    set_opt_bool(tree, schema::LIM_ENABLE, l.enabled)?;
    set_opt(tree, schema::LIM_THRESHOLD, l.threshold_db)?;
    set_opt(tree, schema::LIM_LOOKAHEAD, l.lookahead)?;
    set_opt(tree, schema::LIM_RELEASE, l.release)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preset::fixtures;
    use crate::preset::index::{COARSE_NODE_COUNT, coarse_from_detailed};
    use crate::preset::tree::EMPTY_FILE;

    fn slot(flat: usize) -> SlotIndex {
        SlotIndex::from_flat(flat).unwrap()
    }

    #[test]
    fn empty_overrides_reproduce_the_template() {
        let template = fixtures::template();
        let merged = merge(&template, &Overrides::default()).unwrap();
        assert_eq!(merged, template);
        assert_eq!(merged.to_document(), template.to_document());
    }

    #[test]
    fn master_and_limiter_overrides() {
        let template = fixtures::template();
        let overrides = Overrides::from_json(
            r#"{
                "master": {"length_ms": 150, "tuning_semitones": -2, "single_length_mode": false},
                "limiter": {"enabled": false, "threshold_db": -1.5}
            }"#,
        )
        .unwrap();
        let merged = merge(&template, &overrides).unwrap();

        let master = merged.master();
        assert_eq!(master.length_ms, 150.0);
        assert_eq!(master.tuning_semitones, -2.0);
        assert!(!master.single_length_mode);
        assert_eq!(merged.params().raw("masterLength"), Some("150.0"));
        assert_eq!(merged.params().raw("outGain"), Some("0.000000"), "untouched text is kept");

        let limiter = merged.limiter();
        assert!(!limiter.enabled);
        assert_eq!(limiter.threshold_db, -1.5);
        assert_eq!(limiter.release, template.limiter().release);
    }

    #[test]
    fn detailed_override_rewrites_coarse_mirror() {
        let template = fixtures::template();
        let nodes = vec![
            EnvelopeNode::new(0.0, 0.7, 0.0),
            EnvelopeNode::new(0.1, 0.4, -0.3),
            EnvelopeNode::new(1.0, 0.05, 0.0),
        ];
        let mut slot_overrides = SlotOverrides::new(1);
        slot_overrides.pitch_envelope.nodes = nodes.clone();
        slot_overrides.pitch_envelope.max_freq_hz = Some(18000.0);
        let overrides = Overrides {
            slots: vec![slot_overrides],
            ..Default::default()
        };
        let merged = merge(&template, &overrides).unwrap();

        let detailed = merged.detailed_envelope(slot(1), EnvelopeKind::Pitch).unwrap();
        assert_eq!(detailed.nodes, nodes);
        let coarse = merged.coarse_envelope(slot(1), EnvelopeKind::Pitch).unwrap();
        assert_eq!(coarse.nodes, coarse_from_detailed(&nodes, COARSE_NODE_COUNT).unwrap());
        assert_eq!(merged.slot(slot(1)).pitch_max_hz, 18000.0);

        // The amp envelope was not named, so both of its forms are unchanged.
        assert_eq!(
            merged.detailed_envelope(slot(1), EnvelopeKind::Amp),
            template.detailed_envelope(slot(1), EnvelopeKind::Amp)
        );
        assert_eq!(
            merged.coarse_envelope(slot(1), EnvelopeKind::Amp),
            template.coarse_envelope(slot(1), EnvelopeKind::Amp)
        );
    }

    #[test]
    fn coarse_only_override_leaves_detailed_alone() {
        let template = fixtures::template();
        let mut slot_overrides = SlotOverrides::new(2);
        slot_overrides.amp_envelope.coarse_nodes = vec![EnvelopeNode::new(0.0, 1.0, 0.0), EnvelopeNode::new(1.0, 0.2, 0.0)];
        let overrides = Overrides {
            slots: vec![slot_overrides],
            ..Default::default()
        };
        let merged = merge(&template, &overrides).unwrap();

        assert_eq!(
            merged.detailed_envelope(slot(2), EnvelopeKind::Amp),
            template.detailed_envelope(slot(2), EnvelopeKind::Amp)
        );
        let coarse = merged.coarse_envelope(slot(2), EnvelopeKind::Amp).unwrap();
        assert_eq!(coarse.nodes[1], EnvelopeNode::new(1.0, 0.2, 0.0));
        assert_eq!(coarse.nodes[7], EnvelopeNode::new(1.0, 0.2, 0.0));
    }

    #[test]
    fn clearing_slot_one_sample_marks_it_dirty() {
        let template = fixtures::template();
        let overrides = Overrides::from_json(r#"{"slots": [{"slot_number": 1, "clear_sample": true}]}"#).unwrap();
        let merged = merge(&template, &overrides).unwrap();

        assert_eq!(merged.data_attribute("Slot0File"), Some(EMPTY_FILE));
        assert_eq!(merged.data_attribute("Slot0FileDirty"), Some("1"));
        for (key, value) in template.data_attributes() {
            if !key.starts_with("Slot0") {
                assert_eq!(merged.data_attribute(key), Some(value.as_str()), "{key} changed");
            }
        }
    }

    #[test]
    fn routing_uses_one_based_keys() {
        let template = fixtures::template();
        let overrides =
            Overrides::from_json(r#"{"fx_routing": {"insert2": {"osc5": true, "osc2": false}}}"#).unwrap();
        let merged = merge(&template, &overrides).unwrap();
        assert_eq!(merged.params().get("FXInsert2Osc5Routed"), Some(1.0));
        assert_eq!(merged.params().get("FXInsert2Osc2Routed"), Some(0.0));
        assert_eq!(merged.params().get("FXInsert1Osc1Routed"), Some(1.0));
    }

    #[test]
    fn slot_settings_are_applied_by_flat_number() {
        let template = fixtures::template();
        let overrides = Overrides::from_json(
            r#"{"slots": [{"slot_number": 3, "type": "sine", "gain_db": -3.0, "muted": true, "pan": 0.25}]}"#,
        )
        .unwrap();
        let merged = merge(&template, &overrides).unwrap();
        let s = merged.slot(slot(3));
        assert_eq!(s.slot_type, SlotType::Sine);
        assert_eq!(s.gain_db, -3.0);
        assert!(s.muted);
        assert_eq!(s.pan, 0.25);
        assert_eq!(merged.slot(slot(4)), template.slot(slot(4)));
    }

    #[test]
    fn bad_indices_are_range_errors() {
        let template = fixtures::template();
        for json in [
            r#"{"slots": [{"slot_number": 0}]}"#,
            r#"{"slots": [{"slot_number": 6}]}"#,
            r#"{"fx_routing": {"insert3": {"osc1": true}}}"#,
            r#"{"fx_routing": {"insert1": {"osc6": true}}}"#,
            r#"{"fx_routing": {"insert0": {"osc1": true}}}"#,
        ] {
            let overrides = Overrides::from_json(json).unwrap();
            assert!(
                matches!(merge(&template, &overrides), Err(KickError::Range { .. })),
                "{json} should be out of range"
            );
        }
    }

    #[test]
    fn malformed_routing_keys_are_schema_errors() {
        let template = fixtures::template();
        for json in [
            r#"{"fx_routing": {"master": {"osc1": true}}}"#,
            r#"{"fx_routing": {"insert1": {"slot1": true}}}"#,
            r#"{"fx_routing": {"insert1": {"osc": true}}}"#,
        ] {
            let overrides = Overrides::from_json(json).unwrap();
            assert!(
                matches!(merge(&template, &overrides), Err(KickError::SchemaMismatch(_))),
                "{json} should be malformed"
            );
        }
    }

    #[test]
    fn invalid_envelope_override_fails_before_any_change() {
        let template = fixtures::template();
        let mut slot_overrides = SlotOverrides::new(1);
        slot_overrides.amp_envelope.nodes = vec![EnvelopeNode::new(0.0, 1.0, 0.0), EnvelopeNode::new(0.5, 0.0, 0.0)];
        let overrides = Overrides {
            master: MasterOverrides {
                length_ms: Some(100.0),
                ..Default::default()
            },
            slots: vec![slot_overrides],
            ..Default::default()
        };
        assert!(matches!(merge(&template, &overrides), Err(KickError::InvalidEnvelope(_))));
        assert_eq!(template.master().length_ms, 300.0);
    }

    #[test]
    fn template_topology_is_checked() {
        let full = fixtures::template_document();
        let no_macro = full.replacen(r#"<MACROSETTINGS id="3" name="Macro 4" value="0.0"/>"#, "", 1);
        let tree = PresetTree::parse(&no_macro).unwrap();
        assert!(matches!(merge(&tree, &Overrides::default()), Err(KickError::TemplateMismatch(_))));

        let legacy = PresetTree::parse(&fixtures::legacy_document()).unwrap();
        assert!(matches!(merge(&legacy, &Overrides::default()), Err(KickError::TemplateMismatch(_))));
    }

    #[test]
    fn merge_does_not_alias_the_template() {
        let template = fixtures::template();
        let before = template.to_document();
        let overrides = Overrides::from_json(r#"{"master": {"length_ms": 120}, "slots": [{"slot_number": 2, "clear_sample": true}]}"#).unwrap();
        let mut merged = merge(&template, &overrides).unwrap();
        merged.set_param("gate", 1.0).unwrap();
        assert_eq!(template.to_document(), before);
    }
}
