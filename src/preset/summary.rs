//! Serializable digest of a preset.
//!
//! The JSON form uses the field names of [`Overrides`](crate::preset::merge::Overrides),
//! so a summary can be edited and fed straight back into a merge. Fields
//! that only describe the document (counts, calculated frequencies, effect
//! settings) are ignored on the way back in.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::Result;
use crate::preset::index::{INSERT_CHAIN_COUNT, SlotIndex};
use crate::preset::model::{EffectChainKind, EffectSlot, EnvelopeKind, EnvelopeNode, Limiter, Master, MasterEq, SlotType};
use crate::preset::schema;
use crate::preset::tree::{DocumentFormat, PresetTree};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresetSummary {
    pub format: DocumentFormat,
    pub plugin_version: Option<String>,
    pub master: Master,
    pub limiter: Limiter,
    pub eq: MasterEq,
    pub slots: Vec<SlotSummary>,
    /// Same shape as the merge overrides: `{"insert1": {"osc1": true, ...}}`.
    pub fx_routing: BTreeMap<String, BTreeMap<String, bool>>,
    pub effects: Vec<EffectSummary>,
    pub macro_count: usize,
    pub has_global_fx: bool,
    pub parameter_count: usize,
    pub opaque_parameter_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotSummary {
    pub slot_number: usize,
    #[serde(rename = "type")]
    pub slot_type: SlotType,
    /// Raw `Slot{n}Type` value, including values outside the known types.
    pub type_value: f64,
    pub gain_db: f64,
    pub pan: f64,
    pub muted: bool,
    pub soloed: bool,
    pub active: bool,
    pub has_sample: bool,
    pub pitch_envelope: PitchEnvelopeSummary,
    pub amp_envelope: AmpEnvelopeSummary,
    pub harmonics: Vec<(String, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PitchEnvelopeSummary {
    pub max_freq_hz: f64,
    pub semitone_offset: f64,
    pub range_max: f64,
    pub coarse_nodes: Vec<EnvelopeNode>,
    pub nodes: Vec<EnvelopeNode>,
    /// Sine slots only: every authoritative node mapped to ms and Hz.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub calculated_frequencies: Vec<CalculatedFrequency>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmpEnvelopeSummary {
    pub max_length_ms: f64,
    pub coarse_nodes: Vec<EnvelopeNode>,
    pub nodes: Vec<EnvelopeNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalculatedFrequency {
    pub time_normalized: f64,
    pub time_ms: f64,
    pub freq_hz: f64,
    pub y_raw: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectSummary {
    pub id: String,
    pub chain: EffectChainKind,
    pub effect_type: f64,
    pub gain_db: f64,
    pub enabled: bool,
    /// 1-based oscillator numbers feeding this effect.
    pub routed_slots: Vec<usize>,
    pub settings: BTreeMap<String, String>,
}

impl PresetSummary {
    pub fn from_tree(tree: &PresetTree) -> Self {
        let params = tree.params();
        let slots = SlotIndex::all().map(|index| summarize_slot(tree, index)).collect();

        let mut fx_routing = BTreeMap::new();
        for chain in 0..INSERT_CHAIN_COUNT {
            let routes = SlotIndex::all()
                .map(|slot| {
                    let id = schema::routing_param(chain, slot);
                    (format!("osc{}", slot.flat()), params.get_bool(&id))
                })
                .collect();
            fx_routing.insert(format!("insert{}", chain + 1), routes);
        }

        PresetSummary {
            format: tree.format(),
            plugin_version: tree.plugin_version().map(str::to_string),
            master: tree.master(),
            limiter: tree.limiter(),
            eq: tree.eq(),
            slots,
            fx_routing,
            effects: tree.effect_slots().into_iter().map(EffectSummary::from).collect(),
            macro_count: tree.macros().len(),
            has_global_fx: tree.has_global_fx(),
            parameter_count: params.len(),
            opaque_parameter_count: params.opaque().count(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn summarize_slot(tree: &PresetTree, index: SlotIndex) -> SlotSummary {
    let slot = tree.slot(index);
    let type_id = schema::slot_param(index, schema::SLOT_TYPE);
    // An out-of-domain type is shown as read; the view reports it as off.
    let type_value = tree
        .params()
        .raw(&type_id)
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or_else(|| tree.params().get_or_default(&type_id));
    let nodes = |kind: EnvelopeKind| tree.detailed_envelope(index, kind).map(|e| e.nodes.clone()).unwrap_or_default();
    let coarse = |kind: EnvelopeKind| tree.coarse_envelope(index, kind).map(|e| e.nodes).unwrap_or_default();

    let calculated_frequencies = match (&slot.slot_type, &slot.pitch) {
        (SlotType::Sine, Some(pitch)) => pitch
            .nodes
            .iter()
            .map(|n| CalculatedFrequency {
                time_normalized: n.x,
                time_ms: n.x * slot.amp_max_len_ms,
                freq_hz: (n.y * slot.pitch_max_hz * 10.0).round() / 10.0,
                y_raw: n.y,
            })
            .collect(),
        _ => Vec::new(),
    };

    SlotSummary {
        slot_number: index.flat(),
        slot_type: slot.slot_type,
        type_value,
        gain_db: slot.gain_db,
        pan: slot.pan,
        muted: slot.muted,
        soloed: slot.soloed,
        active: slot.is_active(),
        has_sample: tree.has_embedded_sample(index),
        pitch_envelope: PitchEnvelopeSummary {
            max_freq_hz: slot.pitch_max_hz,
            semitone_offset: slot.pitch_semitones,
            range_max: slot.pitch_range_max,
            coarse_nodes: coarse(EnvelopeKind::Pitch),
            nodes: nodes(EnvelopeKind::Pitch),
            calculated_frequencies,
        },
        amp_envelope: AmpEnvelopeSummary {
            max_length_ms: slot.amp_max_len_ms,
            coarse_nodes: coarse(EnvelopeKind::Amp),
            nodes: nodes(EnvelopeKind::Amp),
        },
        harmonics: slot.harmonics,
    }
}

impl From<EffectSlot> for EffectSummary {
    fn from(slot: EffectSlot) -> Self {
        EffectSummary {
            id: slot.id.to_string(),
            chain: slot.id.kind,
            effect_type: slot.effect_type,
            gain_db: slot.gain_db,
            enabled: slot.enabled,
            routed_slots: slot.routing.slots().map(SlotIndex::flat).collect(),
            settings: slot.settings.into_iter().collect(),
        }
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

impl fmt::Display for PresetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version = self.plugin_version.as_deref().unwrap_or("unknown");
        writeln!(f, "{:?} preset (plugin {version})", self.format)?;
        writeln!(
            f,
            "Master: length {:.1} ms, gain {:.2} dB, pan {:.2}, tuning {:+.2} st, single length {}",
            self.master.length_ms,
            self.master.output_gain_db,
            self.master.pan,
            self.master.tuning_semitones,
            on_off(self.master.single_length_mode)
        )?;
        writeln!(
            f,
            "Limiter: {}, threshold {:.2} dB, lookahead {:.2}, release {:.2}",
            on_off(self.limiter.enabled),
            self.limiter.threshold_db,
            self.limiter.lookahead,
            self.limiter.release
        )?;

        for slot in &self.slots {
            let mut flags = Vec::new();
            if slot.muted {
                flags.push("muted");
            }
            if slot.soloed {
                flags.push("solo");
            }
            if slot.has_sample {
                flags.push("sample");
            }
            writeln!(
                f,
                "Slot {}: {:?}, gain {:.2} dB, pan {:.2}{}{}",
                slot.slot_number,
                slot.slot_type,
                slot.gain_db,
                slot.pan,
                if flags.is_empty() { "" } else { ", " },
                flags.join(", ")
            )?;
            if !slot.active {
                continue;
            }
            let pitch = &slot.pitch_envelope;
            writeln!(
                f,
                "  pitch: max {:.0} Hz, {} node(s), {} coarse",
                pitch.max_freq_hz,
                pitch.nodes.len(),
                pitch.coarse_nodes.len()
            )?;
            for point in &pitch.calculated_frequencies {
                writeln!(f, "    {:>8.2} ms  {:>9.1} Hz", point.time_ms, point.freq_hz)?;
            }
            let amp = &slot.amp_envelope;
            writeln!(
                f,
                "  amp: length {:.1} ms, {} node(s), {} coarse",
                amp.max_length_ms,
                amp.nodes.len(),
                amp.coarse_nodes.len()
            )?;
        }

        for (chain, routes) in &self.fx_routing {
            let routed: Vec<&str> = routes.iter().filter(|(_, on)| **on).map(|(osc, _)| osc.as_str()).collect();
            let routed = if routed.is_empty() { "-".to_string() } else { routed.join(" ") };
            writeln!(f, "{chain}: {routed}")?;
        }
        let active_effects = self.effects.iter().filter(|e| e.enabled).count();
        write!(
            f,
            "Effects: {active_effects} of {} active, {} macro(s), {} parameter(s), {} unmodeled",
            self.effects.len(),
            self.macro_count,
            self.parameter_count,
            self.opaque_parameter_count
        )
    }
}
