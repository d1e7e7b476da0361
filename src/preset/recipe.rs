//! Quick kick recipe: a handful of musical settings expanded into full
//! template overrides.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::preset::index::SLOT_COUNT;
use crate::preset::merge::{
    AmpEnvelopeOverrides, LimiterOverrides, MasterOverrides, Overrides, PitchEnvelopeOverrides, SlotOverrides, merge,
};
use crate::preset::model::{DEFAULT_AMP_NODES, Envelope, EnvelopeNode, SAMPLE_PITCH_NODES, SlotType};
use crate::preset::tree::PresetTree;

/// Slot gain used by both recipe layers.
const LAYER_GAIN_DB: f64 = 1.38;
/// The lowest pitch scale a recipe slot gets.
const MIN_PITCH_MAX_HZ: f64 = 20000.0;
const MAIN_SLOT: usize = 1;
const CLICK_SLOT: usize = 2;

/// Shape of the main pitch sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PitchCurve {
    /// `y0 + (y1 - y0)(1 - e^(-4t))` over six nodes.
    Exponential,
    Linear,
    #[serde(untagged)]
    Custom(Vec<EnvelopeNode>),
}

/// Amplitude contour of the main layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmpShape {
    Punchy,
    Sustain,
    Short,
    #[serde(untagged)]
    Custom(Vec<EnvelopeNode>),
}

const SUSTAIN: [(f64, f64); 5] = [(0.0, 0.0), (0.003, 1.0), (0.85, 0.95), (0.95, 0.0), (1.0, 0.0)];
const SHORT: [(f64, f64); 5] = [(0.0, 0.0), (0.003, 1.0), (0.5, 0.3), (0.7, 0.0), (1.0, 0.0)];

impl AmpShape {
    pub fn nodes(&self) -> Vec<EnvelopeNode> {
        let table: &[(f64, f64)] = match self {
            AmpShape::Punchy => return Envelope::from_points(&DEFAULT_AMP_NODES).nodes,
            AmpShape::Sustain => &SUSTAIN,
            AmpShape::Short => &SHORT,
            AmpShape::Custom(nodes) => return nodes.clone(),
        };
        table.iter().map(|&(x, y)| EnvelopeNode::new(x, y, 0.0)).collect()
    }
}

/// Minimal kick description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuickKick {
    pub length_ms: f64,
    pub pitch_start_hz: f64,
    pub pitch_end_hz: f64,
    pub pitch_curve: PitchCurve,
    pub amp_shape: AmpShape,
    /// Add a sample click on slot 2, routed to insert 2.
    pub click_layer: bool,
    /// Where the click has decayed to silence, in percent of the length.
    pub click_decay_pct: f64,
    pub gain_db: f64,
    pub tuning: f64,
    pub limiter: bool,
}

impl Default for QuickKick {
    fn default() -> Self {
        QuickKick {
            length_ms: 300.0,
            pitch_start_hz: 15000.0,
            pitch_end_hz: 1800.0,
            pitch_curve: PitchCurve::Exponential,
            amp_shape: AmpShape::Punchy,
            click_layer: true,
            click_decay_pct: 50.0,
            gain_db: 0.0,
            tuning: 0.0,
            limiter: true,
        }
    }
}

impl QuickKick {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Pitch scale: the start frequency, but never below 20 kHz.
    pub fn pitch_max_hz(&self) -> f64 {
        self.pitch_start_hz.max(MIN_PITCH_MAX_HZ)
    }

    pub fn pitch_nodes(&self) -> Vec<EnvelopeNode> {
        let max = self.pitch_max_hz();
        let (start, end) = (self.pitch_start_hz / max, self.pitch_end_hz / max);
        match &self.pitch_curve {
            PitchCurve::Exponential => exponential_pitch_nodes(start, end, 6),
            PitchCurve::Linear => vec![EnvelopeNode::new(0.0, start, 0.0), EnvelopeNode::new(1.0, end, 0.0)],
            PitchCurve::Custom(nodes) => nodes.clone(),
        }
    }

    /// Expand into template overrides. Slots other than the main and click
    /// layers are switched off.
    pub fn to_overrides(&self) -> Overrides {
        let mut main = SlotOverrides::new(MAIN_SLOT);
        main.slot_type = Some(SlotType::Sine);
        main.gain_db = Some(LAYER_GAIN_DB);
        main.muted = Some(false);
        main.pitch_envelope = PitchEnvelopeOverrides {
            max_freq_hz: Some(self.pitch_max_hz()),
            nodes: self.pitch_nodes(),
            ..Default::default()
        };
        main.amp_envelope = AmpEnvelopeOverrides {
            max_length_ms: Some(self.length_ms),
            nodes: self.amp_shape.nodes(),
            ..Default::default()
        };
        let mut slots = vec![main];

        let mut routing = BTreeMap::from([("insert1".to_string(), BTreeMap::from([(format!("osc{MAIN_SLOT}"), true)]))]);

        if self.click_layer {
            let decay = (self.click_decay_pct / 100.0).clamp(0.0, 1.0);
            let mut click = SlotOverrides::new(CLICK_SLOT);
            click.slot_type = Some(SlotType::Sample);
            click.gain_db = Some(LAYER_GAIN_DB);
            click.muted = Some(false);
            click.clear_sample = true;
            click.pitch_envelope = PitchEnvelopeOverrides {
                max_freq_hz: Some(MIN_PITCH_MAX_HZ),
                nodes: Envelope::from_points(&SAMPLE_PITCH_NODES).nodes,
                ..Default::default()
            };
            click.amp_envelope = AmpEnvelopeOverrides {
                max_length_ms: Some(self.length_ms),
                nodes: vec![
                    EnvelopeNode::new(0.0, 1.0, 0.0),
                    EnvelopeNode::new(decay, 0.0, 0.0),
                    EnvelopeNode::new(1.0, 0.0, 0.0),
                ],
                ..Default::default()
            };
            slots.push(click);
            routing.insert("insert2".to_string(), BTreeMap::from([(format!("osc{CLICK_SLOT}"), true)]));
        }

        let used = slots.len();
        for number in used + 1..=SLOT_COUNT {
            let mut off = SlotOverrides::new(number);
            off.slot_type = Some(SlotType::Off);
            slots.push(off);
        }

        Overrides {
            master: MasterOverrides {
                length_ms: Some(self.length_ms),
                single_length_mode: Some(true),
                output_gain_db: Some(self.gain_db),
                tuning_semitones: Some(self.tuning),
                ..Default::default()
            },
            limiter: LimiterOverrides {
                enabled: Some(self.limiter),
                ..Default::default()
            },
            slots,
            fx_routing: routing,
        }
    }

    /// Merge the recipe into `template`.
    pub fn build(&self, template: &PresetTree) -> Result<PresetTree> {
        merge(template, &self.to_overrides())
    }

    /// Build the recipe as a legacy Kick 2 preset, without a template.
    pub fn build_kick2(&self) -> Result<PresetTree> {
        let mut overrides = self.to_overrides();
        // A fresh document references no sample files.
        for slot in &mut overrides.slots {
            slot.clear_sample = false;
        }
        PresetTree::new_kick2(&overrides)
    }
}

/// Exponential pitch decay from `start` to `end`, values
/// rounded to four decimals. The second node pulls fast, the next-to-last
/// eases into the tail.
pub fn exponential_pitch_nodes(start: f64, end: f64, points: usize) -> Vec<EnvelopeNode> {
    let points = points.max(2);
    let last = (points - 1) as f64;
    (0..points)
        .map(|i| {
            let t = i as f64 / last;
            let y = start + (end - start) * (1.0 - (-4.0 * t).exp());
            let c = if i == 1 {
                -0.1
            } else if i == points - 2 {
                -0.04
            } else {
                0.0
            };
            EnvelopeNode::new(round4(t), round4(y), c)
        })
        .collect()
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}
