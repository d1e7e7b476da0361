//! The preset document as a typed tree.
//!
//! A [`PresetTree`] owns the flat parameter set, the data section (detailed
//! envelopes, effect and macro settings, file-reference attributes) and
//! every part of the document it does not model. Writing a tree back out
//! reproduces untouched values with their source text.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::error::{KickError, Result};
use crate::preset::index::{COARSE_NODE_COUNT, EFFECT_SLOTS_PER_CHAIN, INSERT_CHAIN_COUNT, MACRO_COUNT, SLOT_COUNT, SlotIndex, coarse_from_detailed};
use crate::preset::model::{
    EffectChainKind, EffectId, EffectSlot, Envelope, EnvelopeKind, EnvelopeNode, Limiter, Master, MasterEq, RoutingMask, Slot,
    SlotType,
};
use crate::preset::params::{ParameterSet, format_value};
use crate::preset::schema::{self, Axis};
use crate::xml::{self, Element, Misc};

/// Value of a file-reference attribute that points at nothing.
pub const EMPTY_FILE: &str = "////////";

const KICK2_ROOT_TAG: &str = "Kick2PresetFile";
const PARAMS_TAGS: [&str; 2] = ["PARAMS", "Params"];
const PARAM_TAG: &str = "PARAM";
const KICK3_DATA_TAG: &str = "DATA";
const KICK2_DATA_TAGS: [&str; 2] = ["EnvelopeData", "ENVELOPEDATA"];
const KICK2_ENVELOPE_TAGS: [&str; 2] = ["Envelope", "ENVELOPE"];
const NODE_TAGS: [&str; 3] = ["node", "Node", "NODE"];
const FX_SETTINGS_TAG: &str = "FXSETTINGS";
const MACRO_SETTINGS_TAG: &str = "MACROSETTINGS";
const GLOBAL_FX_TAG: &str = "GLOBALFX";

/// Which plugin generation wrote the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// `PARAMS` + `DATA` with one element per envelope.
    Kick3,
    /// `Params` + `EnvelopeData` with `<Envelope id=…>` entries.
    Kick2,
}

/// Counts that make up the fixed preset topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Topology {
    pub slots: usize,
    pub insert_slots: usize,
    pub master_slots: usize,
    pub macros: usize,
}

impl Topology {
    pub const EXPECTED: Topology = Topology {
        slots: SLOT_COUNT,
        insert_slots: INSERT_CHAIN_COUNT * EFFECT_SLOTS_PER_CHAIN,
        master_slots: EFFECT_SLOTS_PER_CHAIN,
        macros: MACRO_COUNT,
    };
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} slots, {} insert slots, {} master slots, {} macros",
            self.slots, self.insert_slots, self.master_slots, self.macros
        )
    }
}

/// A detailed envelope and, when it came from a document, the element it
/// was read from.
#[derive(Debug, Clone, PartialEq)]
struct EnvelopeEntry {
    slot: SlotIndex,
    kind: EnvelopeKind,
    envelope: Envelope,
    source: Option<Element>,
}

#[derive(Debug, Clone, PartialEq)]
enum DataEntry {
    Envelope(EnvelopeEntry),
    Effect { id: EffectId, element: Element },
    Macro(Element),
    GlobalFx(Element),
    Other(Element),
}

/// A child of the parameter section, in document order.
#[derive(Debug, Clone, PartialEq)]
enum ParamsItem {
    /// The element as read; only its `value` attribute is refreshed on write.
    Param { id: String, source: Element },
    Other(Element),
}

#[derive(Debug, Clone, PartialEq)]
enum RootPart {
    Params,
    Data,
    /// An envelope placed directly under the root element.
    Envelope(EnvelopeEntry),
    Other(Element),
}

/// Comments and processing instructions, by position.
#[derive(Debug, Clone, PartialEq, Default)]
struct Annotations {
    prolog: Vec<Misc>,
    epilog: Vec<Misc>,
    root: Vec<(usize, Misc)>,
    params: Vec<(usize, Misc)>,
    data: Vec<(usize, Misc)>,
}

/// A parsed or generated preset.
#[derive(Debug, Clone, PartialEq)]
pub struct PresetTree {
    format: DocumentFormat,
    root_name: String,
    root_attributes: Vec<(String, String)>,
    parts: Vec<RootPart>,
    params_tag: String,
    params: ParameterSet,
    params_layout: Vec<ParamsItem>,
    data_tag: String,
    data_attributes: Vec<(String, String)>,
    entries: Vec<DataEntry>,
    notes: Annotations,
}

impl FromStr for PresetTree {
    type Err = KickError;

    fn from_str(s: &str) -> Result<Self> {
        PresetTree::parse(s)
    }
}

impl PresetTree {
    /// Parse a Kick 3 or legacy Kick 2 preset document.
    #[instrument(skip(document), fields(bytes = document.len()))]
    pub fn parse(document: &str) -> Result<Self> {
        let doc = xml::parse_document(document)?;
        let mut tree = Self::from_element(doc.root)?;
        tree.notes.prolog = doc.prolog;
        tree.notes.epilog = doc.epilog;
        debug!(
            format = ?tree.format,
            params = tree.params.len(),
            entries = tree.entries.len(),
            "parsed preset"
        );
        Ok(tree)
    }

    fn empty(format: DocumentFormat, root_name: String, root_attributes: Vec<(String, String)>) -> Self {
        PresetTree {
            format,
            root_name,
            root_attributes,
            parts: Vec::new(),
            params_tag: String::new(),
            params: ParameterSet::new(),
            params_layout: Vec::new(),
            data_tag: String::new(),
            data_attributes: Vec::new(),
            entries: Vec::new(),
            notes: Annotations::default(),
        }
    }

    /// A legacy document with empty `Params` and `EnvelopeData` sections.
    pub(crate) fn empty_kick2(plugin_version: &str) -> Self {
        let mut tree = Self::empty(
            DocumentFormat::Kick2,
            KICK2_ROOT_TAG.to_string(),
            vec![("pluginVersion".to_string(), plugin_version.to_string())],
        );
        tree.params_tag = PARAMS_TAGS[1].to_string();
        tree.data_tag = KICK2_DATA_TAGS[0].to_string();
        tree.parts = vec![RootPart::Params, RootPart::Data];
        tree
    }

    fn from_element(root: Element) -> Result<Self> {
        let mut tree = Self::empty(DocumentFormat::Kick3, root.name, root.attributes);
        tree.notes.root = root.misc;

        for child in root.children {
            let name = child.name.as_str();
            let envelope_tag = schema::parse_envelope_tag(name);
            if PARAMS_TAGS.contains(&name) && tree.params_tag.is_empty() {
                tree.read_params(child)?;
                tree.parts.push(RootPart::Params);
            } else if (name == KICK3_DATA_TAG || KICK2_DATA_TAGS.contains(&name)) && tree.data_tag.is_empty() {
                tree.read_data(child)?;
                tree.parts.push(RootPart::Data);
            } else if let Some((number, kind)) = envelope_tag {
                debug!(tag = %child.name, "envelope outside the data section");
                tree.parts.push(RootPart::Envelope(envelope_entry(number, kind, child)?));
            } else {
                tree.parts.push(RootPart::Other(child));
            }
        }

        if tree.params_tag.is_empty() {
            return Err(KickError::MalformedDocument(format!(
                "<{}> has no parameter section",
                tree.root_name
            )));
        }
        let legacy = KICK2_DATA_TAGS.contains(&tree.data_tag.as_str())
            || (tree.data_tag.is_empty() && tree.params_tag == "Params");
        if legacy {
            tree.format = DocumentFormat::Kick2;
        }
        if tree.data_tag.is_empty() {
            tree.data_tag = match tree.format {
                DocumentFormat::Kick3 => KICK3_DATA_TAG.to_string(),
                DocumentFormat::Kick2 => KICK2_DATA_TAGS[0].to_string(),
            };
        }
        Ok(tree)
    }

    fn read_params(&mut self, section: Element) -> Result<()> {
        self.params_tag = section.name;
        self.notes.params = section.misc;
        for param in section.children {
            if param.name != PARAM_TAG {
                warn!(tag = %param.name, "keeping unknown element in parameter section");
                self.params_layout.push(ParamsItem::Other(param));
                continue;
            }
            let id = param
                .attr("id")
                .ok_or_else(|| KickError::MalformedDocument("PARAM without id".into()))?
                .to_string();
            let value = param
                .attr("value")
                .ok_or_else(|| KickError::MalformedDocument(format!("PARAM '{id}' without value")))?;
            let seen = self.params.contains(&id);
            self.params.insert_raw(&id, value)?;
            if !seen {
                self.params_layout.push(ParamsItem::Param { id, source: param });
            }
        }
        Ok(())
    }

    fn read_data(&mut self, section: Element) -> Result<()> {
        self.data_tag = section.name;
        self.data_attributes = section.attributes;
        self.notes.data = section.misc;
        for child in section.children {
            let entry = data_entry(child)?;
            if let DataEntry::Envelope(env) = &entry {
                if self.envelope_position(env.slot, env.kind).is_some() {
                    warn!(slot = env.slot.tree(), kind = %env.kind, "duplicate envelope, the last one is used");
                }
            }
            self.entries.push(entry);
        }
        Ok(())
    }

    // ── Writing ─────────────────────────────────────────────

    /// The tree as an XML element, ready to be written.
    pub fn to_element(&self) -> Element {
        let mut root = Element::new(self.root_name.clone());
        root.attributes = self.root_attributes.clone();
        root.misc = self.notes.root.clone();
        for part in &self.parts {
            root.children.push(match part {
                RootPart::Params => self.params_element(),
                RootPart::Data => self.data_element(),
                RootPart::Envelope(env) => match &env.source {
                    Some(element) => element.clone(),
                    None => envelope_element(env, self.format, true),
                },
                RootPart::Other(element) => element.clone(),
            });
        }
        root
    }

    /// The full document: declaration, two-space indent, CRLF line endings.
    pub fn to_document(&self) -> String {
        xml::Document {
            prolog: self.notes.prolog.clone(),
            root: self.to_element(),
            epilog: self.notes.epilog.clone(),
        }
        .write()
    }

    /// Parameters in their read order, each from its source element with
    /// the current value. Parameters added since follow at the end.
    fn params_element(&self) -> Element {
        let mut section = Element::new(self.params_tag.clone());
        section.misc = self.notes.params.clone();
        let mut written = HashSet::new();
        for item in &self.params_layout {
            match item {
                ParamsItem::Param { id, source } => {
                    let Some(raw) = self.params.raw(id) else {
                        continue;
                    };
                    let mut param = source.clone();
                    param.set_attr("value", raw);
                    section.children.push(param);
                    written.insert(id.as_str());
                }
                ParamsItem::Other(element) => section.children.push(element.clone()),
            }
        }
        for (id, raw) in self.params.iter().filter(|(id, _)| !written.contains(id)) {
            section
                .children
                .push(Element::new(PARAM_TAG).with_attr("id", id).with_attr("value", raw));
        }
        section
    }

    fn data_element(&self) -> Element {
        let mut section = Element::new(self.data_tag.clone());
        section.attributes = self.data_attributes.clone();
        section.misc = self.notes.data.clone();
        for entry in &self.entries {
            section.children.push(match entry {
                DataEntry::Envelope(env) => match &env.source {
                    Some(element) => element.clone(),
                    None => envelope_element(env, self.format, false),
                },
                DataEntry::Effect { element, .. }
                | DataEntry::Macro(element)
                | DataEntry::GlobalFx(element)
                | DataEntry::Other(element) => element.clone(),
            });
        }
        section
    }

    // ── Accessors ───────────────────────────────────────────

    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    pub fn plugin_version(&self) -> Option<&str> {
        self.root_attributes
            .iter()
            .find(|(k, _)| k == "pluginVersion" || k == "version")
            .map(|(_, v)| v.as_str())
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn set_param(&mut self, id: &str, value: f64) -> Result<()> {
        self.params.set(id, value)
    }

    pub fn set_param_bool(&mut self, id: &str, value: bool) -> Result<()> {
        self.params.set_bool(id, value)
    }

    /// File-reference and cache attributes of the data section.
    pub fn data_attributes(&self) -> &[(String, String)] {
        &self.data_attributes
    }

    pub fn data_attribute(&self, key: &str) -> Option<&str> {
        self.data_attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    // ── Envelopes ───────────────────────────────────────────

    fn envelope_position(&self, slot: SlotIndex, kind: EnvelopeKind) -> Option<usize> {
        self.entries
            .iter()
            .rposition(|e| matches!(e, DataEntry::Envelope(env) if env.slot == slot && env.kind == kind))
    }

    fn root_envelope_position(&self, slot: SlotIndex, kind: EnvelopeKind) -> Option<usize> {
        self.parts
            .iter()
            .position(|p| matches!(p, RootPart::Envelope(env) if env.slot == slot && env.kind == kind))
    }

    /// The detailed envelope, if the document has one. The data section
    /// wins over an envelope placed directly under the root.
    pub fn detailed_envelope(&self, slot: SlotIndex, kind: EnvelopeKind) -> Option<&Envelope> {
        if let Some(i) = self.envelope_position(slot, kind) {
            if let DataEntry::Envelope(env) = &self.entries[i] {
                return Some(&env.envelope);
            }
        }
        match &self.parts[self.root_envelope_position(slot, kind)?] {
            RootPart::Envelope(env) => Some(&env.envelope),
            _ => None,
        }
    }

    /// The eight coarse nodes from the flat set, if the set carries them.
    pub fn coarse_envelope(&self, slot: SlotIndex, kind: EnvelopeKind) -> Option<Envelope> {
        if !self.params.contains(&schema::coarse_node_param(slot, kind, 0, Axis::X)) {
            return None;
        }
        let nodes = (0..COARSE_NODE_COUNT)
            .map(|k| {
                EnvelopeNode::new(
                    self.params.get_or_default(&schema::coarse_node_param(slot, kind, k, Axis::X)),
                    self.params.get_or_default(&schema::coarse_node_param(slot, kind, k, Axis::Y)),
                    0.0,
                )
            })
            .collect();
        Some(Envelope::from_nodes(nodes))
    }

    /// The envelope used for rendering: detailed when present, else coarse.
    pub fn envelope(&self, slot: SlotIndex, kind: EnvelopeKind) -> Option<Envelope> {
        match self.detailed_envelope(slot, kind) {
            Some(env) if !env.is_empty() => Some(env.clone()),
            _ => self.coarse_envelope(slot, kind),
        }
    }

    /// Replace (or add) a detailed envelope and regenerate its coarse mirror.
    pub fn set_detailed_envelope(&mut self, slot: SlotIndex, kind: EnvelopeKind, envelope: Envelope) -> Result<()> {
        envelope.validate()?;
        let coarse = coarse_from_detailed(&envelope.nodes, COARSE_NODE_COUNT)?;
        self.write_coarse(slot, kind, &coarse)?;

        let entry = EnvelopeEntry {
            slot,
            kind,
            envelope,
            source: None,
        };
        if let Some(i) = self.envelope_position(slot, kind) {
            self.entries[i] = DataEntry::Envelope(entry);
        } else if let Some(i) = self.root_envelope_position(slot, kind) {
            self.parts[i] = RootPart::Envelope(entry);
        } else {
            let at = self
                .entries
                .iter()
                .rposition(|e| matches!(e, DataEntry::Envelope(_)))
                .map_or(0, |i| i + 1);
            self.entries.insert(at, DataEntry::Envelope(entry));
            self.ensure_data_part();
        }
        Ok(())
    }

    /// Rewrite the coarse nodes only. Shorter envelopes are padded to eight
    /// nodes with `(1, last y)`; the detailed form is left alone.
    pub fn set_coarse_envelope(&mut self, slot: SlotIndex, kind: EnvelopeKind, envelope: &Envelope) -> Result<()> {
        if envelope.len() > COARSE_NODE_COUNT {
            return Err(KickError::InvalidEnvelope(format!(
                "{} coarse nodes, at most {COARSE_NODE_COUNT} fit",
                envelope.len()
            )));
        }
        envelope.validate()?;
        let last_y = envelope.nodes.last().map_or(0.0, |n| n.y);
        let mut nodes = envelope.nodes.clone();
        nodes.resize(COARSE_NODE_COUNT, EnvelopeNode::new(1.0, last_y, 0.0));
        self.write_coarse(slot, kind, &nodes)
    }

    fn write_coarse(&mut self, slot: SlotIndex, kind: EnvelopeKind, nodes: &[EnvelopeNode]) -> Result<()> {
        for (k, node) in nodes.iter().enumerate() {
            self.params.set(&schema::coarse_node_param(slot, kind, k, Axis::X), node.x)?;
            self.params.set(&schema::coarse_node_param(slot, kind, k, Axis::Y), node.y)?;
        }
        Ok(())
    }

    fn ensure_data_part(&mut self) {
        if !self.parts.iter().any(|p| matches!(p, RootPart::Data)) {
            self.parts.push(RootPart::Data);
        }
    }

    // ── Sample file references ──────────────────────────────

    /// Point every file reference of `slot` at [`EMPTY_FILE`] and raise its
    /// dirty flags so the plugin rebuilds cached data on load.
    pub fn clear_sample(&mut self, slot: SlotIndex) {
        let mut touched = 0;
        for (key, value) in self.data_attributes.iter_mut() {
            let Some(field) = slot_field(key, slot) else {
                continue;
            };
            if field.contains("Dirty") {
                *value = "1".to_string();
                touched += 1;
            } else if field.contains("File") {
                *value = EMPTY_FILE.to_string();
                touched += 1;
            }
        }
        if touched == 0 {
            let t = slot.tree();
            self.data_attributes.push((format!("Slot{t}File"), EMPTY_FILE.to_string()));
            self.data_attributes.push((format!("Slot{t}FileDirty"), "1".to_string()));
            self.ensure_data_part();
        }
        debug!(slot = slot.flat(), touched, "cleared sample references");
    }

    /// Does `slot` reference sample data?
    pub fn has_embedded_sample(&self, slot: SlotIndex) -> bool {
        self.data_attributes.iter().any(|(key, value)| {
            slot_field(key, slot).is_some_and(|f| f.contains("File") && !f.contains("Dirty"))
                && !value.is_empty()
                && value != EMPTY_FILE
        })
    }

    // ── Views ───────────────────────────────────────────────

    pub fn master(&self) -> Master {
        let p = &self.params;
        Master {
            length_ms: p.get_or_default(schema::MASTER_LENGTH),
            single_length_mode: p.get_bool(schema::SINGLE_LENGTH_MODE),
            output_gain_db: p.get_or_default(schema::OUT_GAIN),
            output_gain_position: p.get_or_default(schema::OUT_GAIN_POSITION),
            pan: p.get_or_default(schema::MASTER_PAN),
            tuning_semitones: p.get_or_default(schema::TUNING),
            pitch_wheel_range: p.get_or_default(schema::PITCH_WHEEL_RANGE),
            processing_mode: p.get_or_default(schema::PROCESSING_MODE),
            gate: p.get_or_default(schema::GATE),
        }
    }

    pub fn limiter(&self) -> Limiter {
        let p = &self.params;
        Limiter {
            enabled: p.get_bool(schema::LIM_ENABLE),
            threshold_db: p.get_or_default(schema::LIM_THRESHOLD),
            lookahead: p.get_or_default(schema::LIM_LOOKAHEAD),
            release: p.get_or_default(schema::LIM_RELEASE),
        }
    }

    pub fn eq(&self) -> MasterEq {
        MasterEq {
            bands: self.params.numeric_with_prefix(schema::EQ_PREFIX),
        }
    }

    pub fn slot(&self, index: SlotIndex) -> Slot {
        let p = &self.params;
        let value = |field: &str| p.get_or_default(&schema::slot_param(index, field));
        Slot {
            index,
            slot_type: SlotType::from_value(value(schema::SLOT_TYPE)).unwrap_or(SlotType::Off),
            gain_db: value(schema::SLOT_GAIN),
            pan: value(schema::SLOT_PAN),
            muted: value(schema::SLOT_MUTE) != 0.0,
            soloed: value(schema::SLOT_SOLO) != 0.0,
            pitch_max_hz: value(schema::SLOT_PITCH_MAX),
            pitch_semitones: value(schema::SLOT_PITCH_SEMI),
            pitch_range_max: value(schema::SLOT_PITCH_RANGE_MAX),
            amp_max_len_ms: value(schema::SLOT_AMP_MAX_LEN),
            pitch: self.envelope(index, EnvelopeKind::Pitch),
            amp: self.envelope(index, EnvelopeKind::Amp),
            harmonics: p.numeric_with_prefix(&schema::slot_param(index, schema::SLOT_HARMONIC_PREFIX)),
        }
    }

    pub fn slots(&self) -> Vec<Slot> {
        SlotIndex::all().map(|s| self.slot(s)).collect()
    }

    /// All six effect slots in document order. The master chain hears
    /// every oscillator.
    pub fn effect_slots(&self) -> Vec<EffectSlot> {
        EffectId::all()
            .into_iter()
            .map(|id| {
                let effect_type = self.params.get_or_default(&schema::effect_param(id, schema::EFFECT_TYPE));
                let routing = match id.kind {
                    EffectChainKind::Master => RoutingMask::ALL,
                    EffectChainKind::Insert => SlotIndex::all().fold(RoutingMask::default(), |mask, slot| {
                        mask.with(slot, self.params.get_bool(&schema::routing_param(id.chain as usize, slot)))
                    }),
                };
                let settings = self
                    .effect_element(id)
                    .map(|e| e.attributes.iter().filter(|(k, _)| k != "id").cloned().collect())
                    .unwrap_or_default();
                EffectSlot {
                    id,
                    effect_type,
                    gain_db: self.params.get_or_default(&schema::effect_param(id, schema::EFFECT_GAIN)),
                    enabled: effect_type != 0.0,
                    routing,
                    settings,
                }
            })
            .collect()
    }

    fn effect_element(&self, id: EffectId) -> Option<&Element> {
        self.entries.iter().find_map(|e| match e {
            DataEntry::Effect { id: found, element } if *found == id => Some(element),
            _ => None,
        })
    }

    pub fn macros(&self) -> Vec<&Element> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                DataEntry::Macro(element) => Some(element),
                _ => None,
            })
            .collect()
    }

    pub fn has_global_fx(&self) -> bool {
        self.entries.iter().any(|e| matches!(e, DataEntry::GlobalFx(_)))
    }

    /// Counts of slots, effect slots and macros present in the document.
    pub fn topology(&self) -> Topology {
        let slots = SlotIndex::all()
            .filter(|s| self.params.contains(&schema::slot_param(*s, schema::SLOT_TYPE)))
            .count();
        let mut effects: Vec<EffectId> = self
            .entries
            .iter()
            .filter_map(|e| match e {
                DataEntry::Effect { id, .. } => Some(*id),
                _ => None,
            })
            .collect();
        effects.sort_by_key(|id| (id.kind == EffectChainKind::Insert, id.chain, id.slot));
        effects.dedup();
        let count = |kind: EffectChainKind| effects.iter().filter(|id| id.kind == kind).count();
        Topology {
            slots,
            insert_slots: count(EffectChainKind::Insert),
            master_slots: count(EffectChainKind::Master),
            macros: self.macros().len(),
        }
    }
}

/// The part of a data attribute key after `Slot{tree}`, when the key
/// belongs to `slot`.
fn slot_field(key: &str, slot: SlotIndex) -> Option<&str> {
    let number = slot.tree().to_string();
    let rest = key.strip_prefix("Slot")?.strip_prefix(number.as_str())?;
    (!rest.starts_with(|c: char| c.is_ascii_digit())).then_some(rest)
}

fn data_entry(child: Element) -> Result<DataEntry> {
    if let Some((tree, kind)) = schema::parse_envelope_tag(&child.name) {
        return envelope_entry(tree, kind, child).map(DataEntry::Envelope);
    }
    if KICK2_ENVELOPE_TAGS.contains(&child.name.as_str()) {
        if let Some((tree, kind)) = child.attr("id").and_then(schema::parse_envelope_tag) {
            return envelope_entry(tree, kind, child).map(DataEntry::Envelope);
        }
    }
    match child.name.as_str() {
        FX_SETTINGS_TAG => {
            let id = child
                .attr("id")
                .ok_or_else(|| KickError::SchemaMismatch(format!("{FX_SETTINGS_TAG} without id")))?;
            let id = EffectId::parse(id)?;
            Ok(DataEntry::Effect { id, element: child })
        }
        MACRO_SETTINGS_TAG => Ok(DataEntry::Macro(child)),
        GLOBAL_FX_TAG => Ok(DataEntry::GlobalFx(child)),
        _ => {
            warn!(tag = %child.name, "keeping unknown data entry as-is");
            Ok(DataEntry::Other(child))
        }
    }
}

fn envelope_entry(tree: usize, kind: EnvelopeKind, element: Element) -> Result<EnvelopeEntry> {
    let slot = SlotIndex::from_tree(tree).map_err(|_| {
        KickError::SchemaMismatch(format!(
            "<{}> names slot {tree}, expected 0..={}",
            element.name,
            SLOT_COUNT - 1
        ))
    })?;
    let nodes = element
        .children
        .iter()
        .filter(|c| NODE_TAGS.contains(&c.name.as_str()))
        .map(parse_node)
        .collect::<Result<Vec<_>>>()?;
    Ok(EnvelopeEntry {
        slot,
        kind,
        envelope: Envelope::from_nodes(nodes),
        source: Some(element),
    })
}

fn parse_node(element: &Element) -> Result<EnvelopeNode> {
    let number = |key: &str| -> Result<f64> {
        match element.attr(key) {
            None => Ok(0.0),
            Some(raw) => raw.trim().parse().map_err(|_| {
                KickError::MalformedDocument(format!("envelope node {key}='{raw}' is not a number"))
            }),
        }
    };
    Ok(EnvelopeNode {
        x: number("x")?,
        y: number("y")?,
        c: number("c")?,
        is_keytracked: number("isKeytracked")? != 0.0,
        is_phase_locked: number("isPhaseLocked")? != 0.0,
        locked_phase_value: number("lockedPhaseValue")?,
    })
}

/// Envelopes under the root are always named by their tag; inside a
/// legacy data section they are `<Envelope id=…>`.
fn envelope_element(entry: &EnvelopeEntry, format: DocumentFormat, at_root: bool) -> Element {
    let tag = schema::envelope_tag(entry.slot, entry.kind);
    let node_tag = match format {
        DocumentFormat::Kick3 => NODE_TAGS[0],
        DocumentFormat::Kick2 => NODE_TAGS[1],
    };
    let mut element = if at_root || format == DocumentFormat::Kick3 {
        Element::new(tag)
    } else {
        Element::new(KICK2_ENVELOPE_TAGS[0]).with_attr("id", tag)
    };
    for node in &entry.envelope.nodes {
        let mut el = Element::new(node_tag)
            .with_attr("x", format_value(node.x))
            .with_attr("y", format_value(node.y))
            .with_attr("c", format_value(node.c));
        if format == DocumentFormat::Kick3 {
            el = el
                .with_attr("isKeytracked", flag(node.is_keytracked))
                .with_attr("isPhaseLocked", flag(node.is_phase_locked))
                .with_attr("lockedPhaseValue", format_value(node.locked_phase_value));
        }
        element.children.push(el);
    }
    element
}

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}
