//! Preset documents shared by the unit tests.

use crate::preset::index::{COARSE_NODE_COUNT, SLOT_COUNT};
use crate::preset::tree::PresetTree;

const MAIN_PITCH: [(f64, f64, f64); 6] = [
    (0.0, 0.79, 0.0),
    (0.037, 0.52, -0.1),
    (0.156, 0.36, 0.0),
    (0.49, 0.21, 0.0),
    (0.827, 0.094, -0.04),
    (1.0, 0.09, 0.0),
];

const MAIN_AMP: [(f64, f64, f64); 5] = [
    (0.0, 0.23, 0.0),
    (0.005, 0.62, 0.0),
    (0.02, 0.70, -0.3),
    (0.45, 0.73, 0.2),
    (1.0, 0.0, 0.0),
];

const CLICK_PITCH: [(f64, f64, f64); 2] = [(0.0, 1.0, 0.0), (1.0, 1.0, 0.0)];
const CLICK_AMP: [(f64, f64, f64); 3] = [(0.0, 1.0, 0.0), (0.5, 0.0, 0.0), (1.0, 0.0, 0.0)];

struct Writer(String);

impl Writer {
    fn line(&mut self, depth: usize, text: &str) {
        for _ in 0..depth {
            self.0.push_str("  ");
        }
        self.0.push_str(text);
        self.0.push_str("\r\n");
    }

    fn param(&mut self, id: &str, value: &str) {
        self.line(2, &format!(r#"<PARAM id="{id}" value="{value}"/>"#));
    }

    fn envelope(&mut self, tag: &str, nodes: &[(f64, f64, f64)]) {
        self.line(2, &format!("<{tag}>"));
        for (x, y, c) in nodes {
            self.line(
                3,
                &format!(
                    r#"<node x="{x}" y="{y}" c="{c}" isKeytracked="0" isPhaseLocked="0" lockedPhaseValue="0.0"/>"#
                ),
            );
        }
        self.line(2, &format!("</{tag}>"));
    }
}

/// A complete Kick 3 preset: sine on slot 1, a sample click on slot 2,
/// slots 3 to 5 off with coarse envelopes only.
pub(crate) fn template_document() -> String {
    let mut w = Writer(String::new());
    w.line(0, r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    w.line(0, r#"<Kick3 pluginVersion="3.0.4" presetName="Template">"#);
    w.line(1, "<PARAMS>");

    for (id, value) in [
        ("masterLength", "300.0"),
        ("singleLengthMode", "1.0"),
        ("outGain", "0.000000"),
        ("outGainPosition", "1.0"),
        ("masterPan", "0.0"),
        ("tuning", "0.0"),
        ("pitchWheelRange", "7.0"),
        ("processingMode", "1.0"),
        ("gate", "0.0"),
        ("Lim_Enable", "1.0"),
        ("Lim_Threshold", "-0.3"),
        ("Lim_Lookahead", "1.0"),
        ("Lim_Release", "1.0"),
        ("EQLowGain", "0.0"),
        ("EQHighFreq", "8000.0"),
        ("Comp_Attack", "0.250000"),
        ("presetCategory", "Psy"),
    ] {
        w.param(id, value);
    }

    for flat in 1..=SLOT_COUNT {
        let (slot_type, gain) = match flat {
            1 => ("1.0", "1.38"),
            2 => ("2.0", "-6.0"),
            _ => ("0.0", "0.0"),
        };
        w.param(&format!("Slot{flat}Type"), slot_type);
        w.param(&format!("Slot{flat}Gain"), gain);
        w.param(&format!("Slot{flat}Pan"), "0.0");
        w.param(&format!("Slot{flat}Mute"), "0.0");
        w.param(&format!("Slot{flat}Solo"), "0.0");
        w.param(&format!("Slot{flat}PitchEnvMax"), "20000.0");
        w.param(&format!("Slot{flat}PitchEnvRangeMax"), "100.0");
        w.param(&format!("Slot{flat}PitchSemi"), "0.0");
        w.param(&format!("Slot{flat}AmpEnvMaxLen"), "300.0");
        if flat == 1 {
            w.param("Slot1Harm1", "0.5");
        }
        for k in 1..=COARSE_NODE_COUNT {
            let x = (k - 1) as f64 / (COARSE_NODE_COUNT - 1) as f64;
            w.param(&format!("Slot{flat}PitchNode{k}_x"), &x.to_string());
            w.param(&format!("Slot{flat}PitchNode{k}_y"), &(0.8 - 0.1 * x).to_string());
            w.param(&format!("Slot{flat}AmpNode{k}_x"), &x.to_string());
            w.param(&format!("Slot{flat}AmpNode{k}_y"), &(1.0 - x).to_string());
        }
        w.param(&format!("Slot{flat}Drive"), "0.0");
    }

    for chain in 1..=2 {
        for osc in 1..=SLOT_COUNT {
            let routed = if chain == osc { "1.0" } else { "0.0" };
            w.param(&format!("FXInsert{chain}Osc{osc}Routed"), routed);
        }
        for slot in 1..=2 {
            let effect_type = if chain == 1 && slot == 1 { "3.0" } else { "0.0" };
            w.param(&format!("FXInsert{chain}Slot{slot}Type"), effect_type);
            w.param(&format!("FXInsert{chain}Slot{slot}Gain"), "0.0");
        }
    }
    for slot in 1..=2 {
        w.param(&format!("MstrFXSlot{slot}Type"), "0.0");
        w.param(&format!("MstrFXSlot{slot}Gain"), "0.0");
    }
    w.line(1, "</PARAMS>");

    let mut data = String::from("<DATA");
    for t in 0..SLOT_COUNT {
        let file = match t {
            0 => "C:/Kicks/Sub Layer.wav",
            1 => "C:/Kicks/Click 04.wav",
            _ => "////////",
        };
        data.push_str(&format!(
            r#" Slot{t}File="{file}" Slot{t}FileDirty="0" Slot{t}SubFile="////////" Slot{t}SubFileDirty="0""#
        ));
    }
    data.push_str(r#" AmpCurveFileDirty="0">"#);
    w.line(1, &data);

    w.envelope("Slot0_PitchEnvelope", &MAIN_PITCH);
    w.envelope("Slot0_AmpEnvelope", &MAIN_AMP);
    w.envelope("Slot1_PitchEnvelope", &CLICK_PITCH);
    w.envelope("Slot1_AmpEnvelope", &CLICK_AMP);

    for id in ["master0", "master1", "insert0_0", "insert0_1", "insert1_0", "insert1_1"] {
        let extra = if id == "insert0_0" { r#" drive="0.35" mix="1.0""# } else { "" };
        w.line(2, &format!(r#"<FXSETTINGS id="{id}"{extra}/>"#));
    }
    for id in 0..4 {
        w.line(2, &format!(r#"<MACROSETTINGS id="{id}" name="Macro {}" value="0.0"/>"#, id + 1));
    }
    w.line(2, "<GLOBALFX/>");
    w.line(2, r#"<TUNINGTABLE root="C" cents="0.0"/>"#);
    w.line(1, "</DATA>");
    w.line(1, r#"<EDITOR width="820" height="540"/>"#);
    w.line(0, "</Kick3>");
    w.0
}

pub(crate) fn template() -> PresetTree {
    PresetTree::parse(&template_document()).expect("template fixture parses")
}

/// A small Kick 2 preset with one detailed pitch envelope.
pub(crate) fn legacy_document() -> String {
    [
        r#"<?xml version="1.0" encoding="UTF-8"?>"#,
        r#"<Kick2PresetFile pluginVersion="1.5.3">"#,
        "  <Params>",
        r#"    <PARAM id="masterLength" value="250.0"/>"#,
        r#"    <PARAM id="Slot1Type" value="1.0"/>"#,
        r#"    <PARAM id="Slot1PitchEnvMax" value="20000.0"/>"#,
        "  </Params>",
        "  <EnvelopeData>",
        r#"    <Envelope id="Slot0_PitchEnvelope">"#,
        r#"      <Node x="0.0" y="0.8" c="0.0"/>"#,
        r#"      <Node x="0.2" y="0.3" c="-0.2"/>"#,
        r#"      <Node x="1.0" y="0.1" c="0.0"/>"#,
        "    </Envelope>",
        "  </EnvelopeData>",
        "</Kick2PresetFile>",
    ]
    .join("\r\n")
}
