pub mod dsp;
pub mod error;
pub mod preset;
pub mod xml;

use crate::dsp::renderer::RenderOptions;
use crate::error::Result;
use crate::preset::{Overrides, PresetSummary, PresetTree, QuickKick};
use wasm_bindgen::prelude::*;

pub use crate::error::KickError;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the kick-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// Parse preset text into a tree.
pub fn parse(document: &str) -> Result<PresetTree> {
    PresetTree::parse(document)
}

/// Merge JSON overrides into a template document, returning the new document text.
pub fn merge_document(template: &str, overrides_json: &str) -> Result<String> {
    let template = PresetTree::parse(template)?;
    let overrides = Overrides::from_json(overrides_json)?;
    Ok(preset::merge(&template, &overrides)?.to_document())
}

/// Build a preset from a quick kick recipe (JSON) on top of a template
/// document. A blank template yields a legacy Kick 2 preset instead.
pub fn quick_kick_document(template: &str, recipe_json: &str) -> Result<String> {
    let recipe = QuickKick::from_json(recipe_json)?;
    let tree = if template.trim().is_empty() {
        recipe.build_kick2()?
    } else {
        recipe.build(&PresetTree::parse(template)?)?
    };
    Ok(tree.to_document())
}

/// Build a legacy Kick 2 document from overrides (JSON) alone.
pub fn kick2_document(overrides_json: &str) -> Result<String> {
    let overrides = Overrides::from_json(overrides_json)?;
    Ok(PresetTree::new_kick2(&overrides)?.to_document())
}

/// Render preset text to WAV bytes.
pub fn render_document_wav(document: &str, options: &RenderOptions) -> Result<Vec<u8>> {
    let tree = PresetTree::parse(document)?;
    dsp::renderer::render_wav(&tree, options)
}

fn to_js(error: KickError) -> JsValue {
    JsValue::from_str(&format!("{error}"))
}

/// WASM-exposed: parse a preset and return its summary as a JS object.
#[wasm_bindgen]
pub fn parse_preset(document: &str) -> std::result::Result<JsValue, JsValue> {
    let tree = parse(document).map_err(to_js)?;
    let summary = PresetSummary::from_tree(&tree);
    serde_wasm_bindgen::to_value(&summary).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: merge overrides (JSON) into a template document.
#[wasm_bindgen]
pub fn merge_preset(template: &str, overrides_json: &str) -> std::result::Result<String, JsValue> {
    merge_document(template, overrides_json).map_err(to_js)
}

/// WASM-exposed: build a preset from a quick kick recipe (JSON).
#[wasm_bindgen]
pub fn quick_kick(template: &str, recipe_json: &str) -> std::result::Result<String, JsValue> {
    quick_kick_document(template, recipe_json).map_err(to_js)
}

/// WASM-exposed: build a legacy Kick 2 preset from overrides (JSON).
#[wasm_bindgen]
pub fn generate_kick2_preset(overrides_json: &str) -> std::result::Result<String, JsValue> {
    kick2_document(overrides_json).map_err(to_js)
}

/// WASM-exposed: render a preset to mono 24-bit WAV bytes.
#[wasm_bindgen]
pub fn render_preset_wav(document: &str, sample_rate: u32) -> std::result::Result<Vec<u8>, JsValue> {
    let options = RenderOptions {
        sample_rate,
        ..RenderOptions::default()
    };
    render_document_wav(document, &options).map_err(to_js)
}

/// WASM-exposed: render a preset to mono f32 samples for AudioWorklet playback.
#[wasm_bindgen]
pub fn render_preset_samples(document: &str, sample_rate: u32) -> std::result::Result<Vec<f32>, JsValue> {
    let tree = parse(document).map_err(to_js)?;
    let options = RenderOptions {
        sample_rate,
        ..RenderOptions::default()
    };
    let waveform = dsp::renderer::render_preset(&tree, &options).map_err(to_js)?;
    let samples = waveform.channels.first().map(Vec::as_slice).unwrap_or_default();
    Ok(samples.iter().map(|&s| s as f32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preset::fixtures;

    #[test]
    fn merge_document_round_trips_text() {
        let template = fixtures::template_document();
        let merged = merge_document(&template, "{}").unwrap();
        assert_eq!(parse(&merged).unwrap(), parse(&template).unwrap());
    }

    #[test]
    fn quick_kick_document_applies_recipe() {
        let doc = quick_kick_document(&fixtures::template_document(), r#"{"length_ms": 180}"#).unwrap();
        assert_eq!(parse(&doc).unwrap().master().length_ms, 180.0);
    }

    #[test]
    fn quick_kick_without_template_builds_legacy_preset() {
        let doc = quick_kick_document("", r#"{"length_ms": 200}"#).unwrap();
        let tree = parse(&doc).unwrap();
        assert_eq!(tree.format(), preset::DocumentFormat::Kick2);
        assert_eq!(tree.master().length_ms, 200.0);
        assert!(render_document_wav(&doc, &RenderOptions::default()).is_ok());
    }

    #[test]
    fn kick2_document_from_overrides() {
        let doc = kick2_document(r#"{"slots": [{"slot_number": 2, "type": "sine"}]}"#).unwrap();
        assert!(doc.contains(r#"<Envelope id="Slot1_AmpEnvelope">"#));
        assert!(matches!(kick2_document("[]"), Err(KickError::Config(_))));
    }

    #[test]
    fn render_document_produces_wav() {
        let bytes = render_document_wav(&fixtures::template_document(), &RenderOptions::default()).unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
    }

    #[test]
    fn bad_json_is_a_config_error() {
        let err = merge_document(&fixtures::template_document(), "{not json").unwrap_err();
        assert!(matches!(err, KickError::Config(_)));
    }
}
