//! The flat identifier/value set.

use std::collections::HashMap;

use tracing::warn;

use crate::error::{KickError, Result};
use crate::preset::schema::{FieldDescriptor, schema};

/// A modeled parameter. The raw text is what gets written back, so a value
/// that was never set re-serializes exactly as it was read.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub id: String,
    pub value: f64,
    pub descriptor: &'static FieldDescriptor,
    raw: String,
}

impl Parameter {
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// Schema-validated parameter mapping. Identifiers missing from the schema
/// live in an opaque bag and keep their text untouched; document order is
/// remembered for both.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterSet {
    order: Vec<String>,
    known: HashMap<String, Parameter>,
    opaque: HashMap<String, String>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter as read from a document. A modeled identifier whose
    /// text is not a number its field accepts is kept verbatim in the
    /// opaque bag, so views fall back to the schema default and the text
    /// is written back unchanged.
    pub fn insert_raw(&mut self, id: &str, raw: &str) -> Result<()> {
        let schema = schema();
        if let Some(reason) = schema.topology_violation(id) {
            return Err(KickError::SchemaMismatch(reason));
        }
        let typed = schema.get(id).and_then(|descriptor| match raw.trim().parse::<f64>() {
            Ok(value) if descriptor.accepts(value) => Some((descriptor, value)),
            Ok(value) => {
                warn!(id, value, kind = ?descriptor.kind, "value outside the field's domain, keeping it as text");
                None
            }
            Err(_) => {
                warn!(id, raw, "non-numeric value for a modeled parameter, keeping it as text");
                None
            }
        });

        if self.contains(id) {
            warn!(id, "duplicate parameter, keeping the last value");
            self.known.remove(id);
            self.opaque.remove(id);
        } else {
            self.order.push(id.to_string());
        }

        match typed {
            Some((descriptor, value)) => {
                self.known.insert(
                    id.to_string(),
                    Parameter {
                        id: id.to_string(),
                        value,
                        descriptor,
                        raw: raw.to_string(),
                    },
                );
            }
            None => {
                self.opaque.insert(id.to_string(), raw.to_string());
            }
        }
        Ok(())
    }

    /// Set a modeled parameter, appending it if the set does not hold it yet.
    /// A value kept as text on read is replaced in place.
    pub fn set(&mut self, id: &str, value: f64) -> Result<()> {
        let descriptor = schema()
            .get(id)
            .ok_or_else(|| KickError::SchemaMismatch(format!("'{id}' is not a modeled parameter")))?;
        if !descriptor.accepts(value) {
            return Err(KickError::SchemaMismatch(format!(
                "value {value} is not a valid {:?} for '{id}'",
                descriptor.kind
            )));
        }
        if let Some(param) = self.known.get_mut(id) {
            param.value = value;
            param.raw = format_value(value);
            return Ok(());
        }
        if self.opaque.remove(id).is_none() {
            self.order.push(id.to_string());
        }
        self.known.insert(
            id.to_string(),
            Parameter {
                id: id.to_string(),
                value,
                descriptor,
                raw: format_value(value),
            },
        );
        Ok(())
    }

    pub fn set_bool(&mut self, id: &str, value: bool) -> Result<()> {
        self.set(id, if value { 1.0 } else { 0.0 })
    }

    /// Value of a modeled parameter, if present.
    pub fn get(&self, id: &str) -> Option<f64> {
        self.known.get(id).map(|p| p.value)
    }

    /// Value of a modeled parameter, falling back to the schema default.
    pub fn get_or_default(&self, id: &str) -> f64 {
        self.get(id).unwrap_or_else(|| schema().default_of(id))
    }

    pub fn get_bool(&self, id: &str) -> bool {
        self.get_or_default(id) != 0.0
    }

    pub fn parameter(&self, id: &str) -> Option<&Parameter> {
        self.known.get(id)
    }

    /// Raw text of any parameter, modeled or opaque.
    pub fn raw(&self, id: &str) -> Option<&str> {
        self.known
            .get(id)
            .map(|p| p.raw.as_str())
            .or_else(|| self.opaque.get(id).map(String::as_str))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.known.contains_key(id) || self.opaque.contains_key(id)
    }

    pub fn is_opaque(&self, id: &str) -> bool {
        self.opaque.contains_key(id)
    }

    /// All parameters as `(id, raw)` in document order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order.iter().filter_map(|id| self.raw(id).map(|raw| (id.as_str(), raw)))
    }

    /// Opaque parameters as `(id, raw)` in document order.
    pub fn opaque(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order
            .iter()
            .filter_map(|id| self.opaque.get(id).map(|raw| (id.as_str(), raw.as_str())))
    }

    /// Numeric values of every parameter whose identifier starts with
    /// `prefix`, in document order. Non-numeric opaque values are skipped.
    pub fn numeric_with_prefix(&self, prefix: &str) -> Vec<(String, f64)> {
        self.iter()
            .filter(|(id, _)| id.starts_with(prefix))
            .filter_map(|(id, raw)| raw.trim().parse().ok().map(|v| (id.to_string(), v)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Text form of a value written by this crate: integral values keep one
/// decimal (`300.0`), others use the shortest round-trip form.
pub fn format_value(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_opaque_are_separated() {
        let mut set = ParameterSet::new();
        set.insert_raw("masterLength", "300").unwrap();
        set.insert_raw("Comp_Attack", "0.25").unwrap();
        set.insert_raw("Slot1SamplePath", "C:/kicks/click.wav").unwrap();

        assert_eq!(set.get("masterLength"), Some(300.0));
        assert_eq!(set.get("Comp_Attack"), None, "unknown ids are not typed");
        assert!(set.is_opaque("Comp_Attack"));
        assert_eq!(set.raw("Slot1SamplePath"), Some("C:/kicks/click.wav"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn raw_text_survives_until_set() {
        let mut set = ParameterSet::new();
        set.insert_raw("outGain", "0.000000").unwrap();
        assert_eq!(set.raw("outGain"), Some("0.000000"));
        set.set("outGain", -3.5).unwrap();
        assert_eq!(set.raw("outGain"), Some("-3.5"));
        assert_eq!(set.get("outGain"), Some(-3.5));
    }

    #[test]
    fn order_is_document_order() {
        let mut set = ParameterSet::new();
        for (id, raw) in [("tuning", "0"), ("Zeta", "1"), ("gate", "0"), ("Alpha", "x")] {
            set.insert_raw(id, raw).unwrap();
        }
        set.set("masterLength", 150.0).unwrap();
        let ids: Vec<_> = set.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, ["tuning", "Zeta", "gate", "Alpha", "masterLength"]);
        let opaque: Vec<_> = set.opaque().map(|(id, _)| id).collect();
        assert_eq!(opaque, ["Zeta", "Alpha"]);
    }

    #[test]
    fn duplicates_keep_first_position_last_value() {
        let mut set = ParameterSet::new();
        set.insert_raw("gate", "0").unwrap();
        set.insert_raw("tuning", "1").unwrap();
        set.insert_raw("gate", "1").unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("gate"), Some(1.0));
        assert_eq!(set.iter().next(), Some(("gate", "1")));
    }

    #[test]
    fn schema_violations_are_rejected() {
        let mut set = ParameterSet::new();
        assert!(matches!(set.insert_raw("Slot6Type", "1"), Err(KickError::SchemaMismatch(_))));
        assert!(matches!(set.set("NotModeled", 1.0), Err(KickError::SchemaMismatch(_))));
        assert!(matches!(set.set("Slot1Type", 4.0), Err(KickError::SchemaMismatch(_))));
        assert!(set.is_empty());
    }

    #[test]
    fn out_of_domain_values_are_kept_as_text() {
        let mut set = ParameterSet::new();
        set.insert_raw("Slot1Type", "3.0").unwrap();
        set.insert_raw("Slot1Mute", "0.5").unwrap();
        set.insert_raw("masterLength", "long").unwrap();

        assert_eq!(set.get("Slot1Type"), None);
        assert!(set.is_opaque("Slot1Mute"));
        assert_eq!(set.raw("masterLength"), Some("long"));
        assert_eq!(set.get_or_default("masterLength"), 300.0);

        set.set("Slot1Type", 1.0).unwrap();
        assert_eq!(set.get("Slot1Type"), Some(1.0));
        assert!(!set.is_opaque("Slot1Type"));
        let ids: Vec<_> = set.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, ["Slot1Type", "Slot1Mute", "masterLength"]);
    }

    #[test]
    fn a_later_valid_duplicate_replaces_a_text_value() {
        let mut set = ParameterSet::new();
        set.insert_raw("gate", "2").unwrap();
        set.insert_raw("gate", "1").unwrap();
        assert_eq!(set.get("gate"), Some(1.0));
        assert!(!set.is_opaque("gate"));
        assert_eq!(set.iter().collect::<Vec<_>>(), [("gate", "1")]);
    }

    #[test]
    fn defaults_fill_missing_values() {
        let set = ParameterSet::new();
        assert_eq!(set.get_or_default("masterLength"), 300.0);
        assert!(!set.get_bool("Lim_Enable"));
    }

    #[test]
    fn prefix_query_reads_opaque_numbers() {
        let mut set = ParameterSet::new();
        set.insert_raw("EQLowGain", "1.5").unwrap();
        set.insert_raw("EQMode", "shelf").unwrap();
        set.insert_raw("EQHighGain", "-2").unwrap();
        assert_eq!(
            set.numeric_with_prefix("EQ"),
            vec![("EQLowGain".to_string(), 1.5), ("EQHighGain".to_string(), -2.0)]
        );
    }

    #[test]
    fn value_formatting() {
        assert_eq!(format_value(150.0), "150.0");
        assert_eq!(format_value(0.79), "0.79");
        assert_eq!(format_value(-0.0), "-0.0");
        assert_eq!(format_value(1.0 / 3.0).parse::<f64>().unwrap(), 1.0 / 3.0);
    }
}
