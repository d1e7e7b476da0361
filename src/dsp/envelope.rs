//! Breakpoint envelope interpolation with per-segment curve tension.
//!
//! A segment starting at a node with tension `c` is warped by
//! `k = |c| * CURVE_SENSITIVITY`: negative tension moves early
//! (`1 - (1 - u)^(1 + k)`), positive tension moves late (`u^(1 + k)`),
//! zero tension is a straight line.

use crate::error::Result;
use crate::preset::model::{EnvelopeNode, validate_nodes};

/// Scales |tension| into the warp exponent offset.
pub const CURVE_SENSITIVITY: f64 = 5.0;

/// Apply a tension warp to a local segment fraction `u` in [0, 1].
pub fn warp(u: f64, tension: f64) -> f64 {
    let c = tension.clamp(-1.0, 1.0);
    if c == 0.0 {
        return u;
    }
    let exponent = 1.0 + c.abs() * CURVE_SENSITIVITY;
    if c < 0.0 {
        1.0 - (1.0 - u).powf(exponent)
    } else {
        u.powf(exponent)
    }
}

/// A validated node list that can be evaluated at any normalized time.
#[derive(Debug, Clone, Copy)]
pub struct Curve<'a> {
    nodes: &'a [EnvelopeNode],
}

impl<'a> Curve<'a> {
    pub fn new(nodes: &'a [EnvelopeNode]) -> Result<Self> {
        validate_nodes(nodes)?;
        Ok(Curve { nodes })
    }

    /// Value at normalized time `t` (clamped to [0, 1]).
    pub fn value_at(&self, t: f64) -> f64 {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let last_start = self.nodes.len() - 2;
        // Last segment start with x <= t; duplicate positions resolve to the later node.
        let i = self.nodes[..=last_start]
            .partition_point(|n| n.x <= t)
            .saturating_sub(1);
        self.segment_value(i, t)
    }

    /// Evaluate at `n` evenly spaced times `i / (n - 1)`.
    pub fn sample(&self, n: usize) -> Vec<f64> {
        if n == 0 {
            return Vec::new();
        }
        if n == 1 {
            return vec![self.value_at(0.0)];
        }
        let last_start = self.nodes.len() - 2;
        let denom = (n - 1) as f64;
        let mut segment = 0;
        (0..n)
            .map(|i| {
                let t = i as f64 / denom;
                while segment < last_start && self.nodes[segment + 1].x <= t {
                    segment += 1;
                }
                self.segment_value(segment, t)
            })
            .collect()
    }

    fn segment_value(&self, i: usize, t: f64) -> f64 {
        let a = &self.nodes[i];
        let b = &self.nodes[i + 1];
        // Reached the segment end (only possible on the final segment) or zero width.
        if t >= b.x {
            return b.y;
        }
        let width = b.x - a.x;
        if width <= 0.0 {
            return b.y;
        }
        let u = ((t - a.x) / width).clamp(0.0, 1.0);
        a.y + warp(u, a.c) * (b.y - a.y)
    }
}

/// Validate `nodes` and evaluate them at `t`.
pub fn interpolate(nodes: &[EnvelopeNode], t: f64) -> Result<f64> {
    Ok(Curve::new(nodes)?.value_at(t))
}
