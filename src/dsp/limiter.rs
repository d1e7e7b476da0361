//! Soft limiter: keeps the rendered kick under a threshold without hard clipping.
//!
//! Gain is computed ahead of time: each frame uses the smallest gain any
//! frame in the lookahead window asks for, attacks over the lookahead
//! window and releases smoothly. A rational knee just under the threshold
//! catches whatever the smoothed gain lets through.

use serde::{Deserialize, Serialize};

/// Fraction of the threshold where the soft knee begins.
const KNEE: f64 = 0.1;

/// Limiter parameters in physical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterSettings {
    /// Ceiling in dB (values above 0 are treated as 0).
    pub threshold_db: f64,
    /// Lookahead window in milliseconds.
    pub lookahead_ms: f64,
    /// Release time in milliseconds.
    pub release_ms: f64,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            threshold_db: 0.0,
            lookahead_ms: 1.0,
            release_ms: 10.0,
        }
    }
}

impl LimiterSettings {
    /// Map preset limiter values: `Lim_Lookahead` in ms, `Lim_Release` in
    /// tens of ms.
    pub fn from_preset(limiter: &crate::preset::model::Limiter) -> Self {
        Self {
            threshold_db: limiter.threshold_db,
            lookahead_ms: limiter.lookahead.max(0.0),
            release_ms: limiter.release.max(0.0) * 10.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SoftLimiter {
    threshold: f64,
    lookahead: usize,
    attack_coef: f64,
    release_coef: f64,
}

impl SoftLimiter {
    pub fn new(sample_rate: f64, settings: &LimiterSettings) -> Self {
        let lookahead = (settings.lookahead_ms * sample_rate / 1000.0).round().max(1.0) as usize;
        let release_samples = (settings.release_ms * sample_rate / 1000.0).max(1.0);
        Self {
            threshold: db_to_linear(settings.threshold_db.min(0.0)),
            lookahead,
            attack_coef: (-1.0 / lookahead as f64).exp(),
            release_coef: (-1.0 / release_samples).exp(),
        }
    }

    /// Threshold as a linear amplitude.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Gain needed to bring `level` under the threshold, with a soft knee.
    #[inline]
    fn target_gain(&self, level: f64) -> f64 {
        let knee_start = self.threshold * (1.0 - KNEE);
        if level > self.threshold {
            self.threshold / level
        } else if level > knee_start {
            let blend = (level - knee_start) / (self.threshold - knee_start);
            1.0 - blend * (1.0 - self.threshold / level)
        } else {
            1.0
        }
    }

    /// Bend anything above the knee asymptotically toward the threshold.
    #[inline]
    fn soft_ceiling(&self, x: f64) -> f64 {
        let knee_start = self.threshold * (1.0 - KNEE);
        let level = x.abs();
        if level <= knee_start {
            return x;
        }
        let span = self.threshold - knee_start;
        let over = (level - knee_start) / span;
        let bent = knee_start + span * over / (1.0 + over);
        bent.copysign(x)
    }

    /// Limit channel buffers in place. Gain is linked across channels.
    pub fn process(&self, channels: &mut [Vec<f64>]) {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        if frames == 0 {
            return;
        }

        let required: Vec<f64> = (0..frames)
            .map(|i| {
                let level = channels.iter().map(|c| c[i].abs()).fold(0.0, f64::max);
                self.target_gain(level)
            })
            .collect();

        let mut gain = 1.0;
        for i in 0..frames {
            let window_end = (i + self.lookahead + 1).min(frames);
            let target = required[i..window_end].iter().copied().fold(1.0, f64::min);
            let coef = if target < gain {
                self.attack_coef
            } else {
                self.release_coef
            };
            gain = coef * gain + (1.0 - coef) * target;
            for channel in channels.iter_mut() {
                channel[i] = self.soft_ceiling(channel[i] * gain);
            }
        }
    }
}

#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

#[inline]
pub fn linear_to_db(linear: f64) -> f64 {
    if linear <= 0.0 {
        -120.0
    } else {
        20.0 * linear.log10()
    }
}
