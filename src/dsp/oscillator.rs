//! Sources for a slot voice: a phase-integrating sine and a seeded noise burst.

use std::f64::consts::{PI, TAU};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Sine oscillator driven by a per-sample frequency.
///
/// Phase is the running sum of `2π·f/sample_rate`, so frequency changes at
/// envelope node boundaries never produce a phase jump.
#[derive(Debug, Clone)]
pub struct PhaseIntegrator {
    phase: f64,
    sample_rate: f64,
}

impl PhaseIntegrator {
    pub fn new(sample_rate: f64) -> Self {
        PhaseIntegrator {
            phase: 0.0,
            sample_rate,
        }
    }

    /// Emit `sin(phase)` and advance by one sample at `frequency` Hz.
    pub fn next_sample(&mut self, frequency: f64) -> f64 {
        let sample = self.phase.sin();
        self.phase = (self.phase + TAU * frequency / self.sample_rate).rem_euclid(TAU);
        sample
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }
}

/// Cutoff of the noise burst's low-pass, capped below Nyquist.
pub const NOISE_CUTOFF_HZ: f64 = 4000.0;
/// Output level of the noise burst before the amplitude envelope.
pub const NOISE_LEVEL: f64 = 0.3;

/// Band-limited white noise: uniform samples through a one-pole low-pass.
#[derive(Debug, Clone)]
pub struct NoiseBurst {
    rng: StdRng,
    state: f64,
    alpha: f64,
}

impl NoiseBurst {
    pub fn new(seed: u64, sample_rate: f64) -> Self {
        let cutoff = NOISE_CUTOFF_HZ.min(0.45 * sample_rate);
        let rc = 1.0 / (2.0 * PI * cutoff);
        let dt = 1.0 / sample_rate;
        NoiseBurst {
            rng: StdRng::seed_from_u64(seed),
            state: 0.0,
            alpha: dt / (rc + dt),
        }
    }

    pub fn next_sample(&mut self) -> f64 {
        let white: f64 = self.rng.gen_range(-1.0..=1.0);
        self.state += self.alpha * (white - self.state);
        self.state * NOISE_LEVEL
    }
}

/// Derive a noise seed from the call parameters (SplitMix64 finalizer).
pub fn noise_seed(slot: usize, sample_rate: u32, length_ms: f64) -> u64 {
    let mut h = 0x9E37_79B9_7F4A_7C15_u64;
    for word in [slot as u64, u64::from(sample_rate), length_ms.to_bits()] {
        h = mix64(h ^ word);
    }
    h
}

fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
