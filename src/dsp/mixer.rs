//! Mixer: sums slot voices into mono or stereo output with gain and pan.

use std::f64::consts::{FRAC_PI_4, SQRT_2};

use super::limiter::db_to_linear;

/// Equal-power pan gains `(left, right)` for `pan` in [-1, 1], scaled so the
/// centre position is unity on both sides.
pub fn pan_gains(pan: f64) -> (f64, f64) {
    let pan = if pan.is_nan() { 0.0 } else { pan.clamp(-1.0, 1.0) };
    let angle = (pan + 1.0) * FRAC_PI_4;
    (angle.cos() * SQRT_2, angle.sin() * SQRT_2)
}

/// A summing mixer with a fixed frame count and one or two channels.
#[derive(Debug, Clone)]
pub struct Mixer {
    channels: Vec<Vec<f64>>,
}

impl Mixer {
    /// `channel_count` is 1 or 2; anything above 2 is mixed as stereo.
    pub fn new(frames: usize, channel_count: usize) -> Self {
        let channel_count = channel_count.clamp(1, 2);
        Mixer {
            channels: vec![vec![0.0; frames]; channel_count],
        }
    }

    /// Add a mono voice. Voices shorter than the mix are padded with
    /// silence, longer ones are cut. Pan is ignored for mono output.
    pub fn add(&mut self, voice: &[f64], gain_db: f64, pan: f64) {
        let gain = db_to_linear(gain_db);
        let (left, right) = pan_gains(pan);
        let stereo = self.channels.len() == 2;
        for (c, channel) in self.channels.iter_mut().enumerate() {
            let g = match (stereo, c) {
                (false, _) => gain,
                (true, 0) => gain * left,
                (true, _) => gain * right,
            };
            for (out, &s) in channel.iter_mut().zip(voice) {
                *out += s * g;
            }
        }
    }

    /// Mixed channels with master gain and, for stereo, master pan applied.
    pub fn output(self, master_gain_db: f64, master_pan: f64) -> Vec<Vec<f64>> {
        let gain = db_to_linear(master_gain_db);
        let (left, right) = pan_gains(master_pan);
        let stereo = self.channels.len() == 2;
        self.channels
            .into_iter()
            .enumerate()
            .map(|(c, channel)| {
                let g = match (stereo, c) {
                    (false, _) => gain,
                    (true, 0) => gain * left,
                    (true, _) => gain * right,
                };
                channel.into_iter().map(|s| s * g).collect()
            })
            .collect()
    }

    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
