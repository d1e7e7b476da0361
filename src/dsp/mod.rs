//! DSP: envelope interpolation, oscillators, mixing and the offline
//! renderer that turns a preset into audio.
//!
//! Everything is deterministic: the same preset and options always render
//! the same samples.

pub mod envelope;
pub mod limiter;
pub mod mixer;
pub mod oscillator;
pub mod renderer;
