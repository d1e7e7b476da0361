//! Kick renderer: turns slot envelopes into a sampled waveform and WAV bytes.
//!
//! Each voice follows the same pipeline: a time axis sized from the slot
//! length, the pitch envelope scaled to Hz and integrated into phase, the
//! amplitude envelope multiplied in. The mixed result optionally goes
//! through the soft limiter and is then peak-normalized.

use std::io::Cursor;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::envelope::Curve;
use super::limiter::{LimiterSettings, SoftLimiter};
use super::mixer::Mixer;
use super::oscillator::{NoiseBurst, PhaseIntegrator, noise_seed};
use crate::error::{KickError, Result};
use crate::preset::model::{Envelope, EnvelopeKind, SlotType};
use crate::preset::tree::PresetTree;

/// Peak level after normalization, just under full scale.
pub const NORMALIZE_PEAK: f64 = 0.89;

/// Longest buffer a render may allocate, in ms.
pub const MAX_DURATION_MS: f64 = 60_000.0;

/// Highest accepted output sample rate.
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Number of samples covering `duration_ms` at `sample_rate`, rounded up.
pub fn sample_count(duration_ms: f64, sample_rate: u32) -> usize {
    if !(duration_ms > 0.0) || !duration_ms.is_finite() || sample_rate == 0 {
        return 0;
    }
    (duration_ms * sample_rate as f64 / 1000.0).ceil() as usize
}

/// Reject render lengths above [`MAX_DURATION_MS`].
pub fn check_duration(duration_ms: f64) -> Result<()> {
    if duration_ms > MAX_DURATION_MS {
        return Err(KickError::range("render length ms", duration_ms as usize, 0, MAX_DURATION_MS as usize));
    }
    Ok(())
}

/// Sample times in seconds for `duration_ms` at `sample_rate`.
pub fn time_axis(duration_ms: f64, sample_rate: u32) -> Vec<f64> {
    let n = sample_count(duration_ms, sample_rate);
    let sr = sample_rate as f64;
    (0..n).map(|i| i as f64 / sr).collect()
}

/// Instantaneous frequency in Hz at each of `n` samples.
pub fn frequency_trajectory(pitch: &Envelope, pitch_max_hz: f64, n: usize) -> Result<Vec<f64>> {
    let curve = Curve::new(&pitch.nodes)?;
    Ok(curve.sample(n).into_iter().map(|y| y * pitch_max_hz).collect())
}

/// What a voice oscillates with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoiceSource {
    Sine,
    /// Stand-in for sample audio, which is never decoded.
    NoiseBurst { seed: u64 },
}

/// One slot's worth of synthesis input.
#[derive(Debug, Clone, Copy)]
pub struct Voice<'a> {
    pub source: VoiceSource,
    pub pitch: &'a Envelope,
    pub pitch_max_hz: f64,
    pub amp: &'a Envelope,
    pub length_ms: f64,
}

impl<'a> Voice<'a> {
    pub fn sine(pitch: &'a Envelope, pitch_max_hz: f64, amp: &'a Envelope, length_ms: f64) -> Self {
        Voice {
            source: VoiceSource::Sine,
            pitch,
            pitch_max_hz,
            amp,
            length_ms,
        }
    }

    pub fn noise_burst(seed: u64, pitch: &'a Envelope, amp: &'a Envelope, length_ms: f64) -> Self {
        Voice {
            source: VoiceSource::NoiseBurst { seed },
            pitch,
            pitch_max_hz: 0.0,
            amp,
            length_ms,
        }
    }
}

/// A rendered multi-channel buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f64>>,
}

impl Waveform {
    pub fn mono(sample_rate: u32, samples: Vec<f64>) -> Self {
        Waveform {
            sample_rate,
            channels: vec![samples],
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest absolute sample over all channels.
    pub fn peak(&self) -> f64 {
        peak(&self.channels)
    }

    pub fn duration_ms(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 * 1000.0 / self.sample_rate as f64
    }
}

/// Renders voices at a fixed sample rate.
#[derive(Debug, Clone)]
pub struct Renderer {
    sample_rate: u32,
    limiter: Option<LimiterSettings>,
    normalize_peak: Option<f64>,
}

impl Renderer {
    /// No limiter, normalization to [`NORMALIZE_PEAK`].
    pub fn new(sample_rate: u32) -> Self {
        Renderer {
            sample_rate,
            limiter: None,
            normalize_peak: Some(NORMALIZE_PEAK),
        }
    }

    pub fn with_limiter(mut self, limiter: Option<LimiterSettings>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_normalize_peak(mut self, peak: Option<f64>) -> Self {
        self.normalize_peak = peak;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Raw voice: oscillator times amplitude envelope, before limiting and
    /// normalization.
    pub fn synthesize(&self, voice: &Voice<'_>) -> Result<Vec<f64>> {
        check_duration(voice.length_ms)?;
        let n = sample_count(voice.length_ms, self.sample_rate);
        let amp = Curve::new(&voice.amp.nodes)?.sample(n);
        let sr = self.sample_rate as f64;

        let samples = match voice.source {
            VoiceSource::Sine => {
                let freqs = frequency_trajectory(voice.pitch, voice.pitch_max_hz, n)?;
                let mut osc = PhaseIntegrator::new(sr);
                freqs
                    .iter()
                    .zip(&amp)
                    .map(|(&f, &a)| osc.next_sample(f) * a)
                    .collect()
            }
            VoiceSource::NoiseBurst { seed } => {
                Curve::new(&voice.pitch.nodes)?;
                let mut noise = NoiseBurst::new(seed, sr);
                amp.iter().map(|&a| noise.next_sample() * a).collect()
            }
        };
        Ok(samples)
    }

    /// A single voice through the whole pipeline.
    pub fn render_voice(&self, voice: &Voice<'_>) -> Result<Vec<f64>> {
        let mut channels = vec![self.synthesize(voice)?];
        self.finish(&mut channels);
        Ok(channels.pop().unwrap_or_default())
    }

    /// Limit (when configured) and normalize mixed channels in place.
    pub fn finish(&self, channels: &mut [Vec<f64>]) {
        if let Some(settings) = &self.limiter {
            let limiter = SoftLimiter::new(self.sample_rate as f64, settings);
            debug!(threshold = limiter.threshold(), "applying soft limiter");
            limiter.process(channels);
        }
        if let Some(target) = self.normalize_peak {
            normalize(channels, target);
        }
    }
}

/// Render one sine voice: pitch envelope scaled by `pitch_max_hz`,
/// amplitude envelope spanning `amp_max_len_ms`, peak-normalized.
pub fn render(
    pitch: &Envelope,
    pitch_max_hz: f64,
    amp: &Envelope,
    amp_max_len_ms: f64,
    sample_rate: u32,
) -> Result<Vec<f64>> {
    Renderer::new(sample_rate).render_voice(&Voice::sine(pitch, pitch_max_hz, amp, amp_max_len_ms))
}

fn peak(channels: &[Vec<f64>]) -> f64 {
    channels
        .iter()
        .flatten()
        .fold(0.0_f64, |m, s| m.max(s.abs()))
}

/// Scale so the loudest sample sits at `target`. Silence stays silent.
fn normalize(channels: &mut [Vec<f64>], target: f64) {
    let peak = peak(channels);
    if peak <= 0.0 || !peak.is_finite() {
        return;
    }
    let scale = target / peak;
    for s in channels.iter_mut().flatten() {
        *s *= scale;
    }
}

// ── Whole-preset rendering ──────────────────────────────────

/// Output settings for preset rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub sample_rate: u32,
    /// 1 (mono) or 2 (stereo).
    pub channels: u16,
    /// 16, 24 or 32.
    pub bit_depth: u16,
    /// Run the preset's limiter when `Lim_Enable` is set.
    pub use_preset_limiter: bool,
    pub normalize_peak: f64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            sample_rate: 44100,
            channels: 1,
            bit_depth: 24,
            use_preset_limiter: true,
            normalize_peak: NORMALIZE_PEAK,
        }
    }
}

impl RenderOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        let options: RenderOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.sample_rate > MAX_SAMPLE_RATE {
            return Err(KickError::UnsupportedFormat(format!(
                "sample rate {} outside 1..={MAX_SAMPLE_RATE}",
                self.sample_rate
            )));
        }
        check_channels(self.channels as usize)?;
        check_bit_depth(self.bit_depth)?;
        if !(self.normalize_peak > 0.0 && self.normalize_peak <= 1.0) {
            return Err(KickError::UnsupportedFormat(format!(
                "normalize peak {} outside (0, 1]",
                self.normalize_peak
            )));
        }
        Ok(())
    }
}

fn check_channels(channels: usize) -> Result<()> {
    match channels {
        1 | 2 => Ok(()),
        n => Err(KickError::UnsupportedFormat(format!("{n} channels, expected 1 or 2"))),
    }
}

fn check_bit_depth(bit_depth: u16) -> Result<()> {
    match bit_depth {
        16 | 24 | 32 => Ok(()),
        n => Err(KickError::UnsupportedFormat(format!("{n}-bit PCM, expected 16, 24 or 32"))),
    }
}

/// Render every sounding slot of a preset into one waveform.
///
/// The buffer spans `masterLength`. Slots use their own `AmpEnvMaxLen`
/// unless single-length mode is on. When any sounding slot is soloed, only
/// soloed slots are mixed. A sounding slot without envelopes uses the
/// fallback shapes for its type.
#[instrument(skip(tree), fields(sample_rate = options.sample_rate, channels = options.channels))]
pub fn render_preset(tree: &PresetTree, options: &RenderOptions) -> Result<Waveform> {
    options.validate()?;
    let master = tree.master();
    check_duration(master.length_ms)?;
    let frames = sample_count(master.length_ms, options.sample_rate);
    let slots = tree.slots();
    let any_solo = slots.iter().any(|s| s.is_active() && s.soloed);

    let preset_limiter = tree.limiter();
    let limiter = (options.use_preset_limiter && preset_limiter.enabled)
        .then(|| LimiterSettings::from_preset(&preset_limiter));
    let renderer = Renderer::new(options.sample_rate)
        .with_limiter(limiter)
        .with_normalize_peak(Some(options.normalize_peak));

    let mut mixer = Mixer::new(frames, options.channels as usize);
    for slot in &slots {
        let flat = slot.index.flat();
        if !slot.is_active() {
            debug!(slot = flat, "slot is off or muted");
            continue;
        }
        if any_solo && !slot.soloed {
            debug!(slot = flat, "slot silenced by solo");
            continue;
        }
        let fallback = |kind: EnvelopeKind| {
            warn!(slot = flat, %kind, "sounding slot has no envelope, using the default shape");
            Envelope::fallback(slot.slot_type, kind).unwrap_or_default()
        };
        let pitch = slot.pitch.clone().unwrap_or_else(|| fallback(EnvelopeKind::Pitch));
        let amp = slot.amp.clone().unwrap_or_else(|| fallback(EnvelopeKind::Amp));
        let (pitch, amp) = (&pitch, &amp);

        let length_ms = if master.single_length_mode {
            master.length_ms
        } else {
            slot.amp_max_len_ms
        };
        let voice = match slot.slot_type {
            SlotType::Sample => {
                debug!(slot = flat, "sample slot rendered as noise burst");
                let seed = noise_seed(slot.index.tree(), options.sample_rate, length_ms);
                Voice::noise_burst(seed, pitch, amp, length_ms)
            }
            _ => {
                let transpose = master.tuning_semitones + slot.pitch_semitones;
                let pitch_max_hz = slot.pitch_max_hz * 2f64.powf(transpose / 12.0);
                Voice::sine(pitch, pitch_max_hz, amp, length_ms)
            }
        };
        let samples = renderer.synthesize(&voice)?;
        mixer.add(&samples, slot.gain_db, slot.pan);
    }

    let mut channels = mixer.output(master.output_gain_db, master.pan);
    renderer.finish(&mut channels);
    Ok(Waveform {
        sample_rate: options.sample_rate,
        channels,
    })
}

/// Render a preset and encode it as WAV.
pub fn render_wav(tree: &PresetTree, options: &RenderOptions) -> Result<Vec<u8>> {
    let waveform = render_preset(tree, options)?;
    encode_wav(&waveform, options.bit_depth)
}

/// Encode a waveform as interleaved integer PCM WAV.
pub fn encode_wav(waveform: &Waveform, bit_depth: u16) -> Result<Vec<u8>> {
    check_bit_depth(bit_depth)?;
    check_channels(waveform.channel_count())?;
    if waveform.sample_rate == 0 {
        return Err(KickError::UnsupportedFormat("sample rate must be positive".into()));
    }

    let spec = hound::WavSpec {
        channels: waveform.channel_count() as u16,
        sample_rate: waveform.sample_rate,
        bits_per_sample: bit_depth,
        sample_format: hound::SampleFormat::Int,
    };
    let full_scale = ((1_i64 << (bit_depth - 1)) - 1) as f64;

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
    for i in 0..waveform.len() {
        for channel in &waveform.channels {
            let s = channel.get(i).copied().unwrap_or(0.0).clamp(-1.0, 1.0);
            writer.write_sample((s * full_scale).round() as i32)?;
        }
    }
    writer.finalize()?;
    Ok(cursor.into_inner())
}
