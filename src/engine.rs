//! Block synthesis of the compiled phonetic program.
//!
//! The engine renders one syllable at a time with a source-filter
//! model: a KLGLOTT88 glottal source (or colored noise for unvoiced
//! units) driven through the cascade of resonators described by the
//! syllable's [`VoiceUnit`]. Pitch contours for the Mandarin tones are
//! applied at F0 period boundaries so no discontinuity is introduced
//! mid-period. All mutable state lives in [`SynthState`], which the
//! session keeps inside scratch memory for the duration of one stream.

use rand::Rng;

use crate::dsp::{GlottalSource, NoiseSource, Resonator};
use crate::voice::{MAX_FORMANTS, Syllable, Voice, VoiceUnit};

/// Output sample rate of the synthesis engine in Hz.
pub const SAMPLE_RATE: usize = 16_000;

/// Samples per synthesized PCM block (20 ms at 16 kHz).
pub const BLOCK_LEN: usize = 320;

/// Attack/release envelope edge length in samples (8 ms).
const EDGE_LEN: usize = 128;

/// Output scaling from the unit-range filter chain to i16 PCM.
const PCM_GAIN: f32 = 12_000.0;

const MS_TO_SAMPLES: usize = SAMPLE_RATE / 1000;

/// Per-stream synthesis state. Lives in scratch buffer 1.
#[derive(Debug, Clone)]
pub(crate) struct SynthState {
    /// a syllable is currently being rendered
    active: bool,
    /// sample position within the current syllable (incl. pause)
    sample_pos: usize,
    /// phonation length in samples
    voiced_len: usize,
    /// phonation plus trailing pause, in samples
    total_len: usize,
    base_f0: f32,
    tone: u8,
    amplitude: f32,
    aspiration: f32,
    voiced: bool,
    /// current F0 period length in samples
    period_len: usize,
    /// sample position within the current F0 period
    period_pos: usize,
    glottal: GlottalSource,
    noise: NoiseSource,
    formants: [Resonator; MAX_FORMANTS],
}

impl SynthState {
    pub fn new() -> Self {
        SynthState {
            active: false,
            sample_pos: 0,
            voiced_len: 0,
            total_len: 0,
            base_f0: 0.0,
            tone: 0,
            amplitude: 0.0,
            aspiration: 0.0,
            voiced: false,
            period_len: 0,
            period_pos: 0,
            glottal: GlottalSource::new(),
            noise: NoiseSource::new(SAMPLE_RATE as f32),
            formants: [
                Resonator::new(),
                Resonator::new(),
                Resonator::new(),
                Resonator::new(),
            ],
        }
    }

    pub fn clear(&mut self) {
        *self = SynthState::new();
    }

    fn start_syllable(&mut self, unit: &VoiceUnit, tone: u8) {
        self.voiced_len = usize::from(unit.duration_ms).max(1) * MS_TO_SAMPLES;
        self.total_len = self.voiced_len + usize::from(unit.pause_ms) * MS_TO_SAMPLES;
        self.base_f0 = unit.f0;
        self.tone = tone;
        self.amplitude = unit.amplitude;
        self.aspiration = unit.aspiration;
        self.voiced = unit.f0 > 0.0;
        self.sample_pos = 0;
        self.period_len = 0;
        self.period_pos = 0;
        self.noise.reset();
        for (section, formant) in self.formants.iter_mut().zip(&unit.formants) {
            // frequency 0 marks an unused slot; configure degrades it
            // to passthrough
            section.configure(formant.frequency, formant.bandwidth, SAMPLE_RATE as f32);
            section.reset();
        }
        self.active = true;
    }

    /// Recomputes F0 from the tone contour and starts a new glottal
    /// period. Only called at period boundaries.
    fn start_period(&mut self, tune: u8) {
        let t = self.sample_pos as f32 / self.voiced_len as f32;
        let f0 = (self.base_f0 * tone_contour(self.tone, t) * f32::from(tune) / 8.0)
            .clamp(40.0, 500.0);
        self.period_len = (SAMPLE_RATE as f32 / f0) as usize;
        self.period_pos = 0;
        // 60% open phase, typical for modal voice
        self.glottal.start_period(self.period_len * 3 / 5);
    }

    fn next_sample<R: Rng>(&mut self, rng: &mut R, tune: u8) -> i16 {
        let out = if self.sample_pos >= self.voiced_len {
            0.0
        } else {
            let source = if self.voiced {
                if self.period_pos >= self.period_len {
                    self.start_period(tune);
                }
                self.period_pos += 1;
                let voice = self.glottal.step();
                // breathiness only while the glottis is open
                let breath = if self.glottal.is_open() {
                    self.noise.step(rng) * self.aspiration
                } else {
                    0.0
                };
                voice + breath
            } else {
                self.noise.step(rng) * (0.5 + self.aspiration)
            };

            let mut v = source;
            for section in &mut self.formants {
                v = section.step(v);
            }
            v * self.amplitude * self.envelope()
        };
        self.sample_pos += 1;
        (out.clamp(-1.0, 1.0) * PCM_GAIN) as i16
    }

    /// Linear attack/release ramp over the phonation.
    fn envelope(&self) -> f32 {
        let attack = self.sample_pos as f32 / EDGE_LEN as f32;
        let release = (self.voiced_len - self.sample_pos) as f32 / EDGE_LEN as f32;
        attack.min(release).min(1.0)
    }
}

/// Pitch multiplier for the Mandarin tones at relative position
/// `t` (0..1) within the syllable. Anything outside 1..=4 is neutral.
fn tone_contour(tone: u8, t: f32) -> f32 {
    match tone {
        // high level
        1 => 1.15,
        // rising
        2 => 0.85 + 0.40 * t,
        // dipping: down to the low point at mid-syllable, then up
        3 => {
            if t < 0.5 {
                0.95 - 0.60 * t
            } else {
                0.65 + 0.70 * (t - 0.5)
            }
        }
        // falling
        4 => 1.30 - 0.50 * t,
        _ => 0.95,
    }
}

/// Synthesizes the next PCM block of the program into `block`,
/// returning the sample count. Zero means the program is exhausted.
pub(crate) fn synth_block<R: Rng>(
    voice: &dyn Voice,
    queue: &[Syllable],
    cursor: &mut usize,
    tune: u8,
    rng: &mut R,
    state: &mut SynthState,
    block: &mut [i16; BLOCK_LEN],
) -> usize {
    let mut n = 0;
    while n < BLOCK_LEN {
        if !state.active {
            let Some(&syllable) = queue.get(*cursor) else {
                break;
            };
            *cursor += 1;
            state.start_syllable(&voice.unit(syllable), syllable.tone);
        }
        block[n] = state.next_sample(rng, tune);
        n += 1;
        if state.sample_pos >= state.total_len {
            state.active = false;
        }
    }
    n
}
