//! Small fixed-state DSP sections used by the synthesis engine.
//!
//! All sections are single-sample `step` filters with a few f32 state
//! words, so the whole synthesis state fits comfortably in scratch
//! memory. Invalid configuration parameters degrade to passthrough
//! rather than erroring: the values come out of the voice resource and
//! a broken unit should produce dull audio, not a fault.

use core::f32::consts::PI;

use rand::Rng;

use crate::math::{cosf, expf, powf, sqrtf};

/// A first-order IIR LP filter.
///
/// Filter function: `y[n] = a * x[n] + b * y[n-1]`, with `b` derived
/// from a requested gain `g` at frequency `f`:
/// ```text
///    q = (1 - g^2 * cos(w)) / (1 - g^2),  w = 2*PI*f / sample_rate
///    b = q - sqrt(q^2 - 1)
///    a = (1 - b) * extra_gain
/// ```
#[derive(Debug, Clone)]
pub(crate) struct LowPass {
    a: f32,
    b: f32,
    /// y[n-1], last output value
    y1: f32,
    passthrough: bool,
}

impl LowPass {
    pub fn new() -> Self {
        LowPass {
            a: 0.0,
            b: 0.0,
            y1: 0.0,
            passthrough: true,
        }
    }

    /// Adjusts the filter parameters without resetting the inner state.
    /// `g` is the gain at frequency `f` (0..1); `extra_gain` is the
    /// resulting DC gain.
    pub fn configure(&mut self, f: f32, g: f32, extra_gain: f32, sample_rate: f32) {
        if f <= 0.0 || f >= sample_rate / 2.0 || g <= 0.0 || g >= 1.0 {
            self.set_passthrough();
            return;
        }
        let w = 2.0 * PI * f / sample_rate;
        let q = (1.0 - g * g * cosf(w)) / (1.0 - g * g);
        self.b = q - sqrtf(q * q - 1.0);
        self.a = (1.0 - self.b) * extra_gain;
        self.passthrough = false;
    }

    pub fn set_passthrough(&mut self) {
        self.passthrough = true;
        self.y1 = 0.0;
    }

    pub fn reset(&mut self) {
        self.y1 = 0.0;
    }

    pub fn step(&mut self, x: f32) -> f32 {
        if self.passthrough {
            return x;
        }
        let y = self.a * x + self.b * self.y1;
        self.y1 = y;
        y
    }
}

/// A second-order IIR resonator with unit DC gain.
///
/// Filter function: `y[n] = a * x[n] + b * y[n-1] + c * y[n-2]` with
/// ```text
///    r = exp(-PI * bw / sample_rate)
///    c = -r^2
///    b = 2 * r * cos(2*PI*f / sample_rate)
///    a = 1 - b - c
/// ```
#[derive(Debug, Clone)]
pub(crate) struct Resonator {
    a: f32,
    b: f32,
    c: f32,
    /// y[n-1], last output value
    y1: f32,
    /// y[n-2], second-last output value
    y2: f32,
    passthrough: bool,
}

impl Resonator {
    pub fn new() -> Self {
        Resonator {
            a: 0.0,
            b: 0.0,
            c: 0.0,
            y1: 0.0,
            y2: 0.0,
            passthrough: true,
        }
    }

    /// Adjusts the resonance without resetting the inner state. Out of
    /// range parameters turn the section into a passthrough.
    pub fn configure(&mut self, f: f32, bw: f32, sample_rate: f32) {
        if f < 0.0 || f >= sample_rate / 2.0 || bw <= 0.0 {
            self.set_passthrough();
            return;
        }
        let r = expf(-PI * bw / sample_rate);
        let w = 2.0 * PI * f / sample_rate;
        self.c = -(r * r);
        self.b = 2.0 * r * cosf(w);
        self.a = 1.0 - self.b - self.c;
        self.passthrough = false;
    }

    pub fn set_passthrough(&mut self) {
        self.passthrough = true;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    pub fn reset(&mut self) {
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    pub fn step(&mut self, x: f32) -> f32 {
        if self.passthrough {
            return x;
        }
        let y = self.a * x + self.b * self.y1 + self.c * self.y2;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

/// Returns a random number within the range -1 .. 1.
pub(crate) fn white_noise<R: Rng>(rng: &mut R) -> f32 {
    rng.random_range(-1.0..=1.0)
}

/// A low-pass filtered noise source for aspiration and frication.
///
/// The coloring reproduces a first-order LP filter with b=0.75 at a
/// 10 kHz rate, rebuilt for the actual sample rate, with the amplitude
/// compensated for an output range of roughly -1 .. +1.
#[derive(Debug, Clone)]
pub(crate) struct NoiseSource {
    lp: LowPass,
}

impl NoiseSource {
    pub fn new(sample_rate: f32) -> Self {
        let old_b = 0.75_f32;
        let old_sample_rate = 10_000.0_f32;
        let f = 1000.0_f32;
        let g = (1.0 - old_b)
            / sqrtf(1.0 - 2.0 * old_b * cosf(2.0 * PI * f / old_sample_rate) + old_b * old_b);
        let extra_gain = 2.5 * powf(sample_rate / 10_000.0, 0.33);

        let mut lp = LowPass::new();
        lp.configure(f, g, extra_gain, sample_rate);
        NoiseSource { lp }
    }

    pub fn reset(&mut self) {
        self.lp.reset();
    }

    /// Returns an LP-filtered random number.
    pub fn step<R: Rng>(&mut self, rng: &mut R) -> f32 {
        self.lp.step(white_noise(rng))
    }
}

/// Generates a "natural" glottal source signal according to the
/// KLGLOTT88 model. Formula of the glottal flow: `t^2 - t^3`; the
/// derivative `2*t - 3*t^2` is used as the source.
#[derive(Debug, Clone)]
pub(crate) struct GlottalSource {
    /// current signal value
    x: f32,
    /// current first derivative
    a: f32,
    /// current second derivative
    b: f32,
    /// open glottis phase length in samples
    open_phase_length: usize,
    /// current sample position within the F0 period
    position_in_period: usize,
}

impl GlottalSource {
    pub fn new() -> Self {
        GlottalSource {
            x: 0.0,
            a: 0.0,
            b: 0.0,
            open_phase_length: 0,
            position_in_period: 0,
        }
    }

    /// Starts a new F0 period with the given open-glottis phase length
    /// in samples. A zero length silences the source for the period.
    pub fn start_period(&mut self, open_phase_length: usize) {
        self.open_phase_length = open_phase_length;
        self.x = 0.0;
        if open_phase_length == 0 {
            self.a = 0.0;
            self.b = 0.0;
        } else {
            let amplification = 5.0;
            let open = open_phase_length as f32;
            self.b = -amplification / (open * open);
            self.a = -self.b * open / 3.0;
        }
        self.position_in_period = 0;
    }

    pub fn step(&mut self) -> f32 {
        self.position_in_period += 1;
        if self.position_in_period >= self.open_phase_length {
            self.x = 0.0;
            return 0.0;
        }
        self.a += self.b;
        self.x += self.a;
        self.x
    }

    /// True while the glottis is within the open phase of the period.
    pub fn is_open(&self) -> bool {
        self.position_in_period < self.open_phase_length
    }
}
