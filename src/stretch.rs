//! Pitch-synchronous time stretching of 16-bit mono PCM.
//!
//! Playback speed is changed without shifting pitch by repeating or
//! dropping whole pitch periods and crossfading across the seam. The
//! period is measured per decision with an average magnitude
//! difference scan over the configured fundamental range, so voiced
//! speech keeps its harmonics intact at any speed in 0.5..=2.0.
//!
//! Like the rest of the crate the stretcher allocates nothing: the
//! analysis window lives in a caller buffer sized by [`context_size`].

use core::mem::size_of;

use thiserror::Error;

/// Run period detection on a 2:1 decimated signal, then refine at
/// full rate. Roughly halves analysis cost for a small accuracy loss.
pub const FAST_FLAG: u32 = 0x1;

/// Fundamental range in Hz covering typical speech, used when the
/// caller has no better estimate.
pub const DEFAULT_FREQ_RANGE: (u32, u32) = (55, 333);

const MIN_PERIOD: u32 = 24;
const MAX_PERIOD: u32 = 2400;

const MIN_SPEED: f32 = 0.5;
const MAX_SPEED: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StretchError {
    /// The frequency range maps to periods outside 24..=2400 samples
    /// at the given sample rate.
    #[error("unsupported fundamental frequency range")]
    UnsupportedRange,
    /// The caller buffer is smaller than [`context_size`] requires.
    #[error("stretch buffer too small")]
    BufferTooSmall,
}

fn periods(sample_rate: u32, lower_hz: u32, upper_hz: u32) -> Option<(usize, usize)> {
    if lower_hz == 0 || upper_hz <= lower_hz {
        return None;
    }
    let shortest = sample_rate / upper_hz;
    let longest = sample_rate / lower_hz;
    if shortest < MIN_PERIOD || longest > MAX_PERIOD || shortest >= longest {
        return None;
    }
    Some((shortest as usize, longest as usize))
}

/// Bytes of caller storage for a stretcher over the given range, or
/// `None` if the range is unsupported at this sample rate.
#[must_use]
pub fn context_size(sample_rate: u32, lower_hz: u32, upper_hz: u32, flags: u32) -> Option<usize> {
    let (_, longest) = periods(sample_rate, lower_hz, upper_hz)?;
    let mut samples = 4 * longest;
    if flags & FAST_FLAG != 0 {
        samples += longest;
    }
    Some(samples * size_of::<i16>())
}

/// A time stretcher over a caller-owned analysis window.
pub struct Stretcher<'a> {
    shortest: usize,
    longest: usize,
    fast: bool,
    window: &'a mut [i16],
    half: &'a mut [i16],
    fill: usize,
    credit: f32,
}

impl<'a> Stretcher<'a> {
    /// Binds a stretcher to `buf`, which must hold at least
    /// [`context_size`] bytes worth of samples.
    ///
    /// # Errors
    ///
    /// [`StretchError::UnsupportedRange`] for a frequency range
    /// outside what [`context_size`] accepts,
    /// [`StretchError::BufferTooSmall`] when `buf` is undersized.
    pub fn init(
        sample_rate: u32,
        lower_hz: u32,
        upper_hz: u32,
        flags: u32,
        buf: &'a mut [i16],
    ) -> Result<Self, StretchError> {
        let (shortest, longest) =
            periods(sample_rate, lower_hz, upper_hz).ok_or(StretchError::UnsupportedRange)?;
        let fast = flags & FAST_FLAG != 0;
        let need = 4 * longest + if fast { longest } else { 0 };
        if buf.len() < need {
            return Err(StretchError::BufferTooSmall);
        }
        let (window, half) = buf.split_at_mut(4 * longest);
        log::debug!(
            "stretcher ready, period {shortest}..{longest} samples, fast {fast}"
        );
        Ok(Self {
            shortest,
            longest,
            fast,
            window,
            half,
            fill: 0,
            credit: 0.0,
        })
    }

    /// Upper bound on the samples one [`Stretcher::stretch_samples`]
    /// call with `input_len` samples can produce at speeds down to
    /// `min_speed`, buffered carry-over included.
    #[must_use]
    pub fn output_capacity(&self, input_len: usize, min_speed: f32) -> usize {
        let speed = clamp_speed(min_speed);
        let stretched = (input_len + 2 * self.longest) as f32 / speed;
        stretched as usize + 4 * self.longest + 2
    }

    /// Drops all buffered audio and zeroes the rate bookkeeping.
    pub fn reset(&mut self) {
        self.fill = 0;
        self.credit = 0.0;
    }

    /// Feeds `samples` through at `speed` (0.5..=2.0, clamped; ratio
    /// of input to output duration). Returns the samples written to
    /// `output`, which must hold [`Stretcher::output_capacity`] for
    /// this input length and speed.
    ///
    /// At speed 1.0 the audio passes through unmodified, only delayed
    /// by the analysis window.
    ///
    /// # Panics
    ///
    /// Panics if `output` is smaller than
    /// [`Stretcher::output_capacity`] demands.
    pub fn stretch_samples(&mut self, samples: &[i16], output: &mut [i16], speed: f32) -> usize {
        let speed = clamp_speed(speed);
        let mut input = samples;
        let mut out = 0;
        loop {
            let take = input.len().min(self.window.len() - self.fill);
            self.window[self.fill..self.fill + take].copy_from_slice(&input[..take]);
            self.fill += take;
            input = &input[take..];

            let mut pos = 0;
            while self.fill - pos >= 2 * self.longest {
                let p = self.find_period(pos);
                if speed < 1.0 && self.credit >= p as f32 / 2.0 {
                    // repeat the period, smoothing the second copy in
                    output[out..out + p].copy_from_slice(&self.window[pos..pos + p]);
                    out += p;
                    crossfade(
                        &self.window[pos + p..pos + 2 * p],
                        &self.window[pos..pos + p],
                        &mut output[out..out + p],
                    );
                    out += p;
                    self.credit += p as f32 / speed - 2.0 * p as f32;
                    pos += p;
                } else if speed > 1.0 && self.credit <= -(p as f32) / 2.0 {
                    // drop a period, fading across the gap
                    crossfade(
                        &self.window[pos..pos + p],
                        &self.window[pos + p..pos + 2 * p],
                        &mut output[out..out + p],
                    );
                    out += p;
                    self.credit += 2.0 * p as f32 / speed - p as f32;
                    pos += 2 * p;
                } else {
                    output[out..out + p].copy_from_slice(&self.window[pos..pos + p]);
                    out += p;
                    self.credit += p as f32 / speed - p as f32;
                    pos += p;
                }
            }
            if pos > 0 {
                self.window.copy_within(pos..self.fill, 0);
                self.fill -= pos;
            }
            if input.is_empty() {
                break;
            }
        }
        out
    }

    /// Drains the analysis window unmodified. Returns the samples
    /// written.
    ///
    /// # Panics
    ///
    /// Panics if `output` cannot hold the buffered audio, at most
    /// four longest periods.
    pub fn flush(&mut self, output: &mut [i16]) -> usize {
        let n = self.fill;
        output[..n].copy_from_slice(&self.window[..n]);
        self.fill = 0;
        self.credit = 0.0;
        n
    }

    fn find_period(&mut self, pos: usize) -> usize {
        if self.fast {
            let span = 2 * self.longest;
            for i in 0..span / 2 {
                let a = i32::from(self.window[pos + 2 * i]);
                let b = i32::from(self.window[pos + 2 * i + 1]);
                self.half[i] = ((a + b) / 2) as i16;
            }
            let coarse = best_lag(
                &self.half[..span / 2],
                self.shortest / 2,
                self.longest / 2,
                self.shortest / 2,
            );
            let approx = 2 * coarse;
            let lo = self.shortest.max(approx.saturating_sub(3));
            let hi = self.longest.min(approx + 3);
            best_lag(&self.window[pos..pos + span], lo, hi, self.shortest)
        } else {
            best_lag(
                &self.window[pos..pos + 2 * self.longest],
                self.shortest,
                self.longest,
                self.shortest,
            )
        }
    }
}

fn clamp_speed(speed: f32) -> f32 {
    speed.clamp(MIN_SPEED, MAX_SPEED)
}

/// Lag in `lo..=hi` minimizing the average magnitude difference over
/// `corr_len` samples of `span`.
fn best_lag(span: &[i16], lo: usize, hi: usize, corr_len: usize) -> usize {
    let mut best = lo;
    let mut best_sum = u64::MAX;
    for lag in lo..=hi {
        let mut sum = 0u64;
        for i in 0..corr_len {
            let d = i32::from(span[i]) - i32::from(span[i + lag]);
            sum += u64::from(d.unsigned_abs());
        }
        if sum < best_sum {
            best_sum = sum;
            best = lag;
        }
    }
    best
}

/// `out[i]` ramps linearly from `from` to `into` over the period.
fn crossfade(from: &[i16], into: &[i16], out: &mut [i16]) {
    let p = out.len();
    for i in 0..p {
        let a = i64::from(from[i]) * (p - i) as i64;
        let b = i64::from(into[i]) * i as i64;
        out[i] = ((a + b) / p as i64) as i16;
    }
}
