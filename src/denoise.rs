//! Block-wise background noise suppression for narrowband PCM.
//!
//! The filter tracks a slow noise-floor estimate across 128-sample
//! blocks and applies a smoothed gain that ducks the signal when it
//! sits near the floor. Processing is in place and allocation free.

use core::mem::size_of;

use thiserror::Error;

/// Samples per processing block.
pub const BLOCK_LEN: usize = 128;

/// The only sample rate the floor-tracking constants are tuned for.
pub const SUPPORTED_SAMPLE_RATE: u32 = 8_000;

const FLOOR_RISE: f32 = 0.008;
const GAIN_SLEW: f32 = 0.05;
const MIN_GAIN: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DenoiseError {
    #[error("denoiser supports 8000 Hz input only")]
    UnsupportedRate,
}

/// Bytes of caller storage for one denoiser state.
#[must_use]
pub fn context_size() -> usize {
    size_of::<Denoiser>()
}

/// Bytes of caller storage for the per-block work area.
#[must_use]
pub fn scratch_size() -> usize {
    size_of::<DenoiseScratch>()
}

/// Per-block work area, reusable across denoisers.
pub struct DenoiseScratch {
    work: [f32; BLOCK_LEN],
}

impl DenoiseScratch {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            work: [0.0; BLOCK_LEN],
        }
    }
}

impl Default for DenoiseScratch {
    fn default() -> Self {
        Self::new()
    }
}

/// Adaptive noise-floor gate.
pub struct Denoiser {
    noise_floor: f32,
    gain: f32,
}

impl Denoiser {
    /// # Errors
    ///
    /// [`DenoiseError::UnsupportedRate`] for anything but 8000 Hz.
    pub fn init(sample_rate: u32) -> Result<Self, DenoiseError> {
        if sample_rate != SUPPORTED_SAMPLE_RATE {
            return Err(DenoiseError::UnsupportedRate);
        }
        Ok(Self {
            noise_floor: 0.0,
            gain: 1.0,
        })
    }

    pub fn reset(&mut self) {
        self.noise_floor = 0.0;
        self.gain = 1.0;
    }

    /// Filters one block in place.
    pub fn process(&mut self, block: &mut [i16; BLOCK_LEN], scratch: &mut DenoiseScratch) {
        let mut mean = 0.0f32;
        for (w, s) in scratch.work.iter_mut().zip(block.iter()) {
            *w = f32::from(*s);
            mean += *w;
        }
        mean /= BLOCK_LEN as f32;

        let mut energy = 0.0f32;
        for w in &mut scratch.work {
            *w -= mean;
            energy += *w * *w;
        }
        energy /= BLOCK_LEN as f32;

        // floor follows quiet blocks instantly, loud ones slowly
        if energy < self.noise_floor {
            self.noise_floor = energy;
        } else {
            self.noise_floor += (energy - self.noise_floor) * FLOOR_RISE;
        }

        let target = (1.0 - self.noise_floor / (energy + 1.0)).clamp(MIN_GAIN, 1.0);
        for (s, w) in block.iter_mut().zip(scratch.work.iter()) {
            self.gain += (target - self.gain) * GAIN_SLEW;
            *s = (*w * self.gain).clamp(-32768.0, 32767.0) as i16;
        }
    }
}
