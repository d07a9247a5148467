//! Streaming text-to-speech for memory-constrained devices.
//!
//! This crate turns short runs of text (UTF-8, bracket-quoted pinyin
//! overrides, integers and currency amounts) into 16 kHz mono PCM, one
//! small block at a time, using only caller-owned fixed-size buffers.
//! A companion time-domain harmonic [`stretch`]er resamples the PCM
//! stream to a chosen playback speed without altering pitch, and a
//! fixed-block [`denoise`] filter and the AMR-WB wire [`amrwb`] framing
//! round out the audio path.
//!
//! The voice resource itself is opaque: the engine only talks to it
//! through the [`Voice`] trait.
//!
//! ## `no_std`
//!
//! This library is `no_std` compatible and allocation-free. All working
//! memory is supplied by the caller and sized up front by the pure
//! sizing functions ([`context_size`], [`scratch1_size`],
//! [`scratch2_size`], [`stretch::context_size`]).

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(
    clippy::all,
    clippy::cargo,
    clippy::pedantic,
    unsafe_code,
    rustdoc::all
)]
// precision/sign loss in the DSP casts is acceptable as long as it is the same every time
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::module_name_repetitions
)]

#[cfg(all(feature = "std", feature = "libm"))]
compile_error!("Features \"std\" and \"libm\" are mutually exclusive.");

#[cfg(not(any(feature = "std", feature = "libm")))]
compile_error!("Must specify a math feature: either \"std\" or \"libm\".");

mod dsp;
mod engine;
mod math;
mod session;
mod text;
mod voice;

pub mod amrwb;
pub mod denoise;
pub mod stretch;

pub use engine::{BLOCK_LEN, SAMPLE_RATE};
pub use session::{
    AbortFlag, DEFAULT_TUNE, PcmSink, Session, SinkFlow, State, SynthScratch, Synthesis,
    Synthesizer, context_size, scratch1_size, scratch2_size,
};
pub use text::PushError;
pub use voice::{Formant, MAX_FORMANTS, Syllable, Voice, VoiceUnit};
