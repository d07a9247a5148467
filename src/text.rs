//! Expansion of numbers and currency amounts into phonetic codes.
//!
//! The session resolves each emitted code through its voice and
//! appends the resulting token; expansion itself is pure and streams
//! codes through a callback so no intermediate storage is needed.
//! Readings follow the Mandarin magnitude-grouped convention: four
//! digit groups under `wan4` (1e4) and `yi4` (1e8), a bare `shi2` for
//! standalone 10..=19, and `ling2` filling interior zero runs.

use thiserror::Error;

/// A recoverable input-data error from one of the push operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PushError {
    /// The phonetic queue cannot take another token.
    #[error("phonetic queue is full")]
    Overflow,
    /// The input bytes are not valid UTF-8.
    #[error("input is not valid UTF-8")]
    InvalidUtf8,
}

pub(crate) const DIGITS: [&str; 10] = [
    "ling2", "yi1", "er4", "san1", "si4", "wu3", "liu4", "qi1", "ba1", "jiu3",
];
const SHI: &str = "shi2";
const BAI: &str = "bai3";
const QIAN: &str = "qian1";
const WAN: &str = "wan4";
const YI: &str = "yi4";
const FU: &str = "fu4";
pub(crate) const YUAN: &str = "yuan2";
pub(crate) const JIAO: &str = "jiao3";
pub(crate) const FEN: &str = "fen1";

type Emit<'e> = &'e mut dyn FnMut(&'static str) -> Result<(), PushError>;

/// Streams the spoken-number codes for a signed integer.
pub(crate) fn expand_integer(value: i64, emit: Emit) -> Result<(), PushError> {
    if value < 0 {
        emit(FU)?;
    }
    let magnitude = value.unsigned_abs();
    if magnitude == 0 {
        return emit(DIGITS[0]);
    }
    speak(magnitude, true, emit)
}

/// Streams the spoken codes for a yuan/jiao/fen monetary amount.
pub(crate) fn expand_currency(yuan: i64, jiao: u8, fen: u8, emit: Emit) -> Result<(), PushError> {
    expand_integer(yuan, emit)?;
    emit(YUAN)?;
    if jiao > 0 {
        speak_group(u16::from(jiao), true, emit)?;
        emit(JIAO)?;
    }
    if fen > 0 {
        if jiao == 0 {
            // 5.05 yuan reads "wu yuan ling wu fen"
            emit(DIGITS[0])?;
        }
        speak_group(u16::from(fen), true, emit)?;
        emit(FEN)?;
    }
    Ok(())
}

fn speak(n: u64, leading: bool, emit: Emit) -> Result<(), PushError> {
    if n >= 100_000_000 {
        speak(n / 100_000_000, leading, emit)?;
        emit(YI)?;
        let rem = n % 100_000_000;
        if rem > 0 {
            if rem < 10_000_000 {
                emit(DIGITS[0])?;
            }
            speak(rem, false, emit)?;
        }
        Ok(())
    } else if n >= 10_000 {
        speak_group((n / 10_000) as u16, leading, emit)?;
        emit(WAN)?;
        let rem = n % 10_000;
        if rem > 0 {
            if rem < 1000 {
                emit(DIGITS[0])?;
            }
            speak_group(rem as u16, false, emit)?;
        }
        Ok(())
    } else {
        speak_group(n as u16, leading, emit)
    }
}

/// Reads one 0..=9999 group. `leading` marks the most significant
/// group of the whole utterance, where 10..=19 drop the leading yi1.
fn speak_group(n: u16, leading: bool, emit: Emit) -> Result<(), PushError> {
    let q = usize::from(n / 1000);
    let b = usize::from((n / 100) % 10);
    let s = usize::from((n / 10) % 10);
    let u = usize::from(n % 10);
    let mut pending_zero = false;

    if q > 0 {
        emit(DIGITS[q])?;
        emit(QIAN)?;
    }
    if b > 0 {
        emit(DIGITS[b])?;
        emit(BAI)?;
    } else if q > 0 {
        pending_zero = true;
    }
    if s > 0 {
        if pending_zero {
            emit(DIGITS[0])?;
            pending_zero = false;
        }
        if !(s == 1 && leading && q == 0 && b == 0) {
            emit(DIGITS[s])?;
        }
        emit(SHI)?;
    } else if b > 0 || q > 0 {
        pending_zero = true;
    }
    if u > 0 {
        if pending_zero {
            emit(DIGITS[0])?;
        }
        emit(DIGITS[u])?;
    }
    Ok(())
}
