//! AMR-WB frame packing in the three common wire formats.
//!
//! This module handles the byte-level framing only; the speech
//! payload is carried opaquely. [`Format::Ets`] and [`Format::Itu`]
//! are the 16-bit-word test-sequence layouts with one word per
//! payload bit, [`Format::MimeIetf`] is the RFC 3267 octet-aligned
//! storage layout with a one-byte table-of-contents entry per frame.

use thiserror::Error;

/// PCM samples in one 20 ms frame at 16 kHz.
pub const PCM_FRAME_LEN: usize = 320;

const ETS_BIT0: u16 = 0xFF81;
const ETS_BIT1: u16 = 0x007F;
const ITU_BIT0: u16 = 0x007F;
const ITU_BIT1: u16 = 0x0081;
const ITU_SYNC_GOOD: u16 = 0x6B21;
const ITU_SYNC_BAD: u16 = 0x6B20;
const ETS_FRAME_GOOD: u16 = 0;
const ETS_FRAME_BAD: u16 = 1;

/// Serialized frame layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// ETS test sequences: 3 header words, one word per bit.
    Ets,
    /// ITU-T test sequences: sync and length words, one word per bit.
    Itu,
    /// RFC 3267 octet-aligned storage, as in `.awb` files.
    MimeIetf,
}

/// Coding mode, naming the bit rate in hundreds of bit/s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Mode {
    Mr660,
    Mr885,
    Mr1265,
    Mr1425,
    Mr1585,
    Mr1825,
    Mr1985,
    Mr2305,
    Mr2385,
}

const MODE_BITS: [usize; 9] = [132, 177, 253, 285, 317, 365, 397, 461, 477];
const MODE_RATES: [u32; 9] = [
    6600, 8850, 12650, 14250, 15850, 18250, 19850, 23050, 23850,
];
const MODES: [Mode; 9] = [
    Mode::Mr660,
    Mode::Mr885,
    Mode::Mr1265,
    Mode::Mr1425,
    Mode::Mr1585,
    Mode::Mr1825,
    Mode::Mr1985,
    Mode::Mr2305,
    Mode::Mr2385,
];

impl Mode {
    #[must_use]
    pub fn from_index(index: u8) -> Option<Self> {
        MODES.get(usize::from(index)).copied()
    }

    fn index(self) -> usize {
        self as usize
    }

    /// Speech payload bits per frame.
    #[must_use]
    pub fn bits(self) -> usize {
        MODE_BITS[self.index()]
    }

    /// Nominal bit rate in bit/s.
    #[must_use]
    pub fn bit_rate(self) -> u32 {
        MODE_RATES[self.index()]
    }

    /// Payload bytes in the octet-aligned layout.
    #[must_use]
    pub fn payload_bytes(self) -> usize {
        self.bits().div_ceil(8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("bad frame sync word")]
    BadSync,
    #[error("frame names an unknown coding mode")]
    BadMode,
    #[error("frame length matches no coding mode")]
    BadLength,
    #[error("buffer too short for one frame")]
    ShortBuffer,
}

/// What a probe or read learned about the frame at the stream head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub mode: Mode,
    /// Frame quality bit; bad frames carry no usable speech.
    pub good: bool,
    pub payload_bits: usize,
}

/// Serialized size of one frame of `mode` in `format`, header
/// included.
#[must_use]
pub fn frame_size(format: Format, mode: Mode) -> usize {
    match format {
        Format::Ets => 6 + 2 * mode.bits(),
        Format::Itu => 4 + 2 * mode.bits(),
        Format::MimeIetf => 1 + mode.payload_bytes(),
    }
}

/// Header bytes preceding the payload in `format`.
#[must_use]
pub fn header_size(format: Format) -> usize {
    match format {
        Format::Ets => 6,
        Format::Itu => 4,
        Format::MimeIetf => 1,
    }
}

/// Serializes one frame. `payload` holds the packed speech bits,
/// MSB first, at least `mode.payload_bytes()` long. Returns the bytes
/// written.
///
/// # Errors
///
/// [`FrameError::ShortBuffer`] when `payload` or `out` is undersized.
pub fn write_frame(
    format: Format,
    mode: Mode,
    good: bool,
    payload: &[u8],
    out: &mut [u8],
) -> Result<usize, FrameError> {
    if payload.len() < mode.payload_bytes() {
        return Err(FrameError::ShortBuffer);
    }
    let size = frame_size(format, mode);
    if out.len() < size {
        return Err(FrameError::ShortBuffer);
    }
    match format {
        Format::Ets => {
            let sync = if good { ITU_SYNC_GOOD } else { ITU_SYNC_BAD };
            let quality = if good { ETS_FRAME_GOOD } else { ETS_FRAME_BAD };
            put_word(out, 0, sync);
            put_word(out, 1, quality);
            put_word(out, 2, mode.index() as u16);
            put_bit_words(mode, payload, &mut out[6..], ETS_BIT0, ETS_BIT1);
        }
        Format::Itu => {
            let sync = if good { ITU_SYNC_GOOD } else { ITU_SYNC_BAD };
            put_word(out, 0, sync);
            put_word(out, 1, mode.bits() as u16);
            put_bit_words(mode, payload, &mut out[4..], ITU_BIT0, ITU_BIT1);
        }
        Format::MimeIetf => {
            let quality = u8::from(good);
            out[0] = ((mode.index() as u8) << 3) | (quality << 2);
            let n = mode.payload_bytes();
            out[1..=n].copy_from_slice(&payload[..n]);
        }
    }
    Ok(size)
}

/// Inspects the frame at the head of `stream` without consuming
/// payload bits.
///
/// # Errors
///
/// [`FrameError::ShortBuffer`] when `stream` holds less than a
/// header, [`FrameError::BadSync`], [`FrameError::BadMode`] or
/// [`FrameError::BadLength`] when the header is malformed.
pub fn probe(format: Format, stream: &[u8]) -> Result<FrameInfo, FrameError> {
    if stream.len() < header_size(format) {
        return Err(FrameError::ShortBuffer);
    }
    match format {
        Format::Ets => {
            let good = match get_word(stream, 0) {
                ITU_SYNC_GOOD => true,
                ITU_SYNC_BAD => false,
                _ => return Err(FrameError::BadSync),
            };
            let quality_ok = get_word(stream, 1) == ETS_FRAME_GOOD;
            let index = get_word(stream, 2);
            let mode = u8::try_from(index)
                .ok()
                .and_then(Mode::from_index)
                .ok_or(FrameError::BadMode)?;
            Ok(FrameInfo {
                mode,
                good: good && quality_ok,
                payload_bits: mode.bits(),
            })
        }
        Format::Itu => {
            let good = match get_word(stream, 0) {
                ITU_SYNC_GOOD => true,
                ITU_SYNC_BAD => false,
                _ => return Err(FrameError::BadSync),
            };
            let bits = usize::from(get_word(stream, 1));
            let mode = MODES
                .iter()
                .copied()
                .find(|m| m.bits() == bits)
                .ok_or(FrameError::BadLength)?;
            Ok(FrameInfo {
                mode,
                good,
                payload_bits: bits,
            })
        }
        Format::MimeIetf => {
            let toc = stream[0];
            let mode = Mode::from_index((toc >> 3) & 0x0F).ok_or(FrameError::BadMode)?;
            Ok(FrameInfo {
                mode,
                good: toc & 0x04 != 0,
                payload_bits: mode.bits(),
            })
        }
    }
}

/// Deserializes the frame at the head of `stream` into `payload_out`
/// as packed MSB-first bytes. Trailing pad bits in the final byte are
/// zero.
///
/// # Errors
///
/// Everything [`probe`] reports, plus [`FrameError::ShortBuffer`]
/// when `stream` or `payload_out` cannot hold the whole frame.
pub fn read_frame(
    format: Format,
    stream: &[u8],
    payload_out: &mut [u8],
) -> Result<FrameInfo, FrameError> {
    let info = probe(format, stream)?;
    let mode = info.mode;
    if stream.len() < frame_size(format, mode) || payload_out.len() < mode.payload_bytes() {
        return Err(FrameError::ShortBuffer);
    }
    match format {
        Format::Ets => get_bit_words(mode, &stream[6..], payload_out, ETS_BIT1),
        Format::Itu => get_bit_words(mode, &stream[4..], payload_out, ITU_BIT1),
        Format::MimeIetf => {
            let n = mode.payload_bytes();
            payload_out[..n].copy_from_slice(&stream[1..=n]);
            let pad = n * 8 - mode.bits();
            if pad > 0 {
                payload_out[n - 1] &= 0xFFu8 << pad;
            }
        }
    }
    Ok(info)
}

fn put_word(out: &mut [u8], index: usize, word: u16) {
    out[2 * index..2 * index + 2].copy_from_slice(&word.to_le_bytes());
}

fn get_word(stream: &[u8], index: usize) -> u16 {
    u16::from_le_bytes([stream[2 * index], stream[2 * index + 1]])
}

fn put_bit_words(mode: Mode, payload: &[u8], out: &mut [u8], bit0: u16, bit1: u16) {
    for i in 0..mode.bits() {
        let bit = (payload[i / 8] >> (7 - i % 8)) & 1;
        let word = if bit != 0 { bit1 } else { bit0 };
        put_word(out, i, word);
    }
}

fn get_bit_words(mode: Mode, stream: &[u8], payload_out: &mut [u8], bit1: u16) {
    let n = mode.payload_bytes();
    payload_out[..n].fill(0);
    for i in 0..mode.bits() {
        if get_word(stream, i) == bit1 {
            payload_out[i / 8] |= 1 << (7 - i % 8);
        }
    }
}
