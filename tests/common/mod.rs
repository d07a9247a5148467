//! A small synthetic voice for exercising the engine without a real
//! voice blob.

#![allow(dead_code)]

use rand::rngs::mock::StepRng;
use tinytts::{
    AbortFlag, Formant, Session, SinkFlow, Syllable, SynthScratch, Synthesis, Voice, VoiceUnit,
};

/// Knows every ASCII alphanumeric character and any lowercase pinyin
/// code with an optional trailing tone digit. Unit parameters are
/// derived from the symbol so distinct syllables sound distinct.
pub struct TinyVoice;

impl Voice for TinyVoice {
    fn lookup_char(&self, ch: char) -> Option<Syllable> {
        if ch.is_ascii_alphanumeric() {
            Some(Syllable {
                symbol: 256 + ch as u16,
                tone: 1,
            })
        } else {
            None
        }
    }

    fn lookup_code(&self, code: &str) -> Option<Syllable> {
        let (base, tone) = match code.as_bytes().last() {
            Some(d @ b'1'..=b'5') => (&code[..code.len() - 1], d - b'0'),
            _ => (code, 1),
        };
        if base.is_empty() || !base.bytes().all(|b| b.is_ascii_lowercase()) {
            return None;
        }
        let mut symbol = 0u16;
        for b in base.bytes() {
            symbol = symbol.wrapping_mul(31).wrapping_add(u16::from(b));
        }
        Some(Syllable { symbol, tone })
    }

    fn unit(&self, syllable: Syllable) -> VoiceUnit {
        VoiceUnit {
            f0: 110.0 + f32::from(syllable.symbol % 40),
            duration_ms: 180,
            pause_ms: 40,
            amplitude: 0.8,
            aspiration: 0.05,
            formants: [
                Formant {
                    frequency: 450.0 + f32::from(syllable.symbol % 200),
                    bandwidth: 60.0,
                },
                Formant {
                    frequency: 1500.0,
                    bandwidth: 90.0,
                },
                Formant {
                    frequency: 2500.0,
                    bandwidth: 120.0,
                },
                Formant::NONE,
            ],
        }
    }
}

pub fn test_rng() -> StepRng {
    StepRng::new(0, 0x12f6)
}

/// Samples one syllable occupies, phonation plus pause.
pub const SYLLABLE_SAMPLES: usize = (180 + 40) * 16;

/// Queues `text` on a fresh session and renders the whole program,
/// panicking unless it runs to completion.
pub fn render(text: &[u8]) -> Vec<i16> {
    let abort = AbortFlag::new();
    let mut slots = [Syllable::EMPTY; 64];
    let mut session = Session::new(&TinyVoice, &abort, &mut slots, test_rng());
    session.push_text(text).unwrap();
    let mut scratch = SynthScratch::new();
    let mut pcm = Vec::new();
    let mut sink = |block: &[i16], _acc: usize| {
        pcm.extend_from_slice(block);
        SinkFlow::Continue
    };
    let result = session.synthesize(&mut scratch, &mut sink);
    drop(sink);
    assert!(matches!(result, Synthesis::Done { .. }));
    pcm
}
