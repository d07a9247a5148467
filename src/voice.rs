//! The opaque voice-resource boundary.
//!
//! A voice is an externally owned, read-only resource (typically a blob
//! mapped into flash). Its internal layout is none of the engine's
//! business: everything the engine needs is expressed by the [`Voice`]
//! trait, a lookup-by-symbol capability contract. Multiple sessions may
//! share one voice concurrently since it is never mutated.

/// Maximum number of formant slots in a [`VoiceUnit`].
pub const MAX_FORMANTS: usize = 4;

/// One phonetic token of the compiled speech program.
///
/// `symbol` is an index issued by the voice via a lookup; the engine
/// treats it as opaque. `tone` selects the pitch contour (Mandarin
/// tones 1..=4, anything else is spoken neutral).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Syllable {
    pub symbol: u16,
    pub tone: u8,
}

impl Syllable {
    /// A zero token, handy for initializing queue storage arrays.
    pub const EMPTY: Syllable = Syllable { symbol: 0, tone: 0 };
}

/// One resonance of the vocal-tract filter. A `frequency` of zero marks
/// an unused slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Formant {
    /// Center frequency in Hz.
    pub frequency: f32,
    /// Bandwidth in Hz.
    pub bandwidth: f32,
}

impl Formant {
    /// An unused formant slot.
    pub const NONE: Formant = Formant {
        frequency: 0.0,
        bandwidth: 0.0,
    };
}

/// Synthesis description of one syllable, as supplied by the voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceUnit {
    /// Base fundamental frequency in Hz. Zero means the unit is
    /// unvoiced (noise-excited).
    pub f0: f32,
    /// Phonation length in milliseconds.
    pub duration_ms: u16,
    /// Trailing silence in milliseconds.
    pub pause_ms: u16,
    /// Linear output amplitude, 0..=1.
    pub amplitude: f32,
    /// Aspiration-noise mix, 0..=1.
    pub aspiration: f32,
    /// Vocal-tract resonances; slots with `frequency == 0.0` are skipped.
    pub formants: [Formant; MAX_FORMANTS],
}

/// Read-only capability contract of a voice resource.
///
/// Tokens returned by the lookup methods are only meaningful to the
/// voice that issued them; [`Voice::unit`] must accept any such token.
pub trait Voice {
    /// Phonetic token for one character of running text, or `None` if
    /// the voice does not know the character.
    fn lookup_char(&self, ch: char) -> Option<Syllable>;

    /// Phonetic token for a literal pinyin code such as `"zhong1"`.
    fn lookup_code(&self, code: &str) -> Option<Syllable>;

    /// Synthesis parameters for a token previously returned by one of
    /// the lookups.
    fn unit(&self, syllable: Syllable) -> VoiceUnit;
}
