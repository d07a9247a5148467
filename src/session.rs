//! Synthesis sessions over caller-owned storage.
//!
//! A [`Session`] owns no memory of its own: the phonetic queue, the
//! synthesis scratch, and the abort flag all live in the caller's
//! buffers so the engine can run from a static allocation on targets
//! without a heap. [`context_size`], [`scratch1_size`] and
//! [`scratch2_size`] report how much the caller has to reserve.
//!
//! Two delivery protocols share the same queue. [`Session::synthesize`]
//! pushes blocks into a [`PcmSink`] until the program is exhausted,
//! the sink declines, or the abort flag is raised. [`Session::run`]
//! hands out a [`Synthesizer`] the caller pulls blocks from at its own
//! pace, with mid-stream [`Synthesizer::restart`].

use core::mem::size_of;
use core::num::NonZeroI32;
use core::sync::atomic::{AtomicBool, Ordering};

use rand::Rng;

use crate::engine::{self, BLOCK_LEN, SAMPLE_RATE, SynthState};
use crate::stretch;
use crate::text::{self, PushError};
use crate::voice::{Syllable, Voice};

/// Default speaking-rate control, the neutral 1.0x setting.
///
/// [`Session::tune`] accepts 1..=16; pitch and duration scale by
/// `tune / 8`.
pub const DEFAULT_TUNE: u8 = 8;

/// Bytes of caller storage for a session queue of `max_tokens`
/// syllables, including the session bookkeeping itself.
#[must_use]
pub fn context_size(max_tokens: usize) -> usize {
    max_tokens * size_of::<Syllable>() + size_of::<SessionCore>()
}

/// Bytes of caller storage for the synthesis scratch area.
#[must_use]
pub fn scratch1_size() -> usize {
    size_of::<SynthScratch>()
}

/// Bytes of caller storage for post-processing one synthesized block
/// through the time stretcher at its slowest setting, window included.
#[must_use]
pub fn scratch2_size() -> usize {
    let longest = SAMPLE_RATE / stretch::DEFAULT_FREQ_RANGE.0 as usize;
    let capacity = (BLOCK_LEN + 2 * longest) * 2 + 4 * longest + 2;
    let window = 5 * longest;
    (capacity + window) * size_of::<i16>()
}

/// Cross-thread cancellation flag for a running synthesis.
///
/// The flag is owned by the caller and shared by reference so another
/// thread (or an interrupt handler) can raise it while
/// [`Session::synthesize`] holds the session mutably.
#[derive(Debug)]
pub struct AbortFlag(AtomicBool);

impl AbortFlag {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Requests that the current synthesis stop at the next block edge.
    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

impl Default for AbortFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a session stands with respect to its queued program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Tokens may be queued and synthesis may run.
    Ready,
    /// The last synthesis ran the program to completion.
    Done,
    /// The last synthesis stopped early.
    Aborted,
}

/// How the sink wants the stream to proceed after a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFlow {
    Continue,
    /// Stop the stream and surface this status to the caller.
    Abort(NonZeroI32),
}

/// Consumer side of the push protocol.
///
/// `acc_samples` counts samples delivered before this block, so the
/// sink can timestamp without bookkeeping of its own.
pub trait PcmSink {
    fn accept(&mut self, pcm: &[i16], acc_samples: usize) -> SinkFlow;
}

impl<F> PcmSink for F
where
    F: FnMut(&[i16], usize) -> SinkFlow,
{
    fn accept(&mut self, pcm: &[i16], acc_samples: usize) -> SinkFlow {
        self(pcm, acc_samples)
    }
}

/// Outcome of one push-protocol synthesis pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Synthesis {
    /// The whole queued program was rendered.
    Done { samples: usize },
    /// Stopped early: `status` carries the sink's code, or `None` when
    /// the abort flag was raised from outside.
    Aborted { status: Option<NonZeroI32> },
}

/// Scratch area for block synthesis, sized by [`scratch1_size`].
pub struct SynthScratch {
    state: SynthState,
    block: [i16; BLOCK_LEN],
}

impl SynthScratch {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SynthState::new(),
            block: [0; BLOCK_LEN],
        }
    }

    fn reset(&mut self) {
        self.state.clear();
    }
}

impl Default for SynthScratch {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
struct SessionCore {
    len: usize,
    acc: usize,
    tune: u8,
    state: State,
}

/// A synthesis session bound to a voice, an abort flag, and a
/// caller-owned token queue.
///
/// `R` seeds the aspiration-noise source. The session keeps the
/// pristine generator and clones it for every stream, so replaying the
/// same queue produces bit-identical PCM.
pub struct Session<'a, R> {
    voice: &'a dyn Voice,
    abort: &'a AbortFlag,
    slots: &'a mut [Syllable],
    core: SessionCore,
    rng: R,
}

impl<'a, R: Rng + Clone> Session<'a, R> {
    pub fn new(
        voice: &'a dyn Voice,
        abort: &'a AbortFlag,
        queue: &'a mut [Syllable],
        rng: R,
    ) -> Self {
        log::debug!("session created, queue capacity {}", queue.len());
        abort.clear();
        Self {
            voice,
            abort,
            slots: queue,
            core: SessionCore {
                len: 0,
                acc: 0,
                tune: DEFAULT_TUNE,
                state: State::Ready,
            },
            rng,
        }
    }

    /// Clears the queue and re-arms the session. The tune setting is
    /// kept.
    pub fn reset(&mut self) {
        log::debug!("session reset, dropping {} queued tokens", self.core.len);
        self.core.len = 0;
        self.core.acc = 0;
        self.core.state = State::Ready;
        self.abort.clear();
    }

    /// Sets the speaking-rate control, clamped to 1..=16.
    pub fn tune(&mut self, tune: u8) {
        self.core.tune = tune.clamp(1, 16);
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.core.state
    }

    /// Samples delivered by the most recent synthesis pass.
    #[must_use]
    pub fn samples_emitted(&self) -> usize {
        self.core.acc
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn queued(&self) -> usize {
        self.core.len
    }

    /// The tokens queued so far, in push order.
    #[must_use]
    pub fn tokens(&self) -> &[Syllable] {
        &self.slots[..self.core.len]
    }

    fn append(&mut self, token: Syllable) -> Result<(), PushError> {
        if self.core.len == self.slots.len() {
            return Err(PushError::Overflow);
        }
        self.slots[self.core.len] = token;
        self.core.len += 1;
        Ok(())
    }

    fn append_code(&mut self, code: &str) -> Result<(), PushError> {
        match self.voice.lookup_code(code) {
            Some(token) => self.append(token),
            None => {
                log::trace!("unknown phonetic code {code:?} skipped");
                Ok(())
            }
        }
    }

    /// Queues text. Plain characters are looked up one by one; a
    /// `[...]` bracket group holds whitespace-separated phonetic codes
    /// resolved through [`Voice::lookup_code`]. Characters and codes
    /// the voice does not know are skipped.
    ///
    /// On overflow the tokens queued before the full slot are kept.
    ///
    /// # Errors
    ///
    /// [`PushError::InvalidUtf8`] if `text` is not UTF-8,
    /// [`PushError::Overflow`] once the queue is full.
    pub fn push_text(&mut self, text: &[u8]) -> Result<(), PushError> {
        let mut rest = core::str::from_utf8(text).map_err(|_| PushError::InvalidUtf8)?;
        while !rest.is_empty() {
            match rest.find('[') {
                None => {
                    self.push_plain(rest)?;
                    break;
                }
                Some(open) => {
                    self.push_plain(&rest[..open])?;
                    let inner = &rest[open + 1..];
                    match inner.find(']') {
                        Some(close) => {
                            self.push_codes(&inner[..close])?;
                            rest = &inner[close + 1..];
                        }
                        None => {
                            // unterminated group, read codes to the end
                            self.push_codes(inner)?;
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn push_plain(&mut self, chunk: &str) -> Result<(), PushError> {
        for ch in chunk.chars() {
            match self.voice.lookup_char(ch) {
                Some(token) => self.append(token)?,
                None => log::trace!("no syllable for {ch:?}, skipped"),
            }
        }
        Ok(())
    }

    fn push_codes(&mut self, group: &str) -> Result<(), PushError> {
        for code in group.split_whitespace() {
            self.append_code(code)?;
        }
        Ok(())
    }

    /// Queues the spoken reading of a signed integer.
    ///
    /// All-or-nothing: on overflow the queue is restored to its state
    /// before the call.
    ///
    /// # Errors
    ///
    /// [`PushError::Overflow`] if the reading does not fit the queue.
    pub fn push_integer(&mut self, value: i64) -> Result<(), PushError> {
        let mark = self.core.len;
        let r = text::expand_integer(value, &mut |code| self.append_code(code));
        if r.is_err() {
            self.core.len = mark;
        }
        r
    }

    /// Queues the spoken reading of a monetary amount, `jiao` and
    /// `fen` being tenths and hundredths of a yuan.
    ///
    /// All-or-nothing, like [`Session::push_integer`].
    ///
    /// # Errors
    ///
    /// [`PushError::Overflow`] if the reading does not fit the queue.
    pub fn push_currency(&mut self, yuan: i64, jiao: u8, fen: u8) -> Result<(), PushError> {
        let mark = self.core.len;
        let r = text::expand_currency(yuan, jiao, fen, &mut |code| self.append_code(code));
        if r.is_err() {
            self.core.len = mark;
        }
        r
    }

    /// Renders the queued program, pushing each block into `sink`.
    ///
    /// Returns immediately with zero samples unless the session is
    /// [`State::Ready`]; call [`Session::reset`] to run again.
    pub fn synthesize<S: PcmSink + ?Sized>(
        &mut self,
        scratch: &mut SynthScratch,
        sink: &mut S,
    ) -> Synthesis {
        if self.core.state != State::Ready {
            return Synthesis::Done { samples: 0 };
        }
        scratch.reset();
        self.core.acc = 0;
        let mut cursor = 0;
        let mut rng = self.rng.clone();
        let queue = &self.slots[..self.core.len];
        loop {
            if self.abort.is_aborted() {
                log::debug!("synthesis aborted by flag at {} samples", self.core.acc);
                self.core.state = State::Aborted;
                return Synthesis::Aborted { status: None };
            }
            let n = engine::synth_block(
                self.voice,
                queue,
                &mut cursor,
                self.core.tune,
                &mut rng,
                &mut scratch.state,
                &mut scratch.block,
            );
            if n == 0 {
                log::debug!("synthesis done, {} samples", self.core.acc);
                self.core.state = State::Done;
                return Synthesis::Done {
                    samples: self.core.acc,
                };
            }
            match sink.accept(&scratch.block[..n], self.core.acc) {
                SinkFlow::Continue => self.core.acc += n,
                SinkFlow::Abort(status) => {
                    log::debug!("synthesis aborted by sink, status {status}");
                    self.core.state = State::Aborted;
                    return Synthesis::Aborted {
                        status: Some(status),
                    };
                }
            }
        }
    }

    /// Runs the pull protocol: `f` receives a [`Synthesizer`] and
    /// drains blocks from it. The session state afterwards reflects
    /// how far the synthesizer got.
    pub fn run<T, F>(&mut self, scratch: &mut SynthScratch, f: F) -> T
    where
        F: FnOnce(&mut Synthesizer<'_, R>) -> T,
    {
        scratch.reset();
        let was_ready = self.core.state == State::Ready;
        let mut synth = Synthesizer {
            voice: self.voice,
            abort: self.abort,
            queue: &self.slots[..self.core.len],
            tune: self.core.tune,
            cursor: 0,
            acc: 0,
            live: was_ready,
            done: !was_ready,
            rng0: self.rng.clone(),
            rng: self.rng.clone(),
            state: &mut scratch.state,
            block: &mut scratch.block,
        };
        let out = f(&mut synth);
        let (acc, finished) = (synth.acc, synth.done);
        if was_ready {
            self.core.acc = acc;
            self.core.state = if self.abort.is_aborted() {
                State::Aborted
            } else if finished {
                State::Done
            } else {
                State::Ready
            };
        }
        out
    }
}

/// Pull-protocol handle lent out by [`Session::run`].
pub struct Synthesizer<'s, R> {
    voice: &'s dyn Voice,
    abort: &'s AbortFlag,
    queue: &'s [Syllable],
    tune: u8,
    cursor: usize,
    acc: usize,
    /// the session was ready when the handle was created
    live: bool,
    done: bool,
    rng0: R,
    rng: R,
    state: &'s mut SynthState,
    block: &'s mut [i16; BLOCK_LEN],
}

impl<R: Rng + Clone> Synthesizer<'_, R> {
    /// Renders and returns the next PCM block, or `None` once the
    /// program is exhausted or the abort flag is raised.
    pub fn next_block(&mut self) -> Option<&[i16]> {
        if self.done || self.abort.is_aborted() {
            return None;
        }
        let n = engine::synth_block(
            self.voice,
            self.queue,
            &mut self.cursor,
            self.tune,
            &mut self.rng,
            self.state,
            self.block,
        );
        if n == 0 {
            self.done = true;
            return None;
        }
        self.acc += n;
        Some(&self.block[..n])
    }

    /// Rewinds to the start of the program. The noise generator is
    /// restored too, so the replay is bit-identical. A handle taken
    /// from a session already in a terminal state stays inert.
    pub fn restart(&mut self) {
        self.cursor = 0;
        self.acc = 0;
        self.done = !self.live;
        self.state.clear();
        self.rng = self.rng0.clone();
    }

    /// Samples handed out since creation or the last restart.
    #[must_use]
    pub fn samples(&self) -> usize {
        self.acc
    }
}
