mod common;

use core::num::NonZeroI32;

use common::{SYLLABLE_SAMPLES, TinyVoice, render, test_rng};
use tinytts::{
    AbortFlag, BLOCK_LEN, PushError, SAMPLE_RATE, Session, SinkFlow, State, Syllable,
    SynthScratch, Synthesis, Voice,
};

#[test]
fn sizing_functions_are_sane() {
    assert!(tinytts::context_size(16) > tinytts::context_size(0));
    assert!(tinytts::context_size(0) > 0);
    assert!(tinytts::scratch1_size() >= BLOCK_LEN * 2);
    // room for one stretched block plus the stretcher window
    assert!(tinytts::scratch2_size() > BLOCK_LEN * 2 * 2);
}

#[test]
fn plain_text_skips_unknown_characters() {
    let abort = AbortFlag::new();
    let mut slots = [Syllable::EMPTY; 8];
    let mut session = Session::new(&TinyVoice, &abort, &mut slots, test_rng());
    session.push_text(b"a b!").unwrap();
    assert_eq!(session.queued(), 2);
}

#[test]
fn bracket_groups_hold_phonetic_codes() {
    let abort = AbortFlag::new();
    let mut slots = [Syllable::EMPTY; 8];
    let mut session = Session::new(&TinyVoice, &abort, &mut slots, test_rng());
    session.push_text(b"[yi1 er4]").unwrap();
    assert_eq!(session.queued(), 2);
    assert_eq!(session.tokens()[0].tone, 1);
    assert_eq!(session.tokens()[1].tone, 4);
    assert_eq!(session.tokens()[0], TinyVoice.lookup_code("yi1").unwrap());
}

#[test]
fn invalid_utf8_is_rejected() {
    let abort = AbortFlag::new();
    let mut slots = [Syllable::EMPTY; 8];
    let mut session = Session::new(&TinyVoice, &abort, &mut slots, test_rng());
    assert_eq!(
        session.push_text(&[0x61, 0xFF, 0x62]),
        Err(PushError::InvalidUtf8)
    );
    assert_eq!(session.queued(), 0);
}

#[test]
fn text_overflow_keeps_earlier_tokens() {
    let abort = AbortFlag::new();
    let mut slots = [Syllable::EMPTY; 2];
    let mut session = Session::new(&TinyVoice, &abort, &mut slots, test_rng());
    assert_eq!(session.push_text(b"abc"), Err(PushError::Overflow));
    assert_eq!(session.queued(), 2);
}

#[test]
fn integer_overflow_rolls_the_queue_back() {
    let abort = AbortFlag::new();
    let mut slots = [Syllable::EMPTY; 3];
    let mut session = Session::new(&TinyVoice, &abort, &mut slots, test_rng());
    // 12345 expands to nine codes
    assert_eq!(session.push_integer(12_345), Err(PushError::Overflow));
    assert_eq!(session.queued(), 0);
    session.push_integer(7).unwrap();
    assert_eq!(session.queued(), 1);
}

#[test]
fn zero_still_speaks() {
    let abort = AbortFlag::new();
    let mut slots = [Syllable::EMPTY; 8];
    let mut session = Session::new(&TinyVoice, &abort, &mut slots, test_rng());
    session.push_integer(0).unwrap();
    assert_eq!(session.queued(), 1);
    let mut scratch = SynthScratch::new();
    let mut blocks = 0;
    let result = session.synthesize(&mut scratch, &mut |_: &[i16], _: usize| {
        blocks += 1;
        SinkFlow::Continue
    });
    assert!(blocks >= 1);
    assert!(matches!(result, Synthesis::Done { samples } if samples > 0));
}

#[test]
fn currency_matches_its_spelled_out_reading() {
    let abort = AbortFlag::new();
    let mut slots_a = [Syllable::EMPTY; 16];
    let mut a = Session::new(&TinyVoice, &abort, &mut slots_a, test_rng());
    a.push_currency(12, 3, 4).unwrap();

    let mut slots_b = [Syllable::EMPTY; 16];
    let mut b = Session::new(&TinyVoice, &abort, &mut slots_b, test_rng());
    b.push_text(b"[shi2 er4 yuan2 san1 jiao3 si4 fen1]").unwrap();

    assert_eq!(a.tokens(), b.tokens());
}

#[test]
fn full_program_renders_to_completion() {
    let abort = AbortFlag::new();
    let mut slots = [Syllable::EMPTY; 8];
    let mut session = Session::new(&TinyVoice, &abort, &mut slots, test_rng());
    session.push_text(b"ab").unwrap();
    let mut scratch = SynthScratch::new();
    let mut offsets = Vec::new();
    let mut total = 0usize;
    let result = session.synthesize(&mut scratch, &mut |block: &[i16], acc: usize| {
        offsets.push((acc, block.len()));
        total += block.len();
        SinkFlow::Continue
    });
    assert_eq!(result, Synthesis::Done { samples: total });
    assert_eq!(session.state(), State::Done);
    assert_eq!(session.samples_emitted(), total);
    assert_eq!(total, 2 * SYLLABLE_SAMPLES);
    // acc counts the samples delivered before each block
    let mut expected = 0;
    for (acc, len) in offsets {
        assert_eq!(acc, expected);
        expected += len;
    }
}

#[test]
fn sink_abort_stops_the_stream_with_its_status() {
    let abort = AbortFlag::new();
    let mut slots = [Syllable::EMPTY; 8];
    let mut session = Session::new(&TinyVoice, &abort, &mut slots, test_rng());
    session.push_text(b"abcd").unwrap();
    let mut scratch = SynthScratch::new();
    let mut calls = 0;
    let status = NonZeroI32::new(7).unwrap();
    let result = session.synthesize(&mut scratch, &mut |_block: &[i16], _acc: usize| {
        calls += 1;
        if calls == 2 {
            SinkFlow::Abort(status)
        } else {
            SinkFlow::Continue
        }
    });
    assert_eq!(calls, 2);
    assert_eq!(
        result,
        Synthesis::Aborted {
            status: Some(status)
        }
    );
    assert_eq!(session.state(), State::Aborted);

    // a finished session yields nothing until reset
    let again = session.synthesize(&mut scratch, &mut |_: &[i16], _: usize| SinkFlow::Continue);
    assert_eq!(again, Synthesis::Done { samples: 0 });
    session.reset();
    assert_eq!(session.state(), State::Ready);
    assert_eq!(session.queued(), 0);
}

#[test]
fn abort_flag_cancels_without_a_status() {
    let abort = AbortFlag::new();
    let mut slots = [Syllable::EMPTY; 8];
    let mut session = Session::new(&TinyVoice, &abort, &mut slots, test_rng());
    session.push_text(b"ab").unwrap();
    abort.abort();
    let mut scratch = SynthScratch::new();
    let mut calls = 0;
    let result = session.synthesize(&mut scratch, &mut |_: &[i16], _: usize| {
        calls += 1;
        SinkFlow::Continue
    });
    assert_eq!(calls, 0);
    assert_eq!(result, Synthesis::Aborted { status: None });
    assert_eq!(session.state(), State::Aborted);
}

#[test]
fn replays_are_bit_identical() {
    let first = render(b"hello");
    let second = render(b"hello");
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn tune_changes_pitch_but_not_length() {
    let base = render(b"a");
    let abort = AbortFlag::new();
    let mut slots = [Syllable::EMPTY; 8];
    let mut session = Session::new(&TinyVoice, &abort, &mut slots, test_rng());
    session.tune(12);
    session.push_text(b"a").unwrap();
    let mut scratch = SynthScratch::new();
    let mut pcm = Vec::new();
    session.synthesize(&mut scratch, &mut |block: &[i16], _: usize| {
        pcm.extend_from_slice(block);
        SinkFlow::Continue
    });
    assert_eq!(pcm.len(), base.len());
    assert_ne!(pcm, base);
}

#[test]
fn pull_protocol_matches_the_push_protocol() {
    let pushed = render(b"xy");

    let abort = AbortFlag::new();
    let mut slots = [Syllable::EMPTY; 8];
    let mut session = Session::new(&TinyVoice, &abort, &mut slots, test_rng());
    session.push_text(b"xy").unwrap();
    let mut scratch = SynthScratch::new();
    let pulled = session.run(&mut scratch, |synth| {
        let mut pcm = Vec::new();
        while let Some(block) = synth.next_block() {
            pcm.extend_from_slice(block);
        }
        pcm
    });
    assert_eq!(session.state(), State::Done);
    assert_eq!(session.samples_emitted(), pulled.len());
    assert_eq!(pulled, pushed);
}

#[test]
fn restart_rewinds_the_pull_stream_exactly() {
    let abort = AbortFlag::new();
    let mut slots = [Syllable::EMPTY; 8];
    let mut session = Session::new(&TinyVoice, &abort, &mut slots, test_rng());
    session.push_text(b"xy").unwrap();
    let mut scratch = SynthScratch::new();
    let (partial, replay) = session.run(&mut scratch, |synth| {
        let mut partial = Vec::new();
        for _ in 0..3 {
            partial.extend_from_slice(synth.next_block().unwrap());
        }
        synth.restart();
        assert_eq!(synth.samples(), 0);
        let mut replay = Vec::new();
        while let Some(block) = synth.next_block() {
            replay.extend_from_slice(block);
        }
        (partial, replay)
    });
    assert_eq!(partial, replay[..partial.len()]);
    assert_eq!(replay, render(b"xy"));
}

#[test]
fn synthesis_feeds_the_stretcher_from_scratch_buffer_two() {
    use tinytts::stretch::{DEFAULT_FREQ_RANGE, Stretcher, context_size};

    let sr = SAMPLE_RATE as u32;
    let window_bytes =
        context_size(sr, DEFAULT_FREQ_RANGE.0, DEFAULT_FREQ_RANGE.1, 0).unwrap();
    let mut window = vec![0i16; window_bytes / 2];
    let mut stretcher =
        Stretcher::init(sr, DEFAULT_FREQ_RANGE.0, DEFAULT_FREQ_RANGE.1, 0, &mut window).unwrap();

    // scratch buffer 2 doubles as the stretcher's output area, so it
    // must cover one block stretched at the slowest speed twice over
    assert!(tinytts::scratch2_size() >= 2 * stretcher.output_capacity(BLOCK_LEN, 0.5));
    let mut out = vec![0i16; tinytts::scratch2_size() / 2];

    let abort = AbortFlag::new();
    let mut slots = [Syllable::EMPTY; 8];
    let mut session = Session::new(&TinyVoice, &abort, &mut slots, test_rng());
    let mut scratch = SynthScratch::new();

    let mut streams: Vec<Vec<i16>> = Vec::new();
    for _ in 0..2 {
        session.reset();
        session.push_text(b"ab").unwrap();
        stretcher.reset();
        let mut slow: Vec<i16> = Vec::new();
        let result = session.synthesize(&mut scratch, &mut |block: &[i16], _: usize| {
            let cap = stretcher.output_capacity(block.len(), 0.5);
            assert!(cap <= out.len());
            let n = stretcher.stretch_samples(block, &mut out, 0.5);
            assert!(n <= cap);
            slow.extend_from_slice(&out[..n]);
            SinkFlow::Continue
        });
        assert!(matches!(result, Synthesis::Done { samples } if samples == 2 * SYLLABLE_SAMPLES));
        let n = stretcher.flush(&mut out);
        slow.extend_from_slice(&out[..n]);
        // half speed roughly doubles the audio
        assert!(slow.len() > 2 * SYLLABLE_SAMPLES);
        streams.push(slow);
    }
    // a reset cycle reproduces the stretched stream exactly
    assert_eq!(streams[0], streams[1]);
}

#[test]
fn finished_sessions_stay_terminal_across_the_pull_protocol() {
    let abort = AbortFlag::new();
    let mut slots = [Syllable::EMPTY; 8];
    let mut session = Session::new(&TinyVoice, &abort, &mut slots, test_rng());
    session.push_text(b"ab").unwrap();
    let mut scratch = SynthScratch::new();
    let result = session.synthesize(&mut scratch, &mut |_: &[i16], _: usize| SinkFlow::Continue);
    let samples = match result {
        Synthesis::Done { samples } => samples,
        other => panic!("unexpected result {other:?}"),
    };
    assert_eq!(session.state(), State::Done);

    // neither a fresh handle nor restart revives a Done session
    let pulled = session.run(&mut scratch, |synth| {
        assert!(synth.next_block().is_none());
        synth.restart();
        let mut n = 0;
        while synth.next_block().is_some() {
            n += 1;
        }
        n
    });
    assert_eq!(pulled, 0);
    assert_eq!(session.state(), State::Done);
    assert_eq!(session.samples_emitted(), samples);

    // reset is the only way back
    session.reset();
    session.push_text(b"ab").unwrap();
    let again = session.synthesize(&mut scratch, &mut |_: &[i16], _: usize| SinkFlow::Continue);
    assert_eq!(again, Synthesis::Done { samples });
}

#[test]
fn rendered_audio_survives_a_wav_round_trip() {
    let pcm = render(b"hi");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE as u32,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let path = std::env::temp_dir().join("tinytts_roundtrip.wav");
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for &s in &pcm {
        writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();

    let mut reader = hound::WavReader::open(&path).unwrap();
    let back: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
    assert_eq!(back, pcm);
    std::fs::remove_file(&path).ok();
}
