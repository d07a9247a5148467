use tinytts::stretch::{DEFAULT_FREQ_RANGE, FAST_FLAG, StretchError, Stretcher, context_size};

const SAMPLE_RATE: u32 = 16_000;

fn window_samples(flags: u32) -> usize {
    context_size(SAMPLE_RATE, DEFAULT_FREQ_RANGE.0, DEFAULT_FREQ_RANGE.1, flags).unwrap() / 2
}

/// A 100 Hz square wave, comfortably inside the default range.
fn square(len: usize) -> Vec<i16> {
    (0..len)
        .map(|i| if (i / 80) % 2 == 0 { 6000 } else { -6000 })
        .collect()
}

fn run(input: &[i16], speed: f32, flags: u32, chunk: usize) -> Vec<i16> {
    let mut buf = vec![0i16; window_samples(flags)];
    let mut stretcher = Stretcher::init(
        SAMPLE_RATE,
        DEFAULT_FREQ_RANGE.0,
        DEFAULT_FREQ_RANGE.1,
        flags,
        &mut buf,
    )
    .unwrap();
    let mut out = Vec::new();
    let mut scratch = vec![0i16; stretcher.output_capacity(chunk, speed)];
    for piece in input.chunks(chunk) {
        let n = stretcher.stretch_samples(piece, &mut scratch, speed);
        assert!(n <= stretcher.output_capacity(piece.len(), speed));
        out.extend_from_slice(&scratch[..n]);
    }
    let n = stretcher.flush(&mut scratch);
    out.extend_from_slice(&scratch[..n]);
    out
}

#[test]
fn rejects_unsupported_ranges() {
    assert!(context_size(SAMPLE_RATE, 0, 333, 0).is_none());
    assert!(context_size(SAMPLE_RATE, 333, 55, 0).is_none());
    assert!(context_size(SAMPLE_RATE, 55, 1000, 0).is_none());
    let mut buf = [0i16; 8];
    assert_eq!(
        Stretcher::init(SAMPLE_RATE, 0, 333, 0, &mut buf).err(),
        Some(StretchError::UnsupportedRange)
    );
    assert_eq!(
        Stretcher::init(SAMPLE_RATE, 55, 333, 0, &mut buf).err(),
        Some(StretchError::BufferTooSmall)
    );
}

#[test]
fn unit_speed_is_a_pure_passthrough() {
    let input = square(8000);
    let out = run(&input, 1.0, 0, 320);
    assert_eq!(out, input);
}

#[test]
fn slowing_down_lengthens_the_audio() {
    let input = square(16_000);
    let out = run(&input, 0.8, 0, 320);
    assert!(out.len() > input.len());
    // ratio lands near 1 / 0.8
    let ratio = out.len() as f32 / input.len() as f32;
    assert!((1.1..1.4).contains(&ratio), "ratio {ratio}");
}

#[test]
fn speeding_up_shortens_the_audio() {
    let input = square(16_000);
    let out = run(&input, 1.5, 0, 320);
    assert!(out.len() < input.len());
    let ratio = out.len() as f32 / input.len() as f32;
    assert!((0.55..0.85).contains(&ratio), "ratio {ratio}");
}

#[test]
fn half_speed_doubles_the_audio() {
    let input = square(16_000);
    let out = run(&input, 0.5, 0, 320);
    let ratio = out.len() as f32 / input.len() as f32;
    assert!((1.7..2.1).contains(&ratio), "ratio {ratio}");
}

#[test]
fn out_of_range_speeds_are_clamped() {
    let input = square(8000);
    let slow = run(&input, 0.1, 0, 320);
    let slow_clamped = run(&input, 0.5, 0, 320);
    assert_eq!(slow.len(), slow_clamped.len());
}

#[test]
fn fast_mode_stays_close_to_the_exact_analysis() {
    let input = square(16_000);
    let exact = run(&input, 0.8, 0, 320);
    let fast = run(&input, 0.8, FAST_FLAG, 320);
    let diff = exact.len().abs_diff(fast.len());
    assert!(diff * 5 < exact.len(), "exact {} fast {}", exact.len(), fast.len());
}

#[test]
fn reset_restores_the_initial_behavior() {
    let input = square(8000);
    let mut buf = vec![0i16; window_samples(0)];
    let mut stretcher = Stretcher::init(
        SAMPLE_RATE,
        DEFAULT_FREQ_RANGE.0,
        DEFAULT_FREQ_RANGE.1,
        0,
        &mut buf,
    )
    .unwrap();
    let mut scratch = vec![0i16; stretcher.output_capacity(input.len(), 1.0)];
    let first = stretcher.stretch_samples(&input, &mut scratch, 1.0);
    let first_out = scratch[..first].to_vec();
    stretcher.reset();
    let second = stretcher.stretch_samples(&input, &mut scratch, 1.0);
    assert_eq!(first, second);
    assert_eq!(first_out, scratch[..second]);
}
