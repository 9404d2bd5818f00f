//! Testable invariant: for all valid inputs, a gain ramp's distance to its
//! target never increases from one slice to the next.

use spatialene::voice::GainRamp;

#[test]
fn ramp_distance_to_target_is_non_increasing_across_slices() {
    let mut ramp = GainRamp::new(1);
    let targets = [1.0f32, 0.2, 0.9, 0.0, 0.5];
    let mut current = 0.0f32;

    for &target in &targets {
        ramp.set_target(&[target]);
        let mut out = vec![vec![0.0f32; 32]];
        let before_distance = (current - target).abs();
        ramp.ramp_into(32, &mut out);
        current = *out[0].last().unwrap();
        let after_distance = (current - target).abs();
        assert!(
            after_distance <= before_distance + 1.0e-6,
            "distance grew: before={before_distance} after={after_distance}"
        );
        for &sample in &out[0] {
            assert!(sample.is_finite());
        }
    }
}

#[test]
fn ramp_reaches_target_exactly_at_slice_end() {
    let mut ramp = GainRamp::new(2);
    ramp.set_target(&[0.75, -0.25]);
    let mut out = vec![vec![0.0f32; 64], vec![0.0f32; 64]];
    ramp.ramp_into(64, &mut out);
    assert!((out[0][63] - 0.75).abs() < 1.0e-5);
    assert!((out[1][63] - (-0.25)).abs() < 1.0e-5);
}

#[test]
fn repeated_target_changes_never_overshoot() {
    let mut ramp = GainRamp::new(1);
    ramp.set_target(&[1.0]);
    let mut out = vec![vec![0.0f32; 16]];
    ramp.ramp_into(16, &mut out);
    assert!(out[0].iter().all(|&s| (0.0..=1.0001).contains(&s)));

    ramp.set_target(&[0.0]);
    ramp.ramp_into(16, &mut out);
    assert!(out[0].iter().all(|&s| (-0.0001..=1.0001).contains(&s)));
}
