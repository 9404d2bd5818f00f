//! End-to-end scenario 1 from the testable-properties list: a source to the
//! listener's right should come out louder in the right channel than the
//! left, by a clearly audible margin.

use std::sync::Arc;

use spatialene::ambisonic::{AmbisonicDecoder, DecodeMatrix, DecoderMode};
use spatialene::buffer::{Buffer, BufferChannels};
use spatialene::device::{Device, RenderMode};
use spatialene::format::{ChannelLayout, SampleType};
use spatialene::handover::Handover;
use spatialene::panner::MAX_AMBISONIC_CHANNELS;
use spatialene::source::SourceProps;
use spatialene::Mixer;

/// A minimal 2-speaker decode matrix that only looks at the W (index 0) and
/// X (index 3) ambisonic channels: left = 0.5*(W - X), right = 0.5*(W + X).
/// X carries the listener-space left/right axis (see `panner::spherical_
/// harmonics`), so this is enough to tell left from right without needing
/// a full loudspeaker layout.
fn lr_decode_matrix() -> DecodeMatrix {
    let n = MAX_AMBISONIC_CHANNELS;
    let mut coefficients = vec![0.0f32; 2 * n];
    coefficients[0] = 0.5; // left: W
    coefficients[3] = -0.5; // left: -X
    coefficients[n] = 0.5; // right: W
    coefficients[n + 3] = 0.5; // right: X
    DecodeMatrix {
        speakers: 2,
        ambisonic_channels: n,
        coefficients,
    }
}

fn sine_buffer(freq: f32, sample_rate: u32, frames: usize) -> std::sync::Arc<Buffer> {
    let data: Vec<f32> = (0..frames)
        .map(|i| (std::f32::consts::TAU * freq * i as f32 / sample_rate as f32).sin())
        .collect();
    Buffer::new(BufferChannels::Mono, sample_rate, vec![data])
}

fn rms(samples: &[f32]) -> f32 {
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len().max(1) as f32).sqrt()
}

#[test]
fn source_to_the_right_is_louder_in_the_right_channel() {
    let sample_rate = 44100u32;
    let mut device = Device::new(sample_rate, ChannelLayout::Stereo, SampleType::F32, RenderMode::Speakers, 0);
    device.attach_ambisonic_decoder(AmbisonicDecoder::new(
        DecoderMode::SingleBand { matrix: lr_decode_matrix() },
        sample_rate as f32,
    ));
    let mut mixer = Mixer::new(device);

    let props = Arc::new(Handover::new(SourceProps {
        position: [1.0, 0.0, 0.0],
        ..SourceProps::default()
    }));
    mixer.add_voice(1, props);
    let buf = sine_buffer(440.0, sample_rate, 44100);
    mixer.voices.get_mut(&1).unwrap().voice.start(buf, false);

    let frames = 44100usize;
    let mut out = vec![0.0f32; frames * 2];
    mixer.render(frames, &mut out);

    // Skip the first slice's gain ramp-up before measuring steady-state RMS.
    let skip_frames = 2048usize;
    let mut left = Vec::with_capacity(frames - skip_frames);
    let mut right = Vec::with_capacity(frames - skip_frames);
    for frame in skip_frames..frames {
        left.push(out[frame * 2]);
        right.push(out[frame * 2 + 1]);
    }

    let left_rms = rms(&left);
    let right_rms = rms(&right);
    assert!(right_rms > left_rms, "right={right_rms} left={left_rms}");

    // 6 dB in amplitude is a factor of ~2; this decode matrix actually
    // produces a much larger difference (left collapses to ~silence), so a
    // factor-of-2 floor is a conservative check of the same property.
    assert!(
        right_rms >= left_rms * 2.0 || left_rms < 1.0e-4,
        "expected >= 6 dB right/left difference: right={right_rms} left={left_rms}"
    );
}
