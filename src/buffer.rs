//! PCM buffer storage.
//!
//! Buffer decoding itself (IMA4/µ-law/etc.) is an external collaborator,
//! and this module owns the post-decode, already-linearized
//! mono-per-channel f32 PCM view plus the format tag and loop markers that
//! the mixer consults.

use std::sync::Arc;

/// Source sample format tag, prior to decode-on-demand linearization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    U8,
    S8,
    S16,
    S32,
    F32,
    MuLaw,
    Ima4Adpcm,
    MsAdpcm,
    AmbisonicBFormat,
}

impl SampleFormat {
    /// Formats the voice must decode on demand rather than read as raw f32.
    pub fn needs_decode(self) -> bool {
        matches!(
            self,
            SampleFormat::MuLaw | SampleFormat::Ima4Adpcm | SampleFormat::MsAdpcm
        )
    }
}

/// Channel layout of a source buffer (distinct from the device's output
/// layout in `format.rs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferChannels {
    Mono,
    Stereo,
    AmbisonicBFormat,
    Channelized(u8),
}

impl BufferChannels {
    pub fn count(self) -> usize {
        match self {
            BufferChannels::Mono => 1,
            BufferChannels::Stereo => 2,
            BufferChannels::AmbisonicBFormat => 4,
            BufferChannels::Channelized(n) => n as usize,
        }
    }
}

/// Immutable PCM storage, refcounted by the sources that reference it.
/// Already decoded to per-channel f32 in `[-1, 1]` (µ-law/ADPCM decode is
/// external to this module).
pub struct Buffer {
    pub channels: BufferChannels,
    pub rate: u32,
    /// One `Vec<f32>` per channel.
    pub data: Vec<Vec<f32>>,
    pub loop_start: usize,
    pub loop_end: usize,
}

impl Buffer {
    pub fn new(channels: BufferChannels, rate: u32, data: Vec<Vec<f32>>) -> Arc<Buffer> {
        let frames = data.first().map(|c| c.len()).unwrap_or(0);
        Arc::new(Buffer {
            channels,
            rate,
            data,
            loop_start: 0,
            loop_end: frames,
        })
    }

    pub fn frames(&self) -> usize {
        self.data.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn with_loop_points(mut self, loop_start: usize, loop_end: usize) -> Self {
        self.loop_start = loop_start;
        self.loop_end = loop_end.max(loop_start);
        self
    }
}

/// One entry in a source's playback queue.
#[derive(Clone)]
pub struct QueueEntry {
    pub buffer: Arc<Buffer>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_reports_frame_count_from_first_channel() {
        let buf = Buffer::new(BufferChannels::Mono, 44100, vec![vec![0.0; 1000]]);
        assert_eq!(buf.frames(), 1000);
    }

    #[test]
    fn channelized_reports_declared_count() {
        assert_eq!(BufferChannels::Channelized(6).count(), 6);
    }
}
