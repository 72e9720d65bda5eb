//! Incremental stream decoder
//!
//! Wraps symphonia's probe/format/decoder stack and hands out decoded
//! audio one packet at a time as interleaved stereo f32. Mono input is
//! duplicated to both channels; extra channels beyond two are dropped.

use crate::error::{Error, Result};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use tracing::{debug, warn};

pub(crate) struct StreamDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    duration_ms: Option<u64>,
    sample_buf: Option<SampleBuffer<f32>>,
}

impl StreamDecoder {
    /// Probe the source and set up a decoder for its default audio track.
    pub(crate) fn open(source: Box<dyn MediaSource>, url: &str) -> Result<Self> {
        let mss = MediaSourceStream::new(source, Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = url.rsplit('.').next().filter(|e| e.len() <= 4) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::UnsupportedFormat(format!("probe failed: {e}")))?;

        let format = probed.format;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::UnsupportedFormat("no audio track".to_string()))?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| Error::UnsupportedFormat("sample rate unknown".to_string()))?;
        let channels = codec_params
            .channels
            .map(|c| c.count())
            .ok_or_else(|| Error::UnsupportedFormat("channel layout unknown".to_string()))?;
        let duration_ms = codec_params
            .n_frames
            .map(|frames| frames.saturating_mul(1000) / sample_rate as u64);

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| Error::UnsupportedFormat(format!("codec unsupported: {e}")))?;

        debug!(sample_rate, channels, ?duration_ms, "stream decoder open");
        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            duration_ms,
            sample_buf: None,
        })
    }

    pub(crate) fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub(crate) fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    /// Decode the next packet into `out` as interleaved stereo f32.
    /// Returns the number of frames appended, or `None` at end of stream.
    pub(crate) fn next_chunk(&mut self, out: &mut Vec<f32>) -> Result<Option<usize>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    debug!("end of stream");
                    return Ok(None);
                }
                Err(symphonia::core::errors::Error::IoError(e)) => {
                    return Err(Error::Io(e));
                }
                Err(e) => {
                    return Err(Error::Playback(format!("packet read failed: {e}")));
                }
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let capacity = decoded.capacity() as u64;
                    let needs_new = self
                        .sample_buf
                        .as_ref()
                        .map(|b| b.capacity() < (capacity as usize * spec.channels.count()))
                        .unwrap_or(true);
                    if needs_new {
                        self.sample_buf = Some(SampleBuffer::new(capacity, spec));
                    }
                    let Some(buf) = self.sample_buf.as_mut() else {
                        return Err(Error::Playback("sample buffer unavailable".to_string()));
                    };
                    buf.copy_interleaved_ref(decoded);

                    let frames = to_stereo(buf.samples(), spec.channels.count(), out);
                    return Ok(Some(frames));
                }
                Err(symphonia::core::errors::Error::DecodeError(e)) => {
                    // corrupt packet; skip and keep going
                    warn!(error = %e, "decode error, skipping packet");
                    continue;
                }
                Err(e) => {
                    return Err(Error::Playback(format!("decode failed: {e}")));
                }
            }
        }
    }

    /// Seek the container to a position and reset decoder state.
    pub(crate) fn seek_ms(&mut self, position_ms: u64) -> Result<()> {
        let time = Time::from(position_ms as f64 / 1000.0);
        self.format
            .seek(
                SeekMode::Coarse,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| Error::Playback(format!("seek failed: {e}")))?;
        self.decoder.reset();
        Ok(())
    }
}

/// Append interleaved samples as stereo frames: mono is duplicated, extra
/// channels beyond two are dropped. Returns the frame count appended.
fn to_stereo(samples: &[f32], src_channels: usize, out: &mut Vec<f32>) -> usize {
    match src_channels {
        0 => 0,
        1 => {
            for &s in samples {
                out.push(s);
                out.push(s);
            }
            samples.len()
        }
        2 => {
            out.extend_from_slice(samples);
            samples.len() / 2
        }
        n => {
            for frame in samples.chunks_exact(n) {
                out.push(frame[0]);
                out.push(frame[1]);
            }
            samples.len() / n
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_is_duplicated_to_both_channels() {
        let mut out = Vec::new();
        let frames = to_stereo(&[0.1, -0.2, 0.3], 1, &mut out);
        assert_eq!(frames, 3);
        assert_eq!(out, vec![0.1, 0.1, -0.2, -0.2, 0.3, 0.3]);
    }

    #[test]
    fn stereo_passes_through() {
        let mut out = Vec::new();
        let frames = to_stereo(&[0.1, 0.2, 0.3, 0.4], 2, &mut out);
        assert_eq!(frames, 2);
        assert_eq!(out, vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn surround_keeps_the_front_pair() {
        let mut out = Vec::new();
        let frames = to_stereo(&[0.1, 0.2, 0.9, 0.9, 0.3, 0.4, 0.9, 0.9], 4, &mut out);
        assert_eq!(frames, 2);
        assert_eq!(out, vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn zero_channels_appends_nothing() {
        let mut out = Vec::new();
        assert_eq!(to_stereo(&[0.5], 0, &mut out), 0);
        assert!(out.is_empty());
    }
}
