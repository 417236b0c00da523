// Clip decoder using Symphonia
// Decodes fetched clip bytes to interleaved PCM at the device rate

use symphonia::core::audio::{AudioBufferRef, AudioPlanes, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use std::io::Cursor;

use super::buffer::DecodedBuffer;
use super::resample::resample;
use crate::error::{Result, SoundError};

struct ClipDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
}

impl ClipDecoder {
    fn open(location: &str, bytes: Vec<u8>) -> Result<Self> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        // Use the source's extension as a probe hint
        let mut hint = Hint::new();
        if let Some(ext) = extension_of(location) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| SoundError::decode(location, format!("probe failed: {}", e)))?;

        let format = probed.format;

        let track = format.tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| SoundError::decode(location, "no audio track found"))?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
        let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| SoundError::decode(location, format!("no decoder: {}", e)))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
        })
    }

    /// Decode next packet, returns interleaved f32 samples
    /// Returns None when end of stream is reached
    fn decode_next(&mut self, location: &str) -> Result<Option<Vec<f32>>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(SoundError::decode(location, e)),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    // Keep the channel count the decoder actually produced
                    self.channels = decoded.spec().channels.count().max(1);
                    return Ok(Some(audio_buf_to_f32(&decoded)));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    log::debug!("Skipping undecodable packet in {}: {}", location, e);
                    continue;
                }
                Err(e) => return Err(SoundError::decode(location, e)),
            }
        }
    }
}

/// Decode a whole clip and bring it to `target_rate`.
///
/// Blocking; callers on the async runtime go through `spawn_blocking`.
pub fn decode_clip(location: &str, bytes: Vec<u8>, target_rate: u32) -> Result<DecodedBuffer> {
    if bytes.is_empty() {
        return Err(SoundError::decode(location, "empty input"));
    }

    let mut decoder = ClipDecoder::open(location, bytes)?;
    let mut samples = Vec::new();
    while let Some(chunk) = decoder.decode_next(location)? {
        samples.extend_from_slice(&chunk);
    }

    if samples.is_empty() {
        return Err(SoundError::decode(location, "no samples decoded"));
    }

    let channels = decoder.channels;
    let source_rate = decoder.sample_rate;
    if target_rate == 0 || target_rate == source_rate {
        return Ok(DecodedBuffer::new(samples, source_rate, channels));
    }

    let resampled = resample(&samples, channels, source_rate, target_rate)?;
    Ok(DecodedBuffer::new(resampled, target_rate, channels))
}

fn extension_of(location: &str) -> Option<&str> {
    let path = location.split(['?', '#']).next().unwrap_or(location);
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rsplit_once('.').map(|(_, ext)| ext).filter(|ext| !ext.is_empty())
}

/// Convert any AudioBufferRef to interleaved f32 samples
fn audio_buf_to_f32(buf: &AudioBufferRef) -> Vec<f32> {
    match buf {
        AudioBufferRef::F32(b) => interleave(b.planes(), b.frames(), |s: f32| s),
        AudioBufferRef::F64(b) => interleave(b.planes(), b.frames(), |s: f64| s as f32),
        AudioBufferRef::S8(b) => interleave(b.planes(), b.frames(), |s: i8| s as f32 / 128.0),
        AudioBufferRef::S16(b) => interleave(b.planes(), b.frames(), |s: i16| s as f32 / 32768.0),
        AudioBufferRef::S24(b) => {
            interleave(b.planes(), b.frames(), |s| s.inner() as f32 / 8388608.0)
        }
        AudioBufferRef::S32(b) => {
            interleave(b.planes(), b.frames(), |s: i32| (s as f64 / 2147483648.0) as f32)
        }
        AudioBufferRef::U8(b) => {
            interleave(b.planes(), b.frames(), |s: u8| (s as f32 - 128.0) / 128.0)
        }
        AudioBufferRef::U16(b) => {
            interleave(b.planes(), b.frames(), |s: u16| (s as f32 - 32768.0) / 32768.0)
        }
        AudioBufferRef::U24(b) => {
            interleave(b.planes(), b.frames(), |s| (s.inner() as f32 - 8388608.0) / 8388608.0)
        }
        AudioBufferRef::U32(b) => {
            interleave(b.planes(), b.frames(), |s: u32| ((s as f64 - 2147483648.0) / 2147483648.0) as f32)
        }
    }
}

fn interleave<T: Sample + Copy, F: Fn(T) -> f32>(
    planes: AudioPlanes<T>,
    frames: usize,
    convert: F,
) -> Vec<f32> {
    let planes = planes.planes();
    if planes.is_empty() || frames == 0 {
        return vec![];
    }

    let mut interleaved = Vec::with_capacity(frames * planes.len());
    for frame in 0..frames {
        for plane in planes {
            interleaved.push(convert(plane[frame]));
        }
    }
    interleaved
}
