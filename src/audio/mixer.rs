// Voice mixer shared by the output stream
// Renders every active voice into an interleaved output buffer

use std::sync::Arc;

use super::buffer::DecodedBuffer;
use super::envelope::GainEnvelope;

/// Identifies a voice started on a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(pub u64);

struct Voice {
    id: VoiceId,
    buffer: Arc<DecodedBuffer>,
    envelope: GainEnvelope,
    // Fractional source frame, advanced by `step` per output frame
    cursor: f64,
    step: f64,
}

impl Voice {
    fn finished(&self) -> bool {
        self.cursor >= self.buffer.frames() as f64
    }
}

pub struct Mixer {
    sample_rate: u32,
    channels: usize,
    frames_rendered: u64,
    next_id: u64,
    voices: Vec<Voice>,
}

impl Mixer {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            frames_rendered: 0,
            next_id: 0,
            voices: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Device clock in seconds; only moves while audio is being rendered
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Start `buffer` from its first frame with the given gain envelope
    pub fn start_voice(&mut self, buffer: Arc<DecodedBuffer>, envelope: GainEnvelope) -> VoiceId {
        let id = VoiceId(self.next_id);
        self.next_id += 1;

        let step = buffer.sample_rate() as f64 / self.sample_rate as f64;
        self.voices.push(Voice {
            id,
            buffer,
            envelope,
            cursor: 0.0,
            step,
        });
        id
    }

    /// Returns false if the voice had already finished or was never started
    pub fn stop_voice(&mut self, id: VoiceId) -> bool {
        let before = self.voices.len();
        self.voices.retain(|v| v.id != id);
        self.voices.len() != before
    }

    pub fn stop_all(&mut self) {
        self.voices.clear();
    }

    /// Mix all voices into `out` (interleaved, `channels` wide), overwriting it
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let frames = out.len() / self.channels;

        for frame in 0..frames {
            let time = (self.frames_rendered + frame as u64) as f64 / self.sample_rate as f64;
            let slot = &mut out[frame * self.channels..(frame + 1) * self.channels];

            for voice in self.voices.iter_mut() {
                if voice.finished() {
                    continue;
                }
                let gain = voice.envelope.value_at(time);
                let source_frame = voice.cursor as usize;
                let source_channels = voice.buffer.channels();

                if source_channels == 1 {
                    let value = voice.buffer.sample(source_frame, 0) * gain;
                    for sample in slot.iter_mut() {
                        *sample += value;
                    }
                } else {
                    for ch in 0..source_channels {
                        let target = ch.min(self.channels - 1);
                        slot[target] += voice.buffer.sample(source_frame, ch) * gain;
                    }
                }

                voice.cursor += voice.step;
            }
        }

        self.frames_rendered += frames as u64;
        self.voices.retain(|v| !v.finished());
    }
}
