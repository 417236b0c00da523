// Audio output using cpal
// Owns the output stream on a dedicated thread and renders through the mixer

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::Mutex;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use super::buffer::DecodedBuffer;
use super::device::{AudioDevice, DeviceProvider, DeviceState};
use super::envelope::GainEnvelope;
use super::mixer::{Mixer, VoiceId};
use crate::error::{Result, SoundError};

type Reply = mpsc::Sender<Result<()>>;

// `cpal::Stream` is not Send, so it never leaves the stream thread
enum StreamCommand {
    Play(Reply),
    Pause(Reply),
    Close,
}

pub struct CpalDevice {
    commands: Mutex<mpsc::Sender<StreamCommand>>,
    mixer: Arc<Mutex<Mixer>>,
    state: Mutex<DeviceState>,
    sample_rate: u32,
}

impl CpalDevice {
    /// Open the default output device. The stream starts suspended.
    pub fn open() -> Result<Self> {
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        thread::Builder::new()
            .name("clicker-audio-output".to_string())
            .spawn(move || stream_thread(command_rx, ready_tx))
            .map_err(|e| SoundError::DeviceUnavailable(format!("Failed to spawn audio thread: {}", e)))?;

        let mixer = ready_rx.recv()
            .map_err(|_| SoundError::DeviceUnavailable("Audio thread exited during setup".to_string()))??;
        let sample_rate = mixer.lock().sample_rate();

        log::info!("Opened audio output at {} Hz", sample_rate);

        Ok(Self {
            commands: Mutex::new(command_tx),
            mixer,
            state: Mutex::new(DeviceState::Suspended),
            sample_rate,
        })
    }

    fn request(&self, make: fn(Reply) -> StreamCommand) -> Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.commands.lock()
            .send(make(reply_tx))
            .map_err(|_| SoundError::DeviceClosed)?;
        reply_rx.recv().map_err(|_| SoundError::DeviceClosed)?
    }
}

impl AudioDevice for CpalDevice {
    fn state(&self) -> DeviceState {
        *self.state.lock()
    }

    fn resume(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            DeviceState::Running => Ok(()),
            DeviceState::Closed => Err(SoundError::DeviceClosed),
            _ => {
                self.request(StreamCommand::Play)?;
                *state = DeviceState::Running;
                Ok(())
            }
        }
    }

    fn suspend(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            DeviceState::Running => {
                self.request(StreamCommand::Pause)?;
                *state = DeviceState::Suspended;
                Ok(())
            }
            DeviceState::Closed => Err(SoundError::DeviceClosed),
            _ => Ok(()),
        }
    }

    fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state == DeviceState::Closed {
            return Ok(());
        }
        // The thread may already be gone; closing is still complete
        let _ = self.commands.lock().send(StreamCommand::Close);
        self.mixer.lock().stop_all();
        *state = DeviceState::Closed;
        log::info!("Closed audio output");
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.mixer.lock().current_time()
    }

    fn start_voice(&self, buffer: Arc<DecodedBuffer>, envelope: GainEnvelope) -> Result<VoiceId> {
        if self.state() == DeviceState::Closed {
            return Err(SoundError::DeviceClosed);
        }
        Ok(self.mixer.lock().start_voice(buffer, envelope))
    }

    fn stop_voice(&self, voice: VoiceId) -> Result<()> {
        if self.mixer.lock().stop_voice(voice) {
            Ok(())
        } else {
            Err(SoundError::VoiceFinished)
        }
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        let _ = self.commands.lock().send(StreamCommand::Close);
    }
}

fn stream_thread(commands: mpsc::Receiver<StreamCommand>, ready: mpsc::Sender<Result<Arc<Mutex<Mixer>>>>) {
    let (stream, mixer) = match build_output() {
        Ok(built) => built,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    // Some hosts start streams on build; hold output until the first resume
    let _ = stream.pause();

    if ready.send(Ok(mixer)).is_err() {
        return;
    }

    for command in commands {
        match command {
            StreamCommand::Play(reply) => {
                let _ = reply.send(stream.play().map_err(|e| SoundError::Stream(format!("Failed to start stream: {}", e))));
            }
            StreamCommand::Pause(reply) => {
                let _ = reply.send(stream.pause().map_err(|e| SoundError::Stream(format!("Failed to pause stream: {}", e))));
            }
            StreamCommand::Close => break,
        }
    }
}

fn build_output() -> Result<(Stream, Arc<Mutex<Mixer>>)> {
    let host = cpal::default_host();

    let device = host.default_output_device()
        .ok_or_else(|| SoundError::DeviceUnavailable("No output device available".to_string()))?;

    let config = device.default_output_config()
        .map_err(|e| SoundError::DeviceUnavailable(format!("Failed to get default output config: {}", e)))?;

    let mixer = Arc::new(Mutex::new(Mixer::new(config.sample_rate().0, config.channels() as usize)));

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config.into(), mixer.clone())?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config.into(), mixer.clone())?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config.into(), mixer.clone())?,
        format => {
            return Err(SoundError::DeviceUnavailable(format!("Unsupported sample format: {:?}", format)))
        }
    };

    Ok((stream, mixer))
}

fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
    device: &cpal::Device,
    config: &StreamConfig,
    mixer: Arc<Mutex<Mixer>>,
) -> Result<Stream> {
    let mut scratch: Vec<f32> = Vec::new();

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0.0);
            mixer.lock().render(&mut scratch);
            for (out, &value) in data.iter_mut().zip(scratch.iter()) {
                *out = T::from_sample(value.clamp(-1.0, 1.0));
            }
        },
        move |err| {
            log::error!("Audio output error: {}", err);
        },
        None,
    ).map_err(|e| SoundError::Stream(format!("Failed to build output stream: {}", e)))
}

/// Opens `CpalDevice`s on the default host
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalProvider;

impl DeviceProvider for CpalProvider {
    fn open(&self) -> Result<Arc<dyn AudioDevice>> {
        Ok(Arc::new(CpalDevice::open()?))
    }
}
