//! Audio device output using cpal
//!
//! Opens the default output device and renders frames pulled from a
//! callback. The stream handle is not `Send`, so a `DeviceOutput` lives
//! entirely on its session thread; control reaches it through the shared
//! volume cell and the error flag.

use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, warn};

pub(crate) struct DeviceOutput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
    volume: Arc<Mutex<f32>>,
    error_flag: Arc<AtomicBool>,
}

impl DeviceOutput {
    /// Open the default output device, preferring a stereo config at the
    /// given sample rate. Falls back to the device default when the rate
    /// is unsupported.
    pub(crate) fn open(sample_rate: u32, volume: Arc<Mutex<f32>>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::AudioOutput("no output device available".to_string()))?;

        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("device query failed: {e}")))?
            .find(|c| {
                c.channels() == 2
                    && c.min_sample_rate().0 <= sample_rate
                    && c.max_sample_rate().0 >= sample_rate
            });

        let (config, sample_format) = match supported {
            Some(c) => {
                let sample_format = c.sample_format();
                (c.with_sample_rate(cpal::SampleRate(sample_rate)).config(), sample_format)
            }
            None => {
                let default = device
                    .default_output_config()
                    .map_err(|e| Error::AudioOutput(format!("no default config: {e}")))?;
                warn!(
                    requested = sample_rate,
                    actual = default.sample_rate().0,
                    "requested sample rate unsupported, using device default"
                );
                (default.config(), default.sample_format())
            }
        };

        info!(
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            format = ?sample_format,
            "output device open"
        );
        Ok(Self {
            device,
            config,
            sample_format,
            stream: None,
            volume,
            error_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Start rendering. `next_frame` is called once per output frame and
    /// returns an (left, right) pair; volume and clipping are applied
    /// here.
    pub(crate) fn start<F>(&mut self, next_frame: F) -> Result<()>
    where
        F: FnMut() -> (f32, f32) + Send + 'static,
    {
        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32, F>(next_frame)?,
            SampleFormat::I16 => self.build_stream::<i16, F>(next_frame)?,
            SampleFormat::U16 => self.build_stream::<u16, F>(next_frame)?,
            other => {
                return Err(Error::AudioOutput(format!(
                    "unsupported sample format: {other:?}"
                )))
            }
        };
        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("stream start failed: {e}")))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn build_stream<T, F>(&self, mut next_frame: F) -> Result<Stream>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
        F: FnMut() -> (f32, f32) + Send + 'static,
    {
        let channels = self.config.channels as usize;
        let volume = Arc::clone(&self.volume);
        let error_flag = Arc::clone(&self.error_flag);

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let gain = *volume.lock().unwrap_or_else(PoisonError::into_inner);
                    for frame in data.chunks_mut(channels) {
                        let (left, right) = next_frame();
                        let left = (left * gain).clamp(-1.0, 1.0);
                        let right = (right * gain).clamp(-1.0, 1.0);
                        frame[0] = T::from_sample(left);
                        if channels > 1 {
                            frame[1] = T::from_sample(right);
                        }
                        for extra in frame.iter_mut().skip(2) {
                            *extra = T::from_sample(0.0f32);
                        }
                    }
                },
                move |err| {
                    error!(error = %err, "audio stream error");
                    error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("stream build failed: {e}")))?;
        Ok(stream)
    }

    pub(crate) fn stop(&mut self) {
        self.stream = None;
    }

    pub(crate) fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// True once the device reported a stream error (unplugged, claimed
    /// exclusively, ...).
    pub(crate) fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }
}
