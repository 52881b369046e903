//! Audio output via cpal — device selection with fallback, fixed-block
//! stream lifecycle.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig, SupportedBufferSize};

use crate::error::SamplerError;

/// An opened (not yet started) output device. The stream itself is
/// created by [`AudioOutput::start`] and lives on the thread that owns
/// this struct; cpal streams must not migrate between threads.
pub struct AudioOutput {
    device: cpal::Device,
    name: String,
    config: StreamConfig,
    stream: Option<cpal::Stream>,
}

impl AudioOutput {
    /// Names of every output device the default host exposes.
    pub fn list_outputs() -> Vec<String> {
        let host = cpal::default_host();
        let Ok(devices) = host.output_devices() else {
            return Vec::new();
        };
        devices.filter_map(|d| d.name().ok()).collect()
    }

    /// Choose and open an output device.
    ///
    /// Selection order: the preferred device by name, then the OS
    /// default, then any device that reports a usable output config.
    /// `buffer_size` is honored when the device supports it, otherwise
    /// the device default block size is used.
    pub fn open(
        preferred: Option<&str>,
        channels: u16,
        buffer_size: u32,
    ) -> Result<Self, SamplerError> {
        let host = cpal::default_host();
        let device = select_device(&host, preferred)?;
        let name = device.name().unwrap_or_else(|_| "Unknown".into());

        let supported = device
            .default_output_config()
            .map_err(|_| SamplerError::NoSuitableAudioDevice)?;
        let sample_rate = supported.sample_rate();

        let buffer = match supported.buffer_size() {
            SupportedBufferSize::Range { min, max }
                if (*min..=*max).contains(&buffer_size) =>
            {
                BufferSize::Fixed(buffer_size)
            }
            _ => {
                log::warn!(
                    "[AudioOutput] {name} does not support {buffer_size}-frame blocks, using device default"
                );
                BufferSize::Default
            }
        };

        let config = StreamConfig {
            channels: channels.max(1),
            sample_rate: SampleRate(sample_rate.0),
            buffer_size: buffer,
        };

        Ok(Self {
            device,
            name,
            config,
            stream: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> usize {
        self.config.channels as usize
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    /// Build and start the output stream. `callback` receives each
    /// interleaved f32 block and the channel count.
    pub fn start<F>(&mut self, mut callback: F) -> Result<(), SamplerError>
    where
        F: FnMut(&mut [f32], usize) + Send + 'static,
    {
        let channels = self.config.channels as usize;
        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    callback(data, channels);
                },
                |err| {
                    log::error!("[AudioOutput] stream error: {err}");
                },
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => {
                    SamplerError::AudioDeviceBusy(self.name.clone())
                }
                other => SamplerError::Stream(other.to_string()),
            })?;

        stream
            .play()
            .map_err(|e| SamplerError::Stream(e.to_string()))?;

        log::info!(
            "[AudioOutput] stream started on {}: {}Hz, {} channels",
            self.name,
            self.config.sample_rate.0,
            channels
        );
        self.stream = Some(stream);
        Ok(())
    }

    /// Drop the stream; the callback stops after the current block.
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            log::info!("[AudioOutput] stream stopped on {}", self.name);
        }
    }
}

fn select_device(host: &cpal::Host, preferred: Option<&str>) -> Result<cpal::Device, SamplerError> {
    if let Some(name) = preferred {
        if let Ok(mut devices) = host.output_devices() {
            if let Some(device) =
                devices.find(|d| d.name().as_deref().map(|n| n == name).unwrap_or(false))
            {
                if device.default_output_config().is_ok() {
                    return Ok(device);
                }
            }
        }
        log::warn!("[AudioOutput] configured device '{name}' unavailable, falling back to default");
    }

    if let Some(device) = host.default_output_device() {
        if device.default_output_config().is_ok() {
            return Ok(device);
        }
        log::warn!("[AudioOutput] default output device has no usable config, scanning");
    }

    if let Ok(devices) = host.output_devices() {
        for device in devices {
            if device.default_output_config().is_ok() {
                return Ok(device);
            }
        }
    }

    Err(SamplerError::NoSuitableAudioDevice)
}
