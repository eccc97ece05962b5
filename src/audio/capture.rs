//! Capture thread and frame ring
//!
//! The cpal stream lives on its own thread because the stream handle is not
//! `Send`. The callback downmixes interleaved channels to mono, downsamples
//! to the target rate, and pushes into the shared ring. Consumers pull
//! fixed-size frames; `None` means not enough samples have arrived yet.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use super::AudioError;

/// Upper bound on buffered audio, in seconds. Oldest samples are evicted
/// past this, which also bounds how much stale audio a toggle-on can send.
const MAX_BUFFERED_SECS: u32 = 1;

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Rate the transcription service expects, in Hz
    pub target_sample_rate: u32,
    /// Samples per frame handed to the sender
    pub frame_samples: usize,
}

/// Consumer handle over the shared sample ring.
///
/// Cloning shares the ring. `read_frame` returns exactly one frame or
/// `None` when the ring has not accumulated a full frame yet.
#[derive(Debug, Clone)]
pub struct FrameSource {
    ring: Arc<Mutex<VecDeque<i16>>>,
    frame_samples: usize,
    max_samples: usize,
    dropped: Arc<AtomicU64>,
}

impl FrameSource {
    pub fn new(frame_samples: usize, max_samples: usize) -> Self {
        Self {
            ring: Arc::new(Mutex::new(VecDeque::with_capacity(max_samples))),
            frame_samples,
            max_samples,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Pull exactly one frame, or `None` if the ring is still filling.
    pub fn read_frame(&self) -> Option<Vec<i16>> {
        let mut ring = self.ring.lock().unwrap();
        if ring.len() < self.frame_samples {
            return None;
        }
        Some(ring.drain(..self.frame_samples).collect())
    }

    /// Append captured samples, evicting the oldest past the ring bound.
    pub fn push_samples(&self, samples: &[i16]) {
        let mut ring = self.ring.lock().unwrap();
        ring.extend(samples.iter().copied());

        let mut evicted = 0u64;
        while ring.len() > self.max_samples {
            ring.pop_front();
            evicted += 1;
        }
        drop(ring);

        if evicted > 0 {
            let total = self.dropped.fetch_add(evicted, Ordering::Relaxed) + evicted;
            log::debug!(
                "FrameSource: evicted {} samples ({} dropped in total)",
                evicted,
                total
            );
        }
    }

    pub fn buffered_samples(&self) -> usize {
        self.ring.lock().unwrap().len()
    }

    pub fn dropped_samples(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Keeps the capture thread alive. Dropping stops the stream and joins
/// the thread.
pub struct CaptureHandle {
    stop: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Start capturing from the default input device.
///
/// Blocks until the capture thread reports that the stream is running, so
/// device problems surface here instead of silently producing no audio.
pub fn start_capture(config: &CaptureConfig) -> Result<(CaptureHandle, FrameSource), AudioError> {
    let max_samples = (config.target_sample_rate * MAX_BUFFERED_SECS) as usize;
    let source = FrameSource::new(config.frame_samples, max_samples);
    let stop = Arc::new(AtomicBool::new(false));

    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), AudioError>>();

    let thread = {
        let config = config.clone();
        let source = source.clone();
        let stop = stop.clone();
        std::thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || capture_thread(config, source, stop, ready_tx))
            .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?
    };

    match ready_rx.recv() {
        Ok(Ok(())) => Ok((
            CaptureHandle {
                stop,
                thread: Some(thread),
            },
            source,
        )),
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(e)
        }
        Err(_) => {
            let _ = thread.join();
            Err(AudioError::StreamCreationFailed(
                "Capture thread exited before reporting readiness".to_string(),
            ))
        }
    }
}

fn capture_thread(
    config: CaptureConfig,
    source: FrameSource,
    stop: Arc<AtomicBool>,
    ready_tx: std::sync::mpsc::Sender<Result<(), AudioError>>,
) {
    match build_stream(&config, source) {
        Ok(stream) => {
            let _ = ready_tx.send(Ok(()));
            while !stop.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(50));
            }
            drop(stream);
            log::info!("Audio capture stopped");
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
        }
    }
}

fn build_stream(config: &CaptureConfig, source: FrameSource) -> Result<Stream, AudioError> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or(AudioError::NoInputDevice)?;

    log::info!("Using audio input device: {:?}", device.name());

    let supported_config = device
        .default_input_config()
        .map_err(|_| AudioError::NoSupportedConfig)?;

    let device_rate = supported_config.sample_rate().0;
    let channels = supported_config.channels();

    log::info!(
        "Audio config: {} Hz, {} channels, {:?}",
        device_rate,
        channels,
        supported_config.sample_format()
    );

    if device_rate == 0 || device_rate % config.target_sample_rate != 0 {
        return Err(AudioError::UnsupportedSampleRate {
            device: device_rate,
            target: config.target_sample_rate,
        });
    }

    let sample_format = supported_config.sample_format();
    let stream_config: StreamConfig = supported_config.into();
    let target_rate = config.target_sample_rate;

    let stream = match sample_format {
        SampleFormat::I16 => {
            build_stream_typed::<i16>(&device, &stream_config, source, device_rate, target_rate)
        }
        SampleFormat::U16 => {
            build_stream_typed::<u16>(&device, &stream_config, source, device_rate, target_rate)
        }
        SampleFormat::F32 => {
            build_stream_typed::<f32>(&device, &stream_config, source, device_rate, target_rate)
        }
        _ => return Err(AudioError::NoSupportedConfig),
    }?;

    stream
        .play()
        .map_err(|e| AudioError::StreamCreationFailed(format!("Failed to start stream: {}", e)))?;

    log::info!("Audio capture started");
    Ok(stream)
}

fn build_stream_typed<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    source: FrameSource,
    device_rate: u32,
    target_rate: u32,
) -> Result<Stream, AudioError>
where
    T: cpal::Sample<Float = f32> + cpal::SizedSample + Send + 'static,
{
    let err_fn = |err| log::error!("Audio stream error: {}", err);
    let channels = config.channels as usize;
    let ratio = (device_rate / target_rate) as usize;

    // Carries mono samples left over from the previous callback so the
    // downsample ratio stays aligned across callback boundaries.
    let mut carry: Vec<i16> = Vec::new();

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                for frame in data.chunks(channels) {
                    let sum: i32 = frame.iter().map(|&s| sample_to_i16(s) as i32).sum();
                    carry.push((sum / frame.len() as i32) as i16);
                }

                let usable = carry.len() - carry.len() % ratio;
                if usable > 0 {
                    let downsampled = downsample(&carry[..usable], device_rate, target_rate);
                    source.push_samples(&downsampled);
                    carry.drain(..usable);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

    Ok(stream)
}

/// Convert any sample type to i16.
fn sample_to_i16<T: cpal::Sample<Float = f32>>(sample: T) -> i16 {
    let f32_sample: f32 = sample.to_float_sample();
    let clamped = f32_sample.clamp(-1.0, 1.0);
    (clamped * i16::MAX as f32) as i16
}

/// Downsample audio from source rate to target rate using chunk averaging.
///
/// Supports integer ratios only (e.g. 48kHz → 16kHz). Returns the input
/// unchanged if the rates match or the ratio is not an integer.
pub fn downsample(samples: &[i16], source_rate: u32, target_rate: u32) -> Vec<i16> {
    if target_rate == 0 || source_rate == 0 {
        log::warn!(
            "Invalid sample rate (source: {}, target: {}), returning original",
            source_rate,
            target_rate
        );
        return samples.to_vec();
    }

    if source_rate == target_rate {
        return samples.to_vec();
    }

    if source_rate % target_rate != 0 {
        log::warn!(
            "Unsupported resample ratio {}:{}, returning original",
            source_rate,
            target_rate
        );
        return samples.to_vec();
    }

    let ratio = (source_rate / target_rate) as usize;

    samples
        .chunks(ratio)
        .map(|chunk| {
            // i64 to avoid overflow on wide chunks
            let sum: i64 = chunk.iter().map(|&s| s as i64).sum();
            (sum / chunk.len() as i64) as i16
        })
        .collect()
}
