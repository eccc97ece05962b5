//! Microphone capture feeding the streaming sender
//!
//! A cpal input stream runs on a dedicated thread (the stream handle is not
//! `Send`) and pushes downmixed, downsampled PCM16 samples into a bounded
//! ring. The sender pulls fixed-size frames from the ring; an underfilled
//! ring is the transient "no frame yet" condition, a full ring evicts the
//! oldest samples.

mod capture;

pub use capture::{downsample, start_capture, CaptureConfig, CaptureHandle, FrameSource};

/// Errors that can occur while setting up audio capture.
#[derive(Debug, Clone)]
pub enum AudioError {
    NoInputDevice,
    NoSupportedConfig,
    StreamCreationFailed(String),
    /// Device rate is not an integer multiple of the target rate
    UnsupportedSampleRate {
        device: u32,
        target: u32,
    },
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::NoInputDevice => write!(f, "No audio input device found"),
            AudioError::NoSupportedConfig => write!(f, "No supported audio configuration"),
            AudioError::StreamCreationFailed(e) => {
                write!(f, "Failed to create audio stream: {}", e)
            }
            AudioError::UnsupportedSampleRate { device, target } => {
                write!(
                    f,
                    "Device sample rate {} Hz is not an integer multiple of {} Hz",
                    device, target
                )
            }
        }
    }
}

impl std::error::Error for AudioError {}
