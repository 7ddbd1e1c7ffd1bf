// Capability boundary between the sound scheduling core and the audio engine
// that actually decodes, mixes and renders voices.

use std::fmt;
use thiserror::Error;

pub use glam::Vec3;

// The mock engine lives in `src/mock_backend.rs`.
#[cfg(feature = "mock-audio")]
pub mod mock_backend;

/// A specialized error type for audio engine failures.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("asset not found: {0}")]
    AssetNotFound(String),
    #[error("voice creation failed: {0}")]
    VoiceCreationFailed(String),
    #[error("unknown voice {0}")]
    UnknownVoice(VoiceHandle),
    #[error("invalid operation")]
    InvalidOperation,
    #[error("device error: {0}")]
    DeviceError(String),
}

/// Opaque engine voice. Owned by exactly one slot while it is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceHandle(pub u64);

impl fmt::Display for VoiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice#{}", self.0)
    }
}

/// Creation flags for file-backed voices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoiceFlags {
    /// Fully decode the asset up front instead of streaming it.
    pub decode: bool,
    /// Disable 3D spatialization from the start.
    pub no_spatialization: bool,
}

impl VoiceFlags {
    pub const DECODE: VoiceFlags = VoiceFlags { decode: true, no_spatialization: false };
}

/// PCM sample encodings understood at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    U8,
    S16,
}

impl SampleFormat {
    /// Width in bytes of one sample in this format.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16 => 2,
        }
    }

    /// Maps a legacy sample width (1 or 2 bytes) to a format.
    pub fn from_width(width: usize) -> Self {
        if width == 1 { SampleFormat::U8 } else { SampleFormat::S16 }
    }
}

/// Represents the effective configuration of an audio engine.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub sample_rate: u32,
    /// Period size in frames of one hardware callback.
    pub buffer_size: usize,
    pub channels: u16,
    /// Format assets are decoded to.
    pub decoded_format: SampleFormat,
    pub device_name: Option<String>,
}

/// Format reported by a custom stream source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub channels: u16,
    /// `None` when the source has no notion of a sample rate and plays at the engine rate.
    pub sample_rate: Option<u32>,
}

/// Result of a single pull from a stream source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRead {
    pub frames: usize,
    /// The source has nothing more to give right now; the engine stops the voice.
    pub at_end: bool,
}

/// Custom data source pulled by the engine from its real-time callback.
///
/// Implementations must not block and must never panic across the callback.
pub trait StreamSource: Send + 'static {
    /// Fill `out` (interleaved signed 16-bit) with as many whole frames as are available.
    fn read(&mut self, out: &mut [i16]) -> StreamRead;
    fn seek(&mut self, frame: u64) -> Result<(), BackendError>;
    fn format(&self) -> StreamFormat;
}

/// The core trait defining the audio engine's contract.
///
/// Positions and directions are in the engine's coordinate system; callers
/// are responsible for converting from simulation space.
pub trait AudioEngine {
    fn device_info(&self) -> &DeviceInfo;

    fn sample_rate(&self) -> u32 {
        self.device_info().sample_rate
    }

    fn channels(&self) -> u16 {
        self.device_info().channels
    }

    fn period_frames(&self) -> usize {
        self.device_info().buffer_size
    }

    /// Start pulling audio from the device.
    fn start(&mut self) -> Result<(), BackendError>;
    /// Stop the device without releasing any voice.
    fn stop(&mut self) -> Result<(), BackendError>;

    /// Engine playback clock in frames.
    fn time(&self) -> u64;
    fn set_time(&mut self, frames: u64);

    fn set_master_volume(&mut self, volume: f32);
    fn set_listener(&mut self, position: Vec3, direction: Vec3, world_up: Vec3);

    fn create_voice(&mut self, asset_path: &str, flags: VoiceFlags) -> Result<VoiceHandle, BackendError>;
    fn create_stream_voice(&mut self, source: Box<dyn StreamSource>) -> Result<VoiceHandle, BackendError>;
    fn destroy_voice(&mut self, voice: VoiceHandle);

    fn set_volume(&mut self, voice: VoiceHandle, volume: f32);
    fn set_gain_limits(&mut self, voice: VoiceHandle, min_gain: f32, max_gain: f32);
    fn set_rolloff(&mut self, voice: VoiceHandle, rolloff: f32);
    fn set_looping(&mut self, voice: VoiceHandle, looping: bool);
    /// Delay the voice until the engine clock reaches `frame`.
    fn set_start_time(&mut self, voice: VoiceHandle, frame: u64);
    fn set_position(&mut self, voice: VoiceHandle, position: Vec3);
    fn set_spatialization(&mut self, voice: VoiceHandle, enabled: bool);

    fn length_in_frames(&self, voice: VoiceHandle) -> Option<u64>;
    fn cursor_in_frames(&self, voice: VoiceHandle) -> Option<u64>;
    fn seek_to_frame(&mut self, voice: VoiceHandle, frame: u64) -> Result<(), BackendError>;

    fn play_voice(&mut self, voice: VoiceHandle) -> Result<(), BackendError>;
    fn is_playing(&self, voice: VoiceHandle) -> bool;
    fn is_at_end(&self, voice: VoiceHandle) -> bool;
}
