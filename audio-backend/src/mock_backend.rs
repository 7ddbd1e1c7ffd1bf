use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::{
    AudioEngine, BackendError, DeviceInfo, SampleFormat, StreamSource, Vec3, VoiceFlags,
    VoiceHandle,
};

/// Distance below which a spatialized voice is not attenuated.
const MIN_DISTANCE: f32 = 1.0;

/// Observable state of one file-backed voice.
#[derive(Debug, Clone)]
pub struct MockVoice {
    pub asset: String,
    pub flags: VoiceFlags,
    pub volume: f32,
    pub min_gain: f32,
    pub max_gain: f32,
    pub rolloff: f32,
    pub looping: bool,
    pub start_time: u64,
    pub position: Vec3,
    pub spatialized: bool,
    pub length: u64,
    pub cursor: u64,
    pub playing: bool,
    pub at_end: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MockListener {
    pub position: Vec3,
    pub direction: Vec3,
    pub world_up: Vec3,
}

impl Default for MockListener {
    fn default() -> Self {
        Self { position: Vec3::ZERO, direction: Vec3::NEG_Z, world_up: Vec3::Y }
    }
}

struct MockStream {
    source: Box<dyn StreamSource>,
    playing: bool,
    at_end: bool,
}

type StreamMap = Arc<Mutex<BTreeMap<VoiceHandle, MockStream>>>;

/// Clonable view of the engine's stream voices, usable from a separate
/// thread the way a hardware callback would pull them.
#[derive(Clone)]
pub struct RenderHandle {
    streams: StreamMap,
    channels: usize,
}

impl RenderHandle {
    /// Pull `frames` frames from every playing stream voice and mix them.
    pub fn render(&self, frames: usize) -> Vec<i16> {
        let mut out = vec![0i16; frames * self.channels];
        let mut scratch = vec![0i16; frames * self.channels];
        let mut streams = self.streams.lock();
        for stream in streams.values_mut().filter(|s| s.playing) {
            scratch.iter_mut().for_each(|s| *s = 0);
            let read = stream.source.read(&mut scratch);
            for (o, s) in out.iter_mut().zip(scratch.iter()).take(read.frames * self.channels) {
                *o = o.saturating_add(*s);
            }
            if read.at_end {
                stream.playing = false;
                stream.at_end = true;
            }
        }
        out
    }
}

/// A deterministic in-memory engine. Nothing is rendered to a device; the
/// clock only moves when `advance` or `set_time` is called.
pub struct MockEngine {
    info: DeviceInfo,
    running: bool,
    clock: AtomicU64,
    master_volume: f32,
    listener: MockListener,
    next_handle: u64,
    assets: HashMap<String, u64>,
    voices: BTreeMap<VoiceHandle, MockVoice>,
    streams: StreamMap,
    refuse_creates: usize,
    destroyed: Vec<VoiceHandle>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::with_device_info(DeviceInfo {
            sample_rate: 48000,
            buffer_size: 256,
            channels: 2,
            decoded_format: SampleFormat::S16,
            device_name: Some("mock-device".to_string()),
        })
    }

    pub fn with_device_info(info: DeviceInfo) -> Self {
        Self {
            info,
            running: false,
            clock: AtomicU64::new(0),
            master_volume: 1.0,
            listener: MockListener::default(),
            next_handle: 1,
            assets: HashMap::new(),
            voices: BTreeMap::new(),
            streams: Arc::new(Mutex::new(BTreeMap::new())),
            refuse_creates: 0,
            destroyed: Vec::new(),
        }
    }

    /// Make `path` loadable with the given length.
    pub fn register_asset(&mut self, path: &str, length_frames: u64) {
        self.assets.insert(path.to_string(), length_frames);
    }

    /// Refuse the next `count` voice creations.
    pub fn refuse_next_voices(&mut self, count: usize) {
        self.refuse_creates = count;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn listener(&self) -> MockListener {
        self.listener
    }

    pub fn voice(&self, voice: VoiceHandle) -> Option<&MockVoice> {
        self.voices.get(&voice)
    }

    /// Every live voice, file-backed and streaming.
    pub fn live_voices(&self) -> usize {
        self.voices.len() + self.streams.lock().len()
    }

    pub fn destroyed(&self) -> &[VoiceHandle] {
        &self.destroyed
    }

    /// `(playing, at_end)` of a stream voice.
    pub fn stream_state(&self, voice: VoiceHandle) -> Option<(bool, bool)> {
        self.streams.lock().get(&voice).map(|s| (s.playing, s.at_end))
    }

    pub fn render_handle(&self) -> RenderHandle {
        RenderHandle { streams: self.streams.clone(), channels: self.info.channels as usize }
    }

    /// Gain the listener would hear for a file-backed voice after distance attenuation.
    pub fn effective_gain(&self, voice: VoiceHandle) -> Option<f32> {
        let v = self.voices.get(&voice)?;
        let gain = if v.spatialized {
            let distance = v.position.distance(self.listener.position);
            let attenuation = if distance <= MIN_DISTANCE {
                1.0
            } else {
                MIN_DISTANCE / (MIN_DISTANCE + v.rolloff * (distance - MIN_DISTANCE))
            };
            v.volume * attenuation
        } else {
            v.volume
        };
        Some(gain.clamp(v.min_gain, v.max_gain))
    }

    /// Move the clock forward, play file voices and pull stream voices.
    pub fn advance(&mut self, frames: u64) -> Vec<i16> {
        let before = self.clock.fetch_add(frames, Ordering::AcqRel);
        let after = before + frames;
        for v in self.voices.values_mut().filter(|v| v.playing) {
            if after <= v.start_time {
                continue;
            }
            v.cursor += after - before.max(v.start_time);
            if v.cursor >= v.length {
                if v.looping && v.length > 0 {
                    v.cursor %= v.length;
                } else {
                    v.cursor = v.length;
                    v.playing = false;
                    v.at_end = true;
                }
            }
        }
        self.render_handle().render(frames as usize)
    }

    fn allocate_handle(&mut self) -> Result<VoiceHandle, BackendError> {
        if self.refuse_creates > 0 {
            self.refuse_creates -= 1;
            return Err(BackendError::VoiceCreationFailed("refused by mock".to_string()));
        }
        let handle = VoiceHandle(self.next_handle);
        self.next_handle += 1;
        Ok(handle)
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEngine for MockEngine {
    fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    fn start(&mut self) -> Result<(), BackendError> {
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        self.running = false;
        Ok(())
    }

    fn time(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }

    fn set_time(&mut self, frames: u64) {
        self.clock.store(frames, Ordering::Release);
    }

    fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume;
    }

    fn set_listener(&mut self, position: Vec3, direction: Vec3, world_up: Vec3) {
        self.listener = MockListener { position, direction, world_up };
    }

    fn create_voice(&mut self, asset_path: &str, flags: VoiceFlags) -> Result<VoiceHandle, BackendError> {
        let length = *self
            .assets
            .get(asset_path)
            .ok_or_else(|| BackendError::AssetNotFound(asset_path.to_string()))?;
        let handle = self.allocate_handle()?;
        self.voices.insert(
            handle,
            MockVoice {
                asset: asset_path.to_string(),
                flags,
                volume: 1.0,
                min_gain: 0.0,
                max_gain: 1.0,
                rolloff: 1.0,
                looping: false,
                start_time: 0,
                position: Vec3::ZERO,
                spatialized: !flags.no_spatialization,
                length,
                cursor: 0,
                playing: false,
                at_end: false,
            },
        );
        Ok(handle)
    }

    fn create_stream_voice(&mut self, source: Box<dyn StreamSource>) -> Result<VoiceHandle, BackendError> {
        let handle = self.allocate_handle()?;
        self.streams.lock().insert(handle, MockStream { source, playing: false, at_end: false });
        Ok(handle)
    }

    fn destroy_voice(&mut self, voice: VoiceHandle) {
        let removed = self.voices.remove(&voice).is_some() || self.streams.lock().remove(&voice).is_some();
        if removed {
            self.destroyed.push(voice);
        } else {
            tracing::warn!(%voice, "destroy of unknown voice");
        }
    }

    fn set_volume(&mut self, voice: VoiceHandle, volume: f32) {
        if let Some(v) = self.voices.get_mut(&voice) {
            v.volume = volume;
        }
    }

    fn set_gain_limits(&mut self, voice: VoiceHandle, min_gain: f32, max_gain: f32) {
        if let Some(v) = self.voices.get_mut(&voice) {
            v.min_gain = min_gain;
            v.max_gain = max_gain;
        }
    }

    fn set_rolloff(&mut self, voice: VoiceHandle, rolloff: f32) {
        if let Some(v) = self.voices.get_mut(&voice) {
            v.rolloff = rolloff;
        }
    }

    fn set_looping(&mut self, voice: VoiceHandle, looping: bool) {
        if let Some(v) = self.voices.get_mut(&voice) {
            v.looping = looping;
        }
    }

    fn set_start_time(&mut self, voice: VoiceHandle, frame: u64) {
        if let Some(v) = self.voices.get_mut(&voice) {
            v.start_time = frame;
        }
    }

    fn set_position(&mut self, voice: VoiceHandle, position: Vec3) {
        if let Some(v) = self.voices.get_mut(&voice) {
            v.position = position;
        }
    }

    fn set_spatialization(&mut self, voice: VoiceHandle, enabled: bool) {
        if let Some(v) = self.voices.get_mut(&voice) {
            v.spatialized = enabled;
        }
    }

    fn length_in_frames(&self, voice: VoiceHandle) -> Option<u64> {
        self.voices.get(&voice).map(|v| v.length)
    }

    fn cursor_in_frames(&self, voice: VoiceHandle) -> Option<u64> {
        self.voices.get(&voice).map(|v| v.cursor)
    }

    fn seek_to_frame(&mut self, voice: VoiceHandle, frame: u64) -> Result<(), BackendError> {
        if let Some(v) = self.voices.get_mut(&voice) {
            if frame > v.length {
                return Err(BackendError::InvalidOperation);
            }
            v.cursor = frame;
            v.at_end = false;
            return Ok(());
        }
        match self.streams.lock().get_mut(&voice) {
            Some(stream) => stream.source.seek(frame),
            None => Err(BackendError::UnknownVoice(voice)),
        }
    }

    fn play_voice(&mut self, voice: VoiceHandle) -> Result<(), BackendError> {
        if let Some(v) = self.voices.get_mut(&voice) {
            if v.at_end {
                v.cursor = 0;
            }
            v.playing = true;
            v.at_end = false;
            return Ok(());
        }
        match self.streams.lock().get_mut(&voice) {
            Some(stream) => {
                stream.playing = true;
                stream.at_end = false;
                Ok(())
            }
            None => Err(BackendError::UnknownVoice(voice)),
        }
    }

    fn is_playing(&self, voice: VoiceHandle) -> bool {
        match self.voices.get(&voice) {
            Some(v) => v.playing,
            None => self.streams.lock().get(&voice).is_some_and(|s| s.playing),
        }
    }

    fn is_at_end(&self, voice: VoiceHandle) -> bool {
        match self.voices.get(&voice) {
            Some(v) => v.at_end,
            None => self.streams.lock().get(&voice).is_some_and(|s| s.at_end),
        }
    }
}
