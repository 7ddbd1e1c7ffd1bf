//! Sound scheduling core: voice slots, deferred one-shots, entity loops,
//! spatialisation, clock correction and the raw PCM stream, driven once per
//! rendered frame against an [`AudioEngine`].

use anyhow::{bail, Context, Result};

pub use audio_backend::{AudioEngine, BackendError, Vec3, VoiceHandle};

pub mod autosound;
pub mod clock;
pub mod config;
pub mod convert;
pub mod pending;
pub mod raw_stream;
pub mod ringbuffer;
pub mod sfx;
pub mod snapshot;
mod spacialiser;
pub mod voice_pool;

pub use autosound::{AutosoundStats, AutosoundTracker};
pub use config::{AudioConfig, ConfigError, EvictionPolicy};
pub use pending::{DrainStats, PendingPlay, PendingQueue};
pub use raw_stream::{RawSampleStream, RawSamples};
pub use sfx::{Sfx, SfxRef};
pub use snapshot::{EntityOrigins, FrameState, Listener, LoopingEntity};
pub use spacialiser::{to_engine_axes, Spatialiser};
pub use voice_pool::{EntityId, VoicePool};

/// A request to play a sound once.
#[derive(Debug, Clone)]
pub struct OneShot {
    pub sfx: SfxRef,
    /// 0..=1
    pub volume: f32,
    pub attenuation: f32,
    pub entity: EntityId,
    pub channel: i32,
    /// Play from a fixed point instead of following the entity.
    pub origin: Option<Vec3>,
}

/// What one call to [`AudioSystem::tick`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    /// The loading screen was up; everything was stopped.
    pub silenced: bool,
    pub reaped: usize,
    pub drained: DrainStats,
    pub autosounds: AutosoundStats,
    pub spatialised: usize,
    pub clock_corrected: bool,
}

pub struct AudioSystem<E: AudioEngine> {
    engine: E,
    config: AudioConfig,
    pool: VoicePool,
    pending: PendingQueue,
    autosounds: AutosoundTracker,
    spatialiser: Spatialiser,
    raw: RawSampleStream,
    loading: bool,
    running: bool,
}

impl<E: AudioEngine> AudioSystem<E> {
    pub fn new(engine: E, config: AudioConfig) -> Result<Self> {
        config.validate().context("invalid audio configuration")?;
        if engine.channels() == 0 || engine.sample_rate() == 0 {
            bail!(
                "audio engine reports {} channels at {} Hz",
                engine.channels(),
                engine.sample_rate()
            );
        }
        if engine.sample_rate() != config.sample_rate() {
            tracing::warn!(
                engine = engine.sample_rate(),
                configured = config.sample_rate(),
                "engine sample rate differs from configuration"
            );
        }
        tracing::info!(
            max_voices = config.max_voices,
            sample_rate = engine.sample_rate(),
            channels = engine.channels(),
            device = engine.device_info().device_name.as_deref().unwrap_or("unknown"),
            "audio system created"
        );

        Ok(Self {
            pool: VoicePool::new(config.max_voices, config.max_entities, config.eviction),
            raw: RawSampleStream::new(config.raw_buffer_frames, config.raw_write_chunk_frames),
            pending: PendingQueue::new(),
            autosounds: AutosoundTracker::new(),
            spatialiser: Spatialiser::new(),
            loading: false,
            running: false,
            engine,
            config,
        })
    }

    /// Start the device and apply the configured master volume.
    pub fn initialize(&mut self) -> Result<()> {
        self.engine.start().context("failed to start audio device")?;
        self.engine.set_master_volume(self.config.volume);
        self.running = true;
        tracing::info!("audio system initialized");
        Ok(())
    }

    /// Pause or resume the device without releasing anything.
    pub fn activate(&mut self, active: bool) -> Result<()> {
        if active == self.running {
            return Ok(());
        }
        if active {
            self.engine.start().context("failed to resume audio device")?;
        } else {
            self.engine.stop().context("failed to pause audio device")?;
        }
        self.running = active;
        tracing::debug!(active, "audio device activation changed");
        Ok(())
    }

    pub fn shutdown(&mut self) -> Result<()> {
        self.stop_all();
        self.engine.stop().context("failed to stop audio device")?;
        self.running = false;
        tracing::info!("audio system shut down");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.config.volume = volume.clamp(0.0, 1.0);
        self.engine.set_master_volume(self.config.volume);
    }

    /// Queue a one-shot to start `delay_secs` from now on the engine clock.
    ///
    /// Panics if the channel is negative.
    pub fn request_one_shot(&mut self, request: OneShot, delay_secs: f32) {
        assert!(request.channel >= 0, "request_one_shot: entity channel {} < 0", request.channel);
        // NaN and infinite delays play now; float to int casts saturate.
        let secs = if delay_secs.is_finite() { delay_secs.max(0.0) } else { 0.0 };
        let delay = (secs as f64 * self.engine.sample_rate() as f64) as u64;
        let begin = self.engine.time().saturating_add(delay);
        self.pending.enqueue(PendingPlay {
            sfx: request.sfx,
            volume: request.volume.clamp(0.0, 1.0) * 255.0,
            attenuation: request.attenuation,
            entity: request.entity,
            channel: request.channel,
            origin: request.origin,
            begin,
        });
    }

    /// Feed producer PCM to the raw stream. Returns engine frames committed.
    /// While the loading screen is up the stream is torn down instead.
    pub fn push_raw_samples(&mut self, block: &RawSamples<'_>) -> usize {
        if self.loading {
            self.raw.teardown(&mut self.engine);
            return 0;
        }
        self.raw.push(&mut self.engine, block)
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
        if loading {
            self.raw.teardown(&mut self.engine);
        }
    }

    /// Run one scheduling pass.
    pub fn tick<O>(&mut self, frame: &FrameState<'_>, origins: &O) -> TickStats
    where
        O: EntityOrigins + ?Sized,
    {
        self.loading = frame.loading;
        if frame.loading {
            self.stop_all();
            return TickStats { silenced: true, ..TickStats::default() };
        }

        let engine = &mut self.engine;
        engine.set_master_volume(self.config.volume);
        self.pool.set_listener(frame.listener.entity);
        self.spatialiser.set_listener(engine, frame.listener);

        let reaped = self.pool.reap_finished(engine);
        let now = engine.time();
        let drained = self.pending.drain(now, &mut self.pool, engine);
        let autosounds = self.autosounds.update(&mut self.pool, engine, frame.looping, frame.paused);
        let spatialised = self.spatialiser.spatialise(&self.pool, engine, origins);
        let clock_corrected = clock::sync(engine, frame.server_time_ms).is_some();

        let stats = TickStats { silenced: false, reaped, drained, autosounds, spatialised, clock_corrected };
        tracing::trace!(
            active = self.pool.active_count(),
            pending = self.pending.len(),
            ?stats,
            "audio tick"
        );
        debug_assert!(self.pool.check_consistency().is_ok());
        stats
    }

    /// Stop every voice, forget queued one-shots and close the raw stream.
    pub fn stop_all(&mut self) {
        self.pool.deactivate_all(&mut self.engine);
        self.pending.clear();
        self.raw.teardown(&mut self.engine);
    }

    pub fn engine_time(&self) -> u64 {
        self.engine.time()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    pub fn pool(&self) -> &VoicePool {
        &self.pool
    }

    pub fn pending(&self) -> &PendingQueue {
        &self.pending
    }

    pub fn raw_stream(&self) -> &RawSampleStream {
        &self.raw
    }
}
