//! Shared fixtures for the scenario tests under `tests/`.

use audio_backend::mock_backend::MockEngine;
use audio_system::sfx::ATTN_NORM;
use audio_system::{AudioConfig, AudioSystem, EntityId, OneShot, SfxRef};
use glam::Vec3;

/// Assets every scenario can load, with their lengths in frames.
pub const ASSETS: &[(&str, u64)] = &[
    ("sound/weapons/fire.wav", 3_000),
    ("sound/misc/click.wav", 400),
    ("sound/world/hum.wav", 700),
    ("sound/world/fan.wav", 900),
];

pub fn mock_engine() -> MockEngine {
    let mut engine = MockEngine::new();
    for (path, length) in ASSETS {
        engine.register_asset(path, *length);
    }
    engine
}

pub fn system_with(config: AudioConfig) -> AudioSystem<MockEngine> {
    let mut sys = AudioSystem::new(mock_engine(), config).expect("create audio system");
    sys.initialize().expect("initialize audio system");
    sys
}

pub fn one_shot(sfx: &SfxRef, entity: EntityId, channel: i32) -> OneShot {
    OneShot { sfx: sfx.clone(), volume: 1.0, attenuation: ATTN_NORM, entity, channel, origin: None }
}

/// Entities sit on a line along the simulation X axis, 100 units apart.
pub fn line_origins(entity: EntityId) -> Vec3 {
    Vec3::new(entity as f32 * 100.0, 0.0, 0.0)
}

/// Small deterministic generator for scenario fuzzing.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn below(&mut self, n: usize) -> usize {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((self.0 >> 33) as usize) % n.max(1)
    }
}
