//! Per-tick inputs handed down by the simulation.

use audio_backend::Vec3;

use crate::sfx::SfxRef;
use crate::voice_pool::EntityId;

/// Listener pose in simulation space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Listener {
    /// Entity the player hears from; `None` when there is no such entity.
    pub entity: Option<EntityId>,
    pub origin: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            entity: None,
            origin: Vec3::ZERO,
            forward: Vec3::X,
            right: Vec3::NEG_Y,
            up: Vec3::Z,
        }
    }
}

/// An entity the simulation reports as emitting a loop this tick.
#[derive(Debug, Clone)]
pub struct LoopingEntity {
    pub entity: EntityId,
    pub sfx: Option<SfxRef>,
}

impl LoopingEntity {
    pub fn new(entity: EntityId, sfx: SfxRef) -> Self {
        Self { entity, sfx: Some(sfx) }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FrameState<'a> {
    pub listener: Listener,
    pub looping: &'a [LoopingEntity],
    pub paused: bool,
    /// Loading screen up; everything is silenced.
    pub loading: bool,
    /// Authoritative elapsed simulation time in milliseconds.
    pub server_time_ms: u64,
}

/// Interpolated world position of an entity's sound source.
pub trait EntityOrigins {
    fn sound_origin(&self, entity: EntityId) -> Vec3;
}

impl<F> EntityOrigins for F
where
    F: Fn(EntityId) -> Vec3,
{
    fn sound_origin(&self, entity: EntityId) -> Vec3 {
        self(entity)
    }
}
