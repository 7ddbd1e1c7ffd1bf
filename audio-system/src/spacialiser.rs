use audio_backend::{AudioEngine, Vec3};

use crate::snapshot::{EntityOrigins, Listener};
use crate::voice_pool::VoicePool;

/// Simulation space is Z-up; the engine is Y-up with Z pointing out of the
/// screen. Every vector crossing the boundary goes through this.
pub fn to_engine_axes(v: Vec3) -> Vec3 {
    Vec3::new(v.x, v.z, -v.y)
}

/// Places the listener and keeps voice positions in step with their entities.
#[derive(Default, Debug, Clone)]
pub struct Spatialiser {
    listener: Listener,
}

impl Spatialiser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn set_listener<E: AudioEngine>(&mut self, engine: &mut E, listener: Listener) {
        self.listener = listener;
        engine.set_listener(
            to_engine_axes(listener.origin),
            to_engine_axes(listener.forward),
            to_engine_axes(listener.up),
        );
    }

    /// Update every active voice that is still playing. The listener's own
    /// voices are never spatialised so they stay at full volume.
    pub fn spatialise<E, O>(&self, pool: &VoicePool, engine: &mut E, origins: &O) -> usize
    where
        E: AudioEngine,
        O: EntityOrigins + ?Sized,
    {
        let mut updated = 0;
        for slot in pool.slots().iter().filter(|s| s.is_active()) {
            let Some(voice) = slot.voice() else {
                continue;
            };
            if engine.is_at_end(voice) {
                continue;
            }
            if Some(slot.entity()) == self.listener.entity {
                engine.set_spatialization(voice, false);
            } else {
                // A former listener's voices must be positioned again.
                engine.set_spatialization(voice, true);
                let origin = match slot.fixed_origin() {
                    Some(origin) => origin,
                    None => origins.sound_origin(slot.entity()),
                };
                engine.set_position(voice, to_engine_axes(origin));
            }
            updated += 1;
        }
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvictionPolicy;
    use crate::sfx::{Sfx, ATTN_NORM};
    use crate::voice_pool::Activation;
    use audio_backend::mock_backend::MockEngine;

    fn activate(pool: &mut VoicePool, engine: &mut MockEngine, index: usize, entity: u32, origin: Option<Vec3>) {
        let props = Activation {
            sfx: Sfx::new("a.wav"),
            volume: 255.0,
            attenuation: ATTN_NORM,
            entity,
            channel: 0,
            looping: false,
            autosound: false,
            origin,
            begin: 0,
        };
        pool.activate(engine, index, &props).unwrap();
    }

    #[test]
    fn axes_are_swizzled() {
        assert_eq!(to_engine_axes(Vec3::new(1.0, 2.0, 3.0)), Vec3::new(1.0, 3.0, -2.0));
    }

    #[test]
    fn listener_is_converted() {
        let mut engine = MockEngine::new();
        let mut spatialiser = Spatialiser::new();
        let listener = Listener { entity: Some(1), origin: Vec3::new(10.0, 20.0, 30.0), ..Listener::default() };
        spatialiser.set_listener(&mut engine, listener);

        let l = engine.listener();
        assert_eq!(l.position, Vec3::new(10.0, 30.0, -20.0));
        assert_eq!(l.direction, Vec3::X);
        assert_eq!(l.world_up, Vec3::Y);
    }

    #[test]
    fn voices_follow_their_entities() {
        let mut engine = MockEngine::new();
        engine.register_asset("sound/a.wav", 1000);
        let mut pool = VoicePool::new(4, 16, EvictionPolicy::Never);
        activate(&mut pool, &mut engine, 0, 3, None);
        activate(&mut pool, &mut engine, 1, 4, Some(Vec3::new(5.0, 6.0, 7.0)));

        let spatialiser = Spatialiser::new();
        let origins = |entity: u32| Vec3::new(entity as f32, 0.0, 1.0);
        assert_eq!(spatialiser.spatialise(&pool, &mut engine, &origins), 2);

        let tracked = engine.voice(pool.slot(0).unwrap().voice().unwrap()).unwrap();
        assert_eq!(tracked.position, Vec3::new(3.0, 1.0, 0.0));
        let fixed = engine.voice(pool.slot(1).unwrap().voice().unwrap()).unwrap();
        assert_eq!(fixed.position, Vec3::new(5.0, 7.0, -6.0));
    }

    #[test]
    fn listener_voice_is_not_attenuated() {
        let mut engine = MockEngine::new();
        engine.register_asset("sound/a.wav", 1000);
        let mut pool = VoicePool::new(4, 16, EvictionPolicy::Never);
        activate(&mut pool, &mut engine, 0, 1, None);

        let mut spatialiser = Spatialiser::new();
        spatialiser.set_listener(&mut engine, Listener { entity: Some(1), ..Listener::default() });
        let far_away = |_: u32| Vec3::new(10_000.0, 0.0, 0.0);
        spatialiser.spatialise(&pool, &mut engine, &far_away);

        let voice = pool.slot(0).unwrap().voice().unwrap();
        assert!(!engine.voice(voice).unwrap().spatialized);
        assert_eq!(engine.effective_gain(voice), Some(1.0));
    }

    #[test]
    fn former_listener_voices_are_spatialised_again() {
        let mut engine = MockEngine::new();
        engine.register_asset("sound/a.wav", 1000);
        let mut pool = VoicePool::new(4, 16, EvictionPolicy::Never);
        activate(&mut pool, &mut engine, 0, 1, None);
        let far_away = |_: u32| Vec3::new(10_000.0, 0.0, 0.0);
        let voice = pool.slot(0).unwrap().voice().unwrap();

        let mut spatialiser = Spatialiser::new();
        spatialiser.set_listener(&mut engine, Listener { entity: Some(1), ..Listener::default() });
        spatialiser.spatialise(&pool, &mut engine, &far_away);
        assert!(!engine.voice(voice).unwrap().spatialized);

        spatialiser.set_listener(&mut engine, Listener { entity: Some(2), ..Listener::default() });
        spatialiser.spatialise(&pool, &mut engine, &far_away);
        assert!(engine.voice(voice).unwrap().spatialized);
        assert!(engine.effective_gain(voice).unwrap() < 1.0);
    }

    #[test]
    fn world_sounds_are_spatialised_without_a_listener_entity() {
        let mut engine = MockEngine::new();
        engine.register_asset("sound/a.wav", 1000);
        let mut pool = VoicePool::new(4, 16, EvictionPolicy::Never);
        activate(&mut pool, &mut engine, 0, 0, None);

        let mut spatialiser = Spatialiser::new();
        spatialiser.set_listener(&mut engine, Listener::default());
        let far_away = |_: u32| Vec3::new(10_000.0, 0.0, 0.0);
        spatialiser.spatialise(&pool, &mut engine, &far_away);

        let voice = pool.slot(0).unwrap().voice().unwrap();
        assert!(engine.voice(voice).unwrap().spatialized);
        assert!(engine.effective_gain(voice).unwrap() < 1.0);
    }

    #[test]
    fn finished_voices_are_skipped() {
        let mut engine = MockEngine::new();
        engine.register_asset("sound/a.wav", 10);
        let mut pool = VoicePool::new(4, 16, EvictionPolicy::Never);
        activate(&mut pool, &mut engine, 0, 3, None);
        engine.advance(20);
        let origins = |_: u32| Vec3::ONE;
        assert_eq!(Spatialiser::new().spatialise(&pool, &mut engine, &origins), 0);
    }
}
