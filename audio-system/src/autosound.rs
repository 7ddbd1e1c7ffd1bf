//! Keeps entity loop sounds in step with what the simulation reports.
//!
//! Each update runs four passes in a fixed order: snapshot, recycle, expire,
//! activate. Recycling must precede activation so that an entity whose loop
//! changed sound is restarted on the same tick.

use audio_backend::AudioEngine;

use crate::sfx::{same_sfx, SfxRef};
use crate::snapshot::LoopingEntity;
use crate::voice_pool::{Activation, EntityId, VoicePool};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutosoundStats {
    pub recycled: usize,
    pub expired: usize,
    pub activated: usize,
}

#[derive(Debug, Default)]
pub struct AutosoundTracker {
    scratch: Vec<(EntityId, SfxRef)>,
}

impl AutosoundTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update<E: AudioEngine>(
        &mut self,
        pool: &mut VoicePool,
        engine: &mut E,
        looping: &[LoopingEntity],
        paused: bool,
    ) -> AutosoundStats {
        let mut stats = AutosoundStats::default();
        self.snapshot(pool, looping);

        // Recycle: an entity id now reports a different sound.
        for (entity, sfx) in &self.scratch {
            let Some(index) = pool.autosound_slot(*entity) else {
                continue;
            };
            let bound = pool.slot(index).and_then(|s| s.sfx()).is_some_and(|bound| same_sfx(bound, sfx));
            if !bound {
                tracing::debug!(entity, slot = index, sfx = sfx.name(), "recycling autosound");
                pool.deactivate(engine, index);
                stats.recycled += 1;
            }
        }

        // Expire: loops no longer reported, or every loop while paused.
        if paused {
            stats.expired += pool.deactivate_autosounds(engine);
            return stats;
        }
        for index in 0..pool.capacity() {
            let stale = match pool.slot(index) {
                Some(slot) if slot.is_active() && slot.is_autosound() => !self.scratch.iter().any(|(entity, sfx)| {
                    *entity == slot.entity() && slot.sfx().is_some_and(|bound| same_sfx(bound, sfx))
                }),
                _ => false,
            };
            if stale {
                pool.deactivate(engine, index);
                stats.expired += 1;
            }
        }

        // Activate: unmapped pairs take idle slots only. Unplaced loops are
        // retried next tick since they stay unmapped.
        for (entity, sfx) in &self.scratch {
            if pool.autosound_slot(*entity).is_some() {
                continue;
            }
            let Some(index) = pool.pick_idle() else {
                tracing::trace!(entity, "no idle voice for autosound");
                break;
            };
            match pool.activate(engine, index, &Activation::autosound(*entity, sfx.clone())) {
                Ok(()) => stats.activated += 1,
                Err(e) => tracing::warn!(entity, sfx = sfx.name(), error = %e, "failed to start autosound"),
            }
        }

        stats
    }

    fn snapshot(&mut self, pool: &VoicePool, looping: &[LoopingEntity]) {
        self.scratch.clear();
        for reported in looping {
            let Some(sfx) = &reported.sfx else {
                continue;
            };
            if !pool.autosound_index().covers(reported.entity) {
                tracing::warn!(entity = reported.entity, "autosound entity id out of range");
                continue;
            }
            self.scratch.push((reported.entity, sfx.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvictionPolicy;
    use crate::sfx::Sfx;
    use audio_backend::mock_backend::MockEngine;

    fn setup() -> (MockEngine, VoicePool, AutosoundTracker) {
        let mut engine = MockEngine::new();
        engine.register_asset("sound/hum.wav", 400);
        engine.register_asset("sound/fan.wav", 600);
        (engine, VoicePool::new(4, 32, EvictionPolicy::Never), AutosoundTracker::new())
    }

    #[test]
    fn reported_loops_are_started_and_expired() {
        let (mut engine, mut pool, mut tracker) = setup();
        let hum = Sfx::new("hum.wav");
        let looping = [LoopingEntity::new(5, hum.clone()), LoopingEntity { entity: 6, sfx: None }];

        let stats = tracker.update(&mut pool, &mut engine, &looping, false);
        assert_eq!(stats.activated, 1);
        assert_eq!(pool.autosound_slot(5), Some(0));
        assert_eq!(pool.autosound_slot(6), None);

        let stats = tracker.update(&mut pool, &mut engine, &[], false);
        assert_eq!(stats.expired, 1);
        assert_eq!(pool.active_count(), 0);
        pool.check_consistency().unwrap();
    }

    #[test]
    fn steady_loop_keeps_its_voice() {
        let (mut engine, mut pool, mut tracker) = setup();
        let looping = [LoopingEntity::new(5, Sfx::new("hum.wav"))];
        tracker.update(&mut pool, &mut engine, &looping, false);
        let voice = pool.slot(0).and_then(|s| s.voice());

        let stats = tracker.update(&mut pool, &mut engine, &looping, false);
        assert_eq!(stats, AutosoundStats::default());
        assert_eq!(pool.slot(0).and_then(|s| s.voice()), voice);
    }

    #[test]
    fn recycled_entity_restarts_same_tick() {
        let (mut engine, mut pool, mut tracker) = setup();
        let hum = Sfx::new("hum.wav");
        let fan = Sfx::new("fan.wav");
        tracker.update(&mut pool, &mut engine, &[LoopingEntity::new(5, hum)], false);

        let stats = tracker.update(&mut pool, &mut engine, &[LoopingEntity::new(5, fan.clone())], false);
        assert_eq!(stats.recycled, 1);
        assert_eq!(stats.activated, 1);
        let slot = pool.autosound_slot(5).and_then(|i| pool.slot(i)).unwrap();
        assert!(same_sfx(slot.sfx().unwrap(), &fan));
        pool.check_consistency().unwrap();
    }

    #[test]
    fn pause_silences_and_resume_restores() {
        let (mut engine, mut pool, mut tracker) = setup();
        let looping = [LoopingEntity::new(5, Sfx::new("hum.wav")), LoopingEntity::new(7, Sfx::new("fan.wav"))];
        tracker.update(&mut pool, &mut engine, &looping, false);
        assert_eq!(pool.active_count(), 2);

        let stats = tracker.update(&mut pool, &mut engine, &looping, true);
        assert_eq!(stats.expired, 2);
        assert_eq!(pool.active_count(), 0);

        tracker.update(&mut pool, &mut engine, &looping, false);
        assert!(pool.autosound_slot(5).is_some());
        assert!(pool.autosound_slot(7).is_some());
    }

    #[test]
    fn out_of_range_entities_are_ignored() {
        let (mut engine, mut pool, mut tracker) = setup();
        let stats = tracker.update(&mut pool, &mut engine, &[LoopingEntity::new(32, Sfx::new("hum.wav"))], false);
        assert_eq!(stats.activated, 0);
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn full_pool_retries_next_tick() {
        let (mut engine, mut pool, mut tracker) = setup();
        let hum = Sfx::new("hum.wav");
        let looping: Vec<_> = (1..=5).map(|e| LoopingEntity::new(e, hum.clone())).collect();

        assert_eq!(tracker.update(&mut pool, &mut engine, &looping, false).activated, 4);
        assert_eq!(pool.autosound_slot(5), None);

        // Entity 1 stops reporting, freeing a slot for entity 5.
        assert_eq!(tracker.update(&mut pool, &mut engine, &looping[1..], false).activated, 1);
        assert!(pool.autosound_slot(5).is_some());
        pool.check_consistency().unwrap();
    }
}
