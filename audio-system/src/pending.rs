use std::collections::VecDeque;

use audio_backend::{AudioEngine, Vec3};

use crate::sfx::SfxRef;
use crate::voice_pool::{Activation, EntityId, VoicePool};

/// A one-shot waiting for its start time.
#[derive(Debug, Clone)]
pub struct PendingPlay {
    pub sfx: SfxRef,
    /// 0..=255
    pub volume: f32,
    pub attenuation: f32,
    pub entity: EntityId,
    pub channel: i32,
    pub origin: Option<Vec3>,
    /// Engine frame at which the sound becomes due.
    pub begin: u64,
}

impl PendingPlay {
    fn activation(&self) -> Activation {
        Activation {
            sfx: self.sfx.clone(),
            volume: self.volume,
            attenuation: self.attenuation,
            entity: self.entity,
            channel: self.channel,
            looping: false,
            autosound: false,
            origin: self.origin,
            begin: self.begin,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub activated: usize,
    pub dropped: usize,
}

/// Arrival-ordered queue of deferred one-shots.
#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: VecDeque<PendingPlay>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, play: PendingPlay) {
        self.entries.push_back(play);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingPlay> {
        self.entries.iter()
    }

    /// Start every entry due at `now`, in arrival order. Entries not yet due
    /// keep their relative order for the next tick.
    pub fn drain<E: AudioEngine>(&mut self, now: u64, pool: &mut VoicePool, engine: &mut E) -> DrainStats {
        let mut stats = DrainStats::default();
        let mut waiting = VecDeque::with_capacity(self.entries.len());

        while let Some(play) = self.entries.pop_front() {
            if play.begin > now {
                waiting.push_back(play);
                continue;
            }
            let Some(index) = pool.pick(engine, play.entity, play.channel) else {
                tracing::debug!(entity = play.entity, sfx = play.sfx.name(), "dropped one-shot: no voice available");
                stats.dropped += 1;
                continue;
            };
            match pool.activate(engine, index, &play.activation()) {
                Ok(()) => stats.activated += 1,
                Err(e) => {
                    tracing::warn!(entity = play.entity, sfx = play.sfx.name(), error = %e, "failed to start one-shot");
                    stats.dropped += 1;
                }
            }
        }

        self.entries = waiting;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvictionPolicy;
    use crate::sfx::{Sfx, ATTN_NORM};
    use audio_backend::mock_backend::MockEngine;

    fn play(sfx: &SfxRef, entity: EntityId, begin: u64) -> PendingPlay {
        PendingPlay {
            sfx: sfx.clone(),
            volume: 255.0,
            attenuation: ATTN_NORM,
            entity,
            channel: 1,
            origin: None,
            begin,
        }
    }

    #[test]
    fn drains_due_entries_in_arrival_order() {
        let mut engine = MockEngine::new();
        engine.register_asset("sound/a.wav", 1000);
        let mut pool = VoicePool::new(8, 64, EvictionPolicy::Never);
        let a = Sfx::new("a.wav");
        let mut queue = PendingQueue::new();
        queue.enqueue(play(&a, 10, 5));
        queue.enqueue(play(&a, 11, 2));
        queue.enqueue(play(&a, 12, 8));

        let stats = queue.drain(6, &mut pool, &mut engine);
        assert_eq!(stats, DrainStats { activated: 2, dropped: 0 });
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.iter().next().map(|p| p.begin), Some(8));

        let entities: Vec<_> = pool.slots().iter().filter(|s| s.is_active()).map(|s| s.entity()).collect();
        assert_eq!(entities, vec![10, 11]);
    }

    #[test]
    fn entries_are_consumed_once_even_when_dropped() {
        let mut engine = MockEngine::new();
        let mut pool = VoicePool::new(2, 64, EvictionPolicy::Never);
        let missing = Sfx::new("missing.wav");
        let mut queue = PendingQueue::new();
        queue.enqueue(play(&missing, 1, 0));

        assert_eq!(queue.drain(0, &mut pool, &mut engine).dropped, 1);
        assert!(queue.is_empty());
        assert_eq!(queue.drain(100, &mut pool, &mut engine), DrainStats::default());
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn full_pool_drops_due_requests() {
        let mut engine = MockEngine::new();
        engine.register_asset("sound/a.wav", 1000);
        let mut pool = VoicePool::new(1, 64, EvictionPolicy::Never);
        let a = Sfx::new("a.wav");
        let mut queue = PendingQueue::new();
        queue.enqueue(play(&a, 1, 0));
        queue.enqueue(play(&a, 2, 0));

        let stats = queue.drain(0, &mut pool, &mut engine);
        assert_eq!(stats, DrainStats { activated: 1, dropped: 1 });
        assert!(queue.is_empty());
    }
}
