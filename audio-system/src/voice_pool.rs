//! Fixed pool of voice slots and the entity → autosound slot back-reference.

use std::collections::HashSet;

use audio_backend::{AudioEngine, BackendError, Vec3, VoiceFlags, VoiceHandle};

use crate::config::EvictionPolicy;
use crate::sfx::{rolloff_for, SfxRef, AUTOSOUND_ATTENUATION};

pub type EntityId = u32;

/// One pool entry. Inactive slots are all-default and own no voice.
#[derive(Debug, Default, Clone)]
pub struct VoiceSlot {
    active: bool,
    entity: EntityId,
    channel: i32,
    autosound: bool,
    fixed_origin: bool,
    origin: Vec3,
    sfx: Option<SfxRef>,
    voice: Option<VoiceHandle>,
}

impl VoiceSlot {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn channel(&self) -> i32 {
        self.channel
    }

    pub fn is_autosound(&self) -> bool {
        self.autosound
    }

    /// Static origin, if this voice does not follow its entity.
    pub fn fixed_origin(&self) -> Option<Vec3> {
        self.fixed_origin.then_some(self.origin)
    }

    pub fn sfx(&self) -> Option<&SfxRef> {
        self.sfx.as_ref()
    }

    pub fn voice(&self) -> Option<VoiceHandle> {
        self.voice
    }
}

/// Entity id → 1-based slot index, 0 meaning "no loop mapped".
#[derive(Debug)]
pub struct AutosoundIndex {
    slots: Box<[usize]>,
}

impl AutosoundIndex {
    pub fn new(max_entities: usize) -> Self {
        Self { slots: vec![0; max_entities].into_boxed_slice() }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn covers(&self, entity: EntityId) -> bool {
        (entity as usize) < self.slots.len()
    }

    /// Zero-based slot currently carrying `entity`'s loop.
    pub fn get(&self, entity: EntityId) -> Option<usize> {
        match self.slots.get(entity as usize) {
            Some(&raw) if raw > 0 => Some(raw - 1),
            _ => None,
        }
    }

    /// Raw 1-based entry, 0 when unmapped.
    pub fn raw(&self, entity: EntityId) -> usize {
        self.slots.get(entity as usize).copied().unwrap_or(0)
    }

    fn set(&mut self, entity: EntityId, slot: usize) {
        if let Some(entry) = self.slots.get_mut(entity as usize) {
            *entry = slot + 1;
        }
    }

    fn clear(&mut self, entity: EntityId) {
        if let Some(entry) = self.slots.get_mut(entity as usize) {
            *entry = 0;
        }
    }

    /// Every mapped `(entity, zero-based slot)` pair.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, usize)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, raw)| **raw > 0)
            .map(|(entity, raw)| (entity as EntityId, *raw - 1))
    }
}

/// Everything needed to bring a slot to life.
#[derive(Debug, Clone)]
pub struct Activation {
    pub sfx: SfxRef,
    /// 0..=255
    pub volume: f32,
    pub attenuation: f32,
    pub entity: EntityId,
    pub channel: i32,
    pub looping: bool,
    pub autosound: bool,
    pub origin: Option<Vec3>,
    /// Engine frame to start on; 0 starts immediately.
    pub begin: u64,
}

impl Activation {
    /// Full-volume loop bound to an entity.
    pub fn autosound(entity: EntityId, sfx: SfxRef) -> Self {
        Self {
            sfx,
            volume: 255.0,
            attenuation: AUTOSOUND_ATTENUATION,
            entity,
            channel: 0,
            looping: true,
            autosound: true,
            origin: None,
            begin: 0,
        }
    }
}

pub struct VoicePool {
    slots: Box<[VoiceSlot]>,
    index: AutosoundIndex,
    eviction: EvictionPolicy,
    listener: Option<EntityId>,
}

impl VoicePool {
    pub fn new(max_voices: usize, max_entities: usize, eviction: EvictionPolicy) -> Self {
        Self {
            slots: vec![VoiceSlot::default(); max_voices].into_boxed_slice(),
            index: AutosoundIndex::new(max_entities),
            eviction,
            listener: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[VoiceSlot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&VoiceSlot> {
        self.slots.get(index)
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.active).count()
    }

    pub fn autosound_index(&self) -> &AutosoundIndex {
        &self.index
    }

    pub fn autosound_slot(&self, entity: EntityId) -> Option<usize> {
        self.index.get(entity)
    }

    pub fn listener(&self) -> Option<EntityId> {
        self.listener
    }

    /// Entity whose voices are protected from eviction by other entities.
    pub fn set_listener(&mut self, entity: Option<EntityId>) {
        self.listener = entity;
    }

    /// Choose a slot for a new sound on `(entity, channel)`.
    ///
    /// A non-zero channel already playing on the same entity is overridden;
    /// otherwise the first idle slot is taken; otherwise the eviction policy
    /// decides. A chosen slot that is still active is deactivated first.
    ///
    /// Panics if `channel` is negative.
    pub fn pick<E: AudioEngine>(&mut self, engine: &mut E, entity: EntityId, channel: i32) -> Option<usize> {
        assert!(channel >= 0, "pick: entity channel {channel} < 0");

        let mut picked = self.find_channel_match(entity, channel);
        if picked.is_none() {
            picked = self.pick_idle();
        }
        if picked.is_none() {
            picked = self.find_eviction_candidate(engine, entity);
        }

        let Some(index) = picked else {
            tracing::debug!(entity, channel, "no voice available");
            return None;
        };
        if self.slots[index].active {
            tracing::debug!(slot = index, entity, channel, "overriding active voice");
            self.deactivate(engine, index);
        }
        Some(index)
    }

    /// First inactive slot in scan order.
    pub fn pick_idle(&self) -> Option<usize> {
        self.slots.iter().position(|s| !s.active)
    }

    fn find_channel_match(&self, entity: EntityId, channel: i32) -> Option<usize> {
        if channel == 0 {
            return None;
        }
        self.slots
            .iter()
            .position(|s| s.active && s.entity == entity && s.channel == channel)
    }

    fn find_eviction_candidate<E: AudioEngine>(&self, engine: &E, entity: EntityId) -> Option<usize> {
        if self.eviction == EvictionPolicy::Never {
            return None;
        }
        let protect_listener = self.listener.is_some_and(|l| l != entity);
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.active && !s.autosound)
            .filter(|(_, s)| !(protect_listener && Some(s.entity) == self.listener))
            .filter_map(|(i, s)| {
                let voice = s.voice?;
                let length = engine.length_in_frames(voice)?;
                let cursor = engine.cursor_in_frames(voice).unwrap_or(0);
                Some((i, length.saturating_sub(cursor)))
            })
            .min_by_key(|&(_, remaining)| remaining)
            .map(|(i, _)| i)
    }

    /// Create and start the engine voice for an idle slot.
    ///
    /// On failure the slot stays idle and nothing is left allocated.
    pub fn activate<E: AudioEngine>(
        &mut self,
        engine: &mut E,
        index: usize,
        props: &Activation,
    ) -> Result<(), BackendError> {
        debug_assert!(!self.slots[index].active, "activate on a live slot");
        debug_assert!(!props.autosound || self.index.covers(props.entity));

        let voice = engine.create_voice(&props.sfx.asset_path(), VoiceFlags::DECODE)?;

        if props.begin > 0 {
            engine.set_start_time(voice, props.begin);
        }
        engine.set_volume(voice, props.volume / 255.0);
        engine.set_gain_limits(voice, 0.0, 1.0);
        engine.set_rolloff(voice, rolloff_for(props.attenuation));
        if props.looping {
            engine.set_looping(voice, true);
        }

        // Keep loops in phase with the engine clock, as if they had been
        // running since before the entity became audible.
        if props.autosound && props.looping {
            if let Some(length) = engine.length_in_frames(voice).filter(|&l| l > 0) {
                let phase = engine.time() % length;
                if let Err(e) = engine.seek_to_frame(voice, phase) {
                    tracing::debug!(%voice, phase, error = %e, "loop phase seek failed");
                }
            }
        }

        if let Err(e) = engine.play_voice(voice) {
            engine.destroy_voice(voice);
            return Err(e);
        }

        self.slots[index] = VoiceSlot {
            active: true,
            entity: props.entity,
            channel: props.channel,
            autosound: props.autosound,
            fixed_origin: props.origin.is_some(),
            origin: props.origin.unwrap_or_default(),
            sfx: Some(props.sfx.clone()),
            voice: Some(voice),
        };
        if props.autosound {
            self.index.set(props.entity, index);
        }
        tracing::debug!(
            slot = index,
            entity = props.entity,
            channel = props.channel,
            sfx = props.sfx.name(),
            autosound = props.autosound,
            "voice activated"
        );
        Ok(())
    }

    /// Release the slot's voice and zero the record.
    pub fn deactivate<E: AudioEngine>(&mut self, engine: &mut E, index: usize) {
        let slot = &mut self.slots[index];
        if slot.autosound && self.index.get(slot.entity) == Some(index) {
            self.index.clear(slot.entity);
        }
        if let Some(voice) = slot.voice.take() {
            engine.destroy_voice(voice);
        }
        *slot = VoiceSlot::default();
    }

    pub fn deactivate_all<E: AudioEngine>(&mut self, engine: &mut E) {
        for index in 0..self.slots.len() {
            if self.slots[index].active {
                self.deactivate(engine, index);
            }
        }
    }

    pub fn deactivate_autosounds<E: AudioEngine>(&mut self, engine: &mut E) -> usize {
        let mut stopped = 0;
        for index in 0..self.slots.len() {
            if self.slots[index].active && self.slots[index].autosound {
                self.deactivate(engine, index);
                stopped += 1;
            }
        }
        stopped
    }

    /// Free every slot whose voice has played out.
    pub fn reap_finished<E: AudioEngine>(&mut self, engine: &mut E) -> usize {
        let mut reaped = 0;
        for index in 0..self.slots.len() {
            let finished = match self.slots[index].voice {
                Some(voice) => self.slots[index].active && engine.is_at_end(voice),
                None => false,
            };
            if finished {
                self.deactivate(engine, index);
                reaped += 1;
            }
        }
        reaped
    }

    /// Check slot exclusivity and autosound index consistency.
    pub fn check_consistency(&self) -> Result<(), String> {
        let mut handles = HashSet::new();
        for (i, slot) in self.slots.iter().enumerate() {
            if !slot.active {
                if slot.voice.is_some() {
                    return Err(format!("inactive slot {i} still owns a voice"));
                }
                continue;
            }
            let Some(voice) = slot.voice else {
                return Err(format!("active slot {i} owns no voice"));
            };
            if !handles.insert(voice) {
                return Err(format!("{voice} owned by more than one slot"));
            }
            if slot.autosound && self.index.get(slot.entity) != Some(i) {
                return Err(format!(
                    "autosound slot {i} for entity {} not indexed (index entry {})",
                    slot.entity,
                    self.index.raw(slot.entity)
                ));
            }
        }
        for (entity, i) in self.index.iter() {
            match self.slots.get(i) {
                Some(slot) if slot.active && slot.autosound && slot.entity == entity => {}
                _ => return Err(format!("index entry for entity {entity} points at stale slot {i}")),
            }
        }
        Ok(())
    }
}
