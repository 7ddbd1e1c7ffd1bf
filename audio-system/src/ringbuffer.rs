//! Frame-granular SPSC ring buffer for interleaved signed 16-bit PCM.
//!
//! The producer half stays on the scheduling thread; the consumer half is
//! moved into the engine's stream source and drained from its callback.
//! Both halves only ever move whole frames, so the shared sample count is
//! always a multiple of the channel count.

use ringbuf::traits::{Consumer as _, Observer as _, Producer as _, Split as _};
use ringbuf::{HeapCons, HeapProd, HeapRb};

pub struct PcmProducer {
    inner: HeapProd<i16>,
    channels: usize,
    staging: Vec<i16>,
}

pub struct PcmConsumer {
    inner: HeapCons<i16>,
    channels: usize,
}

pub fn pcm_ring(capacity_frames: usize, channels: usize) -> (PcmProducer, PcmConsumer) {
    let channels = channels.max(1);
    let rb = HeapRb::<i16>::new(capacity_frames.max(1) * channels);
    let (producer, consumer) = rb.split();
    (
        PcmProducer { inner: producer, channels, staging: Vec::new() },
        PcmConsumer { inner: consumer, channels },
    )
}

impl PcmProducer {
    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn capacity_frames(&self) -> usize {
        self.inner.capacity().get() / self.channels
    }

    pub fn free_frames(&self) -> usize {
        self.inner.vacant_len() / self.channels
    }

    /// Reserve up to `max_frames` writable frames. The region may be smaller
    /// (even empty) when the consumer has fallen behind.
    pub fn acquire_write(&mut self, max_frames: usize) -> WriteRegion<'_> {
        let frames = max_frames.min(self.free_frames());
        self.staging.clear();
        self.staging.resize(frames * self.channels, 0);
        WriteRegion { producer: self, frames }
    }

    /// Advance the write cursor by `frames` of silence.
    pub fn seek_write(&mut self, frames: usize) -> usize {
        let mut region = self.acquire_write(frames);
        let frames = region.frames();
        region.samples_mut().fill(0);
        region.commit(frames)
    }
}

/// Writable window handed out by [`PcmProducer::acquire_write`].
pub struct WriteRegion<'a> {
    producer: &'a mut PcmProducer,
    frames: usize,
}

impl WriteRegion<'_> {
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn samples_mut(&mut self) -> &mut [i16] {
        &mut self.producer.staging
    }

    /// Publish the first `frames` frames of the region to the consumer.
    pub fn commit(self, frames: usize) -> usize {
        let frames = frames.min(self.frames);
        let producer = self.producer;
        let samples = frames * producer.channels;
        producer.inner.push_slice(&producer.staging[..samples]) / producer.channels
    }
}

impl PcmConsumer {
    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn available_frames(&self) -> usize {
        self.inner.occupied_len() / self.channels
    }

    /// Copy as many whole frames as are available into `out`.
    pub fn read(&mut self, out: &mut [i16]) -> usize {
        let samples = (out.len() / self.channels) * self.channels;
        self.inner.pop_slice(&mut out[..samples]) / self.channels
    }
}
