//! Raw PCM path for cinematic and streamed audio.
//!
//! Producer blocks are converted to the engine's format and written into a
//! ring buffer; a single persistent stream voice drains it from the engine
//! callback. Writes never block: whatever does not fit is dropped.

use audio_backend::{
    AudioEngine, BackendError, SampleFormat, StreamFormat, StreamRead, StreamSource, VoiceHandle,
};

use crate::convert::SampleConverter;
use crate::ringbuffer::{pcm_ring, PcmConsumer, PcmProducer};

/// One block of producer audio.
#[derive(Debug, Clone, Copy)]
pub struct RawSamples<'a> {
    pub frames: usize,
    pub rate: u32,
    pub format: SampleFormat,
    pub channels: usize,
    pub data: &'a [u8],
}

impl<'a> RawSamples<'a> {
    /// Describe `data` given its legacy sample width in bytes.
    pub fn new(rate: u32, width: usize, channels: usize, data: &'a [u8]) -> Self {
        let format = SampleFormat::from_width(width);
        let channels = channels.max(1);
        Self {
            frames: data.len() / (format.bytes_per_sample() * channels),
            rate,
            format,
            channels,
            data,
        }
    }
}

/// Engine-side half: hands buffered frames to the engine callback.
pub struct RawStreamSource {
    consumer: PcmConsumer,
}

impl StreamSource for RawStreamSource {
    fn read(&mut self, out: &mut [i16]) -> StreamRead {
        let frames = self.consumer.read(out);
        StreamRead { frames, at_end: frames == 0 }
    }

    fn seek(&mut self, _frame: u64) -> Result<(), BackendError> {
        Err(BackendError::InvalidOperation)
    }

    fn format(&self) -> StreamFormat {
        StreamFormat { channels: self.consumer.channels() as u16, sample_rate: None }
    }
}

struct OpenStream {
    producer: PcmProducer,
    voice: VoiceHandle,
    converter: Option<SampleConverter>,
}

impl OpenStream {
    fn open<E: AudioEngine>(engine: &mut E, buffer_frames: usize) -> Result<Self, BackendError> {
        let channels = engine.channels() as usize;
        let (mut producer, consumer) = pcm_ring(buffer_frames, channels);
        // One period of lead-in so the reader does not starve on the first pull.
        producer.seek_write(engine.period_frames());

        let voice = engine.create_stream_voice(Box::new(RawStreamSource { consumer }))?;
        engine.set_spatialization(voice, false);
        tracing::info!(%voice, buffer_frames, channels, "raw sample stream opened");
        Ok(Self { producer, voice, converter: None })
    }

    fn write(&mut self, engine_rate: u32, block: &RawSamples<'_>, chunk_frames: usize) -> usize {
        let stale = !self
            .converter
            .as_ref()
            .is_some_and(|c| c.accepts(block.format, block.channels, block.rate));
        if stale {
            tracing::debug!(
                format = ?block.format,
                channels = block.channels,
                rate = block.rate,
                "raw sample format changed"
            );
            self.converter = Some(SampleConverter::new(
                block.format,
                block.channels,
                block.rate,
                self.producer.channels(),
                engine_rate,
            ));
        }
        let Some(converter) = self.converter.as_mut() else {
            return 0;
        };

        let frame_bytes = converter.in_frame_bytes();
        let total = block.frames.min(block.data.len() / frame_bytes);
        let mut consumed = 0;
        let mut committed = 0;

        while consumed < total {
            let want = converter.expected_output(total - consumed).clamp(1, chunk_frames);
            let mut region = self.producer.acquire_write(want);
            if region.frames() == 0 {
                break;
            }
            let input = &block.data[consumed * frame_bytes..total * frame_bytes];
            let (read, written) = converter.process(input, region.samples_mut());
            committed += region.commit(written);
            consumed += read;
            if read == 0 && written == 0 {
                break;
            }
        }

        if consumed < total {
            tracing::debug!(dropped = total - consumed, "raw sample buffer full, dropping input");
        }
        committed
    }
}

/// Lazily opened ring buffer plus its stream voice.
pub struct RawSampleStream {
    buffer_frames: usize,
    write_chunk_frames: usize,
    state: Option<OpenStream>,
}

impl RawSampleStream {
    pub fn new(buffer_frames: usize, write_chunk_frames: usize) -> Self {
        Self { buffer_frames, write_chunk_frames: write_chunk_frames.max(1), state: None }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    pub fn voice(&self) -> Option<VoiceHandle> {
        self.state.as_ref().map(|s| s.voice)
    }

    /// Frames the producer could still write without dropping.
    pub fn free_frames(&self) -> Option<usize> {
        self.state.as_ref().map(|s| s.producer.free_frames())
    }

    /// Convert and enqueue a block, opening the stream on first use.
    /// Returns the number of engine frames committed, which is less than the
    /// block's worth when the consumer has fallen behind.
    pub fn push<E: AudioEngine>(&mut self, engine: &mut E, block: &RawSamples<'_>) -> usize {
        let mut stream = match self.state.take() {
            Some(stream) => stream,
            None => match OpenStream::open(engine, self.buffer_frames) {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to open raw sample stream");
                    return 0;
                }
            },
        };

        let committed = stream.write(engine.sample_rate(), block, self.write_chunk_frames);
        if committed > 0 && (!engine.is_playing(stream.voice) || engine.is_at_end(stream.voice)) {
            if let Err(e) = engine.play_voice(stream.voice) {
                tracing::warn!(voice = %stream.voice, error = %e, "failed to start raw sample stream");
            }
        }

        self.state = Some(stream);
        committed
    }

    /// Release the voice and the buffer. Safe to call when already closed.
    pub fn teardown<E: AudioEngine>(&mut self, engine: &mut E) {
        if let Some(stream) = self.state.take() {
            engine.destroy_voice(stream.voice);
            tracing::info!(voice = %stream.voice, "raw sample stream closed");
        }
    }
}
