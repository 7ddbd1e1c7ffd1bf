use audio_backend::AudioEngine;

/// Engine frame corresponding to a simulation time in milliseconds.
pub fn server_time_to_frames(server_time_ms: u64, sample_rate: u32) -> u64 {
    (server_time_ms as f64 * 0.001 * sample_rate as f64) as u64
}

/// Pull the engine clock forward to the simulation's time after a stall.
/// The clock never moves backward. Returns the new time if it was moved.
pub fn sync<E: AudioEngine>(engine: &mut E, server_time_ms: u64) -> Option<u64> {
    let target = server_time_to_frames(server_time_ms, engine.sample_rate());
    let now = engine.time();
    if target <= now {
        return None;
    }
    tracing::debug!(from = now, to = target, "engine clock pulled forward");
    engine.set_time(target);
    Some(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use audio_backend::mock_backend::MockEngine;

    #[test]
    fn converts_milliseconds_to_frames() {
        assert_eq!(server_time_to_frames(1000, 22050), 22050);
        assert_eq!(server_time_to_frames(100, 48000), 4800);
    }

    #[test]
    fn only_moves_forward() {
        let mut engine = MockEngine::new();
        assert_eq!(sync(&mut engine, 500), Some(24_000));
        assert_eq!(engine.time(), 24_000);

        assert_eq!(sync(&mut engine, 100), None);
        assert_eq!(engine.time(), 24_000);

        engine.advance(48_000);
        assert_eq!(sync(&mut engine, 1000), None);
        assert_eq!(engine.time(), 72_000);
    }
}
