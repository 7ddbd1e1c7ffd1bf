use audio_backend::SampleFormat;

/// Streaming converter from producer PCM (U8 or little-endian S16, any
/// channel count, any rate) to interleaved S16 at the engine's channel count
/// and rate. Resampling is linear interpolation with no low-pass stage.
///
/// Interpolation state carries across calls, so a block boundary does not
/// click as long as the input format stays the same.
#[derive(Debug)]
pub struct SampleConverter {
    format: SampleFormat,
    in_channels: usize,
    in_rate: u32,
    out_channels: usize,
    out_rate: u32,
    step: f64,
    frac: f64,
    prev: Option<Vec<f32>>,
}

impl SampleConverter {
    pub fn new(format: SampleFormat, in_channels: usize, in_rate: u32, out_channels: usize, out_rate: u32) -> Self {
        let in_channels = in_channels.max(1);
        let out_channels = out_channels.max(1);
        Self {
            format,
            in_channels,
            in_rate,
            out_channels,
            out_rate,
            step: in_rate.max(1) as f64 / out_rate.max(1) as f64,
            frac: 0.0,
            prev: None,
        }
    }

    /// Whether this converter was set up for the given input.
    pub fn accepts(&self, format: SampleFormat, channels: usize, rate: u32) -> bool {
        self.format == format && self.in_channels == channels.max(1) && self.in_rate == rate
    }

    pub fn in_frame_bytes(&self) -> usize {
        self.format.bytes_per_sample() * self.in_channels
    }

    /// Output frames a block of `in_frames` input frames roughly yields.
    pub fn expected_output(&self, in_frames: usize) -> usize {
        (in_frames as f64 / self.step).ceil() as usize
    }

    /// Convert from `input` into `out` until one of them is exhausted.
    /// Returns `(input frames consumed, output frames written)`.
    pub fn process(&mut self, input: &[u8], out: &mut [i16]) -> (usize, usize) {
        let in_frames = input.len() / self.in_frame_bytes();
        let out_frames = out.len() / self.out_channels;

        if self.in_rate == self.out_rate {
            let frames = in_frames.min(out_frames);
            for i in 0..frames {
                let frame = self.decode_frame(input, i);
                for (o, s) in out[i * self.out_channels..(i + 1) * self.out_channels].iter_mut().zip(frame) {
                    *o = to_i16(s);
                }
            }
            return (frames, frames);
        }

        let mut read = 0;
        let mut written = 0;
        let mut prev = match self.prev.take() {
            Some(prev) => prev,
            None => {
                if in_frames == 0 {
                    return (0, 0);
                }
                read = 1;
                self.frac = 0.0;
                self.decode_frame(input, 0)
            }
        };

        'convert: loop {
            while self.frac >= 1.0 {
                if read >= in_frames {
                    break 'convert;
                }
                prev = self.decode_frame(input, read);
                read += 1;
                self.frac -= 1.0;
            }
            if written >= out_frames || read >= in_frames {
                break;
            }
            let next = self.decode_frame(input, read);
            let t = self.frac as f32;
            let dst = &mut out[written * self.out_channels..(written + 1) * self.out_channels];
            for ((o, a), b) in dst.iter_mut().zip(&prev).zip(&next) {
                *o = to_i16(a + (b - a) * t);
            }
            written += 1;
            self.frac += self.step;
        }

        self.prev = Some(prev);
        (read, written)
    }

    fn decode_frame(&self, input: &[u8], frame: usize) -> Vec<f32> {
        let width = self.format.bytes_per_sample();
        let base = frame * self.in_frame_bytes();
        let sample = |ch: usize| -> f32 {
            let at = base + ch * width;
            match self.format {
                SampleFormat::U8 => ((input[at] as i16 - 128) << 8) as f32,
                SampleFormat::S16 => i16::from_le_bytes([input[at], input[at + 1]]) as f32,
            }
        };

        if self.in_channels > self.out_channels {
            // Input channel i folds into output channel i % out_channels.
            (0..self.out_channels)
                .map(|c| {
                    let folded = (c..self.in_channels).step_by(self.out_channels);
                    let count = folded.len() as f32;
                    folded.map(sample).sum::<f32>() / count
                })
                .collect()
        } else {
            (0..self.out_channels).map(|c| sample(c.min(self.in_channels - 1))).collect()
        }
    }
}

fn to_i16(sample: f32) -> i16 {
    sample.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s16_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn same_rate_mono_is_duplicated_to_stereo() {
        let mut conv = SampleConverter::new(SampleFormat::S16, 1, 22050, 2, 22050);
        let mut out = [0i16; 6];
        assert_eq!(conv.process(&s16_bytes(&[100, -200, 300]), &mut out), (3, 3));
        assert_eq!(out, [100, 100, -200, -200, 300, 300]);
    }

    #[test]
    fn u8_is_centred_and_widened() {
        let mut conv = SampleConverter::new(SampleFormat::U8, 1, 11025, 1, 11025);
        let mut out = [0i16; 3];
        conv.process(&[128, 255, 0], &mut out);
        assert_eq!(out, [0, 127 << 8, -128 << 8]);
    }

    #[test]
    fn stereo_folds_to_mono() {
        let mut conv = SampleConverter::new(SampleFormat::S16, 2, 48000, 1, 48000);
        let mut out = [0i16; 2];
        conv.process(&s16_bytes(&[100, 300, -50, -150]), &mut out);
        assert_eq!(out, [200, -100]);
    }

    #[test]
    fn surround_folds_into_stereo() {
        let mut conv = SampleConverter::new(SampleFormat::S16, 6, 48000, 2, 48000);
        let mut out = [0i16; 2];
        assert_eq!(conv.process(&s16_bytes(&[100, 200, 300, 400, 500, 600]), &mut out), (1, 1));
        assert_eq!(out, [300, 400]);
    }

    #[test]
    fn upsampling_interpolates_between_frames() {
        let mut conv = SampleConverter::new(SampleFormat::S16, 1, 11025, 1, 22050);
        let mut out = [0i16; 8];
        let (read, written) = conv.process(&s16_bytes(&[0, 100, 200]), &mut out);
        assert_eq!(read, 3);
        assert_eq!(written, 4);
        assert_eq!(&out[..4], &[0, 50, 100, 150]);

        // The last frame is held and interpolated once more input arrives.
        let (read, written) = conv.process(&s16_bytes(&[300]), &mut out);
        assert_eq!((read, written), (1, 2));
        assert_eq!(&out[..2], &[200, 250]);
    }

    #[test]
    fn downsampling_skips_frames() {
        let mut conv = SampleConverter::new(SampleFormat::S16, 1, 44100, 1, 22050);
        let mut out = [0i16; 8];
        let input: Vec<i16> = (0..8).map(|i| i * 10).collect();
        let (read, written) = conv.process(&s16_bytes(&input), &mut out);
        assert_eq!(read, 8);
        assert_eq!(&out[..written], &[0, 20, 40, 60]);
    }

    #[test]
    fn output_space_limits_consumption() {
        let mut conv = SampleConverter::new(SampleFormat::S16, 1, 22050, 1, 22050);
        let mut out = [0i16; 2];
        assert_eq!(conv.process(&s16_bytes(&[1, 2, 3, 4]), &mut out), (2, 2));
        assert!(conv.accepts(SampleFormat::S16, 1, 22050));
        assert!(!conv.accepts(SampleFormat::U8, 1, 22050));
        assert_eq!(conv.expected_output(4), 4);
    }
}
