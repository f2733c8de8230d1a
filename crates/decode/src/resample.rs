use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::{AudioArc, DecodeError};

/// Resample to the output device rate. Same-rate input is returned as a
/// cheap clone.
pub fn resample(audio: &AudioArc, target_sample_rate: u32) -> Result<AudioArc, DecodeError> {
    if audio.sample_rate() == target_sample_rate || audio.is_empty() {
        return Ok(audio.clone());
    }

    let channels = audio.channels() as usize;
    let input_frames = audio.frames();
    let ratio = target_sample_rate as f64 / audio.sample_rate() as f64;

    // rubato works on planar buffers
    let mut planar = vec![Vec::with_capacity(input_frames); channels];
    for frame in audio.samples().chunks_exact(channels) {
        for (ch, sample) in frame.iter().enumerate() {
            planar[ch].push(*sample);
        }
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, input_frames, channels)?;
    let output = resampler.process(&planar, None)?;

    let output_frames = output.first().map_or(0, Vec::len);
    let mut interleaved = Vec::with_capacity(output_frames * channels);
    for frame in 0..output_frames {
        for plane in &output {
            interleaved.push(plane[frame]);
        }
    }

    log::debug!(
        "resampled {} frames {} Hz -> {} frames {} Hz",
        input_frames,
        audio.sample_rate(),
        output_frames,
        target_sample_rate
    );

    Ok(AudioArc::new(interleaved, target_sample_rate, audio.channels()))
}
