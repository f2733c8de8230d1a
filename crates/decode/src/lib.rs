//! Source loading for the looper engine: decoding with symphonia, resampling
//! to the device rate, and decode-once caches for PCM and waveform peaks.

mod audio;
mod cache;
mod peaks;
mod resample;

use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

pub use audio::AudioArc;
pub use cache::AudioCache;
pub use peaks::{DEFAULT_SAMPLES_PER_BUCKET, Peaks, PeaksCache};
pub use resample::resample;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unsupported source locator '{0}'")]
    UnsupportedLocator(String),

    #[error("source not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode failed: {0}")]
    Format(#[from] SymphoniaError),

    #[error("no audio track in '{}'", .0.display())]
    NoTrack(PathBuf),

    #[error("resampler setup failed: {0}")]
    ResamplerSetup(#[from] rubato::ResamplerConstructionError),

    #[error("resampling failed: {0}")]
    Resample(#[from] rubato::ResampleError),
}

/// Map a source locator to a local file. Accepts plain paths and `file://`
/// URLs; any other scheme is rejected.
pub fn resolve_locator(locator: &str) -> Result<PathBuf, DecodeError> {
    let path = match locator.split_once("://") {
        Some(("file", rest)) => PathBuf::from(rest),
        Some(_) => return Err(DecodeError::UnsupportedLocator(locator.to_string())),
        None => PathBuf::from(locator),
    };

    if path.exists() {
        Ok(path)
    } else {
        Err(DecodeError::NotFound(path))
    }
}

pub fn decode_locator(locator: &str) -> Result<AudioArc, DecodeError> {
    let path = resolve_locator(locator)?;
    decode_file(&path)
}

pub fn decode_file(path: &Path) -> Result<AudioArc, DecodeError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| DecodeError::NoTrack(path.to_path_buf()))?;

    let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2) as u16;
    let track_id = track.id;

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("skipping corrupt packet in {}: {e}", path.display());
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let spec = *decoded.spec();
        let capacity = decoded.capacity() as u64;

        let mut sample_buf = SampleBuffer::<f32>::new(capacity, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    let audio = AudioArc::new(samples, sample_rate, channels);
    log::info!(
        "decoded {} ({:.2}s, {} Hz, {} ch)",
        path.display(),
        audio.duration_secs(),
        sample_rate,
        channels
    );
    Ok(audio)
}
