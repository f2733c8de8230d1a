use std::collections::{BTreeMap, BTreeSet};

use looper_decode::{AudioArc, AudioCache, DecodeError, decode_locator};
use rayon::prelude::*;

/// Decoded sources and the ones that failed, keyed by locator.
#[derive(Debug, Default)]
pub struct Analysis {
    decoded: BTreeMap<String, AudioArc>,
    failed: BTreeMap<String, DecodeError>,
}

impl Analysis {
    pub fn duration(&self, locator: &str) -> Option<f64> {
        self.decoded.get(locator).map(AudioArc::duration_secs)
    }

    pub fn audio(&self, locator: &str) -> Option<&AudioArc> {
        self.decoded.get(locator)
    }

    pub fn error(&self, locator: &str) -> Option<&DecodeError> {
        self.failed.get(locator)
    }

    pub fn durations(&self) -> impl Iterator<Item = (&str, f64)> {
        self.decoded
            .iter()
            .map(|(locator, audio)| (locator.as_str(), audio.duration_secs()))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &DecodeError)> {
        self.failed.iter().map(|(locator, err)| (locator.as_str(), err))
    }

    pub fn decoded_count(&self) -> usize {
        self.decoded.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Hand the decoded PCM to a playback cache so loading these sources
    /// later does not decode them again.
    pub fn prewarm(&self, cache: &mut AudioCache) {
        for (locator, audio) in &self.decoded {
            if !cache.contains(locator) {
                cache.insert(locator.clone(), audio.clone());
            }
        }
    }
}

/// Decode every distinct locator in parallel.
pub fn analyze_sources<'a>(locators: impl IntoIterator<Item = &'a str>) -> Analysis {
    let unique: Vec<&str> = locators.into_iter().collect::<BTreeSet<_>>().into_iter().collect();

    let results: Vec<(&str, Result<AudioArc, DecodeError>)> = unique
        .par_iter()
        .map(|locator| (*locator, decode_locator(locator)))
        .collect();

    let mut analysis = Analysis::default();
    for (locator, result) in results {
        match result {
            Ok(audio) => {
                analysis.decoded.insert(locator.to_string(), audio);
            }
            Err(e) => {
                log::warn!("could not analyze '{locator}': {e}");
                analysis.failed.insert(locator.to_string(), e);
            }
        }
    }
    log::info!(
        "analyzed {} sources ({} failed)",
        analysis.decoded.len() + analysis.failed.len(),
        analysis.failed.len()
    );
    analysis
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    fn write_wav(path: &Path, sample_rate: u32, seconds: f32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
        for _ in 0..(sample_rate as f32 * seconds) as usize {
            writer.write_sample(0i16).expect("write sample");
        }
        writer.finalize().expect("finalize wav");
    }

    #[test]
    fn test_durations_and_isolated_failures() {
        let dir = tempdir().expect("tempdir");
        let short = dir.path().join("short.wav");
        let long = dir.path().join("long.wav");
        write_wav(&short, 8000, 0.5);
        write_wav(&long, 8000, 2.0);
        let short = short.to_string_lossy().to_string();
        let long = long.to_string_lossy().to_string();

        let analysis = analyze_sources([
            short.as_str(),
            long.as_str(),
            short.as_str(),
            "/missing/loop.wav",
        ]);

        assert_eq!(analysis.decoded_count(), 2);
        assert_eq!(analysis.duration(&short), Some(0.5));
        assert_eq!(analysis.duration(&long), Some(2.0));
        assert_eq!(analysis.failed_count(), 1);
        assert!(matches!(
            analysis.error("/missing/loop.wav"),
            Some(DecodeError::NotFound(_))
        ));
    }

    #[test]
    fn test_prewarm_fills_cache() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("loop.wav");
        write_wav(&path, 8000, 0.25);
        let locator = path.to_string_lossy().to_string();

        let analysis = analyze_sources([locator.as_str()]);
        let mut cache = AudioCache::new();
        analysis.prewarm(&mut cache);

        let cached = cache.get_or_decode(&locator).expect("cached");
        assert!(cached.ptr_eq(analysis.audio(&locator).expect("decoded")));
    }
}
