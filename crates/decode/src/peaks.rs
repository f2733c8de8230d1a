use std::collections::HashMap;
use std::sync::Arc;

use crate::{AudioArc, AudioCache, DecodeError};

pub const DEFAULT_SAMPLES_PER_BUCKET: usize = 512;

/// Min/max amplitude per bucket of a mono mixdown, for waveform drawing.
#[derive(Debug, Clone, PartialEq)]
pub struct Peaks {
    pub buckets: Vec<(f32, f32)>,
    pub samples_per_bucket: usize,
    pub sample_rate: u32,
}

impl Peaks {
    pub fn from_audio(audio: &AudioArc, samples_per_bucket: usize) -> Self {
        let samples_per_bucket = samples_per_bucket.max(1);
        let channels = audio.channels() as usize;

        let buckets = audio
            .samples()
            .chunks(samples_per_bucket * channels)
            .map(|bucket| {
                bucket
                    .chunks_exact(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                    .fold((0.0f32, 0.0f32), |(lo, hi), s| (lo.min(s), hi.max(s)))
            })
            .collect();

        Self {
            buckets,
            samples_per_bucket,
            sample_rate: audio.sample_rate(),
        }
    }

    pub fn seconds_per_bucket(&self) -> f64 {
        self.samples_per_bucket as f64 / self.sample_rate as f64
    }
}

/// Decode-once peaks per source locator and bucket size.
#[derive(Debug, Default)]
pub struct PeaksCache {
    entries: HashMap<(String, usize), Arc<Peaks>>,
}

impl PeaksCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, locator: &str, samples_per_bucket: usize) -> Option<Arc<Peaks>> {
        self.entries
            .get(&(locator.to_string(), samples_per_bucket))
            .cloned()
    }

    pub fn get_or_compute(
        &mut self,
        locator: &str,
        samples_per_bucket: usize,
        audio: &mut AudioCache,
    ) -> Result<Arc<Peaks>, DecodeError> {
        if let Some(peaks) = self.get(locator, samples_per_bucket) {
            return Ok(peaks);
        }
        let decoded = audio.get_or_decode(locator)?;
        let peaks = Arc::new(Peaks::from_audio(&decoded, samples_per_bucket));
        self.entries
            .insert((locator.to_string(), samples_per_bucket), peaks.clone());
        Ok(peaks)
    }

    /// Store peaks computed outside the cache. An existing entry wins.
    pub fn insert(&mut self, locator: &str, peaks: Peaks) -> Arc<Peaks> {
        self.entries
            .entry((locator.to_string(), peaks.samples_per_bucket))
            .or_insert_with(|| Arc::new(peaks))
            .clone()
    }

    pub fn evict(&mut self, locator: &str) {
        self.entries.retain(|(key, _), _| key != locator);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_count_rounds_up() {
        let audio = AudioArc::new(vec![0.0; 1100], 44100, 1);
        let peaks = Peaks::from_audio(&audio, 512);
        assert_eq!(peaks.buckets.len(), 3);
    }

    #[test]
    fn test_min_max_of_mono_mixdown() {
        // stereo frames: (1.0, 0.0), (-1.0, -1.0)
        let audio = AudioArc::new(vec![1.0, 0.0, -1.0, -1.0], 44100, 2);
        let peaks = Peaks::from_audio(&audio, 2);
        assert_eq!(peaks.buckets, vec![(-1.0, 0.5)]);
    }

    #[test]
    fn test_cache_computes_once() {
        let mut audio = AudioCache::new();
        audio.insert("mem://a", AudioArc::new(vec![0.5; 2048], 44100, 2));

        let mut cache = PeaksCache::new();
        let first = cache.get_or_compute("mem://a", 256, &mut audio).expect("peaks");
        let second = cache.get_or_compute("mem://a", 256, &mut audio).expect("peaks");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.buckets.len(), 4);

        cache.evict("mem://a");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_insert_keeps_existing_entry() {
        let audio = AudioArc::new(vec![0.25; 64], 44100, 1);
        let mut cache = PeaksCache::new();
        let first = cache.insert("mem://a", Peaks::from_audio(&audio, 16));
        let second = cache.insert("mem://a", Peaks::from_audio(&audio, 16));
        assert!(Arc::ptr_eq(&first, &second));
        assert!(cache.get("mem://a", 16).is_some());
        assert_eq!(cache.len(), 1);
    }
}
