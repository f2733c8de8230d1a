use std::collections::HashMap;

use crate::{AudioArc, DecodeError, decode_locator, resample};

/// Decode-once PCM cache keyed by source locator.
///
/// The decoded original is kept alongside each resampled variant so a device
/// rate change or a peaks request never decodes the file again.
#[derive(Debug, Default)]
pub struct AudioCache {
    decoded: HashMap<String, AudioArc>,
    resampled: HashMap<(String, u32), AudioArc>,
}

impl AudioCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoded source at its native rate.
    pub fn get_or_decode(&mut self, locator: &str) -> Result<AudioArc, DecodeError> {
        if let Some(audio) = self.decoded.get(locator) {
            return Ok(audio.clone());
        }
        let audio = decode_locator(locator)?;
        self.decoded.insert(locator.to_string(), audio.clone());
        Ok(audio)
    }

    /// Decoded source at `sample_rate`.
    pub fn get_or_load(
        &mut self,
        locator: &str,
        sample_rate: u32,
    ) -> Result<AudioArc, DecodeError> {
        let key = (locator.to_string(), sample_rate);
        if let Some(audio) = self.resampled.get(&key) {
            return Ok(audio.clone());
        }
        let original = self.get_or_decode(locator)?;
        let audio = resample(&original, sample_rate)?;
        self.resampled.insert(key, audio.clone());
        Ok(audio)
    }

    /// Cached source at `sample_rate`, without decoding.
    pub fn get(&self, locator: &str, sample_rate: u32) -> Option<AudioArc> {
        if let Some(audio) = self.resampled.get(&(locator.to_string(), sample_rate)) {
            return Some(audio.clone());
        }
        self.decoded
            .get(locator)
            .filter(|audio| audio.sample_rate() == sample_rate)
            .cloned()
    }

    /// Cached source at its native rate, without decoding.
    pub fn get_decoded(&self, locator: &str) -> Option<AudioArc> {
        self.decoded.get(locator).cloned()
    }

    /// Store the results of a decode and resample done outside the cache.
    /// Entries already present win, so racing loaders share one buffer.
    pub fn insert_loaded(
        &mut self,
        locator: &str,
        original: AudioArc,
        audio: AudioArc,
    ) -> AudioArc {
        let original = self
            .decoded
            .entry(locator.to_string())
            .or_insert(original)
            .clone();
        if audio.sample_rate() == original.sample_rate() {
            return original;
        }
        self.resampled
            .entry((locator.to_string(), audio.sample_rate()))
            .or_insert(audio)
            .clone()
    }

    /// Insert already-decoded audio, e.g. a recording the host holds in memory.
    pub fn insert(&mut self, locator: impl Into<String>, audio: AudioArc) {
        let locator = locator.into();
        self.evict(&locator);
        self.decoded.insert(locator, audio);
    }

    pub fn contains(&self, locator: &str) -> bool {
        self.decoded.contains_key(locator)
    }

    /// Drop every variant of a source. Called when its track is removed.
    pub fn evict(&mut self, locator: &str) {
        self.decoded.remove(locator);
        self.resampled.retain(|(key, _), _| key != locator);
    }

    pub fn clear(&mut self) {
        self.decoded.clear();
        self.resampled.clear();
    }

    pub fn len(&self) -> usize {
        self.decoded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoded.is_empty()
    }
}
