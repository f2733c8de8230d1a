use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use looper_decode::{AudioArc, AudioCache, DecodeError, Peaks, PeaksCache, decode_locator, resample};

use crate::element::SourceLoader;
use crate::output::OutputStream;
use crate::voice::{BufferElement, Voice};

/// Loads sources into voices on the default output device.
///
/// Decoded PCM is cached per locator, so a track that is removed and added
/// back, or a waveform request for a playing source, does not decode twice.
#[derive(Clone, Default)]
pub struct DeviceLoader {
    output: Arc<Mutex<Option<OutputStream>>>,
    cache: Arc<Mutex<AudioCache>>,
    peaks: Arc<Mutex<PeaksCache>>,
}

impl DeviceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> Arc<Mutex<AudioCache>> {
        self.cache.clone()
    }

    /// Waveform peaks for a source, computed from the shared PCM cache.
    pub fn peaks(&self, locator: &str, samples_per_bucket: usize) -> anyhow::Result<Arc<Peaks>> {
        if let Some(peaks) = lock(&self.peaks).get(locator, samples_per_bucket) {
            return Ok(peaks);
        }
        let cached = lock(&self.cache).get_decoded(locator);
        let audio = match cached {
            Some(audio) => audio,
            None => {
                let audio = decode_locator(locator)?;
                lock(&self.cache).insert_loaded(locator, audio.clone(), audio)
            }
        };
        let peaks = Peaks::from_audio(&audio, samples_per_bucket);
        Ok(lock(&self.peaks).insert(locator, peaks))
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(OutputStream::sample_rate)
    }
}

impl SourceLoader for DeviceLoader {
    type Element = BufferElement;

    fn prepare(&self) -> impl Future<Output = anyhow::Result<()>> + Send {
        let output = self.output.clone();
        async move {
            if output
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some()
            {
                return Ok(());
            }
            let stream = tokio::task::spawn_blocking(OutputStream::open).await??;
            *output.lock().unwrap_or_else(PoisonError::into_inner) = Some(stream);
            Ok(())
        }
    }

    fn load(
        &self,
        locator: String,
    ) -> impl Future<Output = anyhow::Result<BufferElement>> + Send + 'static {
        let output = self.output.clone();
        let cache = self.cache.clone();
        async move {
            let sample_rate = output
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                .map(OutputStream::sample_rate)
                .ok_or_else(|| anyhow::anyhow!("output device is not open"))?;

            let audio = tokio::task::spawn_blocking(move || {
                fetch_audio(&cache, &locator, sample_rate, decode_locator)
            })
            .await??;

            let voice = Voice::new(audio);
            match output
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_mut()
            {
                Some(stream) => stream.register(voice.clone()),
                None => anyhow::bail!("output device closed while loading"),
            }
            Ok(BufferElement::new(voice))
        }
    }

    fn forget(&self, locator: &str) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .evict(locator);
        self.peaks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .evict(locator);
        if let Some(stream) = self
            .output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            stream.prune();
        }
    }

    fn release(&self) {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Source at `sample_rate`. The cache is only locked to look up and to
/// store; decoding and resampling run unlocked so other loads and
/// evictions proceed meanwhile.
fn fetch_audio(
    cache: &Mutex<AudioCache>,
    locator: &str,
    sample_rate: u32,
    decode: impl FnOnce(&str) -> Result<AudioArc, DecodeError>,
) -> Result<AudioArc, DecodeError> {
    let (ready, original) = {
        let cache = lock(cache);
        (cache.get(locator, sample_rate), cache.get_decoded(locator))
    };
    if let Some(audio) = ready {
        return Ok(audio);
    }
    let original = match original {
        Some(audio) => audio,
        None => decode(locator)?,
    };
    let audio = resample(&original, sample_rate)?;
    Ok(lock(cache).insert_loaded(locator, original, audio))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silence(sample_rate: u32) -> AudioArc {
        AudioArc::new(vec![0.0; 4410], sample_rate, 1)
    }

    #[test]
    fn test_decode_runs_without_cache_lock() {
        let cache = Mutex::new(AudioCache::new());
        let audio = fetch_audio(&cache, "mem://kick", 44100, |_| {
            assert!(cache.try_lock().is_ok(), "cache locked during decode");
            Ok(silence(44100))
        })
        .expect("fetch");
        assert_eq!(audio.sample_rate(), 44100);

        let again = fetch_audio(&cache, "mem://kick", 44100, |_| panic!("decoded twice"))
            .expect("cached");
        assert!(again.ptr_eq(&audio));
    }

    #[test]
    fn test_cached_source_is_resampled_not_decoded() {
        let cache = Mutex::new(AudioCache::new());
        lock(&cache).insert("mem://pad", silence(44100));

        let audio = fetch_audio(&cache, "mem://pad", 48000, |_| panic!("decoded again"))
            .expect("resample");
        assert_eq!(audio.sample_rate(), 48000);
        assert!(lock(&cache).get("mem://pad", 48000).is_some());
    }

    #[test]
    fn test_peaks_come_from_shared_cache() {
        let loader = DeviceLoader::new();
        lock(&loader.cache()).insert("mem://loop", AudioArc::new(vec![0.5; 64], 44100, 1));

        let peaks = loader.peaks("mem://loop", 16).expect("peaks");
        assert_eq!(peaks.buckets.len(), 4);
        let again = loader.peaks("mem://loop", 16).expect("peaks");
        assert!(Arc::ptr_eq(&peaks, &again));
    }
}
