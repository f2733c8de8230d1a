//! Scripted stand-ins for media elements and loaders used by the unit tests.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::element::{MediaElement, SourceLoader};

#[derive(Debug, Clone, PartialEq)]
pub struct ElementState {
    pub paused: bool,
    pub time: f64,
    pub duration: f64,
    pub muted: bool,
    pub volume: f32,
    pub play_calls: usize,
    pub seeks: Vec<f64>,
}

/// Element whose clock only moves when the test advances it.
#[derive(Debug, Clone)]
pub struct ScriptedElement {
    state: Arc<Mutex<ElementState>>,
}

impl ScriptedElement {
    pub fn new(duration: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(ElementState {
                paused: true,
                time: 0.0,
                duration,
                muted: false,
                volume: 1.0,
                play_calls: 0,
                seeks: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ElementState> {
        self.state.lock().expect("element state")
    }

    pub fn state(&self) -> ElementState {
        self.lock().clone()
    }

    /// Play for `seconds`, looping at the end like a real element.
    pub fn advance(&self, seconds: f64) {
        let mut state = self.lock();
        if !state.paused {
            state.time = (state.time + seconds) % state.duration;
        }
    }
}

impl MediaElement for ScriptedElement {
    fn play(&mut self) {
        let mut state = self.lock();
        state.paused = false;
        state.play_calls += 1;
    }

    fn pause(&mut self) {
        self.lock().paused = true;
    }

    fn is_paused(&self) -> bool {
        self.lock().paused
    }

    fn current_time(&self) -> f64 {
        self.lock().time
    }

    fn set_current_time(&mut self, seconds: f64) {
        let mut state = self.lock();
        state.time = seconds;
        state.seeks.push(seconds);
    }

    fn duration(&self) -> Option<f64> {
        Some(self.lock().duration)
    }

    fn set_muted(&mut self, muted: bool) {
        self.lock().muted = muted;
    }

    fn set_volume(&mut self, volume: f32) {
        self.lock().volume = volume;
    }
}

#[derive(Debug, Default)]
pub struct LoaderScript {
    pub durations: HashMap<String, f64>,
    pub failing: HashSet<String>,
    /// Number of upcoming `prepare` calls that fail.
    pub failing_prepares: usize,
    pub load_delay: Duration,
    pub prepare_calls: usize,
    pub loads: Vec<String>,
    pub forgotten: Vec<String>,
    pub releases: usize,
    pub elements: HashMap<String, Vec<ScriptedElement>>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedLoader {
    script: Arc<Mutex<LoaderScript>>,
}

impl ScriptedLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self) -> MutexGuard<'_, LoaderScript> {
        self.script.lock().expect("loader script")
    }

    pub fn loads_of(&self, locator: &str) -> usize {
        self.script().loads.iter().filter(|l| *l == locator).count()
    }

    /// Most recently created element for `locator`.
    pub fn element(&self, locator: &str) -> ScriptedElement {
        self.script()
            .elements
            .get(locator)
            .and_then(|v| v.last().cloned())
            .expect("element was loaded")
    }
}

impl SourceLoader for ScriptedLoader {
    type Element = ScriptedElement;

    fn prepare(&self) -> impl Future<Output = anyhow::Result<()>> + Send {
        let script = self.script.clone();
        async move {
            let mut script = script.lock().expect("loader script");
            script.prepare_calls += 1;
            if script.failing_prepares > 0 {
                script.failing_prepares -= 1;
                anyhow::bail!("no output device found");
            }
            Ok(())
        }
    }

    fn load(
        &self,
        locator: String,
    ) -> impl Future<Output = anyhow::Result<ScriptedElement>> + Send + 'static {
        let (element, fails, delay) = {
            let mut script = self.script();
            script.loads.push(locator.clone());
            let duration = script.durations.get(&locator).copied().unwrap_or(16.0);
            let element = ScriptedElement::new(duration);
            script
                .elements
                .entry(locator.clone())
                .or_default()
                .push(element.clone());
            (element, script.failing.contains(&locator), script.load_delay)
        };
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if fails {
                anyhow::bail!("could not decode {locator}");
            }
            Ok(element)
        }
    }

    fn forget(&self, locator: &str) {
        self.script().forgotten.push(locator.to_string());
    }

    fn release(&self) {
        self.script().releases += 1;
    }
}
