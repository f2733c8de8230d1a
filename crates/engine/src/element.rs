use std::future::Future;

/// One playable audio source with its own playhead.
///
/// Elements loop natively: reaching the end of the media wraps to zero
/// without intervention.
pub trait MediaElement: Send + 'static {
    fn play(&mut self);
    fn pause(&mut self);
    fn is_paused(&self) -> bool;

    /// Playhead in source seconds.
    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, seconds: f64);

    /// Source length in seconds, once known.
    fn duration(&self) -> Option<f64>;

    fn set_muted(&mut self, muted: bool);
    fn set_volume(&mut self, volume: f32);
}

/// Creates media elements for source locators.
pub trait SourceLoader: Send + Sync + 'static {
    type Element: MediaElement;

    /// Acquire the output backend. Called once per successful initialize.
    fn prepare(&self) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn load(
        &self,
        locator: String,
    ) -> impl Future<Output = anyhow::Result<Self::Element>> + Send + 'static;

    /// A track using `locator` went away.
    fn forget(&self, _locator: &str) {}

    /// Release the output backend.
    fn release(&self) {}
}
