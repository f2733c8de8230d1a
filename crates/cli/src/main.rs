//! Command-line front end: analyze sources or play them as a loop session.

mod cli;

use std::path::{Path, PathBuf};
use std::sync::PoisonError;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;

use cli::{Cli, Commands, PlayArgs};
use looper_core::{Session, analyze_sources};
use looper_decode::{AudioCache, DEFAULT_SAMPLES_PER_BUCKET, PeaksCache};
use looper_engine::{DeviceLoader, EngineConfig};
use looper_transport::{TempoClock, TrackId, TrackInfo};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load_from(path),
        None => EngineConfig::load(),
    };

    match cli.command {
        Commands::Play(args) => play(args, config).await,
        Commands::Analyze { files, bpm } => analyze(&files, bpm),
    }
}

fn locators(files: &[PathBuf]) -> Vec<String> {
    files.iter().map(|p| p.to_string_lossy().to_string()).collect()
}

fn track_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn analyze(files: &[PathBuf], bpm: f64) -> Result<()> {
    let locators = locators(files);
    let analysis = analyze_sources(locators.iter().map(String::as_str));
    let clock = TempoClock::new(bpm);

    let mut cache = AudioCache::new();
    analysis.prewarm(&mut cache);
    let mut peaks = PeaksCache::new();

    for locator in &locators {
        if let Some(err) = analysis.error(locator) {
            println!("{locator}: {err}");
            continue;
        }
        let Some(seconds) = analysis.duration(locator) else {
            continue;
        };
        let bars = clock.seconds_to_beats(seconds) / clock.beats_per_bar();
        let summary = peaks.get_or_compute(locator, DEFAULT_SAMPLES_PER_BUCKET, &mut cache)?;
        let loudest = summary
            .buckets
            .iter()
            .map(|(lo, hi)| lo.abs().max(hi.abs()))
            .fold(0.0f32, f32::max);
        println!(
            "{locator}: {seconds:.3}s, {bars:.2} bars at {:.1} bpm, peak {loudest:.3}",
            clock.bpm()
        );
    }

    if analysis.decoded_count() == 0 && !locators.is_empty() {
        bail!("no source could be decoded");
    }
    Ok(())
}

async fn play(args: PlayArgs, config: EngineConfig) -> Result<()> {
    let locators = locators(&args.files);
    let analysis = analyze_sources(locators.iter().map(String::as_str));
    if analysis.decoded_count() == 0 {
        bail!("no source could be decoded");
    }

    let loader = DeviceLoader::new();
    analysis.prewarm(&mut loader.cache().lock().unwrap_or_else(PoisonError::into_inner));

    let mut session = Session::new(loader, config.clone());
    session.set_bpm(args.bpm).await;
    if let Some(bars) = args.min_bars {
        session.set_min_bars(bars).await;
    }

    for (index, (path, locator)) in args.files.iter().zip(&locators).enumerate() {
        if analysis.error(locator).is_some() {
            continue;
        }
        let mut track = TrackInfo::new(TrackId(index as u64), locator.clone());
        track.name = track_name(path);
        if let Some(bars) = args.bars {
            track = track.with_bars(bars);
        }
        session.edit(|e| e.add_track(track)).await;
    }
    session.apply_analysis(&analysis).await;

    session.open().await.context("opening the audio output")?;
    let clock = *session.editor().clock();
    session
        .transport()
        .with(|t| {
            let mut last_bar = 0;
            t.on_tick(move |position| {
                let at = clock.format_position(position);
                if at.bar != last_bar {
                    last_bar = at.bar;
                    log::info!("{at} ({position:.2}s)");
                }
            })
        })
        .await;

    session.play().await?;
    let snapshot = session.snapshot().await;
    println!(
        "playing {} tracks at {:.1} bpm, loop {:.2}s",
        session.editor().store().track_count(),
        snapshot.bpm,
        snapshot.loop_length
    );

    let ticks = session.transport().spawn_tick_loop();
    match args.seconds {
        Some(seconds) if seconds.is_finite() && seconds > 0.0 => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs_f64(seconds)) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        _ => {
            tokio::signal::ctrl_c().await?;
        }
    }

    for (locator, err) in analysis.failures() {
        log::warn!("skipped {locator}: {err}");
    }
    for err in session.transport().with(|t| t.load_errors()).await {
        log::warn!("{err}");
    }

    session.pause().await;
    session.close().await;
    ticks.await?;
    Ok(())
}
