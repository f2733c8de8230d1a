use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "looper")]
#[command(about = "Play audio files as tempo-synchronized loops")]
pub struct Cli {
    /// Engine config file (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Loop every file as one track, all starting on the downbeat
    Play(PlayArgs),

    /// Print length, bars at the given tempo and waveform summary per file
    Analyze {
        files: Vec<PathBuf>,

        #[arg(long, default_value_t = looper_transport::DEFAULT_BPM)]
        bpm: f64,
    },
}

#[derive(Args)]
pub struct PlayArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    #[arg(long, default_value_t = looper_transport::DEFAULT_BPM)]
    pub bpm: f64,

    /// Loop length of every source in bars, instead of its analyzed length
    #[arg(long)]
    pub bars: Option<f64>,

    /// Shortest loop window in bars
    #[arg(long)]
    pub min_bars: Option<f64>,

    /// Stop after this many seconds instead of waiting for ctrl-c
    #[arg(long)]
    pub seconds: Option<f64>,
}
