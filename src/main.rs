//! impulse: play MOD, S3M and IT modules from the terminal.
//!
//! ```bash
//! impulse info song.it
//! impulse play song.s3m --rate 48000 --volume 0.8
//! impulse render song.mod --wav song.wav --seconds 120
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use imp_master::{Controller, Module, PlayerConfig, StateUpdate};

#[derive(Parser)]
#[command(name = "impulse")]
#[command(about = "Tracker module player for MOD, S3M and IT files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print song metadata and the sample list
    Info {
        file: PathBuf,
    },

    /// Play through the default audio device
    Play {
        file: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Render offline to a 16-bit WAV file
    Render {
        file: PathBuf,
        /// Destination WAV file
        #[arg(long)]
        wav: PathBuf,
        /// Stop after this many seconds even if the song loops
        #[arg(long, default_value_t = 600)]
        seconds: u32,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args)]
struct OutputArgs {
    /// Output sample rate in Hz
    #[arg(long, default_value_t = 44100)]
    rate: u32,
    /// Mix down to one channel
    #[arg(long)]
    mono: bool,
    /// Master volume, 0.0 to 1.0
    #[arg(long, default_value_t = 1.0)]
    volume: f32,
}

impl OutputArgs {
    fn config(&self) -> PlayerConfig {
        PlayerConfig {
            sample_rate: self.rate,
            channels: if self.mono { 1 } else { 2 },
            volume: self.volume,
            ..PlayerConfig::default()
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Info { file } => {
            let controller = load(&file, PlayerConfig::default())?;
            print_info(controller.module());
        }
        Commands::Play { file, output } => {
            let mut controller = load(&file, output.config())?;
            print_info(controller.module());
            play(&mut controller)?;
        }
        Commands::Render { file, wav, seconds, output } => {
            let controller = load(&file, output.config())?;
            render(&controller, &wav, seconds)?;
        }
    }
    Ok(())
}

fn load(path: &Path, config: PlayerConfig) -> Result<Controller> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let controller = Controller::load(&data, config)
        .with_context(|| format!("failed to load {}", path.display()))?;
    for warning in controller.warnings() {
        tracing::warn!(?warning, "repaired while loading");
    }
    Ok(controller)
}

fn print_info(module: &Module) {
    println!("Title:    {}", module.title());
    println!("Format:   {}", module.format().name());
    println!("Length:   {} orders", module.song_length());
    println!("Tempo:    {} BPM, Speed: {}", module.initial_tempo, module.initial_speed);
    println!("Channels: {}", module.num_channels());
    println!("Patterns: {}", module.num_patterns());
    println!();

    let names: Vec<String> = module
        .samples
        .iter()
        .enumerate()
        .map(|(i, sample)| format!("{:02} {:<28}", i + 1, sample.name()))
        .collect();
    let half = names.len().div_ceil(2);
    for row in 0..half {
        match names.get(row + half) {
            Some(right) => println!("{} {}", names[row], right),
            None => println!("{}", names[row].trim_end()),
        }
    }
    println!();
}

fn play(controller: &mut Controller) -> Result<()> {
    controller.start().context("failed to start playback")?;
    println!("Playing... (Ctrl-C to quit)");
    println!();

    let mut stdout = std::io::stdout();
    while !controller.is_finished() {
        for update in controller.poll() {
            if let StateUpdate::Position(pos) = update {
                print!(
                    "\rOrd: {:02X} | Pat: {:02X} | Row: {:02X}",
                    pos.order, pos.pattern, pos.row
                );
                let _ = stdout.flush();
            }
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    let dropped = controller.dropped_updates();
    if dropped > 0 {
        tracing::debug!(dropped, "position updates dropped");
    }
    controller.close();
    println!("\rDone.                              ");
    Ok(())
}

fn render(controller: &Controller, path: &Path, seconds: u32) -> Result<()> {
    let config = controller.config();
    println!("Rendering to {} at {} Hz...", path.display(), config.sample_rate);

    let wav = controller.render_to_wav(seconds);
    fs::write(path, &wav).with_context(|| format!("failed to write {}", path.display()))?;

    let frames = (wav.len() - 44) / (2 * config.channels as usize);
    println!(
        "Rendered {} bytes ({:.1} s)",
        wav.len(),
        frames as f64 / config.sample_rate as f64
    );
    Ok(())
}
