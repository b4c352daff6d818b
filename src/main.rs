use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use voicelink::config::Overrides;
use voicelink::voice::{
    AudioInput, AudioSink, CapturePipeline, CpalMicrophone, CpalSpeaker, DecodedAudio, HaltSignal,
    PlaybackEvent, PlaybackPipeline, decode_audio, samples_to_wav,
};
use voicelink::{Config, Session, SessionCommand, SessionEnd, SessionSummary};

/// voicelink - Talk to a voice AI service from the terminal
#[derive(Parser)]
#[command(name = "voicelink", version, about)]
struct Cli {
    /// Voice service WebSocket URL (session id is appended)
    #[arg(short, long, env = "VOICELINK_URL")]
    url: Option<String>,

    /// Capture sample rate in Hz
    #[arg(long, env = "VOICELINK_SAMPLE_RATE")]
    sample_rate: Option<u32>,

    /// Frame duration in milliseconds
    #[arg(long, env = "VOICELINK_TIME_SLICE_MS")]
    time_slice: Option<u32>,

    /// Voice-activity gate: off, mean or decibel
    #[arg(long, env = "VOICELINK_GATE")]
    gate: Option<String>,

    /// Gate threshold (mean energy 0-255, or dBFS for decibel)
    #[arg(long, env = "VOICELINK_GATE_THRESHOLD", allow_hyphen_values = true)]
    gate_threshold: Option<f32>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start a voice session (default)
    Run,
    /// Test microphone input and gate
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Save the recording as WAV
        #[arg(short, long)]
        save: Option<PathBuf>,
    },
    /// Test speaker output
    TestSpeaker,
    /// Play a WAV or MP3 file through the playback pipeline
    Play {
        /// Audio file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,voicelink=info",
        1 => "info,voicelink=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = Overrides {
        url: cli.url,
        sample_rate: cli.sample_rate,
        time_slice_ms: cli.time_slice,
        gate: cli.gate,
        gate_threshold: cli.gate_threshold,
    };

    let config = Config::load(&overrides)?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_session(config).await,
        Command::TestMic { duration, save } => test_mic(&config, duration, save.as_deref()).await,
        Command::TestSpeaker => test_speaker().await,
        Command::Play { file } => play_file(&config, &file).await,
    }
}

/// Run a voice session until stopped
#[allow(clippy::future_not_send)]
async fn run_session(config: Config) -> anyhow::Result<()> {
    let speaker = CpalSpeaker::new()?;
    let session = Session::new(&config, CpalMicrophone::new(), speaker)?;

    let (commands, commands_rx) = mpsc::channel(8);
    spawn_stdin_commands(commands.clone());

    let interrupt = commands.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = interrupt.send(SessionCommand::Stop).await;
        }
    });

    println!("Connecting to {} ...", session.transport().url());
    println!("Speak when ready. [m] mute/unmute, [q] quit\n");

    let summary = session.run(commands_rx).await?;
    drop(commands);

    print_summary(&summary);

    match summary.end {
        SessionEnd::ConnectionError(e) => anyhow::bail!("connection lost: {e}"),
        SessionEnd::InputEnded => anyhow::bail!("microphone stopped delivering audio"),
        SessionEnd::Stopped | SessionEnd::RemoteClosed(_) => Ok(()),
    }
}

/// Forward single-key commands typed on stdin
fn spawn_stdin_commands(commands: mpsc::Sender<SessionCommand>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let command = match line.trim() {
                "m" | "mute" => SessionCommand::ToggleMute,
                "q" | "quit" => SessionCommand::Stop,
                "" => continue,
                other => {
                    println!("unknown command: {other} ([m] mute/unmute, [q] quit)");
                    continue;
                }
            };

            if commands.send(command).await.is_err() {
                break;
            }
        }
    });
}

fn print_summary(summary: &SessionSummary) {
    println!("\n---");
    println!(
        "Frames sent: {} (gated: {}, unsent: {})",
        summary.frames_sent, summary.frames_gated, summary.frames_unsent
    );
    println!(
        "Audio chunks: {} received, {} played, {} failed",
        summary.chunks_enqueued, summary.chunks_played, summary.chunks_failed
    );
    println!("Responses: {}", summary.utterances);

    if !summary.errors.is_empty() {
        println!("Errors:");
        for error in &summary.errors {
            println!("  - {error}");
        }
    }
}

/// Test microphone input and show which frames pass the gate
#[allow(clippy::future_not_send)]
async fn test_mic(config: &Config, duration: u64, save: Option<&Path>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Gate: {}", config.capture.gate);
    println!("Speak into your microphone!\n");

    let mut pipeline = CapturePipeline::new(&config.capture)?;
    let mut mic = CpalMicrophone::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    mic.open(&config.capture, tx)?;

    println!("Sample rate: {} Hz", config.capture.sample_rate);
    println!("---");

    let mut recording = Vec::new();
    let mut second = tokio::time::interval(Duration::from_secs(1));
    second.tick().await;

    for i in 0..duration {
        let mut samples = Vec::new();
        loop {
            tokio::select! {
                _ = second.tick() => break,
                block = rx.recv() => match block {
                    Some(block) => samples.extend(block),
                    None => anyhow::bail!("microphone stopped delivering audio"),
                },
            }
        }

        let before = pipeline.retained();
        pipeline.push_samples(&samples, |_| {});
        let kept = pipeline.retained() - before;

        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | voiced frames: {} | [{}]",
            i + 1,
            energy,
            peak,
            kept,
            meter
        );

        if save.is_some() {
            recording.extend(samples);
        }
    }

    mic.close();

    println!("\n---");
    println!(
        "Frames kept: {} | dropped by gate: {}",
        pipeline.retained(),
        pipeline.dropped()
    );

    if let Some(path) = save {
        let wav = samples_to_wav(&recording, config.capture.sample_rate)?;
        tokio::fs::write(path, wav).await?;
        println!("Saved recording to {}", path.display());
    }

    println!("If frames were kept while you spoke, capture is working.");
    println!("If every frame was dropped, try --gate off or a lower --gate-threshold.");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let speaker = CpalSpeaker::new()?;

    let sample_rate = speaker.sample_rate();
    let frequency = 440.0_f32;
    let num_samples = sample_rate as usize * 2;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    let clip = DecodedAudio {
        samples,
        sample_rate,
    };
    speaker.play(clip, &HaltSignal::new()).await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Play an audio file through the playback pipeline
async fn play_file(config: &Config, file: &Path) -> anyhow::Result<()> {
    let data = tokio::fs::read(file).await?;
    let speaker = Arc::new(CpalSpeaker::new()?);

    // Fail early with a clear message instead of a skipped chunk
    decode_audio(&data, speaker.sample_rate())?;

    let (mut playback, mut events) = PlaybackPipeline::spawn(speaker, config.playback.settle_delay);
    playback.enqueue(data);

    while let Some(event) = events.recv().await {
        match event {
            PlaybackEvent::Started(_) => println!("Playing {} ...", file.display()),
            PlaybackEvent::Finished(_) => println!("Done."),
            PlaybackEvent::Failed { error, .. } => {
                playback.stop().await;
                anyhow::bail!("playback failed: {error}");
            }
            PlaybackEvent::Idle => break,
        }
    }

    playback.stop().await;
    Ok(())
}
