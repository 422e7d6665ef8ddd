use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use relay_console::config::Overrides;
use relay_console::voice::{
    AudioPlayback, CaptureEvent, CaptureSource, DecodedAudio, MutePlayback, PlaybackSink,
    SpeechPlayback, SpeechRecognizer,
};
use relay_console::{
    Components, Config, HttpInferenceClient, TurnOrchestrator, WsConnector, console,
};

/// Relay Console - talk to your relay by voice or keyboard
#[derive(Parser)]
#[command(name = "relay-console", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/relay-console/config.toml)
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable voice input and output (typed input only)
    #[arg(long)]
    disable_voice: bool,

    /// Reasoning backend URL
    #[arg(long)]
    inference_url: Option<String>,

    /// Relay command channel URL
    #[arg(long)]
    command_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Capture one phrase and print the transcript
    TestMic,
    /// Play a test tone
    TestSpeaker,
    /// Speak a line with the configured voice
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the relay console voice.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,relay_console=info",
        1 => "info,relay_console=debug",
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

async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = Overrides {
        config_path: cli.config,
        disable_voice: cli.disable_voice,
        inference_url: cli.inference_url,
        command_url: cli.command_url,
    };
    let config = Config::load(&overrides)?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic => test_mic(&config).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(&config, &text).await,
        };
    }

    tracing::info!(
        inference = %config.inference_url,
        relay = %config.command_url,
        voice = config.voice.enabled,
        "starting relay console"
    );

    let components = build_components(&config)?;
    let (orchestrator, handle) = TurnOrchestrator::new(components, config.session);
    let session = tokio::spawn(orchestrator.run());

    tokio::select! {
        result = console::run(handle.clone()) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted"),
    }

    handle.shutdown();
    session.await?;
    Ok(())
}

fn build_components(config: &Config) -> anyhow::Result<Components> {
    let inference = Arc::new(HttpInferenceClient::new(
        config.inference_url.clone(),
        config.inference_timeout,
    )?);
    let connector = Arc::new(WsConnector::new(config.command_url.clone()));

    if !config.voice.enabled {
        tracing::info!("voice disabled, typed input only");
        return Ok(Components {
            capture: None,
            inference,
            playback: Arc::new(MutePlayback),
            connector,
        });
    }

    let capture: Option<Box<dyn CaptureSource>> = match config
        .transcriber()
        .and_then(|t| SpeechRecognizer::new(t, config.voice.leading_silence))
    {
        Ok(recognizer) => Some(Box::new(recognizer)),
        Err(e) => {
            tracing::warn!(error = %e, "voice input disabled");
            None
        }
    };

    let playback: Arc<dyn PlaybackSink> = match config.synthesizer() {
        Ok(synthesizer) => Arc::new(SpeechPlayback::spawn(
            synthesizer,
            config.voice.preference.clone(),
        )),
        Err(e) => {
            tracing::warn!(error = %e, "voice output disabled");
            Arc::new(MutePlayback)
        }
    };

    Ok(Components {
        capture,
        inference,
        playback,
        connector,
    })
}

/// Capture and transcribe one phrase
async fn test_mic(config: &Config) -> anyhow::Result<()> {
    let mut recognizer = SpeechRecognizer::new(config.transcriber()?, config.voice.leading_silence)?;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    recognizer.start(tx)?;
    println!("Say something (language {})...", config.voice.language);

    match rx.recv().await {
        Some(CaptureEvent::Utterance(utterance)) => println!("Heard: {}", utterance.text()),
        Some(CaptureEvent::Ended(None)) => println!("No speech detected."),
        Some(CaptureEvent::Ended(Some(e))) => return Err(e.into()),
        None => println!("Capture stopped."),
    }

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("You should hear a 440Hz tone for 2 seconds");

    let sample_rate = 24_000_u32;
    let frequency = 440.0_f32;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    let audio = DecodedAudio {
        samples,
        sample_rate,
    };
    tokio::task::spawn_blocking(move || AudioPlayback::play(&audio)).await??;

    println!("Done.");
    Ok(())
}

/// Speak a line the way replies are spoken
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    let playback = SpeechPlayback::spawn(config.synthesizer()?, config.voice.preference.clone());

    println!(
        "Speaking with {:?} (preference \"{}\")...",
        config.voice.tts_provider, config.voice.preference
    );
    playback.speak_and_wait(text).await?;

    println!("Done.");
    Ok(())
}
