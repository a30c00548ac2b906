use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use voice_onboarding::session::PlaybackTarget;
use voice_onboarding::{AgentEvent, AudioSource, Config, Speaker, TranscriptEntry, VoiceAgent};

#[derive(Parser, Debug)]
#[command(
    name = "voice-onboarding",
    version,
    about = "Voice onboarding call with Maya over the Gemini Live API"
)]
struct Args {
    /// Config file (extension optional)
    #[arg(long, default_value = "config/voice-onboarding")]
    config: String,

    /// Capture from a 16kHz WAV file instead of the microphone
    #[arg(long)]
    wav: Option<PathBuf>,

    /// Discard the agent's speech instead of playing it
    #[arg(long)]
    no_playback: bool,

    /// Connect immediately on startup
    #[arg(long)]
    auto_connect: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.service.log_level)),
        )
        .init();

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let source = match args.wav {
        Some(path) => AudioSource::File(path),
        None => AudioSource::Microphone,
    };
    let mut session_config = cfg.session_config(source);
    if args.no_playback {
        session_config.playback = PlaybackTarget::Virtual;
    }
    info!(
        "Model {} with voice {}, capture {:?}",
        session_config.model, session_config.voice_name, session_config.audio_source
    );

    let agent = VoiceAgent::new(session_config);

    let mut events = agent.events();
    let printer = tokio::spawn(async move {
        let mut printed = 0;
        loop {
            match events.recv().await {
                Ok(AgentEvent::TranscriptUpdated(entries)) => {
                    printed = print_final_entries(&entries, printed);
                }
                Ok(AgentEvent::StatusChanged(status)) => println!("[{}]", status),
                Ok(AgentEvent::StageChanged(stage)) => println!("== Stage {} ==", stage),
                Ok(AgentEvent::ConnectionChanged(connected)) => {
                    println!("{}", if connected { "Connected" } else { "Disconnected" })
                }
                Ok(AgentEvent::Error(message)) => eprintln!("Error: {}", message),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Missed {} agent events", missed)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    if args.auto_connect {
        if let Err(e) = agent.connect().await {
            error!("Connect failed: {}", e);
        }
    }

    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                None
            }
        };
        let Some(line) = line else {
            break;
        };

        match line.trim() {
            "connect" | "c" => {
                if let Err(e) = agent.connect().await {
                    error!("Connect failed: {}", e);
                }
            }
            "disconnect" | "d" => agent.disconnect().await?,
            "next" | "n" => {
                agent.next_stage().await?;
            }
            "prev" | "p" => {
                agent.prev_stage().await?;
            }
            "status" | "s" => {
                let snapshot = agent.snapshot();
                let stats = agent.stats().await?;
                println!(
                    "{} | stage {} | [{}]",
                    snapshot.status,
                    snapshot.stage,
                    snapshot.button_label()
                );
                println!(
                    "frames sent {} (dropped {}), chunks played {} (rejected {}), {} transcript entries",
                    stats.frames_sent,
                    stats.frames_dropped,
                    stats.chunks_scheduled,
                    stats.chunks_rejected,
                    stats.transcript_entries
                );
                if let Some(last_error) = snapshot.last_error {
                    println!("last error: {}", last_error);
                }
            }
            "help" | "h" | "?" => print_help(),
            "quit" | "q" | "exit" => break,
            "" => {}
            other => println!("Unknown command: {} (try help)", other),
        }
    }

    agent.shutdown().await?;
    printer.abort();

    Ok(())
}

/// Print entries that became final since `printed`; returns the new count
fn print_final_entries(entries: &[TranscriptEntry], mut printed: usize) -> usize {
    if entries.len() < printed {
        // Log was cleared by a new connect
        printed = 0;
    }
    for entry in entries.iter().skip(printed) {
        if !entry.is_final {
            break;
        }
        let who = match entry.speaker {
            Speaker::User => "You",
            Speaker::Agent => "Maya",
        };
        println!("{}: {}", who, entry.text.trim());
        printed += 1;
    }
    printed
}

fn print_help() {
    println!("Commands: connect, disconnect, next, prev, status, help, quit");
}
