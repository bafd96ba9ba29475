// Live voice conversation from the terminal
//
// Usage: loqa-live --input mic --output speaker --voice Kore
//        loqa-live --input tests/fixtures/question.wav --output virtual --duration 30
//
// Finished turns are printed as they complete; the line below them shows whether
// the model is speaking and how loud its output is. Ctrl+C disconnects.

use anyhow::{Context, Result};
use clap::Parser;
use loqa_live::persona::TEMPLATES;
use loqa_live::{
    AudioSource, Config, GeminiConnector, OutputSink, SessionController, SystemDevices, VoiceName,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const METER_WIDTH: usize = 30;

#[derive(Parser)]
#[command(name = "loqa-live")]
#[command(about = "Hold a live spoken conversation with a remote speech model")]
struct Args {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/loqa-live")]
    config: String,

    /// Prebuilt voice for the model
    #[arg(short, long, value_enum)]
    voice: Option<VoiceName>,

    /// Persona template (assistant, doctor, support)
    #[arg(short, long)]
    template: Option<String>,

    /// System instruction, replaces the template prompt
    #[arg(long)]
    instruction: Option<String>,

    /// Audio input: "mic" or a WAV file path
    #[arg(short, long, default_value = "mic")]
    input: AudioSource,

    /// Audio output: "speaker" or "virtual"
    #[arg(short, long, default_value = "speaker")]
    output: OutputSink,

    /// Disconnect after this many seconds
    #[arg(short, long)]
    duration: Option<u64>,

    /// List voices and persona templates, then exit
    #[arg(long)]
    list_voices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    if args.list_voices {
        println!("Voices:");
        for voice in VoiceName::ALL {
            println!("  {}", voice);
        }
        println!("Persona templates:");
        for template in &TEMPLATES {
            println!("  {:<10} {}", template.key, template.name);
        }
        return Ok(());
    }

    let mut cfg = Config::load(&args.config)?;
    if args.template.is_some() {
        cfg.persona.template = args.template.clone();
    }
    if args.instruction.is_some() {
        cfg.persona.system_instruction = args.instruction.clone();
    }
    if args.voice.is_some() {
        cfg.persona.voice = args.voice;
    }

    let persona = cfg.persona()?;
    let api_key = cfg
        .api_key()
        .with_context(|| format!("Set {} to your API key", cfg.service.api_key_env))?;

    info!("Loqa Live v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!("Model: {}", cfg.service.model);
    info!("Voice: {}", persona.voice_name);

    let connector = Arc::new(GeminiConnector::new(
        cfg.service.endpoint.clone(),
        cfg.service.model.clone(),
        api_key,
    ));
    let devices = Arc::new(SystemDevices::new(args.input.clone(), args.output));
    let controller = SessionController::new(cfg.session_config(), connector, devices);

    controller
        .connect(&persona)
        .await
        .context("Failed to start live session")?;

    info!("Connected! Start talking, press Ctrl+C to stop");

    let mut snapshots = controller.subscribe();
    let mut printed = 0;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                println!();
                info!("Interrupted, disconnecting...");
                break;
            }
            _ = &mut deadline => {
                println!();
                info!("Time is up, disconnecting...");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }

                let snapshot = snapshots.borrow_and_update().clone();

                if snapshot.turns > printed {
                    let turns = controller.transcripts().await;
                    for turn in turns.iter().skip(printed) {
                        println!("\r{:<width$}\r{:>5}: {}", "", turn.sender.to_string(), turn.text, width = METER_WIDTH + 12);
                    }
                    printed = turns.len();
                }

                if !snapshot.is_connected() {
                    println!();
                    if let Some(err) = &snapshot.error {
                        error!("{}", err);
                    } else {
                        info!("Session ended");
                    }
                    break;
                }

                let bars = (snapshot.volume * METER_WIDTH as f32).round() as usize;
                print!(
                    "\r{} [{:<width$}]",
                    if snapshot.is_speaking { "speaking " } else { "listening" },
                    "#".repeat(bars.min(METER_WIDTH)),
                    width = METER_WIDTH
                );
                std::io::stdout().flush().ok();
            }
        }
    }

    let stats = controller.disconnect().await;

    info!("Session complete!");
    if let Some(id) = &stats.session_id {
        info!("Session: {}", id);
    }
    info!("Duration: {:.1} seconds", stats.duration_secs);
    info!("Frames sent: {}", stats.frames_sent);
    info!("Buffers played: {}", stats.buffers_scheduled);
    info!("Interruptions: {}", stats.interruptions);
    info!("Turns: {}", stats.turns);

    Ok(())
}
