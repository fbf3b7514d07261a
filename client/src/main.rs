//! LumeAI command-line client

mod cli;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use lumeai_lib::audio::{
    DeviceMicrophone, OutputDevice, PlaybackScheduler, TimelineConfig, list_input_devices,
    list_output_devices, open_output,
};
use lumeai_lib::network::{ChatUploadClient, WsConnector};
use lumeai_lib::session::{
    ChatRole, ConsoleSpeech, Control, SessionEvent, UploadSession, VoiceSession,
};
use lumeai_lib::state::{ClientConfig, ConfigManager, GlobalConfig, StatusBoard, StatusSnapshot};
use lumeai_lib::utils::AppError;
use lumeai_lib::utils::logging::init_logging;

use cli::{Args, Command, ConfigAction};

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    // cpal streams are not Send, so sessions run on a single-threaded runtime
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;

    runtime.block_on(run(args))
}

async fn run(args: Args) -> Result<()> {
    let path = match args.config {
        Some(path) => path,
        None => ConfigManager::config_path()?,
    };

    match args.command {
        Command::Stream { persona } => {
            let mut config = ConfigManager::load_from(&path)?;
            if let Some(persona) = persona {
                config.persona = persona;
            }
            run_stream(config).await
        }
        Command::Upload => run_upload(ConfigManager::load_from(&path)?).await,
        Command::Config { action } => run_config(action, path),
        Command::Devices => run_devices(),
    }
}

async fn run_stream(config: ClientConfig) -> Result<()> {
    let microphone =
        DeviceMicrophone::new(config.audio.input_device_id.clone(), config.audio.frame_size);
    let scheduler = PlaybackScheduler::new(open_output(), timeline_config(&config));
    let config = Arc::new(GlobalConfig::new(config));
    let status = StatusBoard::shared();

    tokio::spawn(print_status(status.subscribe()));

    let mut session = VoiceSession::new(config.clone(), status, microphone, WsConnector, scheduler);
    tokio::spawn(print_events(session.subscribe()));

    let (controls_tx, controls_rx) = mpsc::channel(16);
    tokio::spawn(read_controls(controls_tx));

    println!("{}", session.chat_header());
    println!(
        "Enter: start/stop talking | persona <{}> | q: quit",
        cli::persona_names()
    );
    if !config.get().is_ready() {
        println!("Set the AssemblyAI and Gemini keys first: lumeai config set api.assembly_key <KEY>");
    }

    session.run(controls_rx).await;
    drain_playback(session.scheduler()).await;
    Ok(())
}

async fn run_upload(config: ClientConfig) -> Result<()> {
    let client = ChatUploadClient::new(
        &config.server.base_url,
        Duration::from_secs(config.server.request_timeout_secs),
    )?;
    let microphone =
        DeviceMicrophone::new(config.audio.input_device_id.clone(), config.audio.frame_size);
    let scheduler = PlaybackScheduler::new(open_output(), timeline_config(&config));
    let config = Arc::new(GlobalConfig::new(config));
    let status = StatusBoard::shared();

    tokio::spawn(print_status(status.subscribe()));

    let mut session =
        UploadSession::new(config, status, microphone, client, scheduler, ConsoleSpeech);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Enter: start/stop recording | q: quit");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if matches!(line.trim(), "q" | "quit" | "exit") {
                    break;
                }

                if !session.is_recording() {
                    if let Err(e) = session.start_recording() {
                        report(e.into());
                    }
                    continue;
                }

                match session.finish_turn().await {
                    Ok(_) => print_last_turn(session.chat().messages()),
                    Err(e) => report(e.into()),
                }
            }
            Some(block) = session.next_frame() => session.record_frame(&block),
        }
    }

    drain_playback(session.scheduler()).await;
    Ok(())
}

fn run_config(action: ConfigAction, path: PathBuf) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let mut config = ConfigManager::load_from(&path)?;
            config.api = config.api.redacted();
            println!("{}", serde_json::to_string_pretty(&config)?);
            if let Err(e) = config.validate() {
                println!("\n{}", AppError::from(e).user_message());
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = ConfigManager::load_from(&path)?;
            config
                .set_value(&key, &value)
                .with_context(|| format!("cannot set {}", key))?;
            ConfigManager::save_to(&path, &config)?;
            println!("{} updated", key);
        }
        ConfigAction::Keys {
            assembly,
            gemini,
            murf,
            weather,
            news,
            tmdb,
        } => {
            let mut config = ConfigManager::load_from(&path)?;
            let api = &mut config.api;
            for (slot, value) in [
                (&mut api.assembly_key, assembly),
                (&mut api.gemini_key, gemini),
                (&mut api.murf_key, murf),
                (&mut api.weather_key, weather),
                (&mut api.news_key, news),
                (&mut api.tmdb_key, tmdb),
            ] {
                if let Some(value) = value {
                    *slot = value.trim().to_string();
                }
            }
            if let Err(e) = ConfigManager::save_validated_to(&path, &config) {
                eprintln!("{}", AppError::from(e).user_message());
                return Ok(());
            }
            println!("API keys saved");
        }
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Reset => {
            ConfigManager::reset_at(&path)?;
            println!("Settings reset: {}", path.display());
        }
    }
    Ok(())
}

fn run_devices() -> Result<()> {
    for (title, devices) in [
        ("Input devices", list_input_devices()),
        ("Output devices", list_output_devices()),
    ] {
        println!("{}:", title);
        match devices {
            Ok(devices) => {
                for device in devices {
                    let marker = if device.is_default { "*" } else { " " };
                    println!(" {} {} {:?}", marker, device.name, device.sample_rates);
                }
            }
            Err(e) => println!("   none ({})", e),
        }
    }
    Ok(())
}

fn timeline_config(config: &ClientConfig) -> TimelineConfig {
    TimelineConfig {
        sample_rate: config.audio.playback_sample_rate,
        jitter_secs: config.audio.jitter_secs,
        lead_secs: config.audio.schedule_lead_secs,
    }
}

async fn read_controls(controls: mpsc::Sender<Control>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let control = match lines.next_line().await {
            Ok(Some(line)) => match cli::parse_line(&line) {
                Ok(control) => control,
                Err(message) => {
                    eprintln!("{}", message);
                    continue;
                }
            },
            Ok(None) => Control::Shutdown,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read stdin");
                Control::Shutdown
            }
        };

        let quit = control == Control::Shutdown;
        if controls.send(control).await.is_err() || quit {
            break;
        }
    }
}

async fn print_status(mut snapshots: mpsc::Receiver<StatusSnapshot>) {
    while let Some(snapshot) = snapshots.recv().await {
        let prefix = if snapshot.is_error { "!" } else { "-" };
        println!(
            "{} [{}] {}",
            prefix, snapshot.connection_label, snapshot.message
        );
    }
}

async fn print_events(mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::ChatAppended { message } => {
                let who = match (message.role, message.persona_tag) {
                    (ChatRole::Assistant, Some(tag)) => format!("Assistant ({})", tag),
                    (role, _) => role.label().to_string(),
                };
                println!("{}: {}", who, message.text);
            }
            SessionEvent::SettingsRequired { reason } => {
                println!("Settings required: {}", reason);
                println!("Use `lumeai config set <key> <value>`");
            }
            SessionEvent::PersonaChanged { header, .. } => println!("{}", header),
            SessionEvent::RecordingChanged { .. }
            | SessionEvent::PartialTranscript { .. }
            | SessionEvent::ReplyFragment { .. } => {}
        }
    }
}

fn print_last_turn(messages: &[lumeai_lib::session::ChatMessage]) {
    for message in messages.iter().rev().take(2).rev() {
        println!("{}: {}", message.role.label(), message.text);
    }
}

fn report(err: AppError) {
    tracing::warn!(error = %err, "Operation failed");
    eprintln!("{}", err.user_message());
    if let Some(hint) = err.recovery_suggestion() {
        eprintln!("  {}", hint);
    }
}

/// Let already scheduled reply audio finish before the process exits
async fn drain_playback<D: OutputDevice>(scheduler: &PlaybackScheduler<D>) {
    let remaining = scheduler.remaining();
    if remaining > 0.0 {
        tokio::time::sleep(Duration::from_secs_f64(remaining.min(30.0))).await;
    }
}
