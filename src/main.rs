use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use voice_shell::{
    Activation, BackendClient, ChatBackend, ChatDispatcher, ChatHistory, ChatSender, Config,
    ConsoleEngine, HistoryEvent, LISTENING_PLACEHOLDER, SpeechEngine, Trigger,
    VoiceModeController, WakeWordChannel, WsTransport,
};

/// Voice shell - terminal client for a voice assistant backend
#[derive(Parser)]
#[command(name = "voice-shell", version, about)]
struct Cli {
    /// Enable voice mode (wake word listening) on start
    #[arg(long)]
    voice: bool,

    /// Run without a speech capture engine
    #[arg(long)]
    no_mic: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Show backend and wake word status
    Status,
    /// Send one chat message and print the reply
    Chat {
        /// Message text
        text: String,
        /// Ask the backend to speak the reply
        #[arg(long)]
        speak: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn,voice_shell=info",
        1 => "info,voice_shell=debug",
        2 => "debug",
        _ => "trace",
    };

    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load().context("failed to load configuration")?;
    if cli.voice {
        config.voice.enabled_on_start = true;
    }
    tracing::debug!(?config, "loaded configuration");

    let client = Arc::new(BackendClient::from_config(&config.backend)?);

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Status => cmd_status(&client).await,
            Command::Chat { text, speak } => cmd_chat(&config, client, &text, speak).await,
        };
    }

    run_shell(config, client, cli.no_mic).await
}

/// Print backend and wake word status
async fn cmd_status(client: &BackendClient) -> anyhow::Result<()> {
    println!("Backend: {}", client.base_url());

    match client.status().await {
        Ok(status) => println!("Status: {}", serde_json::to_string_pretty(&status)?),
        Err(e) => println!("Status: unreachable ({e})"),
    }

    match client.wake_word_status().await {
        Ok(status) => {
            let state = if status.active { "active" } else { "inactive" };
            match status.keyword {
                Some(keyword) => println!("Wake word: {state} (\"{keyword}\")"),
                None => println!("Wake word: {state}"),
            }
        }
        Err(e) => println!("Wake word: unknown ({e})"),
    }

    Ok(())
}

/// Send one message through the dispatcher and print the exchange
async fn cmd_chat(
    config: &Config,
    client: Arc<BackendClient>,
    text: &str,
    speak: bool,
) -> anyhow::Result<()> {
    let history = ChatHistory::new();
    let dispatcher = ChatDispatcher::new(client, history.clone(), config.chat.error_message.clone());

    dispatcher.send(text, speak).await;

    for entry in history.snapshot() {
        println!("{}: {}", entry.sender, entry.text);
    }

    Ok(())
}

const HELP: &str = "\
Commands:
  /mic                 start a voice capture (type the utterance, blank line for silence, /cancel to abort)
  /voice on|off|toggle switch wake word listening
  /history             print the conversation
  /help                show this help
  /quit                exit
Anything else is sent as a chat message.";

/// Interactive shell
async fn run_shell(config: Config, client: Arc<BackendClient>, no_mic: bool) -> anyhow::Result<()> {
    let history = ChatHistory::new();
    let dispatcher = ChatDispatcher::new(
        Arc::clone(&client) as Arc<dyn ChatBackend>,
        history.clone(),
        config.chat.error_message.clone(),
    );

    let transport = Arc::new(WsTransport::new(config.backend.wake_word_url.clone()));
    let channel = WakeWordChannel::new(client, transport, config.voice.reconnect.clone());

    let console = Arc::new(ConsoleEngine::new());
    let mut builder = VoiceModeController::builder(channel, dispatcher)
        .capture(config.voice.capture.clone())
        .speak_flag(config.voice.speak_flag);
    if !no_mic {
        builder = builder.engine(Arc::clone(&console) as Arc<dyn SpeechEngine>);
    }
    let controller = builder.build();

    let printer = tokio::spawn(print_history(history.subscribe()));

    println!("Voice shell connected to {}", config.backend.api_url);
    println!("{HELP}");

    if config.voice.enabled_on_start {
        set_voice(&controller, true).await;
    }

    let typed = controller.text_input();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if console.feed_line(&line) {
            continue;
        }

        let line = line.trim();
        match line.split_once(' ').map_or((line, ""), |(cmd, arg)| (cmd, arg.trim())) {
            ("", _) => {}
            ("/quit" | "/exit", _) => break,
            ("/help", _) => println!("{HELP}"),
            ("/mic", _) => match controller.activate(Trigger::Manual) {
                Activation::AlreadyActive => println!("(already listening)"),
                Activation::Started(_) | Activation::Unsupported => {}
            },
            ("/voice", arg) => match arg {
                "on" => set_voice(&controller, true).await,
                "off" => set_voice(&controller, false).await,
                "" | "toggle" => set_voice(&controller, !controller.is_enabled()).await,
                other => println!("unknown /voice argument: {other}"),
            },
            ("/history", _) => {
                for entry in controller.history().snapshot() {
                    println!("[{}] {}: {}", entry.at.format("%H:%M:%S"), entry.sender, entry.text);
                }
            }
            _ if line.starts_with('/') => println!("unknown command: {line} (try /help)"),
            _ => {
                if typed.send(line.to_string()).is_err() {
                    tracing::warn!("text input worker stopped");
                }
            }
        }
    }

    controller.set_enabled(false).await?;
    printer.abort();

    Ok(())
}

async fn set_voice(controller: &VoiceModeController, enabled: bool) {
    match controller.set_enabled(enabled).await {
        Ok(()) if enabled => println!("Voice mode on: listening for the wake word"),
        Ok(()) => println!("Voice mode off"),
        Err(e) => println!("Could not enable voice mode: {e}"),
    }
}

/// Echo history appends to the terminal
async fn print_history(mut events: broadcast::Receiver<HistoryEvent>) {
    loop {
        match events.recv().await {
            Ok(HistoryEvent::Appended(entry)) => match entry.sender {
                ChatSender::User => println!("> {}", entry.text),
                ChatSender::Assistant if entry.text == LISTENING_PLACEHOLDER => {
                    println!("{}", entry.text);
                }
                ChatSender::Assistant => println!("< {}", entry.text),
            },
            Ok(HistoryEvent::Removed(_)) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "history printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
