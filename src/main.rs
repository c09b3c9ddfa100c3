use std::path::PathBuf;

use clap::Parser;
use dbgdriver::{CommandKind, DebuggerSession, DriverConfig, NotificationHandler, PromptConfig, QueueMode};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Line-oriented front end for a command-line debugger
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Mirror the debugger conversation into this file
    #[arg(short, long)]
    transcript: Option<PathBuf>,

    /// Regular expression matching the debugger prompt
    #[arg(short, long)]
    prompt: Option<String>,

    /// Trace the driver's traffic
    #[arg(short, long)]
    verbose: bool,

    /// Debugger command line, replacing the configured one
    #[arg(last = true)]
    debugger: Vec<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let driver_level = if args.verbose {
        log::LevelFilter::Trace
    } else {
        log::LevelFilter::Info
    };
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .with_module_level("dbgdriver", driver_level)
        .with_module_level("debugdrive", log::LevelFilter::Info)
        .init()
        .unwrap();

    log::info!("debugdrive starting...");
    dbgdriver::process::install_signal_protection();

    let exit_code = match run(args).await {
        Ok(()) => 0,
        Err(e) => {
            log::error!("{}", e);
            1
        }
    };

    log::info!("debugdrive exited with code {exit_code}");
    std::process::exit(exit_code);
}

async fn run(args: Args) -> dbgdriver::Result<()> {
    let mut config = match &args.config {
        Some(path) => DriverConfig::load(path)?,
        None => DriverConfig::default(),
    };
    if let Some(path) = args.transcript {
        config.transcript = Some(path);
    }
    if let Some(regex) = args.prompt {
        config.prompt = PromptConfig::Pattern { regex };
    }

    let (session, notifications) = DebuggerSession::new(config)?;

    let mut handler = NotificationHandler::new(notifications);
    handler.on_command_completed(|_cmd, output| print!("{}", output));
    handler.on_inferior_running(|| log::info!("program is running"));
    handler.on_idle(|| log::debug!("debugger is idle"));
    let notifier = tokio::spawn(async move { handler.run().await });

    let command_line = args.debugger.join(" ");
    session.startup(Some(&command_line)).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::error!("failed to read input: {}", e);
                break;
            }
        };

        match line.strip_prefix('!') {
            Some(urgent) => {
                let text = format!("{}\n", urgent.trim_start());
                session
                    .enqueue_urgent(CommandKind::from_command_text(&text), &text, true)
                    .await?;
            }
            None => {
                let text = format!("{}\n", line);
                session
                    .enqueue_normal(CommandKind::from_command_text(&text), &text, QueueMode::Merge)
                    .await?;
            }
        }
    }

    session.shutdown().await?;
    drop(session);
    if let Err(e) = notifier.await {
        log::warn!("notification task failed: {}", e);
    }
    Ok(())
}
