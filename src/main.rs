//! StageRunner client
//!
//! Beamer viewer, operator console and control-state watcher for the
//! StageRunner live presentation system.

mod api;
mod config;
mod crash;
mod data;
mod logging;
mod projection;
mod sync;
mod ui;

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use std::io::BufRead;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use api::{Command, HttpStageApi};
use config::Config;
use data::{ConfigId, ControlState};
use logging::LogRole;
use projection::Key;
use sync::{
    create_engine_channels, CommandConsole, ControlPoller, Offer, ViewerCommand, ViewerEngine,
    ViewerTarget,
};
use ui::TerminalSink;

/// Parsed command line
#[derive(Debug, PartialEq)]
enum Cli {
    Viewer { target: Option<ViewerTarget> },
    Console { config_id: ConfigId, command: Vec<String> },
    Watch { config_id: ConfigId },
}

impl Cli {
    fn log_role(&self) -> LogRole {
        match self {
            Self::Viewer { .. } => LogRole::Viewer,
            Self::Console { .. } => LogRole::Console,
            Self::Watch { .. } => LogRole::Watch,
        }
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!();
            print_help();
            std::process::exit(2);
        }
    };

    let _log_guard = logging::init_logging(cli.log_role())?;
    match logging::get_log_dir() {
        Ok(log_dir) => {
            if let Err(e) = crash::init_crash_handler(&log_dir) {
                warn!("Failed to set up crash log: {}", e);
            }
        }
        Err(e) => warn!("No log directory for crash reports: {}", e),
    }

    info!("StageRunner {} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("Configuration loaded from {:?}", config.config_path()?);

    let api = Arc::new(HttpStageApi::new(&config)?);
    info!("Using backend {}", api.base_url());

    let runtime = Arc::new(tokio::runtime::Runtime::new()?);

    let result = match cli {
        Cli::Viewer { target } => run_viewer(runtime, api, &config, target),
        Cli::Console { config_id, command } => {
            runtime.block_on(run_console(api, &config, config_id, command))
        }
        Cli::Watch { config_id } => runtime.block_on(run_watch(api, &config, config_id)),
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    info!("Shutdown complete");
    result
}

fn parse_args(args: &[String]) -> Result<Cli> {
    let Some((subcommand, rest)) = args.split_first() else {
        bail!("missing subcommand");
    };

    let mut config_id = None;
    let mut edition_id = None;
    let mut positional = Vec::new();
    let mut iter = rest.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let value = iter.next().context("--config needs a value")?;
                config_id = Some(value.parse().with_context(|| format!("invalid config id '{}'", value))?);
            }
            "--edition" | "-e" => {
                let value = iter.next().context("--edition needs a value")?;
                edition_id = Some(value.parse().with_context(|| format!("invalid edition id '{}'", value))?);
            }
            _ => positional.push(arg.clone()),
        }
    }

    match subcommand.as_str() {
        "viewer" => {
            if !positional.is_empty() {
                bail!("unexpected argument '{}'", positional[0]);
            }
            let target = match (config_id, edition_id) {
                (Some(_), Some(_)) => bail!("use either --config or --edition, not both"),
                (Some(id), None) => Some(ViewerTarget::Config(id)),
                (None, Some(id)) => Some(ViewerTarget::Edition(id)),
                (None, None) => None,
            };
            Ok(Cli::Viewer { target })
        }
        "console" => Ok(Cli::Console {
            config_id: config_id.context("console needs --config ID")?,
            command: positional,
        }),
        "watch" => {
            if !positional.is_empty() {
                bail!("unexpected argument '{}'", positional[0]);
            }
            Ok(Cli::Watch {
                config_id: config_id.context("watch needs --config ID")?,
            })
        }
        other => bail!("unknown subcommand '{}'", other),
    }
}

fn run_viewer(
    runtime: Arc<tokio::runtime::Runtime>,
    api: Arc<HttpStageApi>,
    config: &Config,
    target: Option<ViewerTarget>,
) -> Result<()> {
    let target = match target {
        Some(target) => target,
        None => match (config.viewer.config_id, config.viewer.edition_id) {
            (Some(id), _) => ViewerTarget::Config(id),
            (None, Some(id)) => ViewerTarget::Edition(id),
            (None, None) => bail!(
                "No configuration selected: pass --config or --edition, or set [viewer] config_id"
            ),
        },
    };

    let (cmd_tx, cmd_rx, status_tx, mut status_rx) = create_engine_channels();

    let mut engine = ViewerEngine::new(
        api,
        TerminalSink::new(true),
        target,
        config.viewer_poll_interval(),
        config.viewer.auto_advance,
        cmd_rx,
        status_tx,
    );

    // Ctrl+C sends a shutdown command to the engine
    let ctrl_c_tx = cmd_tx.clone();
    let ctrl_c_runtime = runtime.clone();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, shutting down...");
        let tx = ctrl_c_tx.clone();
        ctrl_c_runtime.spawn(async move {
            let _ = tx.send(ViewerCommand::Shutdown).await;
        });
    })?;

    // Keyboard input, one key per line
    let key_tx = cmd_tx.clone();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match Key::parse(&line) {
                Some(key) => {
                    if key_tx.blocking_send(ViewerCommand::Key(key)).is_err() {
                        break;
                    }
                }
                None => debug!("Ignoring unknown key '{}'", line.trim()),
            }
        }
    });

    runtime.spawn(async move {
        while let Ok(status) = status_rx.recv().await {
            debug!("Viewer status: {:?}", status);
        }
    });

    runtime.block_on(engine.run())
}

async fn run_console(
    api: Arc<HttpStageApi>,
    config: &Config,
    config_id: ConfigId,
    command: Vec<String>,
) -> Result<()> {
    let console = Arc::new(CommandConsole::new(api.clone()));
    console
        .load(config_id)
        .await
        .with_context(|| format!("Failed to load config {}", config_id))?;

    // One-shot mode
    if !command.is_empty() {
        let tokens: Vec<&str> = command.iter().map(String::as_str).collect();
        execute(&console, &tokens).await?;
        println!("{}", console.summary());
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    ctrlc::set_handler(move || ctrl_c.cancel())?;

    let (poller, handle) = ControlPoller::new(api, Some(config_id), config.console_poll_interval());
    tokio::spawn(poller.run());

    let mut updates = handle.updates();
    let polled = console.clone();
    tokio::spawn(async move {
        while let Some(update) = updates.next().await {
            if let Some(state) = update {
                if polled.apply_poll(state) == Offer::Changed {
                    println!("{}", polled.summary());
                }
            }
        }
    });

    println!("{}", console.summary());
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Ctrl+C received, shutting down...");
                break;
            }

            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                let tokens: Vec<&str> = line.split_whitespace().collect();
                match tokens.first().copied() {
                    None => {}
                    Some("quit") | Some("exit") | Some("q") => break,
                    Some("status") => println!("{}", console.summary()),
                    Some("help") => print_console_help(),
                    Some(_) => {
                        // Failures are reported and recorded; the console keeps going
                        if let Err(e) = execute(&console, &tokens).await {
                            println!("error: {:#}", e);
                        }
                        println!("{}", console.summary());
                    }
                }
            }
        }
    }

    handle.shutdown();
    Ok(())
}

/// Run one operator command line against the console
async fn execute(console: &CommandConsole<HttpStageApi>, tokens: &[&str]) -> Result<()> {
    let outcome = match tokens {
        ["next-production"] | ["np"] => console.next_production().await?,
        ["prev-production"] | ["pp"] => console.previous_production().await?,
        ["production", index] => {
            let index = index
                .parse()
                .with_context(|| format!("invalid production index '{}'", index))?;
            console.go_to_production(index).await?
        }
        ["reveal-all"] => Some(console.reveal_all().await?),
        _ => {
            let command = Command::parse(tokens)?;
            Some(console.send_command(command).await?)
        }
    };

    if outcome.is_none() {
        println!("nothing to do");
    }
    Ok(())
}

async fn run_watch(api: Arc<HttpStageApi>, config: &Config, config_id: ConfigId) -> Result<()> {
    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    ctrlc::set_handler(move || ctrl_c.cancel())?;

    let (poller, handle) = ControlPoller::new(api, Some(config_id), config.viewer_poll_interval());
    let poller_task = tokio::spawn(poller.run());
    let mut updates = handle.updates();

    info!("Watching control state of config {}", config_id);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Ctrl+C received, shutting down...");
                break;
            }

            update = updates.next() => {
                match update {
                    Some(Some(state)) => println!("{}", describe(&state)),
                    Some(None) => {}
                    None => break,
                }
            }
        }
    }

    handle.shutdown();
    let _ = poller_task.await;
    Ok(())
}

/// One-line rendering of a control state for the watcher
fn describe(state: &ControlState) -> String {
    format!(
        "{} slide={} production={} revealed={} playing={} command={}",
        state.command_timestamp.to_rfc3339(),
        state.current_slide_index,
        state.current_production_index,
        state.revealed_positions,
        state.is_playing,
        if state.command.is_empty() { "-" } else { &state.command }
    )
}

fn print_help() {
    println!("StageRunner - live presentation viewer and remote control");
    println!();
    println!("USAGE:");
    println!("    stagerunner viewer [--config ID | --edition ID]");
    println!("    stagerunner console --config ID [COMMAND ...]");
    println!("    stagerunner watch --config ID");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config ID     StageRunner configuration id");
    println!("    -e, --edition ID    Edition id (viewer only, looks up its configuration)");
    println!("    -h, --help          Print this help message");
    println!();
    println!("VIEWER KEYS (type and press Enter):");
    println!("    <Enter>, n, right   Next production or slide");
    println!("    p, left             Previous production or slide");
    println!("    home, end, esc      First / last / first slide");
    println!("    1-9                 Jump to slide");
    println!("    f                   Toggle fullscreen");
    println!("    q                   Quit");
    println!();
    print_console_help();
    println!();
    println!("ENVIRONMENT:");
    println!("    STAGERUNNER_API_URL   Backend base URL (overrides the config file)");
    println!("    STAGERUNNER_LOG_PATH  Log directory");
    println!("    STAGERUNNER_STDERR_LEVEL  Log level shown on stderr (viewer/console: warn, watch: info)");
    println!("    RUST_LOG              Log file level (e.g., debug, info, warn)");
}

fn print_console_help() {
    println!("CONSOLE COMMANDS:");
    println!("    next, prev                   Next / previous slide");
    println!("    play                         Toggle production auto-advance");
    println!("    goto SLIDE_ID [INDEX]        Navigate to a slide");
    println!("    reveal, reset-reveal         Reveal the next result / hide all results");
    println!("    reveal-all [COUNT]           Reveal every result");
    println!("    np, pp, production INDEX     Next / previous / specific production");
    println!("    presentation ID|none         Switch the active presentation");
    println!("    countdown RFC3339|none       Set the countdown target");
    println!("    status, help, quit");
}
