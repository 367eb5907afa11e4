// UnrealLoads - Load remover and auto splitter for Unreal Engine 1 games
// Main entry point: prints timing commands on stdout, one per line

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use unrealloads::settings::DEFAULT_SETTINGS_FILE;
use unrealloads::{Registry, Settings, Splitter};

#[derive(Parser)]
#[command(name = "unrealloads")]
#[command(about = "Load remover and auto splitter for Unreal Engine 1 games")]
struct Args {
    /// Settings file (created with defaults by --save-settings)
    #[arg(short, long, default_value = DEFAULT_SETTINGS_FILE)]
    settings: PathBuf,

    /// Profile to use regardless of the process name
    #[arg(short, long)]
    game: Option<String>,

    /// Polling period in milliseconds
    #[arg(long, default_value_t = 15)]
    interval_ms: u64,

    /// List the supported games and exit
    #[arg(long)]
    list_games: bool,

    /// Write the effective settings back to the settings file and exit
    #[arg(long)]
    save_settings: bool,
}

fn main() -> Result<()> {
    // Logs go to stderr, stdout carries only commands
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("unrealloads=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let registry = Registry::builtin()?;

    if args.list_games {
        for profile in registry.profiles() {
            println!("{}\t{}", profile.title, profile.process_names.join(", "));
        }
        return Ok(());
    }

    let mut settings = match Settings::load(&args.settings) {
        Ok(s) => s,
        Err(e) => {
            warn!("Failed to load settings: {}, using defaults", e);
            Settings::default()
        }
    };
    if let Some(game) = args.game {
        settings.game = Some(game);
    }
    if let Some(game) = &settings.game {
        match registry.find_by_name(game) {
            None => anyhow::bail!("Unknown game {:?}, see --list-games", game),
            Some(profile) if registry.find_exact_name(game).is_none() => {
                warn!("Game {:?} partially matches profile {}", game, profile.title);
            }
            Some(_) => {}
        }
    }

    if args.save_settings {
        settings.save(&args.settings)?;
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_ctrlc = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, stopping...");
        shutdown_ctrlc.store(true, Ordering::SeqCst);
    })?;

    let splitter = Splitter::new(registry, settings);
    host::run(splitter, &shutdown, Duration::from_millis(args.interval_ms.max(1)))
}

#[cfg(windows)]
mod host {
    use anyhow::Result;
    use std::collections::HashSet;
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;
    use tracing::{debug, info, warn};
    use unrealloads::memory::Process;
    use unrealloads::platform::{elevation, ProcessInfo};
    use unrealloads::{Error, Splitter, Tick};

    const ATTACH_RETRY: Duration = Duration::from_secs(1);

    /// Waits for a game, tracks it until it exits, and starts over until shutdown
    pub fn run(mut splitter: Splitter, shutdown: &AtomicBool, interval: Duration) -> Result<()> {
        if let Ok(false) = elevation::is_elevated() {
            debug!("Not running elevated, games started as administrator cannot be attached");
        }

        // Attach failures are reported once per process instance
        let mut reported: HashSet<u32> = HashSet::new();
        info!("Waiting for a game process...");

        while !shutdown.load(Ordering::SeqCst) {
            if let Some(info) = find_game(&splitter)? {
                match attach(&mut splitter, &info) {
                    Ok(process) => {
                        reported.clear();
                        track(&mut splitter, &process, shutdown, interval)?;
                        info!("Waiting for a game process...");
                    }
                    Err(e) => {
                        if reported.insert(info.pid) {
                            warn!("{}", e);
                        }
                    }
                }
            }
            thread::sleep(ATTACH_RETRY);
        }

        Ok(())
    }

    fn find_game(splitter: &Splitter) -> Result<Option<ProcessInfo>> {
        let processes = Process::list_all()?;
        Ok(processes.into_iter().find(|p| splitter.is_game_process(&p.name)))
    }

    fn attach(splitter: &mut Splitter, info: &ProcessInfo) -> unrealloads::Result<Process> {
        let attach_failure = |e: anyhow::Error| Error::AttachFailure {
            process: info.name.clone(),
            reason: e.to_string(),
        };

        let process = Process::from_info(info).map_err(attach_failure)?;
        let modules = process.modules().map_err(attach_failure)?;
        splitter.on_process_attached(&process, &info.name, &modules)?;
        Ok(process)
    }

    fn track(
        splitter: &mut Splitter,
        process: &Process,
        shutdown: &AtomicBool,
        interval: Duration,
    ) -> Result<()> {
        let stdout = std::io::stdout();

        while !shutdown.load(Ordering::SeqCst) {
            match splitter.on_tick(process) {
                Tick::Commands(commands) => {
                    if !commands.is_empty() {
                        let mut out = stdout.lock();
                        for command in commands {
                            writeln!(out, "{}", command)?;
                        }
                        out.flush()?;
                    }
                }
                Tick::Detached => return Ok(()),
            }
            thread::sleep(interval);
        }

        splitter.on_process_detached(process);
        Ok(())
    }
}

#[cfg(not(windows))]
mod host {
    use anyhow::Result;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use unrealloads::Splitter;

    pub fn run(_splitter: Splitter, _shutdown: &AtomicBool, _interval: Duration) -> Result<()> {
        anyhow::bail!("Attaching to a game process is only supported on Windows")
    }
}
