use anyhow::{Context, Result};
use fs2::FileExt;
use std::{
    fs::File,
    io::Write,
    path::Path,
    sync::Arc,
    sync::atomic::Ordering,
    sync::mpsc::RecvTimeoutError,
    time::Duration,
};

use livedisplay::args::{CliAction, ParsedArgs, display_help, display_version_info};
use livedisplay::backend::{create_backend, detect_backend};
use livedisplay::clock::SystemClock;
use livedisplay::commands;
use livedisplay::constants::*;
use livedisplay::display::{LiveDisplayService, LogNotifier, ServiceContext};
use livedisplay::logger::Log;
use livedisplay::signals::{self, SignalMessage};

const CHECK_INTERVAL: Duration = Duration::from_millis(CHECK_INTERVAL_MS);

/// Release and remove the lock file.
///
/// # Arguments
/// * `lock_file` - File handle holding the exclusive lock
/// * `lock_path` - Path to the lock file for removal
fn cleanup(lock_file: File, lock_path: &Path) {
    Log::log_decorated("Performing cleanup...");

    drop(lock_file);

    if let Err(e) = std::fs::remove_file(lock_path) {
        Log::log_decorated(&format!("Warning: Failed to remove lock file: {}", e));
    } else {
        Log::log_decorated("Lock file removed successfully");
    }

    Log::log_decorated("Cleanup complete");
}

/// Take the single-instance lock and record our PID in it.
fn acquire_lock(lock_path: &Path) -> Result<File> {
    // Don't truncate before locking or a running daemon loses its PID
    let mut lock_file = File::options()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(lock_path)
        .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;

    if lock_file.try_lock_exclusive().is_err() {
        let owner = signals::read_running_pid(lock_path)
            .map_or_else(String::new, |pid| format!(" (PID {})", pid));
        Log::log_error(&format!(
            "Another instance of livedisplay is already running{}.\n\
            • Stop it before starting a new one.",
            owner
        ));
        std::process::exit(EXIT_FAILURE);
    }

    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    lock_file.flush()?;
    Ok(lock_file)
}

fn run_daemon(debug_enabled: bool, config_path: Option<&Path>) -> Result<()> {
    Log::set_debug(debug_enabled);
    Log::log_version();

    let lock_path = signals::lock_file_path();
    let lock_file = acquire_lock(&lock_path)?;
    Log::log_decorated("Lock acquired, starting livedisplay...");

    let signal_state = signals::setup_signal_handler(debug_enabled)?;

    let (config, config_path) = commands::load_config(config_path)?;
    config.log_config(&config_path);

    let settings = commands::open_settings(&config)?;
    Log::log_block_start(&format!(
        "Settings: {}",
        livedisplay::utils::path_for_display(&settings.path())
    ));

    let backend_type = detect_backend(&config)?;
    let hardware = create_backend(backend_type, &config)?;
    Log::log_decorated(&format!("Using {} backend", backend_type.name()));

    let service = LiveDisplayService::new(
        ServiceContext {
            hardware,
            settings,
            twilight: commands::twilight_source(&config)?,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(LogNotifier),
        },
        &config,
    )?;
    service.start(true, false);

    while signal_state.running.load(Ordering::SeqCst) {
        match signal_state.signal_receiver.recv_timeout(CHECK_INTERVAL) {
            Ok(SignalMessage::Reload) => match service.reload_settings() {
                Ok(changed) => {
                    Log::log_decorated(&format!("Settings reloaded, {} changed", changed))
                }
                Err(e) => Log::log_error(&format!("Failed to reload settings: {}", e)),
            },
            Ok(SignalMessage::Shutdown) => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    Log::log_block_start("Shutting down livedisplay...");
    service.shutdown();
    cleanup(lock_file, &lock_path);
    Log::log_end();
    Ok(())
}

fn main() -> Result<()> {
    let parsed = ParsedArgs::from_env();
    let config_path = parsed.config_path.as_deref();

    match parsed.action {
        CliAction::ShowVersion => display_version_info(),
        CliAction::ShowHelp => display_help(),
        CliAction::ShowHelpDueToError => {
            display_help();
            std::process::exit(EXIT_FAILURE);
        }
        CliAction::Run { debug_enabled } => run_daemon(debug_enabled, config_path)?,
        CliAction::Status {
            debug_enabled,
            at_millis,
        } => {
            commands::status::handle_status_command(at_millis, debug_enabled, config_path)?;
        }
        CliAction::SetMode(mode) => {
            if !commands::settings::handle_set_mode(mode, config_path)? {
                std::process::exit(EXIT_FAILURE);
            }
        }
        CliAction::SetTemperature { period, kelvin } => {
            if !commands::settings::handle_set_temperature(period, kelvin, config_path)? {
                std::process::exit(EXIT_FAILURE);
            }
        }
        CliAction::Get(uri) => {
            commands::settings::handle_get(&uri, config_path)?;
        }
        CliAction::Put { uri, value } => {
            commands::settings::handle_put(&uri, &value, config_path)?;
        }
    }

    Ok(())
}
