//! Signal handling and inter-process communication for livedisplay.
//!
//! A running daemon listens for SIGUSR2 to re-read the settings file that
//! the offline commands wrote to, and for the usual termination signals.
//! The daemon's PID lives in its lock file so other invocations can find it.

use anyhow::{Context, Result};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use signal_hook::{
    consts::signal::{SIGHUP, SIGINT, SIGTERM, SIGUSR2},
    iterator::Signals,
};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, channel};
use std::{
    sync::Arc,
    sync::atomic::{AtomicBool, Ordering},
    thread,
};

use crate::constants::LOCK_FILE_NAME;
use crate::logger::Log;

/// Unified signal message type for all signal-based communication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalMessage {
    /// Re-read the settings file (SIGUSR2)
    Reload,
    /// Shutdown signal (SIGTERM, SIGINT, SIGHUP)
    Shutdown,
}

/// Signal handling state shared between threads
pub struct SignalState {
    /// Atomic flag indicating if the application should keep running
    pub running: Arc<AtomicBool>,
    /// Channel receiver for unified signal messages
    pub signal_receiver: Receiver<SignalMessage>,
}

/// Map a raw signal number to the message it produces.
pub fn message_for_signal(signal: i32) -> Option<SignalMessage> {
    match signal {
        SIGUSR2 => Some(SignalMessage::Reload),
        SIGINT | SIGTERM | SIGHUP => Some(SignalMessage::Shutdown),
        _ => None,
    }
}

/// Set up signal handling for the application.
///
/// Spawns a background thread that forwards signals as [`SignalMessage`]s.
/// Shutdown signals also clear the running flag.
pub fn setup_signal_handler(debug_enabled: bool) -> Result<SignalState> {
    let running = Arc::new(AtomicBool::new(true));
    let (signal_sender, signal_receiver) = channel::<SignalMessage>();

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP, SIGUSR2])
        .context("failed to register signal handlers")?;

    let running_clone = running.clone();

    thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            for sig in signals.forever() {
                let Some(message) = message_for_signal(sig) else {
                    continue;
                };

                match message {
                    SignalMessage::Reload => {
                        Log::log_pipe();
                        Log::log_decorated("Received settings reload signal");
                    }
                    SignalMessage::Shutdown => {
                        let user_message = match sig {
                            SIGINT if debug_enabled => {
                                "Received SIGINT (Ctrl+C), initiating graceful shutdown..."
                            }
                            SIGINT => "Received interrupt signal, initiating graceful shutdown...",
                            SIGTERM => "Received termination request, initiating graceful shutdown...",
                            _ => "Received hangup signal, initiating graceful shutdown...",
                        };
                        Log::log_pipe();
                        Log::log_decorated(user_message);
                        running_clone.store(false, Ordering::SeqCst);
                    }
                }

                if signal_sender.send(message).is_err() {
                    // Main loop is gone
                    break;
                }
            }
        })
        .context("failed to spawn signal handler thread")?;

    Ok(SignalState {
        running,
        signal_receiver,
    })
}

/// Location of the single-instance lock file.
///
/// Uses `$XDG_RUNTIME_DIR`, falling back to `/tmp`.
pub fn lock_file_path() -> PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .ok()
        .filter(|dir| !dir.is_empty())
        .unwrap_or_else(|| "/tmp".to_string());
    PathBuf::from(runtime_dir).join(LOCK_FILE_NAME)
}

/// PID recorded in the lock file, if a live process owns it.
pub fn read_running_pid(lock_path: &Path) -> Option<u32> {
    let content = std::fs::read_to_string(lock_path).ok()?;
    let pid = content.lines().next()?.trim().parse::<u32>().ok()?;
    (pid != std::process::id() && is_process_running(pid)).then_some(pid)
}

/// Check if a process with the given PID is currently running.
pub fn is_process_running(pid: u32) -> bool {
    Path::new(&format!("/proc/{}", pid)).exists()
}

/// Ask the daemon at `pid` to re-read its settings.
pub fn send_reload(pid: u32) -> Result<()> {
    let raw = i32::try_from(pid).with_context(|| format!("PID {} is out of range", pid))?;
    kill(Pid::from_raw(raw), Signal::SIGUSR2)
        .with_context(|| format!("failed to signal livedisplay process {}", pid))
}

/// Notify a running daemon, if any, that the settings file changed.
///
/// # Returns
/// `true` if a daemon was found and signalled
pub fn notify_running_instance(lock_path: &Path) -> Result<bool> {
    match read_running_pid(lock_path) {
        Some(pid) => {
            send_reload(pid)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_signal_mapping() {
        assert_eq!(message_for_signal(SIGUSR2), Some(SignalMessage::Reload));
        assert_eq!(message_for_signal(SIGTERM), Some(SignalMessage::Shutdown));
        assert_eq!(message_for_signal(SIGINT), Some(SignalMessage::Shutdown));
        assert_eq!(message_for_signal(SIGHUP), Some(SignalMessage::Shutdown));
        assert_eq!(message_for_signal(signal_hook::consts::signal::SIGUSR1), None);
    }

    #[test]
    #[serial]
    fn test_lock_file_path_uses_runtime_dir() {
        let original = std::env::var("XDG_RUNTIME_DIR").ok();

        unsafe { std::env::set_var("XDG_RUNTIME_DIR", "/run/user/1234") };
        assert_eq!(
            lock_file_path(),
            PathBuf::from("/run/user/1234/livedisplay.lock")
        );

        unsafe { std::env::remove_var("XDG_RUNTIME_DIR") };
        assert_eq!(lock_file_path(), PathBuf::from("/tmp/livedisplay.lock"));

        unsafe {
            match original {
                Some(value) => std::env::set_var("XDG_RUNTIME_DIR", value),
                None => std::env::remove_var("XDG_RUNTIME_DIR"),
            }
        }
    }

    #[test]
    fn test_read_running_pid_ignores_garbage_and_self() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("livedisplay.lock");

        assert_eq!(read_running_pid(&path), None);

        std::fs::write(&path, "not a pid\n").unwrap();
        assert_eq!(read_running_pid(&path), None);

        std::fs::write(&path, format!("{}\n", std::process::id())).unwrap();
        assert_eq!(read_running_pid(&path), None);

        // PID 1 always exists on Linux
        std::fs::write(&path, "1\n").unwrap();
        assert_eq!(read_running_pid(&path), Some(1));
    }

    #[test]
    fn test_notify_without_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("livedisplay.lock");
        assert!(!notify_running_instance(&path).unwrap());
    }
}
