//! Command-line argument parsing and processing.
//!
//! The daemon runs by default. The remaining subcommands work on the settings
//! store directly and poke a running daemon so it picks the change up.

use chrono::DateTime;
use std::path::PathBuf;

use crate::display::Mode;
use crate::logger::Log;
use crate::settings::SettingUri;

/// Which of the two user temperatures a `day`/`night` command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Night,
}

/// Represents the parsed command-line arguments and their intended actions.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Run the daemon
    Run { debug_enabled: bool },
    /// Print the state the daemon would apply, optionally at another instant
    Status { debug_enabled: bool, at_millis: Option<i64> },
    /// Store a new display mode
    SetMode(Mode),
    /// Store a new day or night temperature
    SetTemperature { period: Period, kelvin: i32 },
    /// Print a raw setting
    Get(SettingUri),
    /// Write a raw setting
    Put { uri: SettingUri, value: String },
    /// Display help information and exit
    ShowHelp,
    /// Display version information and exit
    ShowVersion,
    /// Show help due to unknown arguments and exit
    ShowHelpDueToError,
}

/// Result of parsing command-line arguments.
#[derive(Debug)]
pub struct ParsedArgs {
    pub action: CliAction,
    /// Explicit `--config` path, overriding the XDG location
    pub config_path: Option<PathBuf>,
}

impl ParsedArgs {
    /// Parse command-line arguments into a structured result.
    ///
    /// # Arguments
    /// * `args` - Iterator over command-line arguments, program name first
    ///
    /// # Returns
    /// ParsedArgs containing the determined action
    pub fn parse<I, S>(args: I) -> ParsedArgs
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut debug_enabled = false;
        let mut display_help = false;
        let mut display_version = false;
        let mut unknown_arg_found = false;
        let mut config_path: Option<PathBuf> = None;
        let mut at_millis: Option<i64> = None;
        let mut positional: Vec<String> = Vec::new();

        let args_vec: Vec<String> = args
            .into_iter()
            .skip(1)
            .map(|s| s.as_ref().to_string())
            .collect();

        let mut i = 0;
        while i < args_vec.len() {
            let arg_str = &args_vec[i];
            match arg_str.as_str() {
                "--help" | "-h" => display_help = true,
                "--version" | "-V" | "-v" => display_version = true,
                "--debug" | "-d" => debug_enabled = true,
                "--config" | "-c" => match args_vec.get(i + 1) {
                    Some(path) => {
                        config_path = Some(PathBuf::from(path));
                        i += 1;
                    }
                    None => {
                        Log::log_warning("Missing path for --config");
                        unknown_arg_found = true;
                    }
                },
                "--at" => match args_vec.get(i + 1) {
                    Some(value) => {
                        match DateTime::parse_from_rfc3339(value) {
                            Ok(at) => at_millis = Some(at.timestamp_millis()),
                            Err(_) => {
                                Log::log_warning(&format!(
                                    "Invalid --at time: {} (expected RFC 3339, e.g. 2024-06-21T21:30:00+02:00)",
                                    value
                                ));
                                unknown_arg_found = true;
                            }
                        }
                        i += 1;
                    }
                    None => {
                        Log::log_warning("Missing time for --at");
                        unknown_arg_found = true;
                    }
                },
                _ => {
                    // Negative numbers are values, not options
                    if arg_str.starts_with('-') && arg_str.parse::<i64>().is_err() {
                        Log::log_warning(&format!("Unknown option: {}", arg_str));
                        unknown_arg_found = true;
                    } else {
                        positional.push(arg_str.clone());
                    }
                }
            }
            i += 1;
        }

        let action = if display_version {
            CliAction::ShowVersion
        } else if unknown_arg_found {
            CliAction::ShowHelpDueToError
        } else if display_help {
            CliAction::ShowHelp
        } else {
            parse_command(&positional, debug_enabled, at_millis)
        };

        ParsedArgs {
            action,
            config_path,
        }
    }

    /// Convenience method to parse from std::env::args()
    pub fn from_env() -> ParsedArgs {
        Self::parse(std::env::args())
    }
}

fn parse_command(positional: &[String], debug_enabled: bool, at_millis: Option<i64>) -> CliAction {
    let words: Vec<&str> = positional.iter().map(String::as_str).collect();

    if at_millis.is_some() && words.first() != Some(&"status") {
        Log::log_warning("--at only applies to the status command");
        return CliAction::ShowHelpDueToError;
    }

    match words.as_slice() {
        [] | ["run"] => CliAction::Run { debug_enabled },
        ["status"] => CliAction::Status {
            debug_enabled,
            at_millis,
        },
        ["mode", mode] => match mode.parse::<Mode>() {
            Ok(mode) => CliAction::SetMode(mode),
            Err(e) => {
                Log::log_warning(&e.to_string());
                CliAction::ShowHelpDueToError
            }
        },
        [period @ ("day" | "night"), kelvin] => match kelvin.parse::<i32>() {
            Ok(kelvin) => CliAction::SetTemperature {
                period: if *period == "day" {
                    Period::Day
                } else {
                    Period::Night
                },
                kelvin,
            },
            Err(_) => {
                Log::log_warning(&format!("Invalid temperature value: {}", kelvin));
                CliAction::ShowHelpDueToError
            }
        },
        ["get", uri] => match uri.parse::<SettingUri>() {
            Ok(uri) => CliAction::Get(uri),
            Err(e) => {
                Log::log_warning(&e.to_string());
                CliAction::ShowHelpDueToError
            }
        },
        ["put", uri, value] => match uri.parse::<SettingUri>() {
            Ok(uri) => CliAction::Put {
                uri,
                value: value.to_string(),
            },
            Err(e) => {
                Log::log_warning(&e.to_string());
                CliAction::ShowHelpDueToError
            }
        },
        [command, ..] => {
            Log::log_warning(&format!("Unknown or incomplete command: {}", command));
            CliAction::ShowHelpDueToError
        }
    }
}

/// Displays version information using custom logging style.
pub fn display_version_info() {
    Log::log_version();
    Log::log_pipe();
    println!("┗ {}", env!("CARGO_PKG_DESCRIPTION"));
}

/// Displays custom help message using logger methods.
pub fn display_help() {
    Log::log_version();
    Log::log_block_start(env!("CARGO_PKG_DESCRIPTION"));
    Log::log_block_start("Usage: livedisplay [OPTIONS] [COMMAND]");
    Log::log_block_start("Commands:");
    Log::log_indented("run                       Run the daemon (default)");
    Log::log_indented("status [--at <RFC3339>]   Show the state that would be applied");
    Log::log_indented("mode <mode>               Set the mode: off, night, auto, outdoor, day");
    Log::log_indented("day <kelvin>              Set the day color temperature");
    Log::log_indented("night <kelvin>            Set the night color temperature");
    Log::log_indented("get <uri>                 Print a setting, e.g. system/display_temperature_mode");
    Log::log_indented("put <uri> <value>         Write a setting");
    Log::log_block_start("Options:");
    Log::log_indented("-c, --config <path>       Use this configuration file");
    Log::log_indented("-d, --debug               Enable detailed debug output");
    Log::log_indented("-h, --help                Print help information");
    Log::log_indented("-V, --version             Print version information");
    Log::log_end();
}
