//! # Console Commands Module
//!
//! Parser dei comandi di riga letti da stdin, che sostituiscono i controlli
//! della finestra: apertura file, slider dei parametri, salvataggio e reset.
//!
//! ## Comandi:
//! ```text
//! open <path>            apre un PNG
//! quality <10-90>        colors <48-256>     floyd <0-1>     speed <1-11>
//! set <q> <c> <f> <s>    tutti i parametri insieme
//! status | reset | save | purge | ack | scratch | tools | help | quit
//! ```

use crate::params::ConversionParameters;
use std::path::PathBuf;

pub const HELP: &str = "\
Commands:
  open <path>              open a PNG file
  quality <10-90>          minimum quality (maximum is quality + 5)
  colors <48-256>          number of colors
  floyd <0.0-1.0>          dithering strength
  speed <1-11>             speed/quality trade-off
  set <q> <c> <f> <s>      all four parameters at once
  status                   show the current preview
  reset                    close the file and delete its previews
  save                     replace the original with the preview
  purge                    delete scratch files
  ack                      acknowledge a failed save and resume
  scratch                  show the scratch directory
  tools                    show where pngquant was found
  help                     show this text
  quit                     exit";

/// One line of user input
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Open(PathBuf),
    Quality(f64),
    Colors(f64),
    Floyd(f64),
    Speed(f64),
    Set {
        quality: f64,
        colors: f64,
        floyd: f64,
        speed: f64,
    },
    Status,
    Reset,
    Save,
    Purge,
    Ack,
    Scratch,
    Tools,
    Help,
    Quit,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command '{0}', type 'help' for the list")]
    Unknown(String),

    #[error("'{command}' expects {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },

    #[error("'{0}' is not a number")]
    InvalidNumber(String),
}

impl ConsoleCommand {
    /// Parses one line. Blank lines give `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "open" => {
                let path = unquote(rest);
                if path.is_empty() {
                    return Err(CommandError::MissingArgument {
                        command: "open",
                        expected: "a file path",
                    });
                }
                ConsoleCommand::Open(PathBuf::from(path))
            }
            "quality" | "q" => ConsoleCommand::Quality(single_number("quality", rest)?),
            "colors" | "c" => ConsoleCommand::Colors(single_number("colors", rest)?),
            "floyd" | "f" => ConsoleCommand::Floyd(single_number("floyd", rest)?),
            "speed" | "s" => ConsoleCommand::Speed(single_number("speed", rest)?),
            "set" => {
                let values = rest
                    .split_whitespace()
                    .map(number)
                    .collect::<Result<Vec<_>, _>>()?;
                match values[..] {
                    [quality, colors, floyd, speed] => ConsoleCommand::Set {
                        quality,
                        colors,
                        floyd,
                        speed,
                    },
                    _ => {
                        return Err(CommandError::MissingArgument {
                            command: "set",
                            expected: "four numbers: quality colors floyd speed",
                        })
                    }
                }
            }
            "status" => ConsoleCommand::Status,
            "reset" => ConsoleCommand::Reset,
            "save" => ConsoleCommand::Save,
            "purge" => ConsoleCommand::Purge,
            "ack" => ConsoleCommand::Ack,
            "scratch" => ConsoleCommand::Scratch,
            "tools" => ConsoleCommand::Tools,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };

        Ok(Some(command))
    }

    /// New parameter set for the parameter commands, `None` for the others.
    pub fn apply_to(&self, current: ConversionParameters) -> Option<ConversionParameters> {
        match *self {
            ConsoleCommand::Quality(value) => Some(current.with_quality(value)),
            ConsoleCommand::Colors(value) => Some(current.with_color_count(value)),
            ConsoleCommand::Floyd(value) => Some(current.with_dither_strength(value)),
            ConsoleCommand::Speed(value) => Some(current.with_speed(value)),
            ConsoleCommand::Set {
                quality,
                colors,
                floyd,
                speed,
            } => Some(ConversionParameters::new(quality, colors, floyd, speed)),
            _ => None,
        }
    }
}

fn single_number(command: &'static str, rest: &str) -> Result<f64, CommandError> {
    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(value), None) => number(value),
        _ => Err(CommandError::MissingArgument {
            command,
            expected: "one number",
        }),
    }
}

fn number(value: &str) -> Result<f64, CommandError> {
    value
        .parse::<f64>()
        .map_err(|_| CommandError::InvalidNumber(value.to_string()))
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = value.strip_prefix(quote).and_then(|v| v.strip_suffix(quote)) {
            return inner;
        }
    }
    value
}
