//! Text commands read from stdin
//!
//! Each line is one user gesture. Times are in seconds; `seek` also takes a
//! percentage of the loop range (`seek 25%`).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum SeekTarget {
    Seconds(f64),
    /// Fraction in [0, 1] of the loop range (or file)
    Fraction(f32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Toggle,
    Seek(SeekTarget),
    Pitch(f32),
    PitchReset,
    LoopEnabled(bool),
    /// Loop range in seconds
    LoopRange { start: f64, end: f64 },
    /// `None` when no path was given
    Load(Option<String>),
    Unload,
    Status,
    Devices,
    Bounce,
    Help,
    Quit,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),

    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),

    #[error("'{0}' is not a number")]
    InvalidNumber(String),
}

pub const HELP: &str = "\
Commands:
  load [path]        load an audio file (relative to the last directory)
  unload             drop the current file
  play | pause       start / stop playback
  space | toggle     play/pause
  seek <sec|N%>      jump to a time or a percentage of the loop
  pitch <st>         shift pitch by -4..+4 semitones
  pitch reset        back to 0 semitones
  loop on|off        enable / disable looping
  loop <start> <end> loop range in seconds
  status             show transport status
  devices            list output devices
  bounce             render the loop at the current pitch to a WAV
  help               this text
  quit               exit";

fn number(s: &str) -> Result<f64, ParseError> {
    s.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::InvalidNumber(s.to_string()))
}

fn parse_seek(arg: &str) -> Result<SeekTarget, ParseError> {
    match arg.strip_suffix('%') {
        Some(pct) => Ok(SeekTarget::Fraction((number(pct)? / 100.0) as f32)),
        None => Ok(SeekTarget::Seconds(number(arg)?)),
    }
}

/// Parse one input line
pub fn parse(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::Empty);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let args: Vec<&str> = rest.split_whitespace().collect();

    match word.to_ascii_lowercase().as_str() {
        "play" => Ok(Command::Play),
        "pause" | "stop" => Ok(Command::Pause),
        "toggle" | "space" => Ok(Command::Toggle),
        "seek" => match args.first() {
            Some(arg) => Ok(Command::Seek(parse_seek(arg)?)),
            None => Err(ParseError::MissingArgument("seek")),
        },
        "pitch" => match args.first() {
            Some(&"reset") | Some(&"0") => Ok(Command::PitchReset),
            Some(arg) => Ok(Command::Pitch(number(arg)? as f32)),
            None => Err(ParseError::MissingArgument("pitch")),
        },
        "loop" => match args.as_slice() {
            ["on"] => Ok(Command::LoopEnabled(true)),
            ["off"] => Ok(Command::LoopEnabled(false)),
            [start, end] => Ok(Command::LoopRange {
                start: number(start)?,
                end: number(end)?,
            }),
            _ => Err(ParseError::MissingArgument("loop")),
        },
        // Paths may contain spaces, so take the raw remainder
        "load" | "open" => Ok(Command::Load((!rest.is_empty()).then(|| rest.to_string()))),
        "unload" => Ok(Command::Unload),
        "status" | "s" => Ok(Command::Status),
        "devices" => Ok(Command::Devices),
        "bounce" | "render" => Ok(Command::Bounce),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(ParseError::Unknown(other.to_string())),
    }
}
