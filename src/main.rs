use crate::AppError::ConfigError;
use clap::Parser;
use config::Config;
use kseq2midi::{
    parse_kseq_data, write_sequence, DiagnosticSink, KseqError as LibKseqError, LogSink, NoopSink,
    SmfSequence,
};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

mod config;

fn main() {
    let result = main_result();
    std::process::exit(match result {
        Ok(()) => 0,
        Err(err) => {
            // use Display instead of Debug for user friendly error messages
            log::error!("{err}");
            1
        }
    });
}

pub fn main_result() -> Result<(), AppError> {
    // args
    let args = CliArgs::parse();

    // setup logging
    let default_filter = if args.debug {
        "kseq2midi=debug"
    } else {
        "kseq2midi=info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    // check if input file exists
    let input = PathBuf::from(&args.input);
    if !input.is_file() {
        let err = ConfigError(format!("Input file not found {input:?}"));
        return Err(err);
    }

    // read local config
    let local_config = Config::read_config()?;
    let output = output_path(&input, local_config.get_output_suffix());

    let data = std::fs::read(&input)?;
    log::info!("Converting {input:?} ({} bytes)", data.len());

    // the per-event trace only goes through the logger in debug mode
    let mut sink: Box<dyn DiagnosticSink> = if args.debug {
        Box::new(LogSink)
    } else {
        Box::new(NoopSink)
    };
    let song = parse_kseq_data(&data, sink.as_mut())?;
    println!("Detected file format: {}", song.layout.variant);

    let mut sequence = SmfSequence::new();
    write_sequence(&song, &mut sequence, sink.as_mut());
    sequence.save(&output)?;
    println!("MIDI file written: {}", output.display());
    Ok(())
}

/// `<input><suffix>` next to the input file
fn output_path(input: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(input.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    /// Print a trace of every decoded event.
    #[arg(long, default_value_t = false)]
    debug: bool,
    /// Path to the KSEQ or AllData file.
    input: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("format error: {0}")]
    FormatError(String),
    #[error("configuration error: {0}")]
    ConfigError(String),
    #[error("MIDI error: {0}")]
    MidiError(String),
    #[error("other error: {0}")]
    OtherError(String),
}

impl From<LibKseqError> for AppError {
    fn from(error: LibKseqError) -> Self {
        match error {
            LibKseqError::FormatError(s) => Self::FormatError(s),
            LibKseqError::ConfigError(s) => Self::ConfigError(s),
            LibKseqError::MidiError(s) => Self::MidiError(s),
            LibKseqError::IoError(s) => Self::OtherError(s),
        }
    }
}

impl From<io::Error> for AppError {
    fn from(error: io::Error) -> Self {
        Self::OtherError(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_keeps_input_extension() {
        assert_eq!(
            output_path(Path::new("songs/DEMO.S0Q"), ".mid"),
            PathBuf::from("songs/DEMO.S0Q.mid")
        );
        assert_eq!(
            output_path(Path::new("SONG"), ".smf"),
            PathBuf::from("SONG.smf")
        );
    }

    #[test]
    fn test_cli_args() {
        let args = CliArgs::try_parse_from(["kseq2midi", "--debug", "SONG.KSEQ"]).unwrap();
        assert!(args.debug);
        assert_eq!(args.input, "SONG.KSEQ");

        let args = CliArgs::try_parse_from(["kseq2midi", "SONG.KSEQ"]).unwrap();
        assert!(!args.debug);

        assert!(CliArgs::try_parse_from(["kseq2midi"]).is_err());
    }
}
