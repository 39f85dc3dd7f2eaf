//! zmontage: build a plane x channel montage from a microscopy TIFF stack.
//!
//! Each selected z plane becomes one column: the channel composite with a
//! scale bar on top, then every channel in its own color. Tiles are staged
//! as PNGs in the output directory, reassembled, and removed again; the
//! montage is saved as `<stem>_Montage.png` unless `--no-save` is given.
//!
//! Settings come from flags first, then `--config`/`--config-json`, then
//! interactive prompts on a terminal, then built-in defaults.
//!
//! # Usage
//!
//! ```text
//! zmontage [OPTIONS] [INPUT]
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod error;
mod prompt;
mod resolve;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;
use zmontage_io::{PngDirectoryStore, TiffStack, load_config, load_font, parse_config, source_stem};
use zmontage_pipeline::{ImageSource, MontageConfig, SelectionKind, build_montage};

use crate::error::CliError;
use crate::prompt::{LinePrompt, Prompt};
use crate::resolve::Resolver;

/// Build a calibrated montage of z planes and channels from a TIFF stack.
#[derive(Parser)]
#[command(name = "zmontage", version)]
pub struct Cli {
    /// Input TIFF stack (ImageJ hyperstack or plain z series).
    input: Option<PathBuf>,

    /// Existing directory for temporary tiles and the saved montage
    /// [default: the input's directory].
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Which z planes to include.
    #[arg(long, value_enum)]
    slices: Option<Slices>,

    /// Comma-separated plane numbers (implies `--slices custom`).
    #[arg(long)]
    planes: Option<String>,

    /// Build the montage without saving it.
    #[arg(long)]
    no_save: bool,

    /// Display scale applied to every tile.
    #[arg(long)]
    scale: Option<f64>,

    /// Font for the scale-bar label (TrueType or OpenType).
    #[arg(long)]
    font: Option<PathBuf>,

    /// JSON configuration file.
    #[arg(long, conflicts_with = "config_json")]
    config: Option<PathBuf>,

    /// Inline JSON configuration.
    #[arg(long)]
    config_json: Option<String>,

    /// Print the run report as JSON.
    #[arg(long)]
    json: bool,

    /// Never prompt; use defaults for anything not given.
    #[arg(long)]
    no_prompt: bool,

    /// Log debug detail.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Log warnings and errors only.
    #[arg(short, long)]
    quiet: bool,
}

/// CLI-side mirror of [`SelectionKind`] for clap.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Slices {
    All,
    Odd,
    Custom,
}

impl From<Slices> for SelectionKind {
    fn from(slices: Slices) -> Self {
        match slices {
            Slices::All => Self::All,
            Slices::Odd => Self::Odd,
            Slices::Custom => Self::Custom,
        }
    }
}

fn init_logging(cli: &Cli) {
    let default = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// The explicitly given configuration, if any.
fn config_from_cli(cli: &Cli) -> Result<Option<MontageConfig>, CliError> {
    if let Some(path) = &cli.config {
        return Ok(Some(load_config(path)?));
    }
    if let Some(json) = &cli.config_json {
        return Ok(Some(parse_config(json)?));
    }
    Ok(None)
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let config = config_from_cli(cli)?;

    let interactive = !cli.no_prompt && std::io::stdin().is_terminal();
    let mut terminal = LinePrompt::new(std::io::stdin().lock(), std::io::stderr());
    let prompt: Option<&mut dyn Prompt> = if interactive {
        Some(&mut terminal as &mut dyn Prompt)
    } else {
        None
    };

    let mut resolver = Resolver::new(cli, config, prompt);
    let (input, output_dir) = resolver.paths()?;
    let mut source = TiffStack::open(&input)?;
    let plane_count = source.descriptor().plane_count;
    let settings = resolver.finish(input, output_dir, plane_count)?;

    let font = settings.config.font.as_deref().map(load_font).transpose()?;
    let mut store = PngDirectoryStore::new(&settings.output_dir)?;

    tracing::info!(
        input = %settings.input.display(),
        output = %settings.output_dir.display(),
        selection = %settings.config.selection,
        "building montage"
    );
    let result = build_montage(
        &mut source,
        &mut store,
        settings.config,
        font,
        &source_stem(&settings.input),
    )?;
    if let Some(name) = &result.saved_as {
        tracing::info!(path = %store.path_of(name).display(), "montage saved");
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result.report)?);
    } else {
        println!("{}", result.report.report());
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("zmontage: {error}");
            error.exit_code()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn config_and_inline_json_conflict() {
        let parsed = Cli::try_parse_from([
            "zmontage",
            "--config",
            "a.json",
            "--config-json",
            "{}",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn inline_json_is_an_explicit_config() {
        let cli = Cli::try_parse_from(["zmontage", "--config-json", r#"{"selection": "Odd"}"#])
            .unwrap();
        let config = config_from_cli(&cli).unwrap().unwrap();
        assert_eq!(config.selection, SelectionKind::Odd);

        let cli = Cli::try_parse_from(["zmontage"]).unwrap();
        assert!(config_from_cli(&cli).unwrap().is_none());
    }

    #[test]
    fn malformed_inline_json_is_a_config_error() {
        let cli = Cli::try_parse_from(["zmontage", "--config-json", "{"]).unwrap();
        assert!(matches!(config_from_cli(&cli), Err(CliError::Config(_))));
    }

    #[test]
    fn quiet_and_verbose_conflict() {
        assert!(Cli::try_parse_from(["zmontage", "-v", "-q"]).is_err());
    }
}
