//! Settling run settings from the command line, a configuration, and the
//! user, in that order of precedence.

use std::path::PathBuf;

use zmontage_io::output_dir_for;
use zmontage_pipeline::{MontageConfig, PlaneSelection, SelectionKind, SliceSelection};

use crate::Cli;
use crate::error::CliError;
use crate::prompt::{Prompt, ask_parsed, ask_yes_no};

/// Settings assembled for one run.
#[derive(Debug)]
pub struct Settings {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub config: MontageConfig,
}

/// Resolves each setting from `cli`, then `config` (when one was given
/// explicitly), then `prompt` (when interactive), then built-in defaults.
pub struct Resolver<'a> {
    cli: &'a Cli,
    config: MontageConfig,
    config_given: bool,
    prompt: Option<&'a mut dyn Prompt>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        cli: &'a Cli,
        config: Option<MontageConfig>,
        prompt: Option<&'a mut dyn Prompt>,
    ) -> Self {
        let config_given = config.is_some();
        Self {
            cli,
            config: config.unwrap_or_default(),
            config_given,
            prompt,
        }
    }

    /// The input stack and output directory. Both must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::InvalidPath`] when no input is given or either
    /// path does not exist, and [`CliError::UserCancelled`] when a prompt
    /// is dismissed.
    pub fn paths(&mut self) -> Result<(PathBuf, PathBuf), CliError> {
        let input = match self.cli.input.clone().or_else(|| self.config.input.clone()) {
            Some(input) => input,
            None => match self.prompt.as_deref_mut() {
                Some(prompt) => PathBuf::from(prompt.ask("Input file", "")?),
                None => PathBuf::new(),
            },
        };
        if input.as_os_str().is_empty() {
            return Err(CliError::InvalidPath {
                path: input,
                reason: "no input file given",
            });
        }
        if !input.is_file() {
            return Err(CliError::InvalidPath {
                path: input,
                reason: "input file does not exist",
            });
        }

        let given = self
            .cli
            .output_dir
            .clone()
            .or_else(|| self.config.output_dir.clone());
        let output_dir = match (given, self.prompt.as_deref_mut()) {
            (Some(dir), _) => dir,
            (None, Some(prompt)) => {
                let default = output_dir_for(&input, None);
                PathBuf::from(prompt.ask("Output directory", &default.to_string_lossy())?)
            }
            (None, None) => output_dir_for(&input, None),
        };
        if !output_dir.is_dir() {
            return Err(CliError::InvalidPath {
                path: output_dir,
                reason: "output directory does not exist",
            });
        }
        Ok((input, output_dir))
    }

    /// Plane selection for a stack with `plane_count` planes.
    ///
    /// Interactive custom lists are re-asked until they resolve; lists from
    /// flags or configuration are checked by the pipeline instead.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::UserCancelled`] when a prompt is dismissed.
    pub fn selection(&mut self, plane_count: u32) -> Result<SliceSelection, CliError> {
        let given = self
            .cli
            .slices
            .map(SelectionKind::from)
            .or_else(|| self.cli.planes.is_some().then_some(SelectionKind::Custom))
            .or_else(|| self.config_given.then_some(self.config.selection));
        let default_kind = self.config.selection;

        let kind = match (given, self.prompt.as_deref_mut()) {
            (Some(kind), _) => kind,
            (None, Some(prompt)) => {
                prompt.tell(&format!("Input file contains {plane_count} z slices."))?;
                ask_parsed(
                    prompt,
                    "Slices (all, odd, custom)",
                    &default_kind.to_string(),
                )?
            }
            (None, None) => default_kind,
        };
        if kind != SelectionKind::Custom {
            return Ok(kind.with_text(""));
        }

        let given = self
            .cli
            .planes
            .clone()
            .or_else(|| self.config_given.then(|| self.config.custom_planes.clone()));
        let text = match (given, self.prompt.as_deref_mut()) {
            (Some(text), _) => text,
            (None, Some(prompt)) => ask_planes(prompt, &self.config.custom_planes, plane_count)?,
            (None, None) => self.config.custom_planes.clone(),
        };
        Ok(SliceSelection::Custom(text))
    }

    /// Whether to persist the montage.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::UserCancelled`] when a prompt is dismissed.
    pub fn save_montage(&mut self) -> Result<bool, CliError> {
        if self.cli.no_save {
            return Ok(false);
        }
        if self.config_given {
            return Ok(self.config.save_montage);
        }
        match self.prompt.as_deref_mut() {
            Some(prompt) => ask_yes_no(prompt, "Save final montage", self.config.save_montage),
            None => Ok(self.config.save_montage),
        }
    }

    /// Resolve the remaining settings once the stack's plane count is
    /// known.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::UserCancelled`] when a prompt is dismissed.
    pub fn finish(
        mut self,
        input: PathBuf,
        output_dir: PathBuf,
        plane_count: u32,
    ) -> Result<Settings, CliError> {
        let selection = self.selection(plane_count)?;
        let save_montage = self.save_montage()?;

        let mut config = self.config;
        config.selection = selection.kind();
        if let SliceSelection::Custom(text) = selection {
            config.custom_planes = text;
        }
        config.save_montage = save_montage;
        if let Some(scale) = self.cli.scale {
            config.scale = scale;
        }
        if let Some(font) = &self.cli.font {
            config.font = Some(font.clone());
        }
        config.input = Some(input.clone());
        config.output_dir = Some(output_dir.clone());

        Ok(Settings {
            input,
            output_dir,
            config,
        })
    }
}

fn ask_planes(prompt: &mut dyn Prompt, default: &str, plane_count: u32) -> Result<String, CliError> {
    loop {
        let text = prompt.ask("Custom planes (comma separated)", default)?;
        match PlaneSelection::resolve(&SliceSelection::Custom(text.clone()), plane_count) {
            Ok(_) => return Ok(text),
            Err(e) => prompt.tell(&e.to_string())?,
        }
    }
}
