//! Interactive fallback for values given neither on the command line nor
//! in a configuration.

use std::fmt::Display;
use std::io::{BufRead, Write};
use std::str::FromStr;

use crate::error::CliError;

/// A question-and-answer surface.
pub trait Prompt {
    /// Ask `question`, offering `default`. An empty answer selects the
    /// default.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::UserCancelled`] when input ends before an
    /// answer.
    fn ask(&mut self, question: &str, default: &str) -> Result<String, CliError>;

    /// Show an informational line.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be written.
    fn tell(&mut self, message: &str) -> Result<(), CliError>;
}

/// Line-oriented prompt over a reader and a writer (stdin and stderr in
/// the binary).
pub struct LinePrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    pub const fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Give back the writer, with everything shown so far.
    #[cfg(test)]
    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> Prompt for LinePrompt<R, W> {
    fn ask(&mut self, question: &str, default: &str) -> Result<String, CliError> {
        if default.is_empty() {
            write!(self.output, "{question}: ")?;
        } else {
            write!(self.output, "{question} [{default}]: ")?;
        }
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(CliError::UserCancelled);
        }
        let answer = line.trim();
        Ok(if answer.is_empty() { default } else { answer }.to_owned())
    }

    fn tell(&mut self, message: &str) -> Result<(), CliError> {
        writeln!(self.output, "{message}")?;
        Ok(())
    }
}

/// Ask until the answer parses as `T`.
///
/// # Errors
///
/// Returns [`CliError::UserCancelled`] when input ends.
pub fn ask_parsed<T>(prompt: &mut dyn Prompt, question: &str, default: &str) -> Result<T, CliError>
where
    T: FromStr,
    T::Err: Display,
{
    loop {
        match prompt.ask(question, default)?.parse() {
            Ok(value) => return Ok(value),
            Err(e) => prompt.tell(&e.to_string())?,
        }
    }
}

/// Ask a yes/no question.
///
/// # Errors
///
/// Returns [`CliError::UserCancelled`] when input ends.
pub fn ask_yes_no(prompt: &mut dyn Prompt, question: &str, default: bool) -> Result<bool, CliError> {
    let default = if default { "yes" } else { "no" };
    loop {
        match prompt.ask(question, default)?.to_ascii_lowercase().as_str() {
            "y" | "yes" | "true" => return Ok(true),
            "n" | "no" | "false" => return Ok(false),
            _ => prompt.tell("please answer yes or no")?,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn scripted(answers: &str) -> LinePrompt<Cursor<Vec<u8>>, Vec<u8>> {
        LinePrompt::new(Cursor::new(answers.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn empty_answer_takes_default() {
        let mut prompt = scripted("\n  stack.tif \n");
        assert_eq!(prompt.ask("Input file", "a.tif").unwrap(), "a.tif");
        assert_eq!(prompt.ask("Input file", "a.tif").unwrap(), "stack.tif");
        let shown = String::from_utf8(prompt.output).unwrap();
        assert_eq!(shown, "Input file [a.tif]: Input file [a.tif]: ");
    }

    #[test]
    fn end_of_input_cancels() {
        let mut prompt = scripted("");
        assert!(matches!(
            prompt.ask("Input file", ""),
            Err(CliError::UserCancelled)
        ));
    }

    #[test]
    fn yes_no_reasks_until_understood() {
        let mut prompt = scripted("maybe\nN\n");
        assert!(!ask_yes_no(&mut prompt, "Save final montage", true).unwrap());
        let shown = String::from_utf8(prompt.output).unwrap();
        assert!(shown.contains("please answer yes or no"));
    }

    #[test]
    fn parsed_answers_reask_with_the_parse_error() {
        let mut prompt = scripted("17x\n\n");
        let value: u32 = ask_parsed(&mut prompt, "Count", "4").unwrap();
        assert_eq!(value, 4);
        let shown = String::from_utf8(prompt.output).unwrap();
        assert!(shown.contains("invalid digit"));
    }
}
