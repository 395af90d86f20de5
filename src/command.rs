//! Command line to execute.

use crate::error::ConfigError;
use std::ffi::OsString;
use std::fmt;

/// A program and its arguments.
///
/// Immutable once built. Arguments are passed to execve as-is; there is no
/// shell interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    /// Create a command from a program and its arguments.
    ///
    /// # Errors
    ///
    /// - `ConfigError::EmptyCommand` if the program is empty
    /// - `ConfigError::NulByte` if the program or an argument contains `\0`
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let program = program.into();
        if program.is_empty() {
            return Err(ConfigError::EmptyCommand);
        }
        check_nul("program", &program)?;

        let args = args.into_iter().map(Into::into).collect::<Vec<String>>();
        for arg in &args {
            check_nul("argument", arg)?;
        }

        Ok(Self { program, args })
    }

    /// Create a command from a full argv, program first.
    pub fn from_argv<I, S>(argv: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let program = argv.next().ok_or(ConfigError::EmptyCommand)?;
        Self::new(program, argv)
    }

    /// The program to execute.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments, not including the program.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub(crate) fn to_tokio(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(OsString::from(&self.program));
        cmd.args(&self.args);
        cmd
    }
}

fn check_nul(what: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.contains('\0') {
        return Err(ConfigError::NulByte {
            what,
            value: value.to_string(),
        });
    }
    Ok(())
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

/// Quote a word for display so the rendered command reads like a shell line.
fn quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
