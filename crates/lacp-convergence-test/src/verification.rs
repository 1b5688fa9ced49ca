//! Verification helpers for simulated switches
//!
//! Provides assertion helpers over the configuration commands a switch accepted

use thiserror::Error;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Expected command matching '{expected}', captured {captured:?}")]
    CommandMissing {
        expected: String,
        captured: Vec<String>,
    },

    #[error("Command matching '{pattern}' should not have run: '{command}'")]
    UnexpectedCommand { pattern: String, command: String },

    #[error("Expected {expected} commands, captured {actual}")]
    CommandCountMismatch { expected: usize, actual: usize },
}

/// Result type for verification operations
pub type VerificationResult<T> = Result<T, VerificationError>;

/// Command execution verifier
pub struct CommandVerifier {
    captured_commands: Vec<String>,
}

impl CommandVerifier {
    /// Create a new command verifier
    pub fn new(captured_commands: Vec<String>) -> Self {
        Self { captured_commands }
    }

    /// Verify that a command containing `expected` was executed
    pub fn assert_command_executed(&self, expected: &str) -> VerificationResult<()> {
        if self
            .captured_commands
            .iter()
            .any(|cmd| cmd.contains(expected))
        {
            Ok(())
        } else {
            Err(VerificationError::CommandMissing {
                expected: expected.to_string(),
                captured: self.captured_commands.clone(),
            })
        }
    }

    /// Verify that no command containing `pattern` was executed
    pub fn assert_command_not_executed(&self, pattern: &str) -> VerificationResult<()> {
        match self
            .captured_commands
            .iter()
            .find(|cmd| cmd.contains(pattern))
        {
            Some(command) => Err(VerificationError::UnexpectedCommand {
                pattern: pattern.to_string(),
                command: command.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Verify the number of commands executed
    pub fn assert_command_count(&self, expected: usize) -> VerificationResult<()> {
        let actual = self.captured_commands.len();
        if actual != expected {
            Err(VerificationError::CommandCountMismatch { expected, actual })
        } else {
            Ok(())
        }
    }

    /// Verify that commands matching `first` ran before commands matching `second`
    pub fn assert_command_order(&self, first: &str, second: &str) -> VerificationResult<()> {
        let position = |pattern: &str| {
            self.captured_commands
                .iter()
                .position(|cmd| cmd.contains(pattern))
                .ok_or_else(|| VerificationError::CommandMissing {
                    expected: pattern.to_string(),
                    captured: self.captured_commands.clone(),
                })
        };

        let (first_at, second_at) = (position(first)?, position(second)?);
        if first_at < second_at {
            Ok(())
        } else {
            Err(VerificationError::UnexpectedCommand {
                pattern: format!("{} before {}", second, first),
                command: self.captured_commands[second_at].clone(),
            })
        }
    }

    /// Get all captured commands
    pub fn captured_commands(&self) -> &[String] {
        &self.captured_commands
    }
}
