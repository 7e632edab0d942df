// error.rs - Typed failures and per-step outcomes for the provisioning run

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("command failed: `{command}` ({})", describe_status(.status))]
    CommandFailed { command: String, status: Option<i32> },

    #[error("command could not be started: `{command}`: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("{} not found", .path.display())]
    NotFound { path: PathBuf },

    #[error("malformed configuration in {}: {reason}", .path.display())]
    MalformedConfig { path: PathBuf, reason: String },

    #[error("download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl ProvisionError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        ProvisionError::Io {
            context: context.into(),
            source,
        }
    }
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// Result of a step that did not abort the run.
#[derive(Debug)]
pub enum StepOutcome {
    Completed,
    Skipped(String),
    /// The step failed but the run continues (best-effort policy).
    Recovered(ProvisionError),
}

impl StepOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            StepOutcome::Completed => "completed",
            StepOutcome::Skipped(_) => "skipped",
            StepOutcome::Recovered(_) => "recovered",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_message() {
        let err = ProvisionError::CommandFailed {
            command: "sudo apt update".to_string(),
            status: Some(100),
        };
        assert_eq!(err.to_string(), "command failed: `sudo apt update` (exit status 100)");

        let err = ProvisionError::CommandFailed {
            command: "unzip -o x.zip".to_string(),
            status: None,
        };
        assert!(err.to_string().ends_with("(terminated by signal)"));
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(StepOutcome::Completed.label(), "completed");
        assert_eq!(StepOutcome::Skipped("present".into()).label(), "skipped");
        let recovered = StepOutcome::Recovered(ProvisionError::NotFound {
            path: PathBuf::from("config.json"),
        });
        assert_eq!(recovered.label(), "recovered");
    }
}
