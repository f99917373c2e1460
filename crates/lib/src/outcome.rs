//! Outcome classifier: decide success or failure from the exit state and captured output.
//!
//! A zero exit is success. A non-zero exit is still success when the output shows the
//! network already reached the requested state (re-running `deployCC` against a live
//! network exits non-zero after reporting the chaincode as installed/committed).
//! A timeout is always a failure.

use crate::exec::ExitState;

/// Output markers that turn a non-zero exit into success. Matched case-insensitively as substrings.
pub const SUCCESS_MARKERS: &[&str] = &[
    "Chaincode definition committed",
    "Chaincode is installed",
    "Committed chaincode definition",
    "Query chaincode definition successful",
    "Finished vendoring Go dependencies",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    /// Process exited unsuccessfully and no marker matched.
    Exit,
    /// Deadline expired; the process group was terminated.
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success { message: String },
    Failure { message: String, cause: FailureCause },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Outcome::Success { message } | Outcome::Failure { message, .. } => message,
        }
    }
}

/// ASCII case-insensitive substring search.
fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    let (h, n) = (haystack.as_bytes(), needle.as_bytes());
    if n.is_empty() {
        return true;
    }
    h.len() >= n.len() && h.windows(n.len()).any(|w| w.eq_ignore_ascii_case(n))
}

/// First marker found in `output`, if any.
pub fn matched_marker(output: &str) -> Option<&'static str> {
    SUCCESS_MARKERS
        .iter()
        .copied()
        .find(|m| contains_ignore_case(output, m))
}

/// Classify one execution. Pure; the marker table is the only policy input.
pub fn classify(exit: &ExitState, output: &str) -> Outcome {
    match exit {
        ExitState::Success => Outcome::Success {
            message: output.to_string(),
        },
        ExitState::Failed { description, .. } => {
            if let Some(marker) = matched_marker(output) {
                log::warn!(
                    "process failed ({}) but output reports \"{}\"; treating as success",
                    description,
                    marker
                );
                Outcome::Success {
                    message: output.to_string(),
                }
            } else {
                Outcome::Failure {
                    message: format!("{}\nError: {}", output, description),
                    cause: FailureCause::Exit,
                }
            }
        }
        ExitState::TimedOut { after } => Outcome::Failure {
            message: format!("{}\nError: operation timed out after {:?}", output, after),
            cause: FailureCause::Timeout,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn failed() -> ExitState {
        ExitState::Failed {
            code: Some(1),
            description: "exit status: 1".to_string(),
        }
    }

    #[test]
    fn success_exit_is_success_regardless_of_output() {
        for out in ["", "Error: endorsement failure", "Chaincode is installed"] {
            assert_eq!(
                classify(&ExitState::Success, out),
                Outcome::Success {
                    message: out.to_string()
                }
            );
        }
    }

    #[test]
    fn every_marker_overrides_failure_in_any_case() {
        for marker in SUCCESS_MARKERS {
            for variant in [
                marker.to_string(),
                marker.to_uppercase(),
                marker.to_lowercase(),
            ] {
                let out = format!("+ peer lifecycle ...\n{}\nError: exit 1\n", variant);
                assert!(classify(&failed(), &out).is_success(), "{variant}");
            }
        }
    }

    #[test]
    fn uppercase_installed_marker() {
        let out = "2024-01-01 CHAINCODE IS INSTALLED on peer0.org1";
        assert_eq!(matched_marker(out), Some("Chaincode is installed"));
        assert!(classify(&failed(), out).is_success());
    }

    #[test]
    fn failure_without_marker_appends_error() {
        let outcome = classify(&failed(), "Error: could not assemble transaction");
        assert_eq!(
            outcome,
            Outcome::Failure {
                message: "Error: could not assemble transaction\nError: exit status: 1".to_string(),
                cause: FailureCause::Exit,
            }
        );
    }

    #[test]
    fn partial_marker_does_not_match() {
        assert!(!classify(&failed(), "Chaincode is").is_success());
        assert!(!classify(&failed(), "").is_success());
    }

    #[test]
    fn timeout_ignores_markers() {
        let exit = ExitState::TimedOut {
            after: Duration::from_secs(1),
        };
        let outcome = classify(&exit, "Chaincode definition committed");
        assert!(!outcome.is_success());
        assert!(matches!(
            outcome,
            Outcome::Failure {
                cause: FailureCause::Timeout,
                ..
            }
        ));
        assert!(outcome.message().contains("timed out after 1s"));
    }

    #[test]
    fn contains_ignore_case_edges() {
        assert!(contains_ignore_case("abc", ""));
        assert!(!contains_ignore_case("ab", "abc"));
        assert!(contains_ignore_case("xxABcx", "abC"));
    }
}
