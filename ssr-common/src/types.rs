//! Common types shared between the daemon and its API clients.

use serde::{Deserialize, Serialize};

use crate::errors::ScanError;

/// Unique identifier for one tracked scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanId(pub String);

impl ScanId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ScanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a scan.
///
/// Transitions only move forward: `Queued` → `Running` → one of the
/// terminal states. A resubmission is always a new scan with a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    /// Accepted but not yet picked up by its background task.
    Queued,
    /// The pipeline is executing.
    Running,
    /// Every stage through analysis succeeded.
    Completed,
    /// Clone or analysis exited non-zero.
    Failed,
    /// A fault outside command execution (missing tool, I/O error).
    Error,
}

impl ScanState {
    /// Whether no further transition can occur from this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Error)
    }
}

/// Body of a scan submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub version: String,
}

impl ScanRequest {
    /// Trim every field and reject the request if any ends up empty.
    ///
    /// Rejection happens before a job exists, so an invalid submission
    /// leaves no trace in the registry.
    pub fn validated(mut self) -> Result<Self, ScanError> {
        self.repository = self.repository.trim().to_string();
        self.branch = self.branch.trim().to_string();
        self.version = self.version.trim().to_string();

        for (name, value) in [
            ("repository", &self.repository),
            ("branch", &self.branch),
            ("version", &self.version),
        ] {
            if value.is_empty() {
                return Err(ScanError::Validation(format!(
                    "missing required field: {name}"
                )));
            }
        }

        Ok(self)
    }
}

/// Immutable copy of a job's current fields, decoupled from ongoing
/// mutation by the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSnapshot {
    pub id: ScanId,
    pub repository: String,
    pub branch: String,
    pub version: String,
    pub state: ScanState,
    pub output: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Reply to a successful submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitReply {
    pub status: String,
    pub message: String,
    pub scan_id: ScanId,
}

/// Reply to a status poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: String,
    pub scan_id: ScanId,
    pub scan_status: ScanState,
    pub output: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_code: Option<i32>,
}

impl StatusReply {
    pub fn from_snapshot(snapshot: ScanSnapshot) -> Self {
        Self {
            status: "success".to_string(),
            scan_id: snapshot.id,
            scan_status: snapshot.state,
            output: snapshot.output,
            start_time: snapshot.start_time,
            end_time: snapshot.end_time,
            return_code: snapshot.exit_code,
        }
    }
}

/// Error body returned for rejected or unknown requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReply {
    pub status: String,
    pub message: String,
}

impl ErrorReply {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

/// Liveness payload for `GET /api/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessReply {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub pid: u32,
    pub uptime_seconds: u64,
    pub active_scans: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!ScanState::Queued.is_terminal());
        assert!(!ScanState::Running.is_terminal());
        assert!(ScanState::Completed.is_terminal());
        assert!(ScanState::Failed.is_terminal());
        assert!(ScanState::Error.is_terminal());
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_string(&ScanState::Running).unwrap();
        assert_eq!(json, "\"running\"");
    }

    #[test]
    fn validated_trims_fields() {
        let request = ScanRequest {
            repository: "  https://example.com/demo.git ".to_string(),
            branch: " main ".to_string(),
            version: " 1.0 ".to_string(),
        };
        let request = request.validated().unwrap();
        assert_eq!(request.repository, "https://example.com/demo.git");
        assert_eq!(request.branch, "main");
        assert_eq!(request.version, "1.0");
    }

    #[test]
    fn validated_rejects_empty_branch() {
        let request = ScanRequest {
            repository: "https://example.com/demo.git".to_string(),
            branch: "   ".to_string(),
            version: "1.0".to_string(),
        };
        let err = request.validated().unwrap_err();
        assert!(err.to_string().contains("branch"));
    }

    #[test]
    fn validated_rejects_missing_fields_from_empty_body() {
        let request: ScanRequest = serde_json::from_str("{}").unwrap();
        assert!(request.validated().is_err());
    }

    #[test]
    fn snapshot_omits_unset_optionals() {
        let snapshot = ScanSnapshot {
            id: ScanId::new("demo_main_1_1"),
            repository: "demo".to_string(),
            branch: "main".to_string(),
            version: "1.0".to_string(),
            state: ScanState::Queued,
            output: vec![],
            start_time: None,
            end_time: None,
            exit_code: None,
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(!json.contains("end_time"));
        assert!(!json.contains("exit_code"));
    }
}
