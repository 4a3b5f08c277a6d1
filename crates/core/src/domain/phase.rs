use serde::{Deserialize, Serialize};
use std::fmt;

/// State literals emitted by the aggregator backend. Matching is
/// case-sensitive.
pub mod state_literal {
    pub const PENDING: &str = "PENDING";
    pub const IN_PROGRESS: &str = "IN PROGRESS";
    pub const SUCCESS: &str = "SUCCESS";
    pub const COMPLETED: &str = "COMPLETED";
    pub const FAILURE: &str = "FAILURE";

    /// Closed set accepted when unknown literals are rejected.
    pub const KNOWN: [&str; 5] = [PENDING, IN_PROGRESS, SUCCESS, COMPLETED, FAILURE];
}

/// One stage of the fetch pipeline, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    PackageList,
    MetsDownload,
    IndexRefresh,
}

impl PhaseKind {
    pub const PIPELINE: [PhaseKind; 3] = [
        PhaseKind::PackageList,
        PhaseKind::MetsDownload,
        PhaseKind::IndexRefresh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PackageList => "package_list",
            Self::MetsDownload => "mets_download",
            Self::IndexRefresh => "index_refresh",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "package_list" => Some(Self::PackageList),
            "mets_download" => Some(Self::MetsDownload),
            "index_refresh" => Some(Self::IndexRefresh),
            _ => None,
        }
    }

    /// Human-readable label used in console output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::PackageList => "Downloading package lists",
            Self::MetsDownload => "Downloading AIP METS files",
            Self::IndexRefresh => "Refreshing search index",
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskState {
    /// Map a backend literal the way the aggregator UI always has: the two
    /// non-terminal literals and `FAILURE` are recognised, anything else is
    /// taken as success.
    pub fn from_literal(literal: &str) -> Self {
        match literal {
            state_literal::PENDING => Self::Pending,
            state_literal::IN_PROGRESS => Self::InProgress,
            state_literal::FAILURE => Self::Failed,
            _ => Self::Completed,
        }
    }

    /// Map a backend literal against the closed set only.
    pub fn parse_strict(literal: &str) -> Option<Self> {
        match literal {
            state_literal::PENDING => Some(Self::Pending),
            state_literal::IN_PROGRESS => Some(Self::InProgress),
            state_literal::SUCCESS | state_literal::COMPLETED => Some(Self::Completed),
            state_literal::FAILURE => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Decoded result of one status request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseStatus {
    pub phase: PhaseKind,
    pub state: TaskState,
    /// The literal the backend sent (for batches, the last element's).
    pub raw_state: String,
    /// Informative message, shown once per phase.
    pub message: Option<String>,
    /// Handoff token for the next phase.
    pub coordinator_id: Option<String>,
    /// Running count of processed units, when the phase reports one.
    pub processed: Option<u64>,
    /// Unit currently being processed.
    pub unit: Option<String>,
    /// Lines to display for this tick, in order.
    pub progress: Vec<String>,
}

impl PhaseStatus {
    pub fn new(phase: PhaseKind, raw_state: impl Into<String>, state: TaskState) -> Self {
        Self {
            phase,
            state,
            raw_state: raw_state.into(),
            message: None,
            coordinator_id: None,
            processed: None,
            unit: None,
            progress: Vec::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_coordinator(mut self, coordinator_id: impl Into<String>) -> Self {
        self.coordinator_id = Some(coordinator_id.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// A success literal other than `COMPLETED`, which the display surfaces
    /// verbatim.
    pub fn unrecognized_success(&self) -> Option<&str> {
        (self.state == TaskState::Completed && self.raw_state != state_literal::COMPLETED)
            .then_some(self.raw_state.as_str())
    }
}
