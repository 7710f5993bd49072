use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::summary::RunSummary;

/// Scenario Runner lifecycle, `Idle -> Attaching -> Running(i) -> Finalizing -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunnerState {
    Idle,
    Attaching,
    Running { iteration: u32 },
    Finalizing,
}

/// Immutable event envelope handed to reporting sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: ReportPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReportPayload {
    Log {
        msg: String,
    },
    Finish {
        success: bool,
        results: Option<RunSummary>,
    },
    Lifecycle {
        state: RunnerState,
        details: Option<String>,
    },
}

impl ReportEvent {
    pub fn new(payload: ReportPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn log(msg: impl Into<String>) -> Self {
        Self::new(ReportPayload::Log { msg: msg.into() })
    }

    pub fn finish(success: bool, results: Option<RunSummary>) -> Self {
        Self::new(ReportPayload::Finish { success, results })
    }

    pub fn lifecycle(state: RunnerState, details: Option<String>) -> Self {
        Self::new(ReportPayload::Lifecycle { state, details })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_tagged_by_type() {
        let event = ReportEvent::log("Testing production");
        let value = serde_json::to_value(&event.payload).expect("serialize");
        assert_eq!(value["type"], "log");
        assert_eq!(value["msg"], "Testing production");

        let finish = ReportEvent::finish(false, None);
        let value = serde_json::to_value(&finish.payload).expect("serialize");
        assert_eq!(value["type"], "finish");
        assert_eq!(value["success"], false);
        assert!(value["results"].is_null());
    }
}
