use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

pub const EVENTS_FILE: &str = "provision.jsonl";
pub const STATUS_FILE: &str = "provision_status.json";

/// One entry of the provisioning event log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionEvent {
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub event_type: EventType,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventType {
    RunStarted,
    StepStarted { step: String },
    StepCompleted { step: String },
    StepSkipped { step: String, reason: String },
    StepRecovered { step: String, error: String },
    StepFailed { step: String, error: String },
    RunCompleted,
}

/// Records step transitions to `<workdir>/provision.jsonl`.
/// Write failures are swallowed; the log never decides the outcome of a run.
pub struct ProvisionTracker {
    run_id: String,
    output_dir: PathBuf,
    events: Vec<ProvisionEvent>,
}

impl ProvisionTracker {
    pub fn new(output_dir: PathBuf) -> Self {
        fs::create_dir_all(&output_dir).ok();

        Self {
            run_id: Utc::now().format("%Y%m%d%H%M%S").to_string(),
            output_dir,
            events: Vec::new(),
        }
    }

    pub fn add_event(&mut self, event_type: EventType, message: String) {
        let event = ProvisionEvent {
            timestamp: Utc::now(),
            run_id: self.run_id.clone(),
            event_type,
            message,
        };

        self.append_to_file(&event);
        self.events.push(event);
        self.save_current_status();
    }

    fn append_to_file(&self, event: &ProvisionEvent) {
        let events_file = self.output_dir.join(EVENTS_FILE);

        if let Ok(json) = serde_json::to_string(event) {
            if let Ok(mut file) = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&events_file)
            {
                writeln!(file, "{}", json).ok();
            }
        }
    }

    fn save_current_status(&self) {
        let status_file = self.output_dir.join(STATUS_FILE);

        if let Some(event) = self.events.last() {
            let status = serde_json::json!({
                "run_id": self.run_id,
                "last_update": event.timestamp,
                "current_message": event.message,
                "event_type": event.event_type,
                "total_events": self.events.len(),
            });

            if let Ok(json) = serde_json::to_string_pretty(&status) {
                fs::write(&status_file, json).ok();
            }
        }
    }

    pub fn run_started(&mut self) {
        self.add_event(EventType::RunStarted, "Provisioning started".to_string());
    }

    pub fn step_started(&mut self, step: &str) {
        self.add_event(
            EventType::StepStarted { step: step.to_string() },
            format!("{} started", step),
        );
    }

    pub fn step_completed(&mut self, step: &str) {
        self.add_event(
            EventType::StepCompleted { step: step.to_string() },
            format!("{} completed", step),
        );
    }

    pub fn step_skipped(&mut self, step: &str, reason: &str) {
        self.add_event(
            EventType::StepSkipped {
                step: step.to_string(),
                reason: reason.to_string(),
            },
            format!("{} skipped: {}", step, reason),
        );
    }

    pub fn step_recovered(&mut self, step: &str, error: &str) {
        self.add_event(
            EventType::StepRecovered {
                step: step.to_string(),
                error: error.to_string(),
            },
            format!("{} failed, continuing: {}", step, error),
        );
    }

    pub fn step_failed(&mut self, step: &str, error: &str) {
        self.add_event(
            EventType::StepFailed {
                step: step.to_string(),
                error: error.to_string(),
            },
            format!("{} failed: {}", step, error),
        );
    }

    pub fn run_completed(&mut self) {
        self.add_event(EventType::RunCompleted, "All tasks completed".to_string());
    }

    /// Reads events back from an event log, skipping lines that do not parse
    #[cfg(test)]
    pub fn read_events_from_file(events_file: &std::path::Path) -> Vec<ProvisionEvent> {
        let mut events = Vec::new();

        if let Ok(content) = fs::read_to_string(events_file) {
            for line in content.lines() {
                if let Ok(event) = serde_json::from_str::<ProvisionEvent>(line) {
                    events.push(event);
                }
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_written_as_json_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let mut tracker = ProvisionTracker::new(tmp.path().to_path_buf());

        tracker.run_started();
        tracker.step_started("update");
        tracker.step_recovered("update", "command failed");
        tracker.run_completed();

        let events = ProvisionTracker::read_events_from_file(&tmp.path().join(EVENTS_FILE));
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].event_type, EventType::RunStarted);
        assert_eq!(
            events[2].event_type,
            EventType::StepRecovered {
                step: "update".to_string(),
                error: "command failed".to_string(),
            }
        );
    }

    #[test]
    fn test_status_file_tracks_last_event() {
        let tmp = tempfile::tempdir().unwrap();
        let mut tracker = ProvisionTracker::new(tmp.path().to_path_buf());

        tracker.step_skipped("ensure-unzip", "unzip already installed");

        let status: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(tmp.path().join(STATUS_FILE)).unwrap()).unwrap();
        assert_eq!(status["total_events"], 1);
        assert_eq!(status["event_type"]["type"], "StepSkipped");
    }

    #[test]
    fn test_creates_output_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("gophish");
        let mut tracker = ProvisionTracker::new(dir.clone());
        tracker.run_started();
        assert!(dir.join(EVENTS_FILE).exists());
    }
}
