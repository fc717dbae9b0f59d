//! Crate-level support and BDD tests.

use std::collections::BTreeSet;
use std::io::BufRead;
use std::sync::{Mutex, PoisonError};

use magics_core::{DeviceRef, PlanItem};
use mockall::mock;
use serde_json::Value;

use crate::api::{EnvironmentAction, HistoryItem, PauseMode, StatusSnapshot};
use crate::client::QueueService;
use crate::error::{SessionError, TransportError};
use crate::monitor::{StatusReporter, StatusUpdate};
use crate::transport::{ApiRequest, Transport};

mod behaviour;

mock! {
    pub(crate) Transport {}
    impl Transport for Transport {
        fn execute(&self, request: &ApiRequest) -> Result<Value, TransportError>;
        fn open_stream(
            &self,
            request: &ApiRequest,
        ) -> Result<Box<dyn BufRead + Send>, TransportError>;
    }
}

mock! {
    pub(crate) QueueService {}
    impl QueueService for QueueService {
        fn status(&self) -> Result<StatusSnapshot, SessionError>;
        fn history(&self) -> Result<Vec<HistoryItem>, SessionError>;
        fn submit(&self, item: &PlanItem) -> Result<String, SessionError>;
        fn pause(&self, mode: PauseMode) -> Result<(), SessionError>;
        fn resume(&self) -> Result<(), SessionError>;
        fn stop(&self) -> Result<(), SessionError>;
        fn abort(&self) -> Result<(), SessionError>;
        fn remove_item(&self, item_uid: &str) -> Result<(), SessionError>;
        fn allowed_devices(&self) -> Result<Vec<DeviceRef>, SessionError>;
        fn allowed_plans(&self) -> Result<BTreeSet<String>, SessionError>;
        fn environment(&self, action: EnvironmentAction) -> Result<(), SessionError>;
        fn status_stream(&self) -> Result<Box<dyn BufRead + Send>, SessionError>;
    }
}

/// Reporter that keeps every update it receives.
#[derive(Default)]
pub(crate) struct RecordingReporter {
    updates: Mutex<Vec<StatusUpdate>>,
}

impl RecordingReporter {
    pub(crate) fn updates(&self) -> Vec<StatusUpdate> {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn terminal_count(&self) -> usize {
        self.updates()
            .iter()
            .filter(|update| matches!(update, StatusUpdate::Terminal(_)))
            .count()
    }
}

impl StatusReporter for RecordingReporter {
    fn report(&self, update: &StatusUpdate) {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(update.clone());
    }
}

pub(crate) fn executing(item_uid: &str, items_in_history: u64) -> StatusSnapshot {
    StatusSnapshot {
        manager_state: String::from("executing_queue"),
        running_item_uid: Some(item_uid.to_owned()),
        items_in_history,
        ..StatusSnapshot::default()
    }
}

pub(crate) fn paused(item_uid: &str) -> StatusSnapshot {
    StatusSnapshot {
        manager_state: String::from("paused"),
        ..executing(item_uid, 0)
    }
}

pub(crate) fn idle(items_in_history: u64) -> StatusSnapshot {
    StatusSnapshot {
        manager_state: String::from("idle"),
        items_in_history,
        ..StatusSnapshot::default()
    }
}
