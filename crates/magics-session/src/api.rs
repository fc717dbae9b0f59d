//! Wire types and endpoints of the queue server's HTTP interface.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Endpoint paths relative to the server address.
pub mod endpoints {
    /// Session refresh.
    pub const REFRESH: &str = "/api/auth/session/refresh";
    /// Token revocation.
    pub const LOGOUT: &str = "/api/auth/logout";
    /// Manager status snapshot.
    pub const STATUS: &str = "/api/status";
    /// Newline-delimited job status events.
    pub const STATUS_STREAM: &str = "/api/status/stream";
    /// Completed items, oldest first.
    pub const HISTORY: &str = "/api/history/get";
    /// Queue an item and start it when the queue is idle.
    pub const EXECUTE: &str = "/api/item/execute";
    /// Remove a queued item.
    pub const QUEUE_ITEM_REMOVE: &str = "/api/queue/item/remove";
    /// Pause the running plan.
    pub const RE_PAUSE: &str = "/api/re/pause";
    /// Resume a paused plan.
    pub const RE_RESUME: &str = "/api/re/resume";
    /// Stop a paused plan, marking it successful.
    pub const RE_STOP: &str = "/api/re/stop";
    /// Abort a paused plan, marking it failed.
    pub const RE_ABORT: &str = "/api/re/abort";
    /// Devices the current user may use.
    pub const DEVICES_ALLOWED: &str = "/api/devices/allowed";
    /// Plans the current user may submit.
    pub const PLANS_ALLOWED: &str = "/api/plans/allowed";
    /// Open the worker environment.
    pub const ENVIRONMENT_OPEN: &str = "/api/environment/open";
    /// Close the worker environment.
    pub const ENVIRONMENT_CLOSE: &str = "/api/environment/close";
    /// Destroy the worker environment.
    pub const ENVIRONMENT_DESTROY: &str = "/api/environment/destroy";

    /// Login path for the given authentication provider.
    #[must_use]
    pub fn login(provider: &str) -> String {
        format!("/api/auth/provider/{provider}/token")
    }
}

/// Tokens granted by login or refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    /// Bearer token sent with each request.
    pub access_token: String,
    /// Token exchanged for a new grant.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires.
    #[serde(default)]
    pub expires_in: u64,
}

/// Queue execution mode flags.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlanQueueMode {
    /// Whether completed items are re-added to the queue.
    #[serde(rename = "loop")]
    pub looping: bool,
    /// Whether the queue keeps running after a failed item.
    pub ignore_failures: bool,
}

/// Snapshot returned by the status endpoint.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct StatusSnapshot {
    /// Server version message.
    pub msg: String,
    /// Items waiting in the queue.
    pub items_in_queue: u64,
    /// Items recorded in the history.
    pub items_in_history: u64,
    /// Uid of the item currently executing.
    pub running_item_uid: Option<String>,
    /// Manager state such as `idle`, `executing_queue` or `paused`.
    pub manager_state: String,
    /// Run engine state, when the worker exists.
    pub re_state: Option<String>,
    /// Whether the worker environment exists.
    pub worker_environment_exists: bool,
    /// Worker environment state.
    pub worker_environment_state: String,
    /// Queue mode flags.
    pub plan_queue_mode: PlanQueueMode,
    /// Whether the queue starts automatically.
    pub queue_autostart_enabled: bool,
    /// Whether a queue stop is pending.
    pub queue_stop_pending: bool,
    /// Whether a pause is pending.
    pub pause_pending: bool,
}

impl StatusSnapshot {
    /// Returns `true` when nothing is executing.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.manager_state == "idle"
    }

    /// Returns `true` when the running plan is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.manager_state == "paused"
    }
}

/// Outcome recorded for a finished item.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RunResult {
    /// `completed`, `failed`, `aborted`, `halted`, `stopped` or `unknown`.
    pub exit_status: String,
    /// Start time as seconds since the Unix epoch.
    pub time_start: f64,
    /// Stop time as seconds since the Unix epoch.
    pub time_stop: f64,
    /// Uids of the runs the item produced.
    pub run_uids: Vec<String>,
    /// Scan ids of the runs the item produced.
    pub scan_ids: Vec<Value>,
    /// Error message reported by the server.
    pub msg: String,
    /// Server-side traceback.
    pub traceback: String,
}

/// A finished item from the history.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HistoryItem {
    /// Plan name.
    pub name: String,
    /// Positional arguments.
    pub args: Vec<Value>,
    /// Keyword arguments.
    pub kwargs: Map<String, Value>,
    /// Submitting user.
    pub user: Option<String>,
    /// Submitting user's group.
    pub user_group: Option<String>,
    /// Server-assigned uid.
    pub item_uid: String,
    /// Recorded outcome.
    pub result: Option<RunResult>,
}

/// Capability flags of an allowed device.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceDescription {
    /// Whether the device can be moved.
    pub is_movable: bool,
    /// Whether the device can be read.
    pub is_readable: bool,
}

/// One line of the status stream.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StatusEvent {
    /// Item the event refers to.
    pub item_uid: String,
    /// `queued`, `running`, or an exit status.
    pub state: String,
    /// Error message for failed items.
    #[serde(default)]
    pub msg: String,
    /// Runs produced by a finished item.
    #[serde(default)]
    pub run_uids: Vec<String>,
}

/// How an executing plan is paused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PauseMode {
    /// Pause at the next checkpoint.
    #[default]
    Deferred,
    /// Pause as soon as possible.
    Immediate,
}

impl PauseMode {
    /// Wire spelling of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deferred => "deferred",
            Self::Immediate => "immediate",
        }
    }
}

/// Worker environment operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentAction {
    /// Create the worker and load devices.
    Open,
    /// Close the worker gracefully.
    Close,
    /// Kill the worker.
    Destroy,
}

impl EnvironmentAction {
    /// Endpoint performing the action.
    #[must_use]
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::Open => endpoints::ENVIRONMENT_OPEN,
            Self::Close => endpoints::ENVIRONMENT_CLOSE,
            Self::Destroy => endpoints::ENVIRONMENT_DESTROY,
        }
    }
}
