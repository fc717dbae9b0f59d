//! Text rendering for status snapshots, history entries and help pages.

use magics_core::JobDescriptor;
use magics_session::{HistoryItem, RunResult, StatusSnapshot};
use serde_json::Value;
use time::OffsetDateTime;
use time::macros::format_description;

/// Tool commands with their one-line descriptions.
pub(crate) const TOOLS: &[(&str, &str)] = &[
    ("cs", "Print this help page, with all commands summarized."),
    ("show_md", "Print all configured metadata."),
    ("add_md", "Add metadata (key=value ...) applied to every following run."),
    ("remove_md", "Remove metadata entries by key."),
    ("wait_for_idle", "Wait until no plan is running. Use 'soft' to disable Ctrl+C aborts."),
    ("pause", "Request a pause of the running plan (immediate or deferred)."),
    ("resume", "Resume the paused plan."),
    ("stop", "Stop the running or paused plan, marking it successful."),
    ("abort", "Abort the last submitted plan."),
    ("requery", "Follow the last submitted plan again after its status was lost."),
    ("query_state", "Query the current server state."),
    ("query_history", "Query the item history, with exit statuses."),
    ("reload_devices", "Reload the list of available devices."),
    ("reload_plans", "Reload the list of available plans."),
    ("reload_environment", "Reopen the worker environment. Use 'force' to destroy it first."),
    ("exit", "Leave the console."),
];

pub(crate) fn status_snapshot(state: &StatusSnapshot) -> Vec<String> {
    vec![
        String::new(),
        format!("Version: {}", state.msg),
        String::from("Running state:"),
        format!("  Manager: {}", state.manager_state),
        format!(
            "  RunEngine: {} (Exists: {} | State: {})",
            state.re_state.as_deref().unwrap_or("none"),
            state.worker_environment_exists,
            state.worker_environment_state
        ),
        format!(
            "  Items:  Queue ({}) | History ({})",
            state.items_in_queue, state.items_in_history
        ),
        String::from("Server configuration:"),
        format!(
            "  Pause pending: {} | Stop pending: {}",
            state.pause_pending, state.queue_stop_pending
        ),
        format!("  Autostart: {}", state.queue_autostart_enabled),
        format!("  Loop: {}", state.plan_queue_mode.looping),
        String::new(),
    ]
}

/// Renders the history newest first.
pub(crate) fn history(items: &[HistoryItem]) -> Vec<String> {
    let mut lines = vec![
        String::from("Queue server history - more recent entries are at the top."),
        String::new(),
    ];
    for (index, item) in items.iter().rev().enumerate() {
        lines.extend(history_item(item, index));
        lines.push(String::new());
    }
    lines
}

fn history_item(item: &HistoryItem, index: usize) -> Vec<String> {
    let mut lines = vec![
        format!("=-- Entry #{index}: Plan --="),
        format!(" Plan name: {}", item.name),
        String::from(" Arguments"),
        format!("   args: {}", join_values(&item.args)),
    ];
    if !item.kwargs.is_empty() {
        let kwargs: Vec<String> = item
            .kwargs
            .iter()
            .map(|(key, value)| format!("'{key}' = {value}"))
            .collect();
        lines.push(format!("   kwargs: {}", kwargs.join(", ")));
    }
    lines.push(String::from(" Run metadata"));
    lines.push(format!("   User: {}", item.user.as_deref().unwrap_or("-")));
    lines.push(format!(
        "   User group: {}",
        item.user_group.as_deref().unwrap_or("-")
    ));
    if let Some(result) = &item.result {
        lines.extend(run_result(result));
    }
    lines
}

fn run_result(result: &RunResult) -> Vec<String> {
    let mut lines = vec![
        String::from(" Run result"),
        format!("   Exit status: {}", result.exit_status),
        format!(
            "   Time: {} - {} (Duration: {:.3}s)",
            timestamp(result.time_start),
            timestamp(result.time_stop),
            result.time_stop - result.time_start
        ),
    ];
    if !result.run_uids.is_empty() {
        lines.push(format!("   Run UUIDs: {}", result.run_uids.join(" ")));
        lines.push(format!("   Scan IDs: {}", join_values(&result.scan_ids)));
    }
    if !result.msg.is_empty() {
        lines.push(format!("   Exit message: {}", result.msg));
        lines.push(String::from("   Traceback:"));
        lines.extend(
            result
                .traceback
                .lines()
                .map(|line| format!("      {line}")),
        );
    }
    lines
}

// Times are shown in UTC, truncated to the second.
fn timestamp(seconds: f64) -> String {
    let whole = seconds.trunc() as i64;
    OffsetDateTime::from_unix_timestamp(whole)
        .ok()
        .and_then(|moment| {
            moment
                .format(format_description!(
                    "[hour]:[minute]:[second] ([day]/[month]/[year])"
                ))
                .ok()
        })
        .unwrap_or_else(|| String::from("unknown"))
}

fn join_values(values: &[Value]) -> String {
    values
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Help page listing the whitelisted plans and the tool commands.
pub(crate) fn command_summary(plans: &[std::sync::Arc<JobDescriptor>]) -> Vec<String> {
    let mut lines = vec![String::from("Plans:")];
    if plans.is_empty() {
        lines.push(String::from("  (none available)"));
    }
    lines.extend(
        plans
            .iter()
            .map(|plan| format!("  {:<18} {}", plan.alias(), plan.summary())),
    );
    lines.push(String::new());
    lines.push(String::from("Tools:"));
    lines.extend(
        TOOLS
            .iter()
            .map(|(name, description)| format!("  {name:<18} {description}")),
    );
    lines
}
