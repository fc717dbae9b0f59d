//! Plan commands: translation followed by submission, local execution or
//! recording.

use std::sync::Arc;

use magics_core::{
    JobRequest, Namespace, NamespaceValue, RegistryError, TranslateError, Translator, keys,
};
use magics_session::{StatusReporter, submit};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use super::{Backend, CommandOutcome, Console};
use crate::CLI_TARGET;
use crate::interrupt::Foreground;
use crate::local::LocalEngine;
use crate::output::IoStreams;
use crate::remote::RemoteBackend;
use crate::reporter::ConsoleReporter;

#[derive(Debug, Error)]
enum PlanError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Translate(#[from] TranslateError),
}

impl Console {
    pub(super) fn run_plan(&mut self, line: &str, alias: &str, args: &[String]) -> CommandOutcome {
        let request = match self.translate(alias, args) {
            Ok(request) => request,
            Err(error) => {
                info!(
                    target: CLI_TARGET,
                    event = "translation_failed",
                    alias,
                    error = %error,
                    "plan rejected before submission"
                );
                self.streams
                    .failure([error.to_string(), format!("Command: {line}")]);
                return CommandOutcome::Failed;
            }
        };
        info!(
            target: CLI_TARGET,
            event = "translated",
            correlation_id = %request.correlation_id(),
            plan = request.descriptor().name(),
            "plan translated"
        );

        match &mut self.backend {
            Backend::Remote(remote) => submit_remote(
                remote,
                &request,
                line,
                &self.streams,
                &self.namespace,
                &self.foreground,
            ),
            Backend::Local(engine) => run_local(engine.as_mut(), &request, line, &self.streams),
            Backend::Test => record(&request, line, &self.streams, &self.namespace),
        }
    }

    fn translate(&self, alias: &str, args: &[String]) -> Result<JobRequest, PlanError> {
        let descriptor = self.registry.resolve(alias)?;
        let request = Translator::new(&self.namespace)
            .with_metadata(&self.metadata)
            .translate(&descriptor, args)?;
        Ok(request)
    }
}

fn submit_remote(
    remote: &mut RemoteBackend,
    request: &JobRequest,
    line: &str,
    streams: &IoStreams,
    namespace: &Namespace,
    foreground: &Foreground,
) -> CommandOutcome {
    let reporter: Arc<dyn StatusReporter> = Arc::new(ConsoleReporter::new(streams.clone(), line));
    let job = match submit(remote.service().as_ref(), request, reporter) {
        Ok(job) => job,
        Err(error) => {
            warn!(
                target: CLI_TARGET,
                event = "submission_failed",
                correlation_id = %request.correlation_id(),
                error = %error,
                "plan submission failed"
            );
            streams.stderr.block([
                format!("Failed to submit plan to the remote server! Reason: {error}"),
                format!("*** Command: {line}"),
                format!("*** Correlation id: {}", request.correlation_id()),
            ]);
            return CommandOutcome::Failed;
        }
    };

    let ticket = job.ticket();
    namespace.add_to_namespace(
        keys::LAST_JOB,
        NamespaceValue::Json(json!({
            "correlation_id": ticket.correlation_id().as_str(),
            "item_uid": ticket.item_uid(),
            "alias": ticket.alias(),
        })),
    );
    foreground.set_job(job.clone());
    if let Err(error) = remote.follow(&job) {
        job.report_unknown(&error);
    }
    CommandOutcome::Done
}

fn run_local(
    engine: &mut dyn LocalEngine,
    request: &JobRequest,
    line: &str,
    streams: &IoStreams,
) -> CommandOutcome {
    match engine.run(request) {
        Ok(run) => {
            info!(
                target: CLI_TARGET,
                event = "local_run",
                correlation_id = %request.correlation_id(),
                run_uid = %run.run_uid,
                points = run.points,
                "plan finished locally"
            );
            streams.stdout.block([
                format!("Plan has finished successfully! | Run UID: {}", run.run_uid),
                format!("[{}] {} point(s) recorded", request.correlation_id(), run.points),
            ]);
            CommandOutcome::Done
        }
        Err(error) => {
            streams.failure([
                error.to_string(),
                format!("Command: {line}"),
                format!("Correlation id: {}", request.correlation_id()),
            ]);
            CommandOutcome::Failed
        }
    }
}

fn record(
    request: &JobRequest,
    line: &str,
    streams: &IoStreams,
    namespace: &Namespace,
) -> CommandOutcome {
    match serde_json::to_value(request.plan_item()) {
        Ok(wire) => {
            streams
                .stdout
                .line(format!("Plan recorded for testing: {wire}"));
            namespace.add_to_namespace(keys::TEST_DATA, NamespaceValue::Json(wire));
            CommandOutcome::Done
        }
        Err(error) => {
            streams.failure([error.to_string(), format!("Command: {line}")]);
            CommandOutcome::Failed
        }
    }
}
