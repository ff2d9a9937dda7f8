//! Fail-closed handling of verification failures.
//!
//! Every failure ends the process. Before that, the failure is logged and,
//! when running in a cluster, recorded as a Warning event on the root
//! controller of this pod so repeated restarts add up on one event. The
//! event is diagnostic only: any error while writing it is logged and
//! dropped, and the process still exits.

use crate::config::{
    name_with_suffix, EVENT_NAME_SUFFIX, EVENT_REASON_LICENSE_VERIFICATION_FAILED,
    EVENT_SOURCE_LICENSE_VERIFIER,
};
use crate::error::{LicenseError, PlatformError, PlatformResult};
use crate::platform::{create_or_patch_event, detect_workload, ClusterPlatform};
use crate::shutdown::{ProcessExit, Shutdown, StdProcessExit};
use k8s_openapi::api::core::v1::EventSource;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Exit status used when a license fails verification.
pub const LICENSE_FAILURE_EXIT_CODE: i32 = 1;

/// Event type for failure events.
const EVENT_TYPE_WARNING: &str = "Warning";

/// Why no event was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The platform client was never built.
    NoClient,
    /// The process does not run inside a cluster.
    NotInCluster,
}

/// What the reporting step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// An event was created or updated.
    Recorded {
        namespace: String,
        name: String,
        count: i32,
    },
    /// Reporting was not attempted.
    Skipped(SkipReason),
}

/// Reports a verification failure and terminates the process.
#[derive(Clone)]
pub struct FailureHandler {
    shutdown: Shutdown,
    grace: Duration,
    exit: Arc<dyn ProcessExit>,
}

impl FailureHandler {
    /// Creates a handler that broadcasts on `shutdown`, waits up to `grace`
    /// for listeners, then exits the process.
    #[must_use]
    pub fn new(shutdown: Shutdown, grace: Duration) -> Self {
        Self {
            shutdown,
            grace,
            exit: Arc::new(StdProcessExit),
        }
    }

    /// Replaces the final exit step.
    #[must_use]
    pub fn with_process_exit(mut self, exit: Arc<dyn ProcessExit>) -> Self {
        self.exit = exit;
        self
    }

    /// Handles a failed verification.
    ///
    /// In production this does not return. It hands back `err` only when the
    /// configured [`ProcessExit`] returns.
    pub async fn handle(
        &self,
        platform: Option<&dyn ClusterPlatform>,
        err: LicenseError,
    ) -> LicenseError {
        error!(reason = %err, "Failed to verify license");

        // Reporting is best effort; termination below runs regardless.
        match self.report(platform, &err).await {
            Ok(ReportOutcome::Recorded {
                namespace,
                name,
                count,
            }) => info!(%namespace, %name, count, "recorded license failure event"),
            Ok(ReportOutcome::Skipped(reason)) => {
                debug!(?reason, "skipped license failure event")
            }
            Err(report_err) => warn!(error = %report_err, "failed to record license failure event"),
        }

        self.terminate().await;
        err
    }

    /// Writes the failure event on the root controller of this pod.
    pub async fn report(
        &self,
        platform: Option<&dyn ClusterPlatform>,
        err: &LicenseError,
    ) -> PlatformResult<ReportOutcome> {
        let Some(platform) = platform else {
            return Ok(ReportOutcome::Skipped(SkipReason::NoClient));
        };
        if !platform.possibly_in_cluster() {
            return Ok(ReportOutcome::Skipped(SkipReason::NotInCluster));
        }

        let pod = platform.current_pod()?;
        let root = detect_workload(platform, &pod.namespace, &pod.name).await?;
        let root_name = root
            .name
            .clone()
            .ok_or(PlatformError::MissingField("metadata.name"))?;

        let event_name = name_with_suffix(&root_name, EVENT_NAME_SUFFIX);
        let message = format!("Failed to verify license. Reason: {err}");

        let event = create_or_patch_event(platform, &pod.namespace, &event_name, move |mut ev| {
            let now = Time(chrono::Utc::now());
            ev.involved_object = root;
            ev.type_ = Some(EVENT_TYPE_WARNING.to_string());
            ev.source = Some(EventSource {
                component: Some(EVENT_SOURCE_LICENSE_VERIFIER.to_string()),
                ..Default::default()
            });
            ev.reason = Some(EVENT_REASON_LICENSE_VERIFICATION_FAILED.to_string());
            ev.message = Some(message);
            if ev.first_timestamp.is_none() {
                ev.first_timestamp = Some(now.clone());
            }
            ev.last_timestamp = Some(now);
            ev.count = Some(ev.count.unwrap_or(0) + 1);
            ev
        })
        .await?;

        Ok(ReportOutcome::Recorded {
            namespace: pod.namespace,
            name: event_name,
            count: event.count.unwrap_or_default(),
        })
    }

    /// Broadcasts shutdown, waits for listeners up to the grace period, then
    /// exits. The exit happens even if listeners never acknowledge.
    async fn terminate(&self) {
        self.shutdown.trigger();
        if !self.shutdown.drain(self.grace).await {
            warn!(
                pending = self.shutdown.listener_count(),
                grace = ?self.grace,
                "tasks still running after shutdown grace period"
            );
        }
        self.exit.exit(LICENSE_FAILURE_EXIT_CODE);
    }
}
