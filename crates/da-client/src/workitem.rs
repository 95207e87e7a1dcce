//! Work-item submission and the poll loop.

use crate::session::SessionClient;
use crate::transport::{ApiRequest, Body};
use da_core::{
    validate_arguments, Error, Outcome, ParameterContract, PollPolicy, WorkItemArgument,
    WorkItemStatus,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Submits one job at a time against an activity alias and drives it to
/// a terminal classification. Strictly sequential; no cancellation.
pub struct WorkItemOrchestrator {
    client: SessionClient,
    base_url: String,
    poll: PollPolicy,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: WorkItemStatus,
    #[serde(rename = "reportUrl", default)]
    report_url: Option<String>,
}

impl WorkItemOrchestrator {
    pub fn new(client: SessionClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            poll: PollPolicy::default(),
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Validates `arguments` against the activity's contract, then
    /// submits one work item referencing the aliased activity. Returns
    /// the remote work-item id.
    pub async fn submit(
        &self,
        activity_ref: &str,
        contract: &ParameterContract,
        arguments: &BTreeMap<String, WorkItemArgument>,
    ) -> Result<String, Error> {
        validate_arguments(contract, arguments)?;
        let wire: serde_json::Map<String, serde_json::Value> = arguments
            .iter()
            .map(|(name, arg)| (name.clone(), arg.to_wire()))
            .collect();
        let body = json!({ "activityId": activity_ref, "arguments": wire });
        let response = self
            .client
            .call(ApiRequest::post(
                format!("{}/workitems", self.base_url),
                Body::Json(body),
            ))
            .await?;
        let submitted: SubmitResponse = response.json()?;
        info!(work_item = %submitted.id, activity = activity_ref, "submitted work item");
        Ok(submitted.id)
    }

    /// Polls until the work item reaches a terminal status.
    ///
    /// The loop continues on `pending`/`inprogress` and sleeps per the
    /// poll policy between attempts. A transport or decode failure is
    /// folded into the synthetic terminal status `error` with no report
    /// URL and is never retried; policy exhaustion yields `timeout`.
    /// Poll-time failures are reported through the outcome, not raised.
    pub async fn await_completion(&self, id: &str) -> Outcome {
        let url = format!("{}/workitems/{}", self.base_url, id);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let response = match self.client.call(ApiRequest::get(url.clone())).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(work_item = id, error = %e, "status poll failed");
                    return Outcome {
                        status: WorkItemStatus::Error,
                        report_url: None,
                    };
                }
            };
            let parsed: StatusResponse = match response.json() {
                Ok(p) => p,
                Err(e) => {
                    warn!(work_item = id, error = %e, "unreadable status response");
                    return Outcome {
                        status: WorkItemStatus::Error,
                        report_url: None,
                    };
                }
            };
            info!(work_item = id, status = %parsed.status, "work item status");
            if parsed.status.is_terminal() {
                return Outcome {
                    status: parsed.status,
                    report_url: parsed.report_url,
                };
            }
            if self.poll.exhausted(attempt) {
                warn!(work_item = id, attempts = attempt, "poll budget exhausted");
                return Outcome {
                    status: WorkItemStatus::Timeout,
                    report_url: parsed.report_url,
                };
            }
            tokio::time::sleep(self.poll.delay_for(attempt)).await;
        }
    }

    /// Submit then await. Submission errors propagate; poll outcomes do
    /// not (check `Outcome::status`).
    pub async fn run(
        &self,
        activity_ref: &str,
        contract: &ParameterContract,
        arguments: &BTreeMap<String, WorkItemArgument>,
    ) -> Result<Outcome, Error> {
        let id = self.submit(activity_ref, contract, arguments).await?;
        Ok(self.await_completion(&id).await)
    }
}
