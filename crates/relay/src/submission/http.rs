// HTTP client for the web application's collaboration API.

use async_trait::async_trait;
use url::Url;

use super::{SessionSubmission, SubmissionStore};
use crate::error::PersistenceError;

const SUBMISSION_PATH: &str = "/api/v1/collaboration";

/// Posts finished sessions to `{origin}/api/v1/collaboration?type=submitsession`.
///
/// No timeout and no retry: the call is best-effort and runs detached from
/// the room that produced it. Response bodies are ignored; any non-2xx status
/// is reported as [`PersistenceError::Rejected`].
#[derive(Debug, Clone)]
pub struct HttpSubmissionStore {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpSubmissionStore {
    pub fn new(origin: &str) -> Result<Self, PersistenceError> {
        Self::with_client(reqwest::Client::new(), origin)
    }

    pub fn with_client(client: reqwest::Client, origin: &str) -> Result<Self, PersistenceError> {
        let base = origin.trim().trim_end_matches('/');
        let mut endpoint = Url::parse(&format!("{base}{SUBMISSION_PATH}")).map_err(|source| {
            PersistenceError::InvalidOrigin { origin: origin.to_string(), source }
        })?;
        endpoint.query_pairs_mut().append_pair("type", "submitsession");

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl SubmissionStore for HttpSubmissionStore {
    async fn submit_session(&self, submission: &SessionSubmission) -> Result<(), PersistenceError> {
        let response = self.client.post(self.endpoint.clone()).json(submission).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PersistenceError::Rejected(status));
        }

        Ok(())
    }
}
