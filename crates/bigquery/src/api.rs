//! REST API client for the BigQuery v2 HTTP endpoints.
//!
//! Wraps job submission, status, cancellation and result retrieval plus
//! the handful of table calls the pipeline needs, using [`reqwest`].

use std::sync::Arc;

use crate::auth::{AuthError, TokenSource};
use crate::model::{Job, NewJob, QueryResults, Table, TableReference};

/// Public BigQuery endpoint.
pub const DEFAULT_API_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// HTTP client for the BigQuery REST API.
#[derive(Clone)]
pub struct BigQueryApi {
    client: reqwest::Client,
    api_url: String,
    auth: Arc<dyn TokenSource>,
}

/// Errors from the BigQuery REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum BigQueryApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// BigQuery returned a non-2xx status code.
    #[error("BigQuery API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// `tables.insert` hit an existing table.
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

impl BigQueryApiError {
    /// Worth retrying: transport failures, throttling and server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Auth(_) | Self::AlreadyExists(_) => false,
        }
    }
}

impl BigQueryApi {
    /// * `api_url` - Base URL, e.g. [`DEFAULT_API_URL`].
    pub fn new(api_url: impl Into<String>, auth: Arc<dyn TokenSource>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, auth)
    }

    pub fn with_client(
        client: reqwest::Client,
        api_url: impl Into<String>,
        auth: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            auth,
        }
    }

    /// Submit a job (`POST /projects/{p}/jobs`).
    pub async fn insert_job(&self, project: &str, job: &NewJob) -> Result<Job, BigQueryApiError> {
        let response = self
            .client
            .post(format!("{}/projects/{project}/jobs", self.api_url))
            .bearer_auth(self.auth.token().await?)
            .json(job)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Fetch the current state of a job.
    pub async fn get_job(
        &self,
        project: &str,
        job_id: &str,
        location: Option<&str>,
    ) -> Result<Job, BigQueryApiError> {
        let response = self
            .client
            .get(format!("{}/projects/{project}/jobs/{job_id}", self.api_url))
            .query(&location_query(location))
            .bearer_auth(self.auth.token().await?)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Request cancellation of a running job. BigQuery treats this as
    /// best-effort; the job may still complete.
    pub async fn cancel_job(
        &self,
        project: &str,
        job_id: &str,
        location: Option<&str>,
    ) -> Result<(), BigQueryApiError> {
        let response = self
            .client
            .post(format!(
                "{}/projects/{project}/jobs/{job_id}/cancel",
                self.api_url
            ))
            .query(&location_query(location))
            .bearer_auth(self.auth.token().await?)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Fetch one page of a finished query's results.
    pub async fn get_query_results(
        &self,
        project: &str,
        job_id: &str,
        location: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<QueryResults, BigQueryApiError> {
        let mut query = location_query(location);
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        let response = self
            .client
            .get(format!("{}/projects/{project}/queries/{job_id}", self.api_url))
            .query(&query)
            .bearer_auth(self.auth.token().await?)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Fetch table metadata, `None` if the table does not exist.
    pub async fn get_table(
        &self,
        table: &TableReference,
    ) -> Result<Option<Table>, BigQueryApiError> {
        let response = self
            .client
            .get(self.table_url(table))
            .bearer_auth(self.auth.token().await?)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::parse_response(response).await.map(Some)
    }

    /// Create a table. A 409 maps to [`BigQueryApiError::AlreadyExists`].
    pub async fn insert_table(&self, table: &Table) -> Result<Table, BigQueryApiError> {
        let reference = &table.table_reference;
        let response = self
            .client
            .post(format!(
                "{}/projects/{}/datasets/{}/tables",
                self.api_url, reference.project_id, reference.dataset_id
            ))
            .bearer_auth(self.auth.token().await?)
            .json(table)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            return Err(BigQueryApiError::AlreadyExists(reference.to_string()));
        }
        Self::parse_response(response).await
    }

    /// Patch table metadata with the given partial resource.
    pub async fn patch_table(
        &self,
        table: &TableReference,
        patch: &serde_json::Value,
    ) -> Result<Table, BigQueryApiError> {
        let response = self
            .client
            .patch(self.table_url(table))
            .bearer_auth(self.auth.token().await?)
            .json(patch)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    fn table_url(&self, table: &TableReference) -> String {
        format!(
            "{}/projects/{}/datasets/{}/tables/{}",
            self.api_url, table.project_id, table.dataset_id, table.table_id
        )
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`BigQueryApiError::Api`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, BigQueryApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(BigQueryApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BigQueryApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), BigQueryApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

fn location_query(location: Option<&str>) -> Vec<(&'static str, String)> {
    location
        .map(|l| vec![("location", l.to_string())])
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors() {
        let throttled = BigQueryApiError::Api {
            status: 429,
            body: String::new(),
        };
        let unavailable = BigQueryApiError::Api {
            status: 503,
            body: String::new(),
        };
        let bad_request = BigQueryApiError::Api {
            status: 400,
            body: String::new(),
        };
        assert!(throttled.is_transient());
        assert!(unavailable.is_transient());
        assert!(!bad_request.is_transient());
        assert!(!BigQueryApiError::AlreadyExists("p.d.t".into()).is_transient());
    }

    #[test]
    fn api_error_display() {
        let err = BigQueryApiError::Api {
            status: 403,
            body: "denied".into(),
        };
        assert_eq!(err.to_string(), "BigQuery API error (403): denied");
    }
}
