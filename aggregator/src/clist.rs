use crate::config::{Resource, UpstreamConfig};
use crate::contest::{ContestListing, RawContest};
use crate::errors::{AggregatorError, Result};
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

/// Source of upcoming contests for a single resource.
#[async_trait]
pub trait ContestSource: Send + Sync {
    /// Fetches contests of `resource` starting after `start_after`, an
    /// ISO-8601 timestamp.
    async fn fetch_upcoming(
        &self,
        resource: &Resource,
        start_after: &str,
    ) -> Result<Vec<RawContest>>;
}

/// Client for the clist.by v4 contest listing API.
#[derive(Clone)]
pub struct ClistClient {
    client: reqwest::Client,
    url: Url,
    username: String,
    api_key: String,
    limit: u32,
}

impl ClistClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(ClistClient {
            client,
            url: config.url.clone(),
            username: config.username.clone(),
            api_key: config.api_key.clone(),
            limit: config.limit,
        })
    }

    fn query_params(&self, resource: &Resource, start_after: &str) -> Vec<(&'static str, String)> {
        vec![
            ("username", self.username.clone()),
            ("api_key", self.api_key.clone()),
            ("upcoming", "true".to_string()),
            ("resource_id", resource.id.to_string()),
            ("limit", self.limit.to_string()),
            ("order_by", "start".to_string()),
            ("start__gt", start_after.to_string()),
        ]
    }
}

#[async_trait]
impl ContestSource for ClistClient {
    async fn fetch_upcoming(
        &self,
        resource: &Resource,
        start_after: &str,
    ) -> Result<Vec<RawContest>> {
        tracing::debug!(resource = %resource.name, id = resource.id, "Fetching upcoming contests");

        let response = self
            .client
            .get(self.url.clone())
            .query(&self.query_params(resource, start_after))
            .send()
            .await
            .map_err(|e| AggregatorError::from_reqwest(&resource.name, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AggregatorError::UpstreamStatus {
                resource: resource.name.clone(),
                status,
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AggregatorError::from_reqwest(&resource.name, e))?;

        let listing: ContestListing =
            serde_json::from_slice(&body).map_err(|e| AggregatorError::UpstreamPayload {
                resource: resource.name.clone(),
                message: e.to_string(),
            })?;

        let contests = listing.into_contests();
        tracing::debug!(
            resource = %resource.name,
            count = contests.len(),
            "Fetched upcoming contests"
        );
        Ok(contests)
    }
}
