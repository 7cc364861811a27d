use crate::clist::{ClistClient, ContestSource};
use crate::config::{Config, FailureMode, Resource};
use crate::contest::{Contest, RawContest, format_start_bound, normalize};
use crate::errors::{AggregatorError, Result};
use crate::metrics_defs::UPSTREAM_REQUEST_DURATION;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

/// Queries every configured resource and combines the results into one
/// listing sorted by start time.
#[derive(Clone)]
pub struct Aggregator {
    source: Arc<dyn ContestSource>,
    resources: Arc<[Resource]>,
    failure_mode: FailureMode,
}

impl Aggregator {
    pub fn new(
        source: Arc<dyn ContestSource>,
        resources: Vec<Resource>,
        failure_mode: FailureMode,
    ) -> Self {
        Self {
            source,
            resources: resources.into(),
            failure_mode,
        }
    }

    /// Builds an aggregator backed by the clist.by client described in `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let client = ClistClient::new(&config.upstream)?;
        Ok(Self::new(
            Arc::new(client),
            config.resources.clone(),
            config.failure_mode,
        ))
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Fetches upcoming contests of all resources, starting after now.
    pub async fn upcoming_contests(&self) -> Result<Vec<Contest>> {
        let start_after = format_start_bound(Utc::now());
        let listings = self.fetch_all(&start_after).await?;
        Ok(normalize(listings))
    }

    /// Fans out one call per resource and waits for all of them. Listings
    /// are returned in resource order regardless of completion order.
    async fn fetch_all(&self, start_after: &str) -> Result<Vec<Vec<RawContest>>> {
        let mut join_set = JoinSet::new();

        for (index, resource) in self.resources.iter().cloned().enumerate() {
            let source = self.source.clone();
            let start_after = start_after.to_string();

            join_set.spawn(async move {
                let started = Instant::now();
                let result = source.fetch_upcoming(&resource, &start_after).await;
                record_upstream_duration(&resource.name, &result, started);

                (index, resource.name, result)
            });
        }

        let mut listings: Vec<Option<Vec<RawContest>>> =
            (0..self.resources.len()).map(|_| None).collect();
        let mut last_error = None;

        while let Some(join_result) = join_set.join_next().await {
            let (resource, error) = match join_result {
                Ok((index, _, Ok(contests))) => {
                    listings[index] = Some(contests);
                    continue;
                }
                Ok((_, resource, Err(e))) => (resource, e),
                Err(e) => ("unknown".to_string(), AggregatorError::TaskFailed(e.to_string())),
            };

            match self.failure_mode {
                FailureMode::AllOrNothing => {
                    // Calls still in flight run to completion on their own
                    join_set.detach_all();
                    return Err(error);
                }
                FailureMode::BestEffort => {
                    tracing::warn!(
                        resource = %resource,
                        error = %error,
                        status = ?error.upstream_status(),
                        "Skipping resource"
                    );
                    last_error = Some(error);
                }
            }
        }

        if listings.iter().all(Option::is_none)
            && let Some(e) = last_error
        {
            return Err(e);
        }

        Ok(listings.into_iter().flatten().collect())
    }
}

fn record_upstream_duration(resource: &str, result: &Result<Vec<RawContest>>, started: Instant) {
    let outcome = if result.is_ok() { "success" } else { "failure" };
    shared::histogram!(
        UPSTREAM_REQUEST_DURATION,
        "resource" => resource.to_string(),
        "outcome" => outcome
    )
    .record(started.elapsed().as_secs_f64());
}
