use std::fmt;
use std::time::Instant;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    credentials::{required_env, AwsEnvironment, CredentialsSource},
    decode::{build_parameters, decode_records},
    DataApi, HttpDataApi, Params, PollOptions, Result, StatementDescription, StatusClass,
    TabularResult, WarehouseError,
};

/// Runs SQL through the warehouse's submit/poll/fetch API.
///
/// Every call owns its statement handle from submission to the last result
/// page; nothing is shared between calls, so one connection can serve
/// concurrent queries.
#[derive(Clone)]
pub struct DataApiConnection<A = HttpDataApi> {
    api: A,
    workgroup: String,
    database: String,
    poll: PollOptions,
}

impl<A> fmt::Debug for DataApiConnection<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataApiConnection")
            .field("workgroup", &self.workgroup)
            .field("database", &self.database)
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

impl DataApiConnection<HttpDataApi> {
    /// Creates a connection that talks to the regional Data API endpoint.
    pub fn new(
        workgroup: impl Into<String>,
        database: impl Into<String>,
        region: impl AsRef<str>,
        credentials: impl Into<CredentialsSource>,
    ) -> Self {
        Self::with_api(HttpDataApi::new(region, credentials), workgroup, database)
    }

    /// Creates a connection from environment variables.
    ///
    /// Reads `REDSHIFT_WORKGROUP` and `REDSHIFT_DATABASE`. Region and
    /// credentials come from [`AwsEnvironment::load`].
    pub async fn from_env() -> Result<Self> {
        let workgroup = required_env("REDSHIFT_WORKGROUP")?;
        let database = required_env("REDSHIFT_DATABASE")?;
        let aws = AwsEnvironment::load().await?;
        Ok(Self::new(workgroup, database, aws.region, aws.credentials))
    }

    pub fn region(&self) -> &str {
        self.api.region()
    }
}

impl<A: DataApi> DataApiConnection<A> {
    /// Creates a connection over any [`DataApi`] implementation.
    pub fn with_api(api: A, workgroup: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            api,
            workgroup: workgroup.into(),
            database: database.into(),
            poll: PollOptions::default(),
        }
    }

    /// Applies polling back-off and max-wait settings.
    pub fn with_poll_options(mut self, poll: PollOptions) -> Self {
        self.poll = poll;
        self
    }

    pub fn workgroup(&self) -> &str {
        &self.workgroup
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Executes a statement and waits for its result.
    ///
    /// Statements without a result set (DDL, INSERT, ...) return
    /// [`TabularResult::empty`].
    pub async fn query(&self, sql: &str) -> Result<TabularResult> {
        self.run(sql, Params::default(), None).await
    }

    /// Executes a statement with named `:param` values.
    pub async fn query_with_params<P: Into<Params>>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<TabularResult> {
        self.run(sql, params.into(), None).await
    }

    /// Executes a statement, giving up when `cancel` fires.
    ///
    /// On cancellation the statement is cancelled on the warehouse as well
    /// (best effort) and [`WarehouseError::Cancelled`] is returned.
    pub async fn query_with_cancel<P: Into<Params>>(
        &self,
        sql: &str,
        params: P,
        cancel: &CancellationToken,
    ) -> Result<TabularResult> {
        self.run(sql, params.into(), Some(cancel)).await
    }

    async fn run(
        &self,
        sql: &str,
        params: Params,
        cancel: Option<&CancellationToken>,
    ) -> Result<TabularResult> {
        let parameters = build_parameters(params)?;
        let id = self
            .api
            .execute_statement(&self.workgroup, &self.database, sql, parameters)
            .await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(query_id = %id, workgroup = %self.workgroup, "statement submitted");

        let description = self.wait_for_completion(&id, cancel).await?;
        if !description.has_result_set {
            return Ok(TabularResult::empty());
        }
        self.fetch_results(&id).await
    }

    /// Polls until the statement is terminal. Returns the FINISHED snapshot.
    async fn wait_for_completion(
        &self,
        id: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<StatementDescription> {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(self.abandon(id, Abandon::Cancelled).await);
            }

            let description = self.api.describe_statement(id).await?;

            #[cfg(feature = "tracing")]
            tracing::trace!(query_id = %id, status = %description.status, "statement polled");

            match description.status.class() {
                StatusClass::Finished => return Ok(description),
                StatusClass::Failed => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(query_id = %id, status = %description.status, "statement failed");

                    return Err(WarehouseError::QueryExecution {
                        query_id: id.to_owned(),
                        status: description.status,
                        message: description.error.unwrap_or_default(),
                    });
                }
                StatusClass::Pending => {}
            }

            let mut delay = self.poll.delay_for(attempt);
            if let Some(max_wait) = self.poll.max_wait() {
                let waited = started.elapsed();
                if waited >= max_wait {
                    return Err(self.abandon(id, Abandon::TimedOut(waited)).await);
                }
                delay = delay.min(max_wait - waited);
            }

            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            return Err(self.abandon(id, Abandon::Cancelled).await);
                        }
                        _ = sleep(delay) => {}
                    }
                }
                None => sleep(delay).await,
            }
            attempt = attempt.saturating_add(1);
        }
    }

    async fn fetch_results(&self, id: &str) -> Result<TabularResult> {
        let first = self.api.get_statement_result(id, None).await?;
        let columns = first.columns;
        let mut records = first.records;
        let mut next_token = first.next_token;

        while let Some(token) = next_token {
            let page = self.api.get_statement_result(id, Some(&token)).await?;
            records.extend(page.records);
            next_token = page.next_token;
        }

        decode_records(columns, records)
    }

    /// Asks the warehouse to stop a statement this call no longer waits for.
    async fn abandon(&self, id: &str, reason: Abandon) -> WarehouseError {
        // The caller gets the cancellation/timeout, not a cancel failure.
        if let Err(_err) = self.api.cancel_statement(id).await {
            #[cfg(feature = "tracing")]
            tracing::debug!(query_id = %id, error = %_err, "cancel request failed");
        }

        match reason {
            Abandon::Cancelled => WarehouseError::Cancelled {
                query_id: id.to_owned(),
            },
            Abandon::TimedOut(waited) => WarehouseError::PollTimeout {
                query_id: id.to_owned(),
                waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
            },
        }
    }
}

enum Abandon {
    Cancelled,
    TimedOut(std::time::Duration),
}
