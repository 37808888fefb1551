use async_trait::async_trait;

use crate::{
    credentials::CredentialsSource,
    transport::AwsJsonClient,
    wire::{
        DescribeStatementResponse, ExecuteStatementRequest, ExecuteStatementResponse,
        GetStatementResultRequest, GetStatementResultResponse, SqlParameter, StatementIdRequest,
    },
    ClientOptions, ResultPage, Result, StatementDescription,
};

/// Submit/poll/fetch operations of the warehouse's asynchronous SQL API.
///
/// [`crate::DataApiConnection`] drives its query state machine through this
/// trait. [`HttpDataApi`] is the network implementation.
#[async_trait]
pub trait DataApi: Send + Sync {
    /// Submits a statement and returns its handle.
    async fn execute_statement(
        &self,
        workgroup: &str,
        database: &str,
        sql: &str,
        parameters: Vec<SqlParameter>,
    ) -> Result<String>;

    async fn describe_statement(&self, id: &str) -> Result<StatementDescription>;

    /// Fetches one page of results; `next_token` is `None` for the first page.
    async fn get_statement_result(&self, id: &str, next_token: Option<&str>)
        -> Result<ResultPage>;

    async fn cancel_statement(&self, id: &str) -> Result<()>;
}

/// Redshift Data API over signed HTTPS.
#[derive(Clone, Debug)]
pub struct HttpDataApi {
    api: AwsJsonClient,
}

impl HttpDataApi {
    pub fn new(region: impl AsRef<str>, credentials: impl Into<CredentialsSource>) -> Self {
        Self {
            api: AwsJsonClient::new(
                "redshift-data",
                "RedshiftData",
                region.as_ref(),
                credentials.into(),
            ),
        }
    }

    /// Targets another endpoint, e.g. a local mock.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api = self.api.with_endpoint(endpoint);
        self
    }

    /// Applies HTTP timeout and retry behavior.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.api = self.api.with_options(opts);
        self
    }

    pub fn region(&self) -> &str {
        self.api.region()
    }

    pub fn endpoint(&self) -> &str {
        self.api.endpoint()
    }
}

#[async_trait]
impl DataApi for HttpDataApi {
    async fn execute_statement(
        &self,
        workgroup: &str,
        database: &str,
        sql: &str,
        parameters: Vec<SqlParameter>,
    ) -> Result<String> {
        let response: ExecuteStatementResponse = self
            .api
            .call(
                "ExecuteStatement",
                &ExecuteStatementRequest {
                    workgroup_name: workgroup,
                    database,
                    sql,
                    parameters,
                },
            )
            .await?;
        Ok(response.id)
    }

    async fn describe_statement(&self, id: &str) -> Result<StatementDescription> {
        let response: DescribeStatementResponse = self
            .api
            .call("DescribeStatement", &StatementIdRequest { id })
            .await?;
        Ok(StatementDescription {
            id: response.id,
            status: response.status,
            error: response.error,
            has_result_set: response.has_result_set.unwrap_or(false),
            result_rows: response.result_rows,
        })
    }

    async fn get_statement_result(
        &self,
        id: &str,
        next_token: Option<&str>,
    ) -> Result<ResultPage> {
        let response: GetStatementResultResponse = self
            .api
            .call(
                "GetStatementResult",
                &GetStatementResultRequest { id, next_token },
            )
            .await?;
        Ok(ResultPage {
            columns: response
                .column_metadata
                .into_iter()
                .map(|col| col.name)
                .collect(),
            records: response.records,
            next_token: response.next_token.filter(|token| !token.is_empty()),
        })
    }

    async fn cancel_statement(&self, id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .api
            .call("CancelStatement", &StatementIdRequest { id })
            .await?;
        Ok(())
    }
}
