use serde::{Deserialize, Serialize};

use crate::{QueryStatus, WrappedValue};

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecuteStatementRequest<'a> {
    pub workgroup_name: &'a str,
    pub database: &'a str,
    pub sql: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<SqlParameter>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct SqlParameter {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecuteStatementResponse {
    pub id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatementIdRequest<'a> {
    pub id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeStatementResponse {
    pub id: String,
    pub status: QueryStatus,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub has_result_set: Option<bool>,
    #[serde(default)]
    pub result_rows: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetStatementResultRequest<'a> {
    pub id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetStatementResultResponse {
    #[serde(default)]
    pub column_metadata: Vec<ColumnMetadata>,
    #[serde(default)]
    pub records: Vec<Vec<WrappedValue>>,
    #[serde(default)]
    pub next_token: Option<String>,
}

/// Only the name is used; the service sends more (type, nullable, ...).
#[derive(Debug, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCredentialsRequest<'a> {
    pub workgroup_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_name: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCredentialsResponse {
    pub db_user: String,
    pub db_password: String,
}

/// AWS JSON protocol error document.
#[derive(Debug, Deserialize)]
pub struct ErrorDocument {
    #[serde(rename = "__type", default)]
    pub kind: Option<String>,
    #[serde(alias = "Message", default)]
    pub message: Option<String>,
}

impl ErrorDocument {
    /// Exception name without the namespace prefix
    /// (`com.amazonaws...#ValidationException` -> `ValidationException`).
    pub fn code(&self) -> Option<&str> {
        let kind = self.kind.as_deref()?;
        Some(kind.rsplit('#').next().unwrap_or(kind))
    }
}
