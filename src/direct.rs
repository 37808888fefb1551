use std::{error::Error as StdError, fmt};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use tokio_postgres::{
    error::SqlState,
    types::{FromSql, Type},
    Client, NoTls, SimpleQueryMessage,
};

use crate::{
    credentials::{
        required_env, AwsEnvironment, CredentialProvider, CredentialsSource,
        ServerlessCredentials,
    },
    Result, TabularResult, Value, WarehouseError,
};

/// Default Redshift port.
pub const DEFAULT_PORT: u16 = 5439;

/// Everything needed to open one wire-protocol session.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An open session able to run SQL.
#[async_trait]
pub trait SqlSession: Send {
    /// Runs one statement and returns all of its rows.
    async fn execute(&mut self, sql: &str) -> Result<TabularResult>;

    /// True once the underlying connection is known to be gone.
    fn is_closed(&self) -> bool;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Opens sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn SqlSession>>;
}

/// Connection state of a [`DirectConnection`].
pub enum ConnectionState {
    Disconnected,
    Connected(Box<dyn SqlSession>),
}

impl fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("Disconnected"),
            Self::Connected(_) => f.write_str("Connected"),
        }
    }
}

/// Runs SQL over one lazily opened wire-protocol connection.
///
/// Holds a single session, so one query is in flight at a time (`query`
/// takes `&mut self`); share it behind a mutex if several tasks need it.
///
/// A session found closed before a query is replaced with a fresh one. A
/// query that fails because the connection drops mid-flight is not retried:
/// the error is returned and the next call reconnects.
pub struct DirectConnection<C = PostgresConnector> {
    workgroup: String,
    database: String,
    host: String,
    port: u16,
    credentials: Box<dyn CredentialProvider>,
    connector: C,
    state: ConnectionState,
}

impl<C> fmt::Debug for DirectConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectConnection")
            .field("workgroup", &self.workgroup)
            .field("database", &self.database)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl DirectConnection<PostgresConnector> {
    /// Creates a disconnected client that fetches credentials from Redshift
    /// Serverless in `region`.
    pub fn new(
        workgroup: impl Into<String>,
        database: impl Into<String>,
        region: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        aws: impl Into<CredentialsSource>,
    ) -> Self {
        Self::with_parts(
            workgroup,
            database,
            host,
            port,
            ServerlessCredentials::new(region, aws),
            PostgresConnector,
        )
    }

    /// Creates a client from environment variables.
    ///
    /// Reads `REDSHIFT_WORKGROUP`, `REDSHIFT_DATABASE`, `REDSHIFT_HOST`,
    /// and optional `REDSHIFT_PORT` (default 5439). Region and AWS
    /// credentials come from [`AwsEnvironment::load`].
    pub async fn from_env() -> Result<Self> {
        let port = match std::env::var("REDSHIFT_PORT") {
            Ok(port) => port.trim().parse::<u16>().map_err(|err| {
                WarehouseError::Config(format!("invalid REDSHIFT_PORT '{port}': {err}"))
            })?,
            Err(_) => DEFAULT_PORT,
        };
        let workgroup = required_env("REDSHIFT_WORKGROUP")?;
        let database = required_env("REDSHIFT_DATABASE")?;
        let host = required_env("REDSHIFT_HOST")?;
        let aws = AwsEnvironment::load().await?;
        Ok(Self::new(
            workgroup,
            database,
            aws.region,
            host,
            port,
            aws.credentials,
        ))
    }
}

impl<C: Connector> DirectConnection<C> {
    pub fn with_parts(
        workgroup: impl Into<String>,
        database: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        credentials: impl CredentialProvider + 'static,
        connector: C,
    ) -> Self {
        Self {
            workgroup: workgroup.into(),
            database: database.into(),
            host: host.into(),
            port,
            credentials: Box::new(credentials),
            connector,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn workgroup(&self) -> &str {
        &self.workgroup
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// True when a session is held and has not reported itself closed.
    pub fn is_connected(&self) -> bool {
        match &self.state {
            ConnectionState::Connected(session) => !session.is_closed(),
            ConnectionState::Disconnected => false,
        }
    }

    /// Opens a session with freshly fetched credentials, replacing any
    /// session currently held.
    pub async fn connect(&mut self) -> Result<()> {
        let creds = self
            .credentials
            .get_credentials(&self.workgroup, &self.database)
            .await?;
        let params = ConnectParams {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            user: creds.user,
            password: creds.password,
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(host = %self.host, port = self.port, "opening direct connection");

        let session = self.connector.connect(&params).await?;
        self.state = ConnectionState::Connected(session);
        Ok(())
    }

    /// Executes a statement, connecting first if no live session is held.
    pub async fn query(&mut self, sql: &str) -> Result<TabularResult> {
        if !self.is_connected() {
            self.connect().await?;
        }
        self.session()?.execute(sql).await
    }

    /// Releases the session. Closing a disconnected client is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, ConnectionState::Disconnected) {
            ConnectionState::Connected(session) => session.close().await,
            ConnectionState::Disconnected => Ok(()),
        }
    }

    fn session(&mut self) -> Result<&mut Box<dyn SqlSession>> {
        match &mut self.state {
            ConnectionState::Connected(session) => Ok(session),
            ConnectionState::Disconnected => Err(WarehouseError::NotConnected),
        }
    }
}

/// Opens `tokio-postgres` sessions.
#[derive(Clone, Copy, Debug, Default)]
pub struct PostgresConnector;

#[async_trait]
impl Connector for PostgresConnector {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn SqlSession>> {
        let (client, connection) = tokio_postgres::Config::new()
            .host(&params.host)
            .port(params.port)
            .dbname(&params.database)
            .user(&params.user)
            .password(&params.password)
            .connect(NoTls)
            .await?;

        let driver = tokio::spawn(async move {
            if let Err(_err) = connection.await {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %_err, "direct connection closed with error");
            }
        });

        Ok(Box::new(PostgresSession { client, driver }))
    }
}

struct PostgresSession {
    client: Client,
    driver: tokio::task::JoinHandle<()>,
}

#[async_trait]
impl SqlSession for PostgresSession {
    async fn execute(&mut self, sql: &str) -> Result<TabularResult> {
        // Prepared first so column names are known even when no row comes back.
        let statement = match self.client.prepare(sql).await {
            Ok(statement) => statement,
            // Several statements in one string cannot be prepared.
            Err(err) if err.code() == Some(&SqlState::SYNTAX_ERROR) => {
                return self.execute_text(sql).await
            }
            Err(err) => return Err(err.into()),
        };
        if !all_typed(statement.columns().iter().map(|col| col.type_())) {
            return self.execute_text(sql).await;
        }

        let rows = self.client.query(&statement, &[]).await?;
        let columns = statement
            .columns()
            .iter()
            .map(|col| col.name().to_owned())
            .collect();
        let rows = rows
            .iter()
            .map(|row| {
                (0..row.len())
                    .map(|idx| Ok(row.try_get::<_, Cell>(idx)?.0))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        TabularResult::from_rows(columns, rows)
    }

    fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let PostgresSession { client, driver } = *self;
        drop(client);
        // The driver task ends once the client is gone.
        let _ = driver.await;
        Ok(())
    }
}

impl PostgresSession {
    /// Runs `sql` through the simple query protocol, where every cell comes
    /// back as text. Returns the rows of the last statement that produced
    /// a result set.
    async fn execute_text(&self, sql: &str) -> Result<TabularResult> {
        #[cfg(feature = "tracing")]
        tracing::debug!("running statement as simple query");

        let mut columns = Vec::new();
        let mut rows = Vec::new();
        for message in self.client.simple_query(sql).await? {
            match message {
                SimpleQueryMessage::RowDescription(description) => {
                    columns = description
                        .iter()
                        .map(|col| col.name().to_owned())
                        .collect();
                    rows.clear();
                }
                SimpleQueryMessage::Row(row) => {
                    let values = (0..row.len())
                        .map(|idx| {
                            Ok(row
                                .try_get(idx)?
                                .map_or(Value::Null, |text| Value::text(text)))
                        })
                        .collect::<Result<Vec<_>>>()?;
                    rows.push(values);
                }
                _ => {}
            }
        }
        TabularResult::from_rows(columns, rows)
    }
}

fn all_typed<'a>(mut types: impl Iterator<Item = &'a Type>) -> bool {
    types.all(<Cell as FromSql>::accepts)
}

/// One column value mapped onto [`Value`].
///
/// NUMERIC keeps its exact digits as text. Dates and times are ISO 8601
/// text, with `timestamptz` in UTC.
struct Cell(Value);

impl<'a> FromSql<'a> for Cell {
    fn from_sql(
        ty: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn StdError + Sync + Send>> {
        let value = match *ty {
            Type::BOOL => Value::Bool(bool::from_sql(ty, raw)?),
            Type::INT2 => Value::Integer(i16::from_sql(ty, raw)?.into()),
            Type::INT4 => Value::Integer(i32::from_sql(ty, raw)?.into()),
            Type::INT8 => Value::Integer(i64::from_sql(ty, raw)?),
            Type::OID => Value::Integer(u32::from_sql(ty, raw)?.into()),
            Type::FLOAT4 => Value::Float(f32::from_sql(ty, raw)?.into()),
            Type::FLOAT8 => Value::Float(f64::from_sql(ty, raw)?),
            Type::NUMERIC => Value::Text(Decimal::from_sql(ty, raw)?.to_string()),
            Type::DATE => Value::Text(
                NaiveDate::from_sql(ty, raw)?
                    .format("%Y-%m-%d")
                    .to_string(),
            ),
            Type::TIME => Value::Text(
                NaiveTime::from_sql(ty, raw)?
                    .format("%H:%M:%S%.f")
                    .to_string(),
            ),
            Type::TIMESTAMP => Value::Text(
                NaiveDateTime::from_sql(ty, raw)?
                    .format("%Y-%m-%dT%H:%M:%S%.f")
                    .to_string(),
            ),
            Type::TIMESTAMPTZ => Value::Text(
                DateTime::<Utc>::from_sql(ty, raw)?
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true),
            ),
            _ => Value::Text(String::from_sql(ty, raw)?),
        };
        Ok(Cell(value))
    }

    fn from_sql_null(_ty: &Type) -> std::result::Result<Self, Box<dyn StdError + Sync + Send>> {
        Ok(Cell(Value::Null))
    }

    fn accepts(ty: &Type) -> bool {
        match *ty {
            Type::BOOL
            | Type::INT2
            | Type::INT4
            | Type::INT8
            | Type::OID
            | Type::FLOAT4
            | Type::FLOAT8
            | Type::NUMERIC
            | Type::DATE
            | Type::TIME
            | Type::TIMESTAMP
            | Type::TIMESTAMPTZ => true,
            ref ty => <String as FromSql>::accepts(ty),
        }
    }
}
