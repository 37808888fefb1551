use std::{
    fmt,
    sync::Arc,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::{
    provider::{ProvideCredentials, SharedCredentialsProvider},
    Credentials,
};
use tokio::sync::Mutex;

use crate::{
    transport::AwsJsonClient,
    wire::{GetCredentialsRequest, GetCredentialsResponse},
    ClientOptions, Result, WarehouseError,
};

/// Access keys used to sign requests.
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl AwsCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

/// Where request-signing keys come from.
///
/// Resolved keys are cached and fetched again once they are within five
/// minutes of expiring. Clones share the cache.
#[derive(Clone)]
pub struct CredentialsSource {
    provider: SharedCredentialsProvider,
    cached: Arc<Mutex<Option<Credentials>>>,
}

const REFRESH_BEFORE_EXPIRY: Duration = Duration::from_secs(300);

impl CredentialsSource {
    /// Wraps any AWS credentials provider, e.g. one from `aws-config`.
    pub fn from_provider(provider: impl ProvideCredentials + 'static) -> Self {
        Self {
            provider: SharedCredentialsProvider::new(provider),
            cached: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) async fn resolve(&self) -> Result<Credentials> {
        let mut cached = self.cached.lock().await;
        if let Some(credentials) = cached.as_ref() {
            if !expires_soon(credentials, SystemTime::now()) {
                return Ok(credentials.clone());
            }
        }

        let fresh = self
            .provider
            .provide_credentials()
            .await
            .map_err(|err| WarehouseError::Credentials(err.to_string()))?;

        #[cfg(feature = "tracing")]
        tracing::debug!(expiry = ?fresh.expiry(), "resolved aws credentials");

        *cached = Some(fresh.clone());
        Ok(fresh)
    }
}

impl fmt::Debug for CredentialsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsSource")
            .field("provider", &"<redacted>")
            .finish()
    }
}

impl From<AwsCredentials> for CredentialsSource {
    fn from(value: AwsCredentials) -> Self {
        Self::from_provider(Credentials::new(
            value.access_key_id,
            value.secret_access_key,
            value.session_token,
            None,
            "rsq-warehouse",
        ))
    }
}

fn expires_soon(credentials: &Credentials, now: SystemTime) -> bool {
    credentials
        .expiry()
        .is_some_and(|expiry| expiry <= now + REFRESH_BEFORE_EXPIRY)
}

/// Region and credentials from the standard AWS configuration chain:
/// environment, shared config and credentials files, SSO, web identity,
/// container and instance metadata.
#[derive(Clone, Debug)]
pub struct AwsEnvironment {
    pub region: String,
    pub credentials: CredentialsSource,
}

impl AwsEnvironment {
    pub async fn load() -> Result<Self> {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let region = config
            .region()
            .map(|region| region.to_string())
            .ok_or_else(|| WarehouseError::Config("no AWS region configured".to_owned()))?;
        let provider = config.credentials_provider().ok_or_else(|| {
            WarehouseError::Config("no AWS credentials provider configured".to_owned())
        })?;

        Ok(Self {
            region,
            credentials: CredentialsSource::from_provider(provider),
        })
    }
}

/// Database user and password for the wire-protocol connection.
#[derive(Clone, PartialEq, Eq)]
pub struct DbCredentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for DbCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Source of short-lived database credentials for a workgroup.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn get_credentials(&self, workgroup: &str, database: &str) -> Result<DbCredentials>;
}

/// Fetches temporary database credentials from Redshift Serverless
/// (`GetCredentials`).
#[derive(Clone, Debug)]
pub struct ServerlessCredentials {
    api: AwsJsonClient,
}

impl ServerlessCredentials {
    pub fn new(region: impl Into<String>, credentials: impl Into<CredentialsSource>) -> Self {
        let region = region.into();
        Self {
            api: AwsJsonClient::new(
                "redshift-serverless",
                "RedshiftServerless",
                &region,
                credentials.into(),
            ),
        }
    }

    /// Targets another endpoint, e.g. a local mock.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api = self.api.with_endpoint(endpoint);
        self
    }

    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.api = self.api.with_options(opts);
        self
    }
}

#[async_trait]
impl CredentialProvider for ServerlessCredentials {
    async fn get_credentials(&self, workgroup: &str, database: &str) -> Result<DbCredentials> {
        let response: GetCredentialsResponse = self
            .api
            .call(
                "GetCredentials",
                &GetCredentialsRequest {
                    workgroup_name: workgroup,
                    db_name: (!database.is_empty()).then_some(database),
                },
            )
            .await?;
        Ok(DbCredentials {
            user: response.db_user,
            password: response.db_password,
        })
    }
}

pub(crate) fn required_env(name: &str) -> Result<String> {
    let value = std::env::var(name)
        .map_err(|_| WarehouseError::Config(format!("missing {name} environment variable")))?;
    if value.trim().is_empty() {
        return Err(WarehouseError::Config(format!("{name} is set but empty")));
    }
    Ok(value)
}
