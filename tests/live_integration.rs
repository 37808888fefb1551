use std::{
    fs,
    time::{SystemTime, UNIX_EPOCH},
};

use rsq_warehouse::{
    AwsCredentials, DataApiConnection, DirectConnection, Params, PollOptions, Value,
    WarehouseError, DEFAULT_PORT,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct SecretsFile {
    #[serde(rename = "AWS_ACCESS_KEY_ID")]
    access_key_id: Option<String>,
    #[serde(rename = "AWS_SECRET_ACCESS_KEY")]
    secret_access_key: Option<String>,
    #[serde(rename = "AWS_SESSION_TOKEN")]
    session_token: Option<String>,
    #[serde(rename = "AWS_REGION")]
    region: Option<String>,
    #[serde(rename = "REDSHIFT_WORKGROUP")]
    workgroup: Option<String>,
    #[serde(rename = "REDSHIFT_DATABASE")]
    database: Option<String>,
    #[serde(rename = "REDSHIFT_HOST")]
    host: Option<String>,
}

struct LiveConfig {
    credentials: AwsCredentials,
    region: String,
    workgroup: String,
    database: String,
    host: Option<String>,
}

fn env_or(name: &str, fallback: Option<String>) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or(fallback)
}

fn load_live_config() -> Result<LiveConfig, String> {
    let secrets = match fs::read_to_string("secrets.json") {
        Ok(content) => Some(
            serde_json::from_str::<SecretsFile>(&content)
                .map_err(|err| format!("secrets.json could not be parsed: {err}"))?,
        ),
        Err(_) => None,
    };
    let pick = |name: &str, field: fn(&SecretsFile) -> Option<String>| {
        env_or(name, secrets.as_ref().and_then(field))
    };
    let required = |name: &str, field: fn(&SecretsFile) -> Option<String>| {
        pick(name, field).ok_or_else(|| format!("{name} env or secrets.json entry is required"))
    };

    let mut credentials = AwsCredentials::new(
        required("AWS_ACCESS_KEY_ID", |s| s.access_key_id.clone())?,
        required("AWS_SECRET_ACCESS_KEY", |s| s.secret_access_key.clone())?,
    );
    if let Some(token) = pick("AWS_SESSION_TOKEN", |s| s.session_token.clone()) {
        credentials = credentials.with_session_token(token);
    }

    Ok(LiveConfig {
        credentials,
        region: required("AWS_REGION", |s| s.region.clone())?,
        workgroup: required("REDSHIFT_WORKGROUP", |s| s.workgroup.clone())?,
        database: required("REDSHIFT_DATABASE", |s| s.database.clone())?,
        host: pick("REDSHIFT_HOST", |s| s.host.clone()),
    })
}

fn unique_suffix() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock must be after epoch")
        .as_millis()
}

#[tokio::test]
async fn live_data_api_roundtrip_and_failure() {
    let config = match load_live_config() {
        Ok(config) => config,
        Err(_) => {
            eprintln!("skipping live test: credentials not found in env or secrets.json");
            return;
        }
    };

    let db = DataApiConnection::new(
        config.workgroup,
        config.database,
        config.region,
        config.credentials,
    )
    .with_poll_options(PollOptions {
        max_wait_ms: Some(120_000),
        ..PollOptions::default()
    });
    let table = format!("rsq_live_{}", unique_suffix());

    db.query(&format!("CREATE TABLE {table} (id INT, name VARCHAR(32))"))
        .await
        .expect("table creation must succeed");

    let inserted = db
        .query_with_params(
            &format!("INSERT INTO {table} VALUES (:id, :name)"),
            [("id", Value::integer(1)), ("name", Value::text("kit"))],
        )
        .await
        .expect("insert must succeed");
    assert!(inserted.is_empty());

    let result = db
        .query_with_params(
            &format!("SELECT id, name FROM {table} WHERE name = :name"),
            Params::named([("name", Value::text("kit"))]),
        )
        .await
        .expect("query must succeed");
    assert_eq!(result.num_rows(), 1);
    assert_eq!(result.get(0, "id"), Some(&Value::Integer(1)));

    let err = db
        .query(&format!("SELEC * FROM {table}"))
        .await
        .expect_err("syntax error must fail");
    assert!(matches!(err, WarehouseError::QueryExecution { .. }));

    db.query(&format!("DROP TABLE IF EXISTS {table}"))
        .await
        .expect("cleanup must succeed");
}

#[tokio::test]
async fn live_direct_connection_select() {
    let config = match load_live_config() {
        Ok(config) if config.host.is_some() => config,
        _ => {
            eprintln!("skipping live test: REDSHIFT_HOST and credentials are required");
            return;
        }
    };
    let host = config.host.clone().unwrap_or_default();

    let mut db = DirectConnection::new(
        config.workgroup,
        config.database,
        config.region,
        host,
        DEFAULT_PORT,
        config.credentials,
    );

    let result = db
        .query("SELECT 1::int8 AS one, 'kit'::varchar AS name")
        .await
        .expect("query must succeed");
    assert_eq!(result.get(0, "one"), Some(&Value::Integer(1)));
    assert_eq!(result.get(0, "name"), Some(&Value::text("kit")));

    let typed = db
        .query(
            "SELECT 12.50::numeric(10,2) AS amount, DATE '2024-02-17' AS day, \
             NULL::date AS missing",
        )
        .await
        .expect("numeric and date query must succeed");
    assert_eq!(typed.get(0, "amount"), Some(&Value::text("12.50")));
    assert_eq!(typed.get(0, "day"), Some(&Value::text("2024-02-17")));
    assert_eq!(typed.get(0, "missing"), Some(&Value::Null));

    let table = format!("rsq_direct_{}", unique_suffix());
    let last = db
        .query(&format!(
            "CREATE TEMP TABLE {table} (id INT); \
             INSERT INTO {table} VALUES (7); \
             SELECT id FROM {table}"
        ))
        .await
        .expect("multi-statement query must succeed");
    assert_eq!(last.num_rows(), 1);
    assert_eq!(last.get(0, "id"), Some(&Value::text("7")));

    db.close().await.expect("close must succeed");
}
