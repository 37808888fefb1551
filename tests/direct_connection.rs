use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use rsq_warehouse::{
    ConnectParams, ConnectionState, Connector, CredentialProvider, DbCredentials,
    DirectConnection, SqlSession, TabularResult, Value, WarehouseError,
};

#[derive(Clone, Default)]
struct Counters {
    credential_calls: Arc<AtomicUsize>,
    connects: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    /// Set to make the current session report itself closed.
    drop_session: Arc<AtomicBool>,
    /// Set to make the next statement fail as if the socket died.
    fail_next: Arc<AtomicBool>,
    params: Arc<Mutex<Vec<ConnectParams>>>,
}

struct FakeCredentials {
    counters: Counters,
    fail: bool,
}

#[async_trait]
impl CredentialProvider for FakeCredentials {
    async fn get_credentials(
        &self,
        workgroup: &str,
        database: &str,
    ) -> rsq_warehouse::Result<DbCredentials> {
        let call = self.counters.credential_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            return Err(WarehouseError::Service {
                status: 400,
                code: "ResourceNotFoundException".to_owned(),
                message: format!("workgroup {workgroup} not found"),
            });
        }
        Ok(DbCredentials {
            user: format!("IAM:{workgroup}:{database}"),
            password: format!("secret-{call}"),
        })
    }
}

struct FakeConnector {
    counters: Counters,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, params: &ConnectParams) -> rsq_warehouse::Result<Box<dyn SqlSession>> {
        let generation = self.counters.connects.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.drop_session.store(false, Ordering::SeqCst);
        self.counters
            .params
            .lock()
            .expect("params mutex must not be poisoned")
            .push(params.clone());
        Ok(Box::new(FakeSession {
            counters: self.counters.clone(),
            generation,
        }))
    }
}

struct FakeSession {
    counters: Counters,
    generation: usize,
}

#[async_trait]
impl SqlSession for FakeSession {
    async fn execute(&mut self, sql: &str) -> rsq_warehouse::Result<TabularResult> {
        if self.counters.fail_next.swap(false, Ordering::SeqCst) {
            self.counters.drop_session.store(true, Ordering::SeqCst);
            return Err(WarehouseError::Decode("connection reset mid-query".to_owned()));
        }
        TabularResult::from_rows(
            vec!["sql".to_owned(), "session".to_owned()],
            [vec![
                Value::text(sql),
                Value::integer(i64::try_from(self.generation).expect("small generation")),
            ]],
        )
    }

    fn is_closed(&self) -> bool {
        self.counters.drop_session.load(Ordering::SeqCst)
    }

    async fn close(self: Box<Self>) -> rsq_warehouse::Result<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn client(counters: &Counters) -> DirectConnection<FakeConnector> {
    client_with(counters, false)
}

fn client_with(counters: &Counters, failing_credentials: bool) -> DirectConnection<FakeConnector> {
    DirectConnection::with_parts(
        "analytics",
        "dev",
        "analytics.123.us-east-1.redshift-serverless.amazonaws.com",
        5439,
        FakeCredentials {
            counters: counters.clone(),
            fail: failing_credentials,
        },
        FakeConnector {
            counters: counters.clone(),
        },
    )
}

fn session_of(result: &TabularResult) -> Option<&Value> {
    result.get(0, "session")
}

#[tokio::test]
async fn connects_lazily_and_reuses_the_session() {
    let counters = Counters::default();
    let mut db = client(&counters);
    assert!(!db.is_connected());
    assert!(matches!(db.state(), ConnectionState::Disconnected));

    let first = db.query("SELECT 1").await.expect("first query");
    let second = db.query("SELECT 2").await.expect("second query");

    assert_eq!(first.get(0, "sql"), Some(&Value::text("SELECT 1")));
    assert_eq!(session_of(&second), Some(&Value::Integer(1)));
    assert!(db.is_connected());
    assert_eq!(counters.connects.load(Ordering::SeqCst), 1);
    assert_eq!(counters.credential_calls.load(Ordering::SeqCst), 1);

    let params = counters.params.lock().expect("params mutex").clone();
    assert_eq!(params.len(), 1);
    assert_eq!(
        params[0].host,
        "analytics.123.us-east-1.redshift-serverless.amazonaws.com"
    );
    assert_eq!(params[0].port, 5439);
    assert_eq!(params[0].database, "dev");
    assert_eq!(params[0].user, "IAM:analytics:dev");
    assert_eq!(params[0].password, "secret-1");
}

#[tokio::test]
async fn closed_session_is_replaced_before_the_next_query() {
    let counters = Counters::default();
    let mut db = client(&counters);

    db.query("SELECT 1").await.expect("first query");
    counters.drop_session.store(true, Ordering::SeqCst);
    assert!(!db.is_connected());

    let result = db.query("SELECT 2").await.expect("query after reconnect");
    assert_eq!(session_of(&result), Some(&Value::Integer(2)));
    assert_eq!(counters.connects.load(Ordering::SeqCst), 2);
    // Fresh credentials for every new session.
    assert_eq!(counters.credential_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failure_mid_query_is_returned_not_retried() {
    let counters = Counters::default();
    let mut db = client(&counters);

    db.query("SELECT 1").await.expect("first query");
    counters.fail_next.store(true, Ordering::SeqCst);

    let err = db
        .query("UPDATE t SET x = 1")
        .await
        .expect_err("mid-query failure must surface");
    assert!(matches!(err, WarehouseError::Decode(_)));
    assert_eq!(counters.connects.load(Ordering::SeqCst), 1);

    let result = db.query("SELECT 3").await.expect("next query reconnects");
    assert_eq!(session_of(&result), Some(&Value::Integer(2)));
    assert_eq!(counters.connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn close_is_idempotent_and_query_reopens() {
    let counters = Counters::default();
    let mut db = client(&counters);

    db.close().await.expect("closing a disconnected client is a no-op");
    assert_eq!(counters.closes.load(Ordering::SeqCst), 0);

    db.query("SELECT 1").await.expect("first query");
    db.close().await.expect("close");
    db.close().await.expect("second close");
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    assert!(!db.is_connected());

    let result = db.query("SELECT 2").await.expect("query after close");
    assert_eq!(session_of(&result), Some(&Value::Integer(2)));
}

#[tokio::test]
async fn explicit_connect_replaces_current_session() {
    let counters = Counters::default();
    let mut db = client(&counters);

    db.connect().await.expect("connect");
    db.connect().await.expect("reconnect");
    let result = db.query("SELECT 1").await.expect("query");

    assert_eq!(session_of(&result), Some(&Value::Integer(2)));
    assert_eq!(counters.credential_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn credential_failure_leaves_client_disconnected() {
    let counters = Counters::default();
    let mut db = client_with(&counters, true);

    let err = db.query("SELECT 1").await.expect_err("must fail");
    assert!(matches!(err, WarehouseError::Service { .. }));
    assert!(!db.is_connected());
    assert_eq!(counters.connects.load(Ordering::SeqCst), 0);
}

#[test]
fn connect_params_debug_hides_password() {
    let params = ConnectParams {
        host: "localhost".to_owned(),
        port: 5439,
        database: "dev".to_owned(),
        user: "admin".to_owned(),
        password: "hunter2".to_owned(),
    };
    let debug = format!("{params:?}");
    assert!(debug.contains("admin"));
    assert!(!debug.contains("hunter2"));
}
