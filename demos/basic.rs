use rsq_warehouse::{DataApiConnection, Params, PollOptions, Value};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let db = DataApiConnection::from_env().await?.with_poll_options(PollOptions {
        max_wait_ms: Some(60_000),
        ..PollOptions::default()
    });

    db.query("CREATE TABLE IF NOT EXISTS users (id INT, name VARCHAR(64))")
        .await?;

    db.query_with_params(
        "INSERT INTO users VALUES (:id, :name)",
        [("id", Value::integer(1)), ("name", Value::text("kit"))],
    )
    .await?;

    let result = db
        .query_with_params(
            "SELECT id, name FROM users WHERE name = :name",
            Params::named([("name", Value::text("kit"))]),
        )
        .await?;

    println!("{:?}", result.columns());
    for row in result.rows() {
        println!("{row:?}");
    }

    Ok(())
}
