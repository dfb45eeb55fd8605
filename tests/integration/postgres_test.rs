//! Runs built-in task statements against a live PostgreSQL server.
//!
//! Set DATABASE_URL to a postgres:// URL to enable; otherwise each test is
//! skipped. Tables are created as TEMP so nothing outlives the connection.

use db_chores::config::{ConnectionConfig, RunnerConfig};
use db_chores::db::{DatabaseClient, PostgresClient};
use db_chores::query::QueryExecutor;
use db_chores::task::catalog;
use pretty_assertions::assert_eq;

async fn get_test_client() -> Option<PostgresClient> {
    let url = std::env::var("DATABASE_URL")
        .ok()
        .filter(|url| url.starts_with("postgres"))?;
    let config = ConnectionConfig::from_connection_string(&url).ok()?;
    PostgresClient::connect(&config, &RunnerConfig::default())
        .await
        .ok()
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[tokio::test]
async fn test_check_payment_ids_on_postgres() {
    let Some(mut client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set or unreachable");
        return;
    };
    for sql in [
        "CREATE TEMP TABLE payments (id BIGINT PRIMARY KEY, payment_id TEXT, bank_account_id UUID)",
        "INSERT INTO payments (id, payment_id) VALUES (1, 'abc123_0f_def456'), (2, 'XYZ')",
    ] {
        client.execute(sql, &[]).await.unwrap();
    }

    let invocation = catalog::find("check-payment-ids").unwrap().bind(&[]).unwrap();
    let result = QueryExecutor::new(&mut client).execute(&invocation).await.unwrap();
    client.close().await.unwrap();

    let rows = result.rows().unwrap();
    assert_eq!(rows.len(), 1);
    let record = rows.record(0).unwrap();
    assert_eq!(record.get("id").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(record.get("payment_id").and_then(|v| v.as_str()), Some("XYZ"));
}

#[tokio::test]
async fn test_delete_bank_account_binds_uuid_on_postgres() {
    let Some(mut client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set or unreachable");
        return;
    };
    for sql in [
        "CREATE TEMP TABLE bank_accounts (id UUID PRIMARY KEY, iban TEXT)",
        "INSERT INTO bank_accounts VALUES ('6f1c2b9e-3a4d-4c5e-8f70-1a2b3c4d5e6f', 'NL91ABNA0417164300')",
    ] {
        client.execute(sql, &[]).await.unwrap();
    }
    let task = catalog::find("delete-bank-account").unwrap();

    let missing = task
        .bind(&args(&["11111111-2222-4333-8444-555555555555"]))
        .unwrap();
    let result = QueryExecutor::new(&mut client).execute(&missing).await.unwrap();
    assert_eq!(result.affected_count(), Some(0));

    let present = task
        .bind(&args(&["6f1c2b9e-3a4d-4c5e-8f70-1a2b3c4d5e6f"]))
        .unwrap();
    let result = QueryExecutor::new(&mut client).execute(&present).await.unwrap();
    assert_eq!(result.affected_count(), Some(1));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_count_orphaned_payments_on_postgres() {
    let Some(mut client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set or unreachable");
        return;
    };
    for sql in [
        "CREATE TEMP TABLE bank_accounts (id UUID PRIMARY KEY)",
        "CREATE TEMP TABLE payments (id BIGINT PRIMARY KEY, payment_id TEXT, bank_account_id UUID)",
        "INSERT INTO bank_accounts VALUES ('6f1c2b9e-3a4d-4c5e-8f70-1a2b3c4d5e6f')",
        "INSERT INTO payments SELECT g, 'abc123_0f_def456', \
            CASE WHEN g <= 7 THEN '6f1c2b9e-3a4d-4c5e-8f70-1a2b3c4d5e6f'::uuid \
            ELSE gen_random_uuid() END FROM generate_series(1, 10) g",
    ] {
        client.execute(sql, &[]).await.unwrap();
    }

    let invocation = catalog::find("count-orphaned-payments")
        .unwrap()
        .bind(&[])
        .unwrap();
    let result = QueryExecutor::new(&mut client).execute(&invocation).await.unwrap();
    client.close().await.unwrap();

    let rows = result.rows().unwrap();
    assert_eq!(
        rows.record(0).unwrap().get("missing_count").and_then(|v| v.as_i64()),
        Some(3)
    );
}
