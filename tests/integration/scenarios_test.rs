//! End-to-end runs of the built-in tasks against a SQLite database file.

use super::fixtures::{Fixture, ACCOUNT_A, ACCOUNT_B};
use db_chores::db::Value;
use db_chores::report::OutputFormat;
use db_chores::task::{ArgKind, ArgSpec, SqlSource, SqlTemplate, StatementKind, TaskSpec};
use pretty_assertions::assert_eq;

async fn seed_accounts(fixture: &Fixture) {
    for id in [ACCOUNT_A, ACCOUNT_B] {
        fixture
            .exec(
                "INSERT INTO bank_accounts (id, iban) VALUES ($1, $2)",
                &[Value::String(id.into()), Value::String("NL91ABNA0417164300".into())],
            )
            .await;
    }
}

#[tokio::test]
async fn test_check_payment_ids_reports_only_malformed() {
    let fixture = Fixture::new().await;
    fixture
        .exec_all(&[
            "INSERT INTO payments (id, payment_id, bank_account_id) VALUES (1, 'abc123_0f_def456', NULL)",
            "INSERT INTO payments (id, payment_id, bank_account_id) VALUES (2, 'XYZ', NULL)",
        ])
        .await;

    let output = fixture.run("check-payment-ids", &[]).await;

    assert_eq!(output.code, 0);
    assert_eq!(output.stdout, "id=2, payment_id=XYZ\n(1 row)\n");
    assert_eq!(output.stderr, "");
}

#[tokio::test]
async fn test_check_payment_ids_flags_uppercase_and_null() {
    let fixture = Fixture::new().await;
    fixture
        .exec_all(&[
            "INSERT INTO payments (id, payment_id) VALUES (1, 'ABC123_0F_DEF456')",
            "INSERT INTO payments (id, payment_id) VALUES (2, NULL)",
            "INSERT INTO payments (id, payment_id) VALUES (3, '0a0b0c_ff_123456')",
            "INSERT INTO payments (id, payment_id) VALUES (4, '0a0b0c_ff_1234567')",
        ])
        .await;

    let output = fixture.run("check-payment-ids", &[]).await;

    assert_eq!(output.code, 0);
    assert_eq!(
        output.stdout,
        "id=1, payment_id=ABC123_0F_DEF456\nid=2, payment_id=NULL\nid=4, payment_id=0a0b0c_ff_1234567\n(3 rows)\n"
    );
}

#[tokio::test]
async fn test_check_payment_ids_keeps_one_line_per_row() {
    let fixture = Fixture::new().await;
    fixture
        .exec(
            "INSERT INTO payments (id, payment_id) VALUES (1, $1)",
            &[Value::String("abc123\n0f, def456".into())],
        )
        .await;

    let output = fixture.run("check-payment-ids", &[]).await;

    assert_eq!(output.code, 0);
    assert_eq!(
        output.stdout,
        "id=1, payment_id=\"abc123\\n0f, def456\"\n(1 row)\n"
    );
}

#[tokio::test]
async fn test_check_payment_ids_empty_table() {
    let fixture = Fixture::new().await;

    let output = fixture.run("check-payment-ids", &[]).await;

    assert_eq!(output.code, 0);
    assert_eq!(output.stdout, "(0 rows)\n");
}

#[tokio::test]
async fn test_check_payment_ids_json_output() {
    let fixture = Fixture::new().await;
    fixture
        .exec_all(&["INSERT INTO payments (id, payment_id) VALUES (2, 'XYZ')"])
        .await;

    let output = fixture
        .run_with_format("check-payment-ids", &[], OutputFormat::Json)
        .await;

    assert_eq!(output.code, 0);
    let parsed: serde_json::Value = serde_json::from_str(&output.stdout).unwrap();
    assert_eq!(
        parsed,
        serde_json::json!([{ "id": 2, "payment_id": "XYZ" }])
    );
}

#[tokio::test]
async fn test_delete_bank_account_without_argument_prints_usage() {
    let fixture = Fixture::new().await;
    seed_accounts(&fixture).await;

    let output = fixture.run("delete-bank-account", &[]).await;

    assert_eq!(output.code, 1);
    assert_eq!(output.stdout, "");
    assert!(output.stderr.starts_with("Validation Error: "));
    assert!(output
        .stderr
        .contains("usage: dbchore delete-bank-account <bank-account-id>"));
    assert_eq!(fixture.scalar("SELECT COUNT(*) FROM bank_accounts").await, 2);
}

#[tokio::test]
async fn test_delete_bank_account_rejects_malformed_uuid() {
    let fixture = Fixture::new().await;
    seed_accounts(&fixture).await;

    let output = fixture.run("delete-bank-account", &["not-a-uuid"]).await;

    assert_eq!(output.code, 1);
    assert!(output.stderr.starts_with("Validation Error: "));
    assert_eq!(fixture.scalar("SELECT COUNT(*) FROM bank_accounts").await, 2);
}

#[tokio::test]
async fn test_delete_bank_account_unknown_id_affects_nothing() {
    let fixture = Fixture::new().await;
    seed_accounts(&fixture).await;

    let output = fixture
        .run("delete-bank-account", &["11111111-2222-4333-8444-555555555555"])
        .await;

    assert_eq!(output.code, 0);
    assert_eq!(output.stdout, "affected_rows: 0\n");
    assert_eq!(fixture.scalar("SELECT COUNT(*) FROM bank_accounts").await, 2);
}

#[tokio::test]
async fn test_delete_bank_account_removes_row() {
    let fixture = Fixture::new().await;
    seed_accounts(&fixture).await;

    let output = fixture.run("delete-bank-account", &[ACCOUNT_A]).await;

    assert_eq!(output.code, 0);
    assert_eq!(output.stdout, "affected_rows: 1\n");
    assert_eq!(fixture.scalar("SELECT COUNT(*) FROM bank_accounts").await, 1);
    assert_eq!(
        fixture
            .scalar("SELECT COUNT(*) FROM bank_accounts WHERE id = '0b7e9c1d-2f3a-4b5c-9d8e-7f6a5b4c3d2e'")
            .await,
        1
    );
}

#[tokio::test]
async fn test_count_orphaned_payments() {
    let fixture = Fixture::new().await;
    seed_accounts(&fixture).await;
    for i in 1..=10 {
        let account = match i {
            1..=4 => ACCOUNT_A,
            5..=7 => ACCOUNT_B,
            _ => "99999999-0000-4000-8000-000000000000",
        };
        fixture
            .exec(
                "INSERT INTO payments (id, payment_id, bank_account_id) VALUES ($1, $2, $3)",
                &[
                    Value::Int(i),
                    Value::String(format!("abc123_0f_{i:06}")),
                    Value::String(account.into()),
                ],
            )
            .await;
    }

    let output = fixture.run("count-orphaned-payments", &[]).await;

    assert_eq!(output.code, 0);
    assert_eq!(output.stdout, "missing_count=3\n(1 row)\n");
}

#[tokio::test]
async fn test_inspect_rule() {
    let fixture = Fixture::new().await;
    fixture
        .exec_all(&[
            "INSERT INTO rules (id, name, enabled) VALUES (7, 'round-up', 1)",
            "INSERT INTO rules (id, name, enabled) VALUES (8, 'split', 0)",
        ])
        .await;

    let output = fixture.run("inspect-rule", &["7"]).await;

    assert_eq!(output.code, 0);
    assert_eq!(output.stdout, "id=7, name=round-up, enabled=1\n(1 row)\n");
}

#[tokio::test]
async fn test_inspect_rule_rejects_non_numeric_id() {
    let fixture = Fixture::new().await;

    for bad in ["abc", "0", "-3", "7; DROP TABLE rules"] {
        let output = fixture.run("inspect-rule", &[bad]).await;
        assert_eq!(output.code, 1, "{bad}");
        assert!(output.stderr.starts_with("Validation Error: "), "{bad}");
        assert!(output.stderr.contains("usage: dbchore inspect-rule <rule-id>"));
    }
    assert_eq!(fixture.scalar("SELECT COUNT(*) FROM rules").await, 0);
}

#[tokio::test]
async fn test_hostile_text_is_bound_not_spliced() {
    let fixture = Fixture::new().await;
    fixture
        .exec_all(&[
            "INSERT INTO payments (id, payment_id) VALUES (1, 'abc123_0f_def456')",
            "INSERT INTO payments (id, payment_id) VALUES (2, 'fedcba_01_654321')",
        ])
        .await;

    for hostile in ["' OR '1'='1", "x'; DELETE FROM payments; --"] {
        let output = fixture.run("inspect-payment", &[hostile]).await;
        assert_eq!(output.code, 0, "{hostile}");
        assert_eq!(output.stdout, "(0 rows)\n", "{hostile}");
    }
    assert_eq!(fixture.scalar("SELECT COUNT(*) FROM payments").await, 2);

    let output = fixture.run("inspect-payment", &["fedcba_01_654321"]).await;
    assert_eq!(output.code, 0);
    assert_eq!(
        output.stdout,
        "id=2, payment_id=fedcba_01_654321, bank_account_id=NULL\n(1 row)\n"
    );
}

#[tokio::test]
async fn test_truncate_table_defaults_to_staging() {
    let fixture = Fixture::new().await;
    fixture
        .exec_all(&[
            "INSERT INTO import_staging (raw) VALUES ('a'), ('b'), ('c'), ('d')",
            "INSERT INTO payment_events (payment_id) VALUES (1), (2)",
        ])
        .await;
    let before = fixture.scalar("SELECT COUNT(*) FROM import_staging").await;

    let output = fixture.run("truncate-table", &[]).await;

    assert_eq!(output.code, 0);
    assert_eq!(output.stdout, format!("affected_rows: {before}\n"));
    assert_eq!(fixture.scalar("SELECT COUNT(*) FROM import_staging").await, 0);
    assert_eq!(fixture.scalar("SELECT COUNT(*) FROM payment_events").await, 2);
}

#[tokio::test]
async fn test_truncate_table_named_target() {
    let fixture = Fixture::new().await;
    fixture
        .exec_all(&[
            "INSERT INTO import_staging (raw) VALUES ('a')",
            "INSERT INTO payment_events (payment_id) VALUES (1), (2)",
        ])
        .await;

    let output = fixture.run("truncate-table", &["payment_events"]).await;

    assert_eq!(output.code, 0);
    assert_eq!(output.stdout, "affected_rows: 2\n");
    assert_eq!(fixture.scalar("SELECT COUNT(*) FROM import_staging").await, 1);
}

#[tokio::test]
async fn test_truncate_table_rejects_unlisted_target() {
    let fixture = Fixture::new().await;
    fixture
        .exec_all(&["INSERT INTO payments (id, payment_id) VALUES (1, 'abc123_0f_def456')"])
        .await;

    for target in ["payments", "import_staging; DROP TABLE payments"] {
        let output = fixture.run("truncate-table", &[target]).await;
        assert_eq!(output.code, 1, "{target}");
        assert!(output.stderr.contains("must be one of: import_staging, payment_events"));
    }
    assert_eq!(fixture.scalar("SELECT COUNT(*) FROM payments").await, 1);
}

#[tokio::test]
async fn test_unknown_task_lists_available() {
    let fixture = Fixture::new().await;

    let output = fixture.run("drop-everything", &[]).await;

    assert_eq!(output.code, 1);
    assert!(output.stderr.starts_with("Validation Error: "));
    assert!(output.stderr.contains("check-payment-ids"));
}

#[tokio::test]
async fn test_unreachable_database_reports_connection_error() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!(
        "sqlite://{}",
        dir.path().join("missing").join("nested").join("chores.db").display()
    );
    let config = db_chores::config::ConnectionConfig::from_connection_string(&url).unwrap();
    let provider =
        db_chores::db::DatabaseProvider::new(config, db_chores::config::RunnerConfig::default());
    let reporter =
        db_chores::report::Reporter::new(Vec::new(), Vec::new(), OutputFormat::Text);
    let mut controller = db_chores::runner::InvocationController::new(&provider, reporter);

    let code = controller.run_named("check-payment-ids", &[]).await;
    let (out, err) = controller.into_reporter().into_parts();

    assert_eq!(code, 1);
    assert!(out.is_empty());
    assert!(String::from_utf8(err).unwrap().starts_with("Connection Error: "));
}

#[tokio::test]
async fn test_query_error_on_missing_table() {
    let fixture = Fixture::new().await;
    fixture.exec_all(&["DROP TABLE rules"]).await;

    let output = fixture.run("inspect-rule", &["1"]).await;

    assert_eq!(output.code, 1);
    assert_eq!(output.stdout, "");
    assert!(output.stderr.starts_with("Query Error: "));
}

const ARCHIVE_EVENTS: TaskSpec = TaskSpec {
    name: "archive-events",
    summary: "Drop events for one payment",
    kind: StatementKind::Mutation,
    sql: SqlSource::Fixed(SqlTemplate::portable(
        "DELETE FROM payment_events WHERE payment_id = $1",
    )),
    args: &[ArgSpec::required("payment", ArgKind::PositiveInt, "payment row id")],
    atomic: true,
};

#[tokio::test]
async fn test_atomic_mutation_commits() {
    let fixture = Fixture::new().await;
    fixture
        .exec_all(&["INSERT INTO payment_events (payment_id) VALUES (1), (1), (2)"])
        .await;

    let output = fixture.run_spec(&ARCHIVE_EVENTS, &["1"]).await;

    assert_eq!(output.code, 0);
    assert_eq!(output.stdout, "affected_rows: 2\n");
    assert_eq!(fixture.scalar("SELECT COUNT(*) FROM payment_events").await, 1);
}
