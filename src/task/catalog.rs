//! Built-in maintenance tasks.

use super::{ArgKind, ArgSpec, SqlSource, SqlTemplate, StatementKind, TaskSpec};

/// Payment IDs look like `abc123_0f_def456`.
pub const PAYMENT_ID_PATTERN: &str = "^[0-9a-f]{6}_[0-9a-f]{2}_[0-9a-f]{6}$";

const CHECK_PAYMENT_IDS: SqlTemplate = SqlTemplate::dialects(
    r#"
    SELECT id, payment_id
    FROM payments
    WHERE payment_id IS NULL
       OR payment_id !~ '^[0-9a-f]{6}_[0-9a-f]{2}_[0-9a-f]{6}$'
    ORDER BY id
    "#,
    // SQLite has no regex operator; GLOB matches the same fixed-width shape.
    r#"
    SELECT id, payment_id
    FROM payments
    WHERE payment_id IS NULL
       OR NOT (payment_id GLOB '[0-9a-f][0-9a-f][0-9a-f][0-9a-f][0-9a-f][0-9a-f]_[0-9a-f][0-9a-f]_[0-9a-f][0-9a-f][0-9a-f][0-9a-f][0-9a-f][0-9a-f]')
    ORDER BY id
    "#,
);

const TRUNCATE_TARGETS: &[(&str, SqlTemplate)] = &[
    (
        "import_staging",
        SqlTemplate::portable("DELETE FROM import_staging"),
    ),
    (
        "payment_events",
        SqlTemplate::portable("DELETE FROM payment_events"),
    ),
];

/// Every task the binary knows, in listing order.
pub static TASKS: &[TaskSpec] = &[
    TaskSpec {
        name: "check-payment-ids",
        summary: "List payments whose payment_id is missing or malformed",
        kind: StatementKind::Query,
        sql: SqlSource::Fixed(CHECK_PAYMENT_IDS),
        args: &[],
        atomic: false,
    },
    TaskSpec {
        name: "delete-bank-account",
        summary: "Delete one bank account by id",
        kind: StatementKind::Mutation,
        sql: SqlSource::Fixed(SqlTemplate::portable(
            "DELETE FROM bank_accounts WHERE id = $1",
        )),
        args: &[ArgSpec::required(
            "bank-account-id",
            ArgKind::Uuid,
            "UUID of the bank account to delete",
        )],
        atomic: false,
    },
    TaskSpec {
        name: "inspect-rule",
        summary: "Show one rule by numeric id",
        kind: StatementKind::Query,
        sql: SqlSource::Fixed(SqlTemplate::portable("SELECT * FROM rules WHERE id = $1")),
        args: &[ArgSpec::required(
            "rule-id",
            ArgKind::PositiveInt,
            "numeric id of the rule",
        )],
        atomic: false,
    },
    TaskSpec {
        name: "inspect-payment",
        summary: "Show payments carrying a given payment_id",
        kind: StatementKind::Query,
        sql: SqlSource::Fixed(SqlTemplate::portable(
            "SELECT * FROM payments WHERE payment_id = $1 ORDER BY id",
        )),
        args: &[ArgSpec::required(
            "payment-id",
            ArgKind::Text,
            "payment_id to look up",
        )],
        atomic: false,
    },
    TaskSpec {
        name: "count-orphaned-payments",
        summary: "Count payments whose bank account no longer exists",
        kind: StatementKind::Query,
        sql: SqlSource::Fixed(SqlTemplate::portable(
            r#"
            SELECT COUNT(*) AS missing_count
            FROM payments p
            LEFT JOIN bank_accounts b ON b.id = p.bank_account_id
            WHERE b.id IS NULL
            "#,
        )),
        args: &[],
        atomic: false,
    },
    TaskSpec {
        name: "truncate-table",
        summary: "Remove every row from an allow-listed table",
        kind: StatementKind::Mutation,
        sql: SqlSource::PerTarget(TRUNCATE_TARGETS),
        args: &[ArgSpec::optional(
            "table",
            ArgKind::Target,
            "import_staging",
            "table to empty",
        )],
        atomic: false,
    },
];

/// Looks up a task by name.
pub fn find(name: &str) -> Option<&'static TaskSpec> {
    TASKS.iter().find(|task| task.name == name)
}

/// Human-readable listing of every task, its summary, usage and arguments.
pub fn describe_tasks() -> String {
    let mut listing = String::new();
    for task in TASKS {
        listing.push_str(&format!(
            "{:<26} {} ({})\n    {}\n",
            task.name,
            task.summary,
            task.kind.as_str(),
            task.usage()
        ));
        for arg in task.args {
            listing.push_str(&format!("      {:<18} {}\n", arg.name, arg.help));
        }
    }
    listing
}
