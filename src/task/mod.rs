//! Task specifications and their resolved invocations.
//!
//! A [`TaskSpec`] is the static description of one maintenance operation: its
//! statement kind, SQL text and positional argument contract. Binding the
//! command-line arguments against it yields an immutable [`TaskInvocation`].
//!
//! Argument values only ever travel as bound parameters. Arguments of kind
//! [`ArgKind::Target`] are never bound at all; they pick one of the task's
//! static statements, so no input is ever formatted into SQL text.

pub mod catalog;

use crate::db::{DatabaseBackend, Value};
use crate::error::{Result, TaskError};
use crate::BIN_NAME;
use uuid::Uuid;

/// Whether a statement returns rows or changes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Query,
    Mutation,
}

impl StatementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
        }
    }
}

/// Statement text with `$1..$n` placeholders, per SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlTemplate {
    postgres: &'static str,
    sqlite: &'static str,
}

impl SqlTemplate {
    /// Same text for every backend.
    pub const fn portable(sql: &'static str) -> Self {
        Self {
            postgres: sql,
            sqlite: sql,
        }
    }

    /// Separate text where the dialects diverge.
    pub const fn dialects(postgres: &'static str, sqlite: &'static str) -> Self {
        Self { postgres, sqlite }
    }

    pub fn for_backend(&self, backend: DatabaseBackend) -> &'static str {
        match backend {
            DatabaseBackend::Postgres => self.postgres,
            DatabaseBackend::Sqlite => self.sqlite,
        }
    }
}

/// Where a task's statement comes from.
#[derive(Debug, Clone, Copy)]
pub enum SqlSource {
    /// One statement for every invocation.
    Fixed(SqlTemplate),

    /// One statement per allow-listed target, selected by the task's
    /// [`ArgKind::Target`] argument.
    PerTarget(&'static [(&'static str, SqlTemplate)]),
}

/// Shape check applied to a positional argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// A well-formed UUID, bound as a UUID.
    Uuid,
    /// An integer greater than zero, bound as a 64-bit integer.
    PositiveInt,
    /// Any non-empty string, bound as text.
    Text,
    /// One of the task's allow-listed targets. Selects the statement.
    Target,
}

/// One positional argument of a task.
#[derive(Debug, Clone, Copy)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
    /// Literal used when the argument is omitted.
    pub default: Option<&'static str>,
    pub help: &'static str,
}

impl ArgSpec {
    pub const fn required(name: &'static str, kind: ArgKind, help: &'static str) -> Self {
        Self {
            name,
            kind,
            default: None,
            help,
        }
    }

    pub const fn optional(
        name: &'static str,
        kind: ArgKind,
        default: &'static str,
        help: &'static str,
    ) -> Self {
        Self {
            name,
            kind,
            default: Some(default),
            help,
        }
    }

    /// Parses a raw argument into the value bound for it.
    fn parse(&self, raw: &str) -> Result<Value> {
        match self.kind {
            ArgKind::Uuid => Uuid::parse_str(raw.trim()).map(Value::Uuid).map_err(|_| {
                TaskError::validation(format!("<{}> must be a UUID, got '{raw}'", self.name))
            }),
            ArgKind::PositiveInt => match raw.trim().parse::<i64>() {
                Ok(n) if n > 0 => Ok(Value::Int(n)),
                _ => Err(TaskError::validation(format!(
                    "<{}> must be a positive integer, got '{raw}'",
                    self.name
                ))),
            },
            ArgKind::Text if raw.trim().is_empty() => Err(TaskError::validation(format!(
                "<{}> must not be empty",
                self.name
            ))),
            ArgKind::Text => Ok(Value::String(raw.to_string())),
            ArgKind::Target => Err(TaskError::internal(format!(
                "<{}> selects a statement and is never bound",
                self.name
            ))),
        }
    }

    fn usage(&self) -> String {
        match self.default {
            Some(default) => format!("[{}={default}]", self.name),
            None => format!("<{}>", self.name),
        }
    }
}

/// Static description of one maintenance task.
#[derive(Debug, Clone, Copy)]
pub struct TaskSpec {
    pub name: &'static str,
    pub summary: &'static str,
    pub kind: StatementKind,
    pub sql: SqlSource,
    pub args: &'static [ArgSpec],
    /// Run the mutation inside an explicit transaction.
    pub atomic: bool,
}

impl TaskSpec {
    /// One-line usage string for this task.
    pub fn usage(&self) -> String {
        let mut usage = format!("usage: {BIN_NAME} {}", self.name);
        for arg in self.args {
            usage.push(' ');
            usage.push_str(&arg.usage());
        }
        usage
    }

    /// Allow-listed targets, if the statement is selected by target.
    pub fn targets(&self) -> Vec<&'static str> {
        match self.sql {
            SqlSource::Fixed(_) => Vec::new(),
            SqlSource::PerTarget(targets) => targets.iter().map(|(name, _)| *name).collect(),
        }
    }

    /// Validates positional arguments and resolves the invocation.
    pub fn bind(&self, args: &[String]) -> Result<TaskInvocation> {
        if args.len() > self.args.len() {
            return Err(TaskError::validation(format!(
                "{} takes at most {} argument(s), got {}",
                self.name,
                self.args.len(),
                args.len()
            )));
        }

        let mut params = Vec::with_capacity(self.args.len());
        let mut selected = None;

        for (i, spec) in self.args.iter().enumerate() {
            let raw = args
                .get(i)
                .map(String::as_str)
                .or(spec.default)
                .ok_or_else(|| {
                    TaskError::validation(format!("missing required argument <{}>", spec.name))
                })?;

            match spec.kind {
                ArgKind::Target => selected = Some(self.select_target(spec, raw)?),
                _ => params.push(spec.parse(raw)?),
            }
        }

        let sql = match (self.sql, selected) {
            (SqlSource::Fixed(template), _) => template,
            (SqlSource::PerTarget(_), Some(template)) => template,
            (SqlSource::PerTarget(_), None) => {
                return Err(TaskError::internal(format!(
                    "task '{}' has per-target statements but no target argument",
                    self.name
                )))
            }
        };

        Ok(TaskInvocation {
            task: self.name,
            kind: self.kind,
            sql,
            params,
            atomic: self.atomic,
        })
    }

    fn select_target(&self, spec: &ArgSpec, raw: &str) -> Result<SqlTemplate> {
        let SqlSource::PerTarget(targets) = self.sql else {
            return Err(TaskError::internal(format!(
                "task '{}' declares target <{}> but has a fixed statement",
                self.name, spec.name
            )));
        };

        targets
            .iter()
            .find(|(name, _)| *name == raw)
            .map(|(_, template)| *template)
            .ok_or_else(|| {
                TaskError::validation(format!(
                    "<{}> must be one of: {}, got '{raw}'",
                    spec.name,
                    self.targets().join(", ")
                ))
            })
    }
}

/// The resolved, immutable intent of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskInvocation {
    task: &'static str,
    kind: StatementKind,
    sql: SqlTemplate,
    params: Vec<Value>,
    atomic: bool,
}

impl TaskInvocation {
    pub fn task(&self) -> &'static str {
        self.task
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Statement text for the given backend.
    pub fn sql(&self, backend: DatabaseBackend) -> &'static str {
        self.sql.for_backend(backend)
    }

    /// Parameters in placeholder order.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn is_atomic(&self) -> bool {
        self.atomic
    }
}
