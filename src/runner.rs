//! Invocation controller.
//!
//! Drives one task through
//! `Start → ArgsValidated → ConnectionAcquired → Executed → Reported → Released`.
//! Any failure jumps straight to `Released`. A connection that was acquired is
//! handed back to the provider exactly once, after the outcome has been
//! reported, whatever happened in between.

use std::io::Write;

use tracing::{debug, info};

use crate::db::ConnectionProvider;
use crate::error::TaskError;
use crate::query::QueryExecutor;
use crate::report::{OutcomeReport, Reporter};
use crate::task::{catalog, TaskSpec};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;

/// Lifecycle stage of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    ArgsValidated,
    ConnectionAcquired,
    Executed,
    Reported,
    Released,
}

/// Runs a single task invocation from arguments to exit code.
pub struct InvocationController<'a, P: ConnectionProvider + ?Sized, O: Write, E: Write> {
    provider: &'a P,
    reporter: Reporter<O, E>,
    stage: Stage,
}

impl<'a, P: ConnectionProvider + ?Sized, O: Write, E: Write> InvocationController<'a, P, O, E> {
    pub fn new(provider: &'a P, reporter: Reporter<O, E>) -> Self {
        Self {
            provider,
            reporter,
            stage: Stage::Start,
        }
    }

    /// The stage reached so far.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Gives the reporter back, e.g. to inspect captured output.
    pub fn into_reporter(self) -> Reporter<O, E> {
        self.reporter
    }

    /// Looks the task up in the built-in catalog and runs it.
    pub async fn run_named(&mut self, name: &str, args: &[String]) -> u8 {
        match catalog::find(name) {
            Some(task) => self.run(task, args).await,
            None => {
                let error = TaskError::validation(format!("unknown task '{name}'"));
                self.reporter.report(&OutcomeReport::Failure(error));
                let names: Vec<&str> = catalog::TASKS.iter().map(|t| t.name).collect();
                self.reporter
                    .usage(&format!("available tasks: {}", names.join(", ")));
                self.advance(Stage::Released);
                EXIT_FAILURE
            }
        }
    }

    /// Runs `task` with its positional arguments and returns the exit code.
    pub async fn run(&mut self, task: &TaskSpec, args: &[String]) -> u8 {
        info!(task = task.name, "Starting task");

        let invocation = match task.bind(args) {
            Ok(invocation) => invocation,
            Err(e) => {
                debug!(task = task.name, error = %e, "Argument validation failed");
                self.reporter.report(&OutcomeReport::Failure(e));
                self.reporter.usage(&task.usage());
                self.advance(Stage::Released);
                return EXIT_FAILURE;
            }
        };
        self.advance(Stage::ArgsValidated);

        let mut client = match self.provider.acquire().await {
            Ok(client) => client,
            Err(e) => {
                debug!(task = task.name, error = %e, "Connection failed");
                self.reporter.report(&OutcomeReport::Failure(e));
                self.advance(Stage::Released);
                return EXIT_FAILURE;
            }
        };
        self.advance(Stage::ConnectionAcquired);

        let result = QueryExecutor::new(client.as_mut())
            .execute(&invocation)
            .await;
        self.advance(Stage::Executed);

        let outcome = OutcomeReport::from(result);
        self.reporter.report(&outcome);
        self.advance(Stage::Reported);

        let released = self.provider.release(client).await;
        self.advance(Stage::Released);

        if outcome.is_success() && released.is_ok() {
            EXIT_SUCCESS
        } else {
            EXIT_FAILURE
        }
    }

    fn advance(&mut self, next: Stage) {
        debug!(from = ?self.stage, to = ?next, "Invocation stage");
        self.stage = next;
    }
}
