//! dbchore - run one raw SQL maintenance task.

use clap::Parser;
use db_chores::cli::Cli;
use db_chores::config::Config;
use db_chores::db::{DatabaseProvider, ResolvingProvider};
use db_chores::error::{Result, TaskError};
use db_chores::logging;
use db_chores::report::{OutcomeReport, Reporter};
use db_chores::runner::{InvocationController, EXIT_FAILURE, EXIT_SUCCESS};
use db_chores::task::catalog;
use std::process::ExitCode;
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_FAILURE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // Before logging, so RUST_LOG may come from the env file.
    let env_loaded = cli.load_env();
    logging::init_stderr_logging();

    ExitCode::from(run(cli, env_loaded).await)
}

async fn run(cli: Cli, env_loaded: Result<()>) -> u8 {
    if cli.list {
        print!("{}", catalog::describe_tasks());
        return EXIT_SUCCESS;
    }

    let mut reporter = Reporter::stdio(cli.format);

    let Some(task) = cli.task.as_deref() else {
        reporter.report(&OutcomeReport::Failure(TaskError::validation(
            "no task given. Use --list to see available tasks",
        )));
        return EXIT_FAILURE;
    };

    // Resolution errors surface at acquire time, after argument validation.
    let provider = ResolvingProvider::new(|| {
        env_loaded.clone()?;
        build_provider(&cli)
    });

    InvocationController::new(&provider, reporter)
        .run_named(task, &cli.args)
        .await
}

/// Resolves configuration into a provider. Nothing here touches the database.
fn build_provider(cli: &Cli) -> Result<DatabaseProvider> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let database_url = cli.database_url();
    let connection = config.resolve_connection(database_url.as_deref(), cli.connection_name())?;

    Ok(DatabaseProvider::new(connection, config.runner))
}
