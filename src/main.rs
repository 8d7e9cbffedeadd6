//! Runs one query inside a unit of work and prints the rows.
//!
//! Connection settings come from `DB_HOST`, `DB_USER`, `DB_PASSWORD`,
//! `DB_NAME`, `DB_PORT` (a `.env` file is honoured). The query is taken from
//! the first argument or from `DB_QUERY`.

use std::io::{self, Write};
use std::process::ExitCode;

use dotenvy::dotenv;
use query_unit_of_work::drivers::PgConnector;
use query_unit_of_work::{ConnectionConfig, QueryResult, QuerySettings, UnitOfWork};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "uow-query";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let settings = match load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let uow = UnitOfWork::new(PgConnector::new().with_application_name(SERVICE_NAME));
    let result = match uow.run_query(&settings.connection, &settings.query).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(error = %e, phase = %e.phase(), "query failed");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = print_table(&mut io::stdout().lock(), &result) {
        tracing::error!(error = %e, "failed to write result");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn load_settings() -> Result<QuerySettings, query_unit_of_work::ConfigError> {
    match std::env::args().nth(1) {
        Some(query) => Ok(QuerySettings {
            connection: ConnectionConfig::from_env()?,
            query,
        }),
        None => QuerySettings::from_env(),
    }
}

/// Tab-separated header line followed by one line per row.
fn print_table(out: &mut impl Write, result: &QueryResult) -> io::Result<()> {
    writeln!(out, "{}", result.columns().join("\t"))?;
    for row in result.rows() {
        let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
        writeln!(out, "{}", cells.join("\t"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_unit_of_work::SqlValue;

    #[test]
    fn test_print_table_is_tab_separated() {
        let result = QueryResult::new(
            vec!["first column".to_string(), "second column".to_string()],
            vec![
                vec![SqlValue::Int(1), SqlValue::Int(10)],
                vec![SqlValue::Int(2), SqlValue::Null],
            ],
        )
        .unwrap();
        let mut out = Vec::new();

        print_table(&mut out, &result).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "first column\tsecond column\n1\t10\n2\tNULL\n"
        );
    }
}
