use anyhow::{bail, Result};
use colored::Colorize;
use dbkit::config;
use dbkit::{Context, DatabaseHandle, DbError, MySqlDb, SqliteDb};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Execute the check command
///
/// Opens every configured database, pings it and closes it again
pub async fn execute(config_path: &Path, timeout_secs: u64) -> Result<()> {
    println!("{}", "Checking databases...".yellow());
    let cfg = config::load_config(config_path)?;
    let timeout = Duration::from_secs(timeout_secs);

    if cfg.mysql.is_none() && cfg.sqlite.is_none() {
        println!("{}", "No databases configured".dimmed());
        return Ok(());
    }

    let mut failures = 0;

    if let Some(mysql) = &cfg.mysql {
        let label = mysql.redacted_dsn();
        let opened = tokio::time::timeout(timeout, MySqlDb::connect(mysql)).await;
        let result = match opened {
            Ok(Ok(db)) => ping_and_close(&db, timeout).await,
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DbError::DeadlineExceeded {
                phase: dbkit::Phase::Open,
            }),
        };
        failures += report("MySQL", &label, result);
    }

    if let Some(sqlite) = &cfg.sqlite {
        let opened = tokio::time::timeout(timeout, SqliteDb::open(&sqlite.path)).await;
        let result = match opened {
            Ok(Ok(db)) => ping_and_close(&db, timeout).await,
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DbError::DeadlineExceeded {
                phase: dbkit::Phase::Open,
            }),
        };
        failures += report("SQLite", &sqlite.path, result);
    }

    if failures > 0 {
        bail!("{failures} database check(s) failed");
    }

    info!("Database check completed successfully");
    Ok(())
}

/// Ping `db` and close it, returning the round-trip time
async fn ping_and_close(db: &dyn DatabaseHandle, timeout: Duration) -> Result<Duration, DbError> {
    let started = Instant::now();
    let pinged = db.ping(&Context::with_timeout(timeout)).await;
    let elapsed = started.elapsed();

    if let Err(e) = db.close().await {
        warn!(database = %db.describe(), error = %e, "Failed to close database after check");
    }

    pinged.map(|()| elapsed)
}

fn report(backend: &str, target: &str, result: Result<Duration, DbError>) -> usize {
    match result {
        Ok(elapsed) => {
            println!(
                "  {} {}: {} ({} ms)",
                "✓".green(),
                backend.cyan(),
                target,
                elapsed.as_millis()
            );
            0
        }
        Err(e) => {
            println!("  {} {}: {}", "✗".red(), backend.cyan(), target);
            println!("    {}", e.to_string().red());
            warn!(backend, error = %e, "Database check failed");
            1
        }
    }
}
