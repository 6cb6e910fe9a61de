pub mod config;
pub mod context;
pub mod database;
pub mod error;
pub mod logger;
pub mod metrics;

pub use context::{CancelHandle, Context};
pub use database::{Backend, DatabaseHandle, MySqlDb, RowSet, SqliteDb};
pub use error::{DbError, LogError, Phase};
pub use logger::{Logger, Severity};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing for the command-line tool
///
/// Library users install their own subscriber or use [`logger`]; this only
/// serves `dbkit` itself. Can only be called once per process.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}
