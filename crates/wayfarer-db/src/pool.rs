//! Connection setup and schema bootstrap.

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tracing::info;

use crate::config::DbConfig;
use crate::models::PlanStatus;

/// Migrations embedded at compile time from `crates/wayfarer-db/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// SQLSTATE `duplicate_database`.
const DUPLICATE_DATABASE: &str = "42P04";

fn options(max_connections: u32) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
}

pub async fn create_pool(config: &DbConfig) -> Result<PgPool> {
    options(config.max_connections)
        .connect(&config.database_url)
        .await
        .with_context(|| format!("failed to connect to database at {}", config.database_url))
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to run database migrations")?;
    info!(known = MIGRATOR.iter().count(), "schema is up to date");
    Ok(())
}

/// Create the configured database unless it is already there.
///
/// Returns `true` when this call created it.
pub async fn ensure_database_exists(config: &DbConfig) -> Result<bool> {
    let name = config
        .database_name()
        .context("database URL names no database")?;
    let maintenance_url = config.maintenance_url();
    let maintenance = options(1)
        .connect(&maintenance_url)
        .await
        .with_context(|| format!("failed to connect to maintenance database at {maintenance_url}"))?;

    // CREATE DATABASE cannot take bind parameters.
    let outcome = maintenance
        .execute(format!("CREATE DATABASE {}", quote_ident(name)).as_str())
        .await;
    maintenance.close().await;

    match outcome {
        Ok(_) => {
            info!(db = name, "database created");
            Ok(true)
        }
        Err(err) if has_sqlstate(&err, DUPLICATE_DATABASE) => {
            info!(db = name, "database already exists");
            Ok(false)
        }
        Err(err) => Err(err).with_context(|| format!("failed to create database {name}")),
    }
}

fn has_sqlstate(err: &sqlx::Error, code: &str) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|c| c == code)
}

/// Quote an identifier for direct interpolation into SQL.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// What `wayfarer db-init` reports about a ready database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSummary {
    pub notes: i64,
    pub profiles: i64,
    /// One entry per [`PlanStatus`], in [`PlanStatus::ALL`] order.
    pub plans: Vec<(PlanStatus, i64)>,
}

impl SchemaSummary {
    pub fn total_plans(&self) -> i64 {
        self.plans.iter().map(|(_, n)| n).sum()
    }

    pub fn plans_with_status(&self, status: PlanStatus) -> i64 {
        self.plans
            .iter()
            .find(|(s, _)| *s == status)
            .map_or(0, |(_, n)| *n)
    }
}

pub async fn schema_summary(pool: &PgPool) -> Result<SchemaSummary> {
    let notes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notes")
        .fetch_one(pool)
        .await
        .context("failed to count notes")?;
    let profiles: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_profiles")
        .fetch_one(pool)
        .await
        .context("failed to count user profiles")?;
    let grouped: Vec<(PlanStatus, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM plans GROUP BY status")
            .fetch_all(pool)
            .await
            .context("failed to count plans by status")?;

    let plans = PlanStatus::ALL
        .iter()
        .map(|status| {
            let n = grouped
                .iter()
                .find(|(s, _)| s == status)
                .map_or(0, |(_, n)| *n);
            (*status, n)
        })
        .collect();

    Ok(SchemaSummary {
        notes,
        profiles,
        plans,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("wayfarer"), "\"wayfarer\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn summary_lookups() {
        let summary = SchemaSummary {
            notes: 2,
            profiles: 1,
            plans: vec![
                (PlanStatus::PendingAi, 3),
                (PlanStatus::Active, 2),
                (PlanStatus::Archived, 0),
            ],
        };
        assert_eq!(summary.total_plans(), 5);
        assert_eq!(summary.plans_with_status(PlanStatus::Active), 2);
        assert_eq!(summary.plans_with_status(PlanStatus::Archived), 0);
    }
}
