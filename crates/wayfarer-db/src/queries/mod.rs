//! Query functions, one module per table.
//!
//! Functions take any [`sqlx::PgExecutor`] so the same query runs against the
//! pool or inside a caller-owned transaction (`&mut *tx`).

pub mod notes;
pub mod plans;
pub mod profiles;
