//! Database query functions for the `plans` table.

use anyhow::{Context, Result};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{Plan, PlanStatus, PlanType};

/// Parameters for inserting a plan row.
#[derive(Debug, Clone)]
pub struct NewPlan<'a> {
    pub note_id: Uuid,
    pub plan_text: &'a str,
    pub plan_type: PlanType,
    pub status: PlanStatus,
    pub generation_id: Option<Uuid>,
}

/// Insert a new plan row. Returns the inserted plan with server-generated
/// defaults (id, timestamps).
pub async fn insert_plan(executor: impl PgExecutor<'_>, plan: &NewPlan<'_>) -> Result<Plan> {
    let plan = sqlx::query_as::<_, Plan>(
        "INSERT INTO plans (note_id, plan_text, plan_type, status, generation_id) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING *",
    )
    .bind(plan.note_id)
    .bind(plan.plan_text)
    .bind(plan.plan_type)
    .bind(plan.status)
    .bind(plan.generation_id)
    .fetch_one(executor)
    .await
    .context("failed to insert plan")?;

    Ok(plan)
}

/// Fetch a plan by its ID.
pub async fn get_plan(executor: impl PgExecutor<'_>, id: Uuid) -> Result<Option<Plan>> {
    let plan = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch plan")?;

    Ok(plan)
}

/// Find the plan of a note carrying `generation_id` in the given status.
///
/// With `for_update`, the row stays locked until the enclosing transaction
/// ends.
pub async fn find_by_generation(
    executor: impl PgExecutor<'_>,
    note_id: Uuid,
    generation_id: Uuid,
    status: PlanStatus,
    for_update: bool,
) -> Result<Option<Plan>> {
    let sql = if for_update {
        "SELECT * FROM plans \
         WHERE note_id = $1 AND generation_id = $2 AND status = $3 \
         ORDER BY created_at DESC LIMIT 1 \
         FOR UPDATE"
    } else {
        "SELECT * FROM plans \
         WHERE note_id = $1 AND generation_id = $2 AND status = $3 \
         ORDER BY created_at DESC LIMIT 1"
    };

    let plan = sqlx::query_as::<_, Plan>(sql)
        .bind(note_id)
        .bind(generation_id)
        .bind(status)
        .fetch_optional(executor)
        .await
        .context("failed to fetch plan by generation")?;

    Ok(plan)
}

/// Most recently updated plan of a note in the given status.
pub async fn latest_with_status(
    executor: impl PgExecutor<'_>,
    note_id: Uuid,
    status: PlanStatus,
) -> Result<Option<Plan>> {
    let plan = sqlx::query_as::<_, Plan>(
        "SELECT * FROM plans \
         WHERE note_id = $1 AND status = $2 \
         ORDER BY updated_at DESC, created_at DESC \
         LIMIT 1",
    )
    .bind(note_id)
    .bind(status)
    .fetch_optional(executor)
    .await
    .context("failed to fetch latest plan")?;

    Ok(plan)
}

/// List every plan of a note, newest first.
pub async fn list_plans_for_note(executor: impl PgExecutor<'_>, note_id: Uuid) -> Result<Vec<Plan>> {
    let plans = sqlx::query_as::<_, Plan>(
        "SELECT * FROM plans WHERE note_id = $1 ORDER BY created_at DESC",
    )
    .bind(note_id)
    .fetch_all(executor)
    .await
    .context("failed to list plans for note")?;

    Ok(plans)
}

/// Count a note's plans in the given status.
pub async fn count_with_status(
    executor: impl PgExecutor<'_>,
    note_id: Uuid,
    status: PlanStatus,
) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM plans WHERE note_id = $1 AND status = $2")
            .bind(note_id)
            .bind(status)
            .fetch_one(executor)
            .await
            .context("failed to count plans")?;

    Ok(count)
}

/// Move every `ACTIVE` plan of a note to `to`. Returns the moved plan IDs.
///
/// The caller decides `to` from the plan state machine; in practice it is
/// always `ARCHIVED`.
pub async fn retire_active(executor: impl PgExecutor<'_>, note_id: Uuid, to: PlanStatus) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "UPDATE plans \
         SET status = $2, updated_at = now() \
         WHERE note_id = $1 AND status = 'ACTIVE' \
         RETURNING id",
    )
    .bind(note_id)
    .bind(to)
    .fetch_all(executor)
    .await
    .context("failed to retire active plans")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Atomically move a plan from one status to another.
///
/// Uses optimistic locking: the row is only updated if its current status
/// is still `from`. Returns `None` when nothing matched.
pub async fn transition_plan_status(
    executor: impl PgExecutor<'_>,
    id: Uuid,
    from: PlanStatus,
    to: PlanStatus,
) -> Result<Option<Plan>> {
    let plan = sqlx::query_as::<_, Plan>(
        "UPDATE plans \
         SET status = $1, updated_at = now() \
         WHERE id = $2 AND status = $3 \
         RETURNING *",
    )
    .bind(to)
    .bind(id)
    .bind(from)
    .fetch_optional(executor)
    .await
    .context("failed to transition plan status")?;

    Ok(plan)
}

/// Overwrite the text of an active plan and set its type.
///
/// Optimistic: only matches while the row is still `ACTIVE` with type
/// `expected_type`. Returns `None` when another writer got there first or
/// the plan is no longer active.
pub async fn update_active_text(
    executor: impl PgExecutor<'_>,
    id: Uuid,
    expected_type: PlanType,
    plan_text: &str,
    new_type: PlanType,
) -> Result<Option<Plan>> {
    let plan = sqlx::query_as::<_, Plan>(
        "UPDATE plans \
         SET plan_text = $1, plan_type = $2, updated_at = now() \
         WHERE id = $3 AND status = 'ACTIVE' AND plan_type = $4 \
         RETURNING *",
    )
    .bind(plan_text)
    .bind(new_type)
    .bind(id)
    .bind(expected_type)
    .fetch_optional(executor)
    .await
    .context("failed to update plan text")?;

    Ok(plan)
}

/// Delete every plan of a note regardless of status. Returns rows removed.
pub async fn delete_plans_for_note(executor: impl PgExecutor<'_>, note_id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM plans WHERE note_id = $1")
        .bind(note_id)
        .execute(executor)
        .await
        .context("failed to delete plans for note")?;

    Ok(result.rows_affected())
}
