//! Database query functions for the `notes` table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::Note;

/// Parameters for inserting a new note.
#[derive(Debug, Clone)]
pub struct NewNote<'a> {
    pub owner_id: Uuid,
    pub title: &'a str,
    pub place: &'a str,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub number_of_people: i32,
    pub key_ideas: Option<&'a str>,
}

/// Insert a new note row. Constraint violations (duplicate title for the
/// owner, bad dates, party size) surface as errors.
pub async fn insert_note(executor: impl PgExecutor<'_>, note: &NewNote<'_>) -> Result<Note> {
    let note = sqlx::query_as::<_, Note>(
        "INSERT INTO notes (owner_id, title, place, date_from, date_to, number_of_people, key_ideas) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING *",
    )
    .bind(note.owner_id)
    .bind(note.title)
    .bind(note.place)
    .bind(note.date_from)
    .bind(note.date_to)
    .bind(note.number_of_people)
    .bind(note.key_ideas)
    .fetch_one(executor)
    .await
    .context("failed to insert note")?;

    Ok(note)
}

/// Fetch a note by ID, only if it belongs to `owner_id`.
///
/// A note owned by someone else is reported as `None`, same as a missing one.
pub async fn get_owned_note(
    executor: impl PgExecutor<'_>,
    id: Uuid,
    owner_id: Uuid,
) -> Result<Option<Note>> {
    let note = sqlx::query_as::<_, Note>("SELECT * FROM notes WHERE id = $1 AND owner_id = $2")
        .bind(id)
        .bind(owner_id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch note")?;

    Ok(note)
}

/// Take a row lock on a note for the rest of the enclosing transaction.
///
/// Every plan transition for a note starts here, which serializes concurrent
/// transitions on the same note. Returns `false` if the note does not exist.
pub async fn lock_note(executor: impl PgExecutor<'_>, id: Uuid) -> Result<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM notes WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to lock note")?;

    Ok(row.is_some())
}

/// Delete an owned note and every plan attached to it in one transaction.
///
/// Returns `None` when the note does not exist for this owner (nothing is
/// deleted), otherwise the number of plan rows removed alongside it.
pub async fn delete_note_with_plans(pool: &PgPool, id: Uuid, owner_id: Uuid) -> Result<Option<u64>> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let owned: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM notes WHERE id = $1 AND owner_id = $2 FOR UPDATE")
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&mut *tx)
            .await
            .context("failed to lock note for deletion")?;

    if owned.is_none() {
        // Transaction rolls back on drop.
        return Ok(None);
    }

    let plans = super::plans::delete_plans_for_note(&mut *tx, id).await?;

    sqlx::query("DELETE FROM notes WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("failed to delete note")?;

    tx.commit().await.context("failed to commit transaction")?;

    Ok(Some(plans))
}
