//! Integration tests for the embedded schema.
//!
//! Each test creates a unique temporary database in the shared test
//! PostgreSQL, runs migrations, and drops it on completion.

use uuid::Uuid;

use wayfarer_db::models::{PlanStatus, PlanType};
use wayfarer_db::pool;
use wayfarer_db::queries::plans::{self, NewPlan};
use wayfarer_test_utils::{create_test_db, drop_test_db, insert_test_note};

#[tokio::test]
async fn fresh_schema_is_empty() {
    let (pool, db_name) = create_test_db().await;

    let summary = pool::schema_summary(&pool).await.expect("schema_summary");
    assert_eq!(summary.notes, 0);
    assert_eq!(summary.profiles, 0);
    let statuses: Vec<PlanStatus> = summary.plans.iter().map(|(s, _)| *s).collect();
    assert_eq!(statuses, PlanStatus::ALL);
    assert_eq!(summary.total_plans(), 0);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn schema_summary_counts_plans_by_status() {
    let (pool, db_name) = create_test_db().await;
    let note = insert_test_note(&pool, Uuid::new_v4(), "Summary").await;
    for status in [PlanStatus::PendingAi, PlanStatus::PendingAi, PlanStatus::Active] {
        plans::insert_plan(
            &pool,
            &NewPlan {
                note_id: note.id,
                plan_text: "Day 1",
                plan_type: PlanType::Ai,
                status,
                generation_id: Some(Uuid::new_v4()),
            },
        )
        .await
        .unwrap();
    }

    let summary = pool::schema_summary(&pool).await.unwrap();
    assert_eq!(summary.notes, 1);
    assert_eq!(summary.plans_with_status(PlanStatus::PendingAi), 2);
    assert_eq!(summary.plans_with_status(PlanStatus::Active), 1);
    assert_eq!(summary.plans_with_status(PlanStatus::Archived), 0);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let (pool, db_name) = create_test_db().await;

    pool::run_migrations(&pool)
        .await
        .expect("second run should be a no-op");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn second_active_plan_for_note_is_rejected_by_index() {
    let (pool, db_name) = create_test_db().await;
    let note = insert_test_note(&pool, Uuid::new_v4(), "Index check").await;

    let manual = NewPlan {
        note_id: note.id,
        plan_text: "Day 1: walk",
        plan_type: PlanType::Manual,
        status: PlanStatus::Active,
        generation_id: None,
    };
    plans::insert_plan(&pool, &manual).await.expect("first active");

    let second = plans::insert_plan(&pool, &manual).await;
    assert!(second.is_err(), "partial unique index should reject a second ACTIVE row");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn manual_plan_cannot_carry_generation_id() {
    let (pool, db_name) = create_test_db().await;
    let note = insert_test_note(&pool, Uuid::new_v4(), "Check constraint").await;

    let result = plans::insert_plan(
        &pool,
        &NewPlan {
            note_id: note.id,
            plan_text: "Day 1",
            plan_type: PlanType::Manual,
            status: PlanStatus::Active,
            generation_id: Some(Uuid::new_v4()),
        },
    )
    .await;
    assert!(result.is_err());

    let result = plans::insert_plan(
        &pool,
        &NewPlan {
            note_id: note.id,
            plan_text: "Day 1",
            plan_type: PlanType::Ai,
            status: PlanStatus::PendingAi,
            generation_id: None,
        },
    )
    .await;
    assert!(result.is_err(), "AI rows need a generation_id");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn note_with_plans_cannot_be_deleted_without_removing_plans() {
    let (pool, db_name) = create_test_db().await;
    let note = insert_test_note(&pool, Uuid::new_v4(), "No implicit cascade").await;
    plans::insert_plan(
        &pool,
        &NewPlan {
            note_id: note.id,
            plan_text: "Day 1",
            plan_type: PlanType::Ai,
            status: PlanStatus::PendingAi,
            generation_id: Some(Uuid::new_v4()),
        },
    )
    .await
    .unwrap();

    let direct = sqlx::query("DELETE FROM notes WHERE id = $1")
        .bind(note.id)
        .execute(&pool)
        .await;
    assert!(direct.is_err(), "foreign key must block a bare note delete");

    pool.close().await;
    drop_test_db(&db_name).await;
}
