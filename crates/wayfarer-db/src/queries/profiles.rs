//! Database query functions for the `user_profiles` table.

use anyhow::{Context, Result};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{Budget, TravelPace, TravelStyle, UserProfile};

/// Fetch the travel preferences of a user, if a profile exists.
pub async fn get_profile(executor: impl PgExecutor<'_>, user_id: Uuid) -> Result<Option<UserProfile>> {
    let profile = sqlx::query_as::<_, UserProfile>("SELECT * FROM user_profiles WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch user profile")?;

    Ok(profile)
}

/// Create or replace the travel preferences of a user.
pub async fn upsert_profile(
    executor: impl PgExecutor<'_>,
    user_id: Uuid,
    travel_style: Option<TravelStyle>,
    preferred_pace: Option<TravelPace>,
    budget: Option<Budget>,
) -> Result<UserProfile> {
    let profile = sqlx::query_as::<_, UserProfile>(
        "INSERT INTO user_profiles (user_id, travel_style, preferred_pace, budget) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (user_id) DO UPDATE \
         SET travel_style = EXCLUDED.travel_style, \
             preferred_pace = EXCLUDED.preferred_pace, \
             budget = EXCLUDED.budget, \
             updated_at = now() \
         RETURNING *",
    )
    .bind(user_id)
    .bind(travel_style)
    .bind(preferred_pace)
    .bind(budget)
    .fetch_one(executor)
    .await
    .context("failed to upsert user profile")?;

    Ok(profile)
}
