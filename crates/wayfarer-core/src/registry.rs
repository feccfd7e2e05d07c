//! Collaborator ports: note ownership and traveler preferences.
//!
//! Notes and profiles are owned elsewhere; the plan lifecycle only needs to
//! read them (and to cascade a note deletion into its plans).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use wayfarer_db::models::{Budget, Note, TravelPace, TravelStyle, UserProfile};

use crate::repository::RepositoryError;

/// Travel preferences that shape a generated itinerary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub travel_style: Option<TravelStyle>,
    pub preferred_pace: Option<TravelPace>,
    pub budget: Option<Budget>,
}

impl Preferences {
    pub fn is_empty(&self) -> bool {
        self.travel_style.is_none() && self.preferred_pace.is_none() && self.budget.is_none()
    }
}

impl From<UserProfile> for Preferences {
    fn from(profile: UserProfile) -> Self {
        Self {
            travel_style: profile.travel_style,
            preferred_pace: profile.preferred_pace,
            budget: profile.budget,
        }
    }
}

/// Ownership-checked access to trip notes.
#[async_trait]
pub trait NoteRegistry: Send + Sync {
    /// Return the note if it exists and belongs to `owner_id`.
    ///
    /// A note owned by someone else is reported as absent.
    async fn get_owned_note(&self, note_id: Uuid, owner_id: Uuid) -> Result<Option<Note>, RepositoryError>;

    /// Delete an owned note together with every plan attached to it, in one
    /// atomic step. Returns the number of plans removed, or `None` when the
    /// note is absent or owned by someone else.
    async fn delete_owned_note(&self, note_id: Uuid, owner_id: Uuid) -> Result<Option<u64>, RepositoryError>;
}

#[async_trait]
pub trait PreferenceProvider: Send + Sync {
    /// Preferences of `user_id`, or `None` when no profile exists.
    async fn get_preferences(&self, user_id: Uuid) -> Result<Option<Preferences>, RepositoryError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn NoteRegistry, _: &dyn PreferenceProvider) {}
};

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn preferences_from_profile() {
        let now = Utc::now();
        let profile = UserProfile {
            user_id: Uuid::new_v4(),
            travel_style: Some(TravelStyle::Culture),
            preferred_pace: None,
            budget: Some(Budget::Medium),
            created_at: now,
            updated_at: now,
        };
        let prefs = Preferences::from(profile);
        assert_eq!(prefs.travel_style, Some(TravelStyle::Culture));
        assert_eq!(prefs.preferred_pace, None);
        assert_eq!(prefs.budget, Some(Budget::Medium));
        assert!(!prefs.is_empty());
        assert!(Preferences::default().is_empty());
    }
}
