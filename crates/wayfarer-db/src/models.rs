use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Maximum length of a plan's text, in characters. Mirrors the
/// `VARCHAR(5000)` column.
pub const PLAN_TEXT_MAX_CHARS: usize = 5000;

/// Error returned when parsing a stored or user-supplied enum value fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a closed enum stored as upper-case text, with `Display` and
/// `FromStr` agreeing with the database and JSON spellings.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
        #[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_owned(),
                    }),
                }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

text_enum! {
    /// Provenance of a plan's text.
    PlanType, "plan type" {
        Ai => "AI",
        Manual => "MANUAL",
        Hybrid => "HYBRID",
    }
}

text_enum! {
    /// Where a plan sits in its lifecycle.
    PlanStatus, "plan status" {
        PendingAi => "PENDING_AI",
        Active => "ACTIVE",
        Archived => "ARCHIVED",
    }
}

text_enum! {
    TravelStyle, "travel style" {
        Relax => "RELAX",
        Adventure => "ADVENTURE",
        Culture => "CULTURE",
        Party => "PARTY",
    }
}

text_enum! {
    TravelPace, "travel pace" {
        Calm => "CALM",
        Moderate => "MODERATE",
        Intense => "INTENSE",
    }
}

text_enum! {
    Budget, "budget" {
        Low => "LOW",
        Medium => "MEDIUM",
        High => "HIGH",
    }
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A trip note: the traveler's intent that plans are generated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Note {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub place: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub number_of_people: i32,
    pub key_ideas: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Trip length in days, counting both the first and the last day.
    pub fn trip_days(&self) -> i64 {
        (self.date_to - self.date_from).num_days() + 1
    }
}

/// Travel preferences of a user. Every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub travel_style: Option<TravelStyle>,
    pub preferred_pace: Option<TravelPace>,
    pub budget: Option<Budget>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One itinerary document attached to a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub note_id: Uuid,
    pub plan_text: String,
    #[serde(rename = "type")]
    pub plan_type: PlanType,
    pub status: PlanStatus,
    pub generation_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn plan_status_display_roundtrip() {
        for v in PlanStatus::ALL {
            let parsed: PlanStatus = v.to_string().parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
        assert_eq!(PlanStatus::PendingAi.to_string(), "PENDING_AI");
    }

    #[test]
    fn plan_type_invalid() {
        let err = "ai".parse::<PlanType>().unwrap_err();
        assert_eq!(err.kind, "plan type");
        assert_eq!(err.to_string(), "invalid plan type: \"ai\"");
    }

    #[test]
    fn preference_enums_parse() {
        assert_eq!("CULTURE".parse::<TravelStyle>().unwrap(), TravelStyle::Culture);
        assert_eq!("INTENSE".parse::<TravelPace>().unwrap(), TravelPace::Intense);
        assert_eq!("LOW".parse::<Budget>().unwrap(), Budget::Low);
        assert!("cheap".parse::<Budget>().is_err());
    }

    #[test]
    fn plan_serializes_type_key_and_upper_case_values() {
        let ts = Utc.with_ymd_and_hms(2025, 5, 11, 11, 0, 0).unwrap();
        let plan = Plan {
            id: Uuid::nil(),
            note_id: Uuid::nil(),
            plan_text: "Day 1".to_string(),
            plan_type: PlanType::Hybrid,
            status: PlanStatus::PendingAi,
            generation_id: None,
            created_at: ts,
            updated_at: ts,
        };
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["type"], "HYBRID");
        assert_eq!(json["status"], "PENDING_AI");
        assert!(json["generation_id"].is_null());
        assert!(json.get("plan_type").is_none());
    }

    #[test]
    fn trip_days_is_inclusive() {
        let ts = Utc::now();
        let note = Note {
            id: Uuid::nil(),
            owner_id: Uuid::nil(),
            title: "Lisbon".to_string(),
            place: "Lisbon".to_string(),
            date_from: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            date_to: NaiveDate::from_ymd_opt(2025, 6, 3).unwrap(),
            number_of_people: 2,
            key_ideas: None,
            created_at: ts,
            updated_at: ts,
        };
        assert_eq!(note.trip_days(), 3);
    }
}
