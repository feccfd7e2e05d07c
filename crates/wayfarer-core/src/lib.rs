//! Plan lifecycle for wayfarer trip notes.
//!
//! ```text
//! caller
//!   |
//!   v
//! PlanLifecycleService --get_owned_note--> NoteRegistry
//!   |                  --get_preferences--> PreferenceProvider
//!   |                  --generate(prompt)--> PlanGenerator   (deadline)
//!   v
//! PlanRepository  (PgPlanStore | InMemoryStore)
//! ```

pub mod error;
pub mod generator;
pub mod lifecycle;
pub mod registry;
pub mod repository;
pub mod state;

pub use error::{Missing, PlanError, ValidationError};
pub use lifecycle::{GeneratedProposal, LifecycleConfig, PlanLifecycleService, PlanRequest};
pub use repository::{PlanRepository, ReplacePolicy};
