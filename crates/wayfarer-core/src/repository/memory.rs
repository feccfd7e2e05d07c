//! In-process adapter for the plan, note and preference ports.
//!
//! One mutex guards the whole store, so every operation (including
//! [`PlanRepository::activate`]) is atomic with respect to every other.
//! Used by the test suites and for running the HTTP surface without a
//! database.

use std::collections::HashMap;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use wayfarer_db::models::{Note, Plan, PlanStatus, PlanType};

use super::{
    Activation, ActivationOutcome, PlanRepository, ReplacePolicy, RepositoryError, check_type_change,
    superseded_status,
};
use crate::registry::{NoteRegistry, PreferenceProvider, Preferences};

/// Fields of a note created directly in the in-memory store.
#[derive(Debug, Clone)]
pub struct NoteDraft {
    pub owner_id: Uuid,
    pub title: String,
    pub place: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub number_of_people: i32,
    pub key_ideas: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    notes: HashMap<Uuid, Note>,
    preferences: HashMap<Uuid, Preferences>,
    plans: Vec<Plan>,
}

impl State {
    fn plans_of(&self, note_id: Uuid) -> impl Iterator<Item = &Plan> {
        self.plans.iter().filter(move |p| p.note_id == note_id)
    }

    fn latest_with_status(&self, note_id: Uuid, status: PlanStatus) -> Option<&Plan> {
        self.plans_of(note_id)
            .filter(|p| p.status == status)
            .max_by_key(|p| (p.updated_at, p.created_at))
    }

    fn position(&self, plan_id: Uuid) -> Option<usize> {
        self.plans.iter().position(|p| p.id == plan_id)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_note(&self, draft: NoteDraft) -> Note {
        let now = Utc::now();
        let note = Note {
            id: Uuid::new_v4(),
            owner_id: draft.owner_id,
            title: draft.title,
            place: draft.place,
            date_from: draft.date_from,
            date_to: draft.date_to,
            number_of_people: draft.number_of_people,
            key_ideas: draft.key_ideas,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.notes.insert(note.id, note.clone());
        note
    }

    pub async fn set_preferences(&self, user_id: Uuid, preferences: Preferences) {
        self.state.lock().await.preferences.insert(user_id, preferences);
    }
}

#[async_trait]
impl PlanRepository for InMemoryStore {
    async fn insert_proposal(
        &self,
        note_id: Uuid,
        generation_id: Uuid,
        plan_text: &str,
    ) -> Result<Plan, RepositoryError> {
        let mut state = self.state.lock().await;
        if !state.notes.contains_key(&note_id) {
            return Err(RepositoryError::NoteNotFound(note_id));
        }
        let now = Utc::now();
        let plan = Plan {
            id: Uuid::new_v4(),
            note_id,
            plan_text: plan_text.to_owned(),
            plan_type: PlanType::Ai,
            status: PlanStatus::PendingAi,
            generation_id: Some(generation_id),
            created_at: now,
            updated_at: now,
        };
        state.plans.push(plan.clone());
        Ok(plan)
    }

    async fn latest_active(&self, note_id: Uuid) -> Result<Option<Plan>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.latest_with_status(note_id, PlanStatus::Active).cloned())
    }

    async fn find_proposal(
        &self,
        note_id: Uuid,
        generation_id: Uuid,
    ) -> Result<Option<Plan>, RepositoryError> {
        let state = self.state.lock().await;
        let plan = state
            .plans_of(note_id)
            .filter(|p| p.status == PlanStatus::PendingAi && p.generation_id == Some(generation_id))
            .max_by_key(|p| p.created_at)
            .cloned();
        Ok(plan)
    }

    async fn activate(
        &self,
        note_id: Uuid,
        activation: &Activation,
    ) -> Result<ActivationOutcome, RepositoryError> {
        if !activation.is_well_formed() {
            return Err(anyhow!("activation for note {note_id} must produce exactly one active plan").into());
        }

        let mut state = self.state.lock().await;
        if !state.notes.contains_key(&note_id) {
            return Err(RepositoryError::NoteNotFound(note_id));
        }

        // Validate everything before mutating so a failure leaves no trace.
        let proposal_idx = match activation.proposal {
            Some(usage) => {
                let idx = state
                    .plans
                    .iter()
                    .position(|p| {
                        p.note_id == note_id
                            && p.status == PlanStatus::PendingAi
                            && p.generation_id == Some(usage.generation_id)
                    })
                    .ok_or(RepositoryError::ProposalNotFound {
                        note_id,
                        generation_id: usage.generation_id,
                    })?;
                Some((idx, usage.target_status()?))
            }
            None => None,
        };

        if activation.replace == ReplacePolicy::Reject
            && state.latest_with_status(note_id, PlanStatus::Active).is_some()
        {
            return Err(RepositoryError::ActivePlanExists(note_id));
        }

        let retired = superseded_status()?;
        let now = Utc::now();
        let mut superseded = Vec::new();
        for plan in state
            .plans
            .iter_mut()
            .filter(|p| p.note_id == note_id && p.status == PlanStatus::Active)
        {
            plan.status = retired;
            plan.updated_at = now;
            superseded.push(plan.id);
        }

        let mut active = None;

        if let Some((idx, becomes)) = proposal_idx {
            let plan = &mut state.plans[idx];
            plan.status = becomes;
            plan.updated_at = now;
            if becomes == PlanStatus::Active {
                active = Some(plan.clone());
            }
        }

        if let Some(new) = &activation.insert {
            let plan = Plan {
                id: Uuid::new_v4(),
                note_id,
                plan_text: new.plan_text.clone(),
                plan_type: new.plan_type,
                status: PlanStatus::Active,
                generation_id: new.generation_id,
                created_at: now,
                updated_at: now,
            };
            state.plans.push(plan.clone());
            active = Some(plan);
        }

        let active = active.ok_or_else(|| anyhow!("activation for note {note_id} produced no active plan"))?;
        Ok(ActivationOutcome { active, superseded })
    }

    async fn update_active_text(
        &self,
        plan_id: Uuid,
        expected_type: PlanType,
        plan_text: &str,
        new_type: PlanType,
    ) -> Result<Option<Plan>, RepositoryError> {
        check_type_change(expected_type, new_type)?;
        let mut state = self.state.lock().await;
        let Some(idx) = state.position(plan_id) else {
            return Ok(None);
        };
        let plan = &mut state.plans[idx];
        if plan.status != PlanStatus::Active || plan.plan_type != expected_type {
            return Ok(None);
        }
        plan.plan_text = plan_text.to_owned();
        plan.plan_type = new_type;
        plan.updated_at = Utc::now();
        Ok(Some(plan.clone()))
    }

    async fn list_for_note(&self, note_id: Uuid) -> Result<Vec<Plan>, RepositoryError> {
        let state = self.state.lock().await;
        let mut plans: Vec<Plan> = state.plans_of(note_id).cloned().collect();
        plans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(plans)
    }
}

#[async_trait]
impl NoteRegistry for InMemoryStore {
    async fn get_owned_note(&self, note_id: Uuid, owner_id: Uuid) -> Result<Option<Note>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .notes
            .get(&note_id)
            .filter(|n| n.owner_id == owner_id)
            .cloned())
    }

    async fn delete_owned_note(&self, note_id: Uuid, owner_id: Uuid) -> Result<Option<u64>, RepositoryError> {
        let mut state = self.state.lock().await;
        match state.notes.get(&note_id) {
            Some(note) if note.owner_id == owner_id => {}
            _ => return Ok(None),
        }
        state.notes.remove(&note_id);
        let before = state.plans.len();
        state.plans.retain(|p| p.note_id != note_id);
        Ok(Some((before - state.plans.len()) as u64))
    }
}

#[async_trait]
impl PreferenceProvider for InMemoryStore {
    async fn get_preferences(&self, user_id: Uuid) -> Result<Option<Preferences>, RepositoryError> {
        Ok(self.state.lock().await.preferences.get(&user_id).cloned())
    }
}
