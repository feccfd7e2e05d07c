//! Prompt construction for travel plan generation.

use serde::{Deserialize, Serialize};

use wayfarer_db::models::{Note, PLAN_TEXT_MAX_CHARS};

use crate::registry::Preferences;

/// Headroom subtracted from the stored text limit when asking the model
/// for a maximum length; models overshoot.
const LENGTH_HEADROOM: usize = 1000;

const SYSTEM_INSTRUCTIONS: &str = "\
You are a travel planning assistant. Create detailed travel plans that include:
- Daily activities and attractions
- Dining recommendations
- Accommodation suggestions
- Transportation tips
Don't include any information about the weather.
Use a friendly and engaging tone.
Be creative and provide unique suggestions.
Avoid generic or overly common recommendations.
Be concise and clear, but add some flair such as interesting facts or anecdotes.
Use bullet points or numbered lists for easy readability.
Include a summary at the end of the plan.
Do not include emojis.
Generate only the plan. Do not include any additional text, discussion, disclaimer, explanation or questions.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// A complete request for a generator.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub messages: Vec<Message>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Prompt {
    /// Content of the last user message, if any.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptOptions {
    /// Upper bound on plan text the caller will accept, in characters.
    pub max_plan_chars: usize,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            max_plan_chars: PLAN_TEXT_MAX_CHARS,
            max_tokens: None,
            temperature: None,
        }
    }
}

/// Build the system and user messages for planning the trip in `note`.
pub fn build_travel_prompt(
    note: &Note,
    preferences: Option<&Preferences>,
    options: &PromptOptions,
) -> Prompt {
    Prompt {
        messages: vec![
            Message {
                role: Role::System,
                content: system_message(preferences, options.max_plan_chars),
            },
            Message {
                role: Role::User,
                content: user_message(note),
            },
        ],
        max_tokens: options.max_tokens,
        temperature: options.temperature,
    }
}

fn system_message(preferences: Option<&Preferences>, max_plan_chars: usize) -> String {
    let mut content = String::from(SYSTEM_INSTRUCTIONS);

    let mut lines = Vec::new();
    if let Some(prefs) = preferences {
        if let Some(budget) = prefs.budget {
            lines.push(format!("Budget level: {budget}"));
        }
        if let Some(pace) = prefs.preferred_pace {
            lines.push(format!("Travel pace: {pace}"));
        }
        if let Some(style) = prefs.travel_style {
            lines.push(format!("Travel style: {style}"));
        }
    }
    if !lines.is_empty() {
        content.push_str("\n\nConsider these preferences:\n");
        content.push_str(&lines.join("\n"));
    }

    let limit = max_plan_chars.saturating_sub(LENGTH_HEADROOM);
    content.push_str(&format!("\n\nTravel plan max length: {limit} characters"));
    content
}

fn user_message(note: &Note) -> String {
    let mut content = format!(
        "Create a detailed travel plan for {place} from {from} to {to} ({days} days) for {people} people.\n\n\
         Trip title: {title}\n\n",
        place = note.place,
        from = note.date_from,
        to = note.date_to,
        days = note.trip_days(),
        people = note.number_of_people,
        title = note.title,
    );

    if let Some(ideas) = note.key_ideas.as_deref().filter(|s| !s.trim().is_empty()) {
        content.push_str(&format!("Additional notes/ideas: {ideas}\n\n"));
    }

    content.push_str("Organize the plan by days and include specific recommendations.");
    content
}
