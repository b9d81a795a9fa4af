//! Wire types exchanged with the training backend.

use crate::state::Turn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A server-defined role-play that parameterizes a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: i64,
    pub title: String,
    pub goal: String,
    #[serde(default)]
    pub customer_persona: String,
    #[serde(default)]
    pub required_keywords: Vec<String>,
}

/// Payload for creating a scenario from the admin console.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioDraft {
    pub title: String,
    pub goal: String,
    pub customer_persona: String,
    pub required_keywords: Vec<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DraftError {
    #[error("{0} is required")]
    MissingField(&'static str),
}

impl ScenarioDraft {
    /// Builds a draft from raw form fields. Keywords are comma separated.
    pub fn from_form(
        title: &str,
        goal: &str,
        customer_persona: &str,
        keywords: &str,
    ) -> Result<Self, DraftError> {
        let required = |value: &str, name: &'static str| {
            let value = value.trim();
            if value.is_empty() {
                Err(DraftError::MissingField(name))
            } else {
                Ok(value.to_string())
            }
        };

        let title = required(title, "title")?;
        let goal = required(goal, "goal")?;
        let customer_persona = required(customer_persona, "customer persona")?;
        required(keywords, "keywords")?;

        let required_keywords = keywords
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            title,
            goal,
            customer_persona,
            required_keywords,
        })
    }
}

/// The analyzer's verdict on a concluded session.
///
/// Backends differ in which scores they report, so anything beyond the
/// well-known fields is kept in `scores` (e.g. `clarity_score`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub goal_achieved: bool,
    #[serde(default)]
    pub keywords_usage: Vec<String>,
    #[serde(default)]
    pub feedback_on_goal: Option<String>,
    #[serde(default)]
    pub overall_assessment: String,
    #[serde(flatten)]
    pub scores: BTreeMap<String, serde_json::Value>,
}

impl Feedback {
    /// Scores as display pairs, e.g. `("Clarity Score", "7/10")`.
    pub fn score_lines(&self) -> Vec<(String, String)> {
        self.scores
            .iter()
            .map(|(key, value)| {
                let label = key
                    .split('_')
                    .filter(|w| !w.is_empty())
                    .map(capitalize)
                    .collect::<Vec<_>>()
                    .join(" ");
                let shown = match value {
                    serde_json::Value::Number(n) if key.ends_with("_score") => format!("{}/10", n),
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (label, shown)
            })
            .collect()
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Body of the respond and analyze calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRequest {
    pub conversation: Vec<Turn>,
    pub scenario_id: i64,
}

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_splits_and_trims_keywords() {
        let draft = ScenarioDraft::from_form(
            "Cold call",
            "Book a demo",
            "Busy CTO",
            " pricing, demo ,, discount ",
        )
        .unwrap();
        assert_eq!(draft.required_keywords, vec!["pricing", "demo", "discount"]);
    }

    #[test]
    fn test_draft_requires_every_field() {
        let err = ScenarioDraft::from_form("Cold call", " ", "Busy CTO", "demo").unwrap_err();
        assert_eq!(err, DraftError::MissingField("goal"));
        assert_eq!(err.to_string(), "goal is required");

        let err = ScenarioDraft::from_form("Cold call", "Book", "CTO", "").unwrap_err();
        assert_eq!(err, DraftError::MissingField("keywords"));
    }

    #[test]
    fn test_feedback_keyword_variant() {
        let json = r#"{
            "goal_achieved": true,
            "keywords_usage": ["discount"],
            "feedback_on_goal": "You steered the client well.",
            "overall_assessment": "Great job!"
        }"#;
        let feedback: Feedback = serde_json::from_str(json).unwrap();
        assert!(feedback.goal_achieved);
        assert_eq!(feedback.keywords_usage, vec!["discount"]);
        assert!(feedback.scores.is_empty());
    }

    #[test]
    fn test_feedback_collects_extra_scores() {
        let json = r#"{
            "goal_achieved": false,
            "clarity_score": 7,
            "persuasion_score": 4,
            "overall_assessment": "Be more assertive."
        }"#;
        let feedback: Feedback = serde_json::from_str(json).unwrap();
        assert!(feedback.keywords_usage.is_empty());
        assert_eq!(
            feedback.score_lines(),
            vec![
                ("Clarity Score".to_string(), "7/10".to_string()),
                ("Persuasion Score".to_string(), "4/10".to_string()),
            ]
        );
    }

    #[test]
    fn test_scenario_tolerates_missing_persona() {
        let scenario: Scenario =
            serde_json::from_str(r#"{"id": 3, "title": "Upsell", "goal": "Sell the plan"}"#).unwrap();
        assert_eq!(scenario.id, 3);
        assert!(scenario.customer_persona.is_empty());
        assert!(scenario.required_keywords.is_empty());
    }
}
