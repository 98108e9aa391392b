//! User records and extracted profile points.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How often the user sees their therapist.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TherapyFrequency {
    Weekly,
    Biweekly,
    Monthly,
    Other,
}

impl std::fmt::Display for TherapyFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Weekly => write!(f, "weekly"),
            Self::Biweekly => write!(f, "biweekly"),
            Self::Monthly => write!(f, "monthly"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for TherapyFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(Self::Weekly),
            "biweekly" => Ok(Self::Biweekly),
            "monthly" => Ok(Self::Monthly),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown therapy frequency: {other}")),
        }
    }
}

/// A stored user. `external_id` is the identity issued by the auth proxy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    pub id: Uuid,
    pub external_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub therapy_frequency: Option<TherapyFrequency>,
    pub onboarding_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when creating a user.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub external_id: String,
    pub preferred_name: Option<String>,
    pub therapy_frequency: Option<TherapyFrequency>,
    pub onboarding_completed: bool,
}

impl NewUser {
    /// A user who has just started onboarding.
    pub fn onboarding(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            ..Default::default()
        }
    }
}

/// Category of an extracted profile point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProfilePointType {
    Goal,
    Struggle,
    Insight,
    NextStep,
}

/// One structured fact extracted from a user utterance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfilePoint {
    #[serde(rename = "type")]
    pub kind: ProfilePointType,
    pub context_tags: Vec<String>,
    pub summary: String,
    #[serde(default)]
    pub original_quote: String,
    pub importance: u8,
}

impl ProfilePoint {
    pub const MIN_TAGS: usize = 2;
    pub const MAX_TAGS: usize = 4;

    /// Check the shape constraints the extraction prompt asks for.
    pub fn validate(&self) -> Result<(), String> {
        let tags = self.context_tags.len();
        if !(Self::MIN_TAGS..=Self::MAX_TAGS).contains(&tags) {
            return Err(format!(
                "expected {}-{} context tags, got {tags}",
                Self::MIN_TAGS,
                Self::MAX_TAGS
            ));
        }
        if !(1..=5).contains(&self.importance) {
            return Err(format!("importance {} outside 1..=5", self.importance));
        }
        if self.summary.trim().is_empty() {
            return Err("empty summary".to_string());
        }
        Ok(())
    }
}
