//! Onboarding steps and the history-length classifier.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The fixed onboarding sequence.
///
/// Progresses linearly: Intro → TherapyFrequency → Goals → Challenges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Intro,
    TherapyFrequency,
    Goals,
    Challenges,
}

impl StepName {
    pub const ALL: [StepName; 4] = [
        Self::Intro,
        Self::TherapyFrequency,
        Self::Goals,
        Self::Challenges,
    ];
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Intro => "intro",
            Self::TherapyFrequency => "therapy_frequency",
            Self::Goals => "goals",
            Self::Challenges => "challenges",
        };
        write!(f, "{s}")
    }
}

/// Map a conversation length to the step it belongs to.
///
/// Content-blind and monotonic: a longer history never maps to an earlier
/// step.
pub fn classify(history_len: usize) -> StepName {
    match history_len {
        0..=2 => StepName::Intro,
        3..=4 => StepName::TherapyFrequency,
        5..=6 => StepName::Goals,
        _ => StepName::Challenges,
    }
}

/// One stage of the guided conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingStep {
    pub name: StepName,
    /// Injected as an assistant turn after the history.
    pub guidance_prompt: String,
    /// Informational; not used to decide progression.
    pub required_fields: Vec<String>,
}

impl OnboardingStep {
    pub fn new(name: StepName, guidance_prompt: &str, required_fields: &[&str]) -> Self {
        Self {
            name,
            guidance_prompt: guidance_prompt.to_string(),
            required_fields: required_fields.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// Immutable step table, shared read-only across requests.
#[derive(Debug, Clone)]
pub struct StepCatalog {
    steps: Vec<OnboardingStep>,
}

impl StepCatalog {
    /// Build a catalog. It must contain the intro step, which is the
    /// fallback for names missing from the table.
    pub fn new(steps: Vec<OnboardingStep>) -> Result<Self, ConfigError> {
        if !steps.iter().any(|s| s.name == StepName::Intro) {
            return Err(ConfigError::InvalidValue {
                key: "onboarding.steps".to_string(),
                message: "catalog must contain the intro step".to_string(),
            });
        }
        Ok(Self { steps })
    }

    pub fn get(&self, name: StepName) -> Option<&OnboardingStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn steps(&self) -> &[OnboardingStep] {
        &self.steps
    }

    /// The step for a history of `history_len` messages, falling back to
    /// intro when the classified name has no entry.
    pub fn classify(&self, history_len: usize) -> &OnboardingStep {
        let name = classify(history_len);
        match self.get(name) {
            Some(step) => step,
            None => {
                tracing::debug!(step = %name, "Step missing from catalog, using intro");
                self.intro()
            }
        }
    }

    fn intro(&self) -> &OnboardingStep {
        // `new` guarantees an intro entry; index 0 keeps this total regardless.
        self.get(StepName::Intro).unwrap_or(&self.steps[0])
    }
}

impl Default for StepCatalog {
    fn default() -> Self {
        Self {
            steps: vec![
                OnboardingStep::new(
                    StepName::Intro,
                    "Hi! Let's start with some basic information. What's your name?",
                    &["name"],
                ),
                OnboardingStep::new(
                    StepName::TherapyFrequency,
                    "How often do you typically attend therapy sessions?",
                    &["frequency"],
                ),
                OnboardingStep::new(
                    StepName::Goals,
                    "What are your main goals in therapy? What would you like to work on?",
                    &["goals"],
                ),
                OnboardingStep::new(
                    StepName::Challenges,
                    "What challenges have you been facing lately?",
                    &["challenges"],
                ),
            ],
        }
    }
}
