//! Guided onboarding conversation.
//!
//! The step is derived from the history length on every turn; nothing about
//! progress is stored. Each step contributes a guidance prompt that is
//! appended as an assistant turn, and user utterances are mined for profile
//! points in the background.

pub mod model;
pub mod prompts;
pub mod routes;
pub mod session;
pub mod steps;

pub use model::{NewUser, ProfilePoint, ProfilePointType, TherapyFrequency, UserRecord};
pub use routes::{IDENTITY_HEADER, OnboardingRouteState, onboarding_routes};
pub use session::OnboardingSession;
pub use steps::{OnboardingStep, StepCatalog, StepName, classify};
