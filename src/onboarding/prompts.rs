//! System prompt and profile-extraction prompt for onboarding.

/// Persona for onboarding turns.
pub const ONBOARDING_SYSTEM_PROMPT: &str = "You are a compassionate therapy companion helping with onboarding. \
Keep responses warm and engaging, but focused on gathering necessary information.";

/// Instructions for the extraction model. The utterance is sent as the user turn.
pub const EXTRACTION_SYSTEM_PROMPT: &str = "\
You are analyzing a conversation as an experienced therapist with deep insight into human behavior. \
Extract the key elements that will guide personalized therapy and later therapeutic insights.

Rules:
1. Only include information that will meaningfully guide future therapeutic conversations.
2. Each item has a \"type\": one of \"goal\", \"struggle\", \"insight\", \"next_step\".
3. \"context_tags\": 2-4 specific keywords capturing the emotional, behavioral or thematic essence \
(e.g. [\"self_esteem\", \"perfectionism\"]). Avoid generic tags like \"therapy\" or \"conversation\".
4. \"summary\": one sentence pinpointing the essence of the statement.
5. \"original_quote\": a short direct quote from the user that prompted the entry.
6. \"importance\": integer 1-5 (1 minor, 2 relevant, 3 moderate, 4 significant, 5 central).

Output a JSON array of objects with exactly these fields:
[{\"type\": string, \"context_tags\": [string], \"summary\": string, \"original_quote\": string, \"importance\": int}]

Do not include any text outside the JSON array. Return [] when nothing is worth keeping.";

/// Frame a single utterance for the extraction call.
pub fn extraction_user_prompt(utterance: &str) -> String {
    format!("Here is what the user said:\n\nUSER: {utterance}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_prompt_names_every_point_type() {
        for kind in ["goal", "struggle", "insight", "next_step"] {
            assert!(EXTRACTION_SYSTEM_PROMPT.contains(kind), "missing {kind}");
        }
    }

    #[test]
    fn user_prompt_embeds_utterance() {
        let prompt = extraction_user_prompt("I can't sleep before exams");
        assert!(prompt.ends_with("USER: I can't sleep before exams"));
    }
}
