//! Prompts sent to the video-understanding model.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::RecipeError;

/// Template for the tolerant policy, with `{{STEPS}}` and `{{FIRST_STEP}}`
/// placeholders.
pub const TOLERANT_PROMPT_TEMPLATE: &str = include_str!("tolerant_prompt.txt");

/// Prompt text supplied by an operator. Never blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomPrompt(String);

impl CustomPrompt {
    pub fn new(text: impl Into<String>) -> Result<Self, RecipeError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(RecipeError::InvalidInput(
                "custom prompt text cannot be empty".to_string(),
            ));
        }
        Ok(CustomPrompt(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// How the analysis prompt is phrased
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PromptPolicy {
    /// One clean contiguous range per step
    #[default]
    Strict,
    /// Overlapping, combined or missing actions are expected; nulls allowed
    Tolerant,
    /// Operator-supplied text, sent verbatim
    Custom(CustomPrompt),
}

impl FromStr for PromptPolicy {
    type Err = RecipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" | "basic" => Ok(PromptPolicy::Strict),
            "tolerant" | "advanced" => Ok(PromptPolicy::Tolerant),
            other => Err(RecipeError::InvalidInput(format!(
                "unknown prompt policy '{}' (expected strict or tolerant)",
                other
            ))),
        }
    }
}

impl fmt::Display for PromptPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptPolicy::Strict => f.write_str("strict"),
            PromptPolicy::Tolerant => f.write_str("tolerant"),
            PromptPolicy::Custom(_) => f.write_str("custom"),
        }
    }
}

fn numbered(instructions: &[String]) -> String {
    instructions
        .iter()
        .enumerate()
        .map(|(index, instruction)| format!("{}. {}", index + 1, instruction))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_strict_prompt(instructions: &[String]) -> String {
    format!(
        "Identify the start time and end time (in seconds) for each cooking step in this video:\n\n{}\n\nReturn as JSON: [{{ \"step\": 1, \"startSeconds\": X, \"endSeconds\": Y }}, ...]",
        numbered(instructions)
    )
}

pub fn build_tolerant_prompt(instructions: &[String]) -> String {
    let first = instructions
        .first()
        .map(|instruction| json_string_body(instruction))
        .unwrap_or_default();

    TOLERANT_PROMPT_TEMPLATE
        .replace("{{STEPS}}", &numbered(instructions))
        .replace("{{FIRST_STEP}}", &first)
}

/// `text` escaped for the inside of a JSON string literal
fn json_string_body(text: &str) -> String {
    let quoted = Value::String(text.to_string()).to_string();
    quoted
        .strip_prefix('"')
        .and_then(|body| body.strip_suffix('"'))
        .unwrap_or_default()
        .to_string()
}

/// Build the analysis prompt for `instructions`, numbered 1..N by position.
pub fn build_prompt(policy: &PromptPolicy, instructions: &[String]) -> String {
    match policy {
        PromptPolicy::Strict => build_strict_prompt(instructions),
        PromptPolicy::Tolerant => build_tolerant_prompt(instructions),
        PromptPolicy::Custom(custom) => custom.as_str().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pasta() -> Vec<String> {
        vec![
            "Boil water.".to_string(),
            "Add pasta.".to_string(),
            "Drain.".to_string(),
        ]
    }

    #[test]
    fn test_strict_prompt_numbers_steps() {
        let prompt = build_prompt(&PromptPolicy::Strict, &pasta());
        assert!(prompt.contains("1. Boil water.\n2. Add pasta.\n3. Drain."));
        assert!(prompt.contains(r#"[{ "step": 1, "startSeconds": X, "endSeconds": Y }, ...]"#));
    }

    #[test]
    fn test_tolerant_prompt_uses_actual_steps() {
        let prompt = build_prompt(&PromptPolicy::Tolerant, &pasta());
        assert!(prompt.contains("overlap"));
        assert!(prompt.contains("confidence"));
        assert!(prompt.contains("null"));
        assert!(prompt.contains("Prefer visual evidence"));
        assert!(prompt.contains("1. Boil water.\n2. Add pasta.\n3. Drain."));
        assert!(prompt.contains(r#""description": "Boil water.""#));
        assert!(!prompt.contains("{{"));
        assert!(!prompt.contains("spare ribs"));
    }

    #[test]
    fn test_tolerant_example_escapes_first_step() {
        let first = "Whisk \"eggs\" with C:\\sugar\nthen rest".to_string();
        let prompt = build_tolerant_prompt(&[first.clone(), "Bake.".to_string()]);

        let line = prompt
            .lines()
            .find(|line| line.trim_start().starts_with("\"description\""))
            .unwrap();
        let value = line.trim().trim_end_matches(',');
        let parsed: Value = serde_json::from_str(&format!("{{{}}}", value)).unwrap();
        assert_eq!(parsed["description"], Value::String(first));
    }

    #[test]
    fn test_custom_prompt_is_verbatim() {
        let custom = CustomPrompt::new("Only find the plating shot.").unwrap();
        let prompt = build_prompt(&PromptPolicy::Custom(custom), &pasta());
        assert_eq!(prompt, "Only find the plating shot.");
    }

    #[test]
    fn test_blank_custom_prompt_is_rejected() {
        assert!(matches!(
            CustomPrompt::new("  \n"),
            Err(RecipeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("strict".parse::<PromptPolicy>().unwrap(), PromptPolicy::Strict);
        assert_eq!("Basic".parse::<PromptPolicy>().unwrap(), PromptPolicy::Strict);
        assert_eq!(
            "advanced".parse::<PromptPolicy>().unwrap(),
            PromptPolicy::Tolerant
        );
        assert!("custom".parse::<PromptPolicy>().is_err());
    }
}
