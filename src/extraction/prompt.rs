/// The prompt template used for extracting a recipe from a caption.
///
/// Loaded from `prompt.txt` at compile time. Contains a `{{CAPTION}}`
/// placeholder that [`build_extraction_prompt`] replaces with the caption.
pub const RECIPE_EXTRACTION_PROMPT: &str = include_str!("prompt.txt");

/// The line every extraction prompt must carry, whatever the caption language
pub const ENGLISH_OUTPUT_RULE: &str =
    "**IMPORTANT: Extract ALL information in ENGLISH, regardless of the source language.**";

/// System prompt pinning the reply to the extraction schema
pub const EXTRACTION_SCHEMA_PROMPT: &str = r#"
You extract recipes into JSON. Output only this JSON object without any other characters:

{
  "ingredients": [
    {"name": "<string>", "quantity": "<string, optional>", "unit": "<string, optional>", "notes": "<string, optional>"}
  ],
  "steps": [
    {"order": <integer starting at 1>, "instruction": "<string>", "durationMinutes": <number, optional>}
  ],
  "prepTimeMinutes": <integer, optional>,
  "cookTimeMinutes": <integer, optional>,
  "servings": <integer, optional>
}

Omit optional fields you cannot determine instead of writing null.
"#;

/// Injects the caption into the extraction prompt template.
pub fn build_extraction_prompt(caption: &str) -> String {
    RECIPE_EXTRACTION_PROMPT.replace("{{CAPTION}}", caption.trim())
}
