//! Prompt assembly for alt text requests.

use super::ImageContext;
use crate::provider::{ChatMessage, ChatRequest};

/// Completion budget. Alt text is short, so this only bounds runaway output.
pub const MAX_TOKENS: u32 = 300;

/// How many existing alt texts are quoted as style examples.
pub const EXAMPLE_LIMIT: usize = 5;
/// How many configured site categories are mentioned.
pub const CATEGORY_LIMIT: usize = 5;

pub const SYSTEM_PROMPT: &str = "You are an expert in website accessibility and SEO best practices. \
Your task is to generate descriptive, SEO-friendly alt text for images. \
The alt text should be concise (under 125 characters) but descriptive, conveying the image's purpose and content. \
Include relevant keywords naturally, without keyword stuffing.";

const INSTRUCTION: &str = "Generate a descriptive, SEO-friendly alt text for this image. \
The alt text should accurately describe what's in the image while incorporating relevant SEO keywords naturally.";

const OUTPUT_CONSTRAINT: &str = "Respond ONLY with the recommended alt text in plain text format, nothing else. \
Keep it under 125 characters.";

const NO_EXAMPLES: &str = "No existing alt tags found on this site. \
Create alt text that is descriptive, concise, and SEO-friendly.";

/// User message text. Empty context fields are left out entirely.
#[must_use]
pub fn user_prompt(context: &ImageContext, instructions: Option<&str>) -> String {
    let mut prompt = format!("{INSTRUCTION}\n\n");

    let labelled = [
        ("Image Title: ", &context.title, "\n"),
        ("Image Caption: ", &context.caption, "\n"),
        ("Image Description: ", &context.description, "\n\n"),
        ("Website Context:\n", &context.site, "\n\n"),
        (
            "Examples of existing alt tags on this site:\n",
            &context.examples,
            "\n\n",
        ),
    ];
    for (label, value, end) in labelled {
        let value = value.trim();
        if !value.is_empty() {
            prompt.push_str(label);
            prompt.push_str(value);
            prompt.push_str(end);
        }
    }

    if let Some(instructions) = instructions.map(str::trim).filter(|s| !s.is_empty()) {
        prompt.push_str("Additional Instructions: ");
        prompt.push_str(instructions);
        prompt.push_str("\n\n");
    }

    prompt.push_str(OUTPUT_CONSTRAINT);
    prompt
}

#[must_use]
pub fn build_request(
    model: &str,
    image_url: &str,
    context: &ImageContext,
    instructions: Option<&str>,
) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user_with_image(user_prompt(context, instructions), image_url),
        ],
        max_tokens: Some(MAX_TOKENS),
    }
}

/// Site summary block: name, tagline and up to [`CATEGORY_LIMIT`] categories.
#[must_use]
pub fn site_summary(name: &str, description: &str, categories: &[String]) -> String {
    let mut summary = format!("Site Name: {name}\nSite Description: {description}\n");
    let categories: Vec<&str> = categories
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .take(CATEGORY_LIMIT)
        .collect();
    if !categories.is_empty() {
        summary.push_str("\nSite Categories:\n");
        summary.push_str(&categories.join(", "));
        summary.push('\n');
    }
    summary
}

/// Bullet list of `(title, alt)` pairs, or a fallback hint when there are none.
#[must_use]
pub fn format_examples(examples: &[(String, String)]) -> String {
    let lines: Vec<String> = examples
        .iter()
        .filter(|(_, alt)| !alt.trim().is_empty())
        .take(EXAMPLE_LIMIT)
        .map(|(title, alt)| format!("- {title}: \"{}\"", alt.trim()))
        .collect();
    if lines.is_empty() {
        NO_EXAMPLES.to_string()
    } else {
        lines.join("\n")
    }
}
