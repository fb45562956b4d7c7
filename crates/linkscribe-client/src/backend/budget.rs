//! Completion-length budgeting for context-window-limited chat models.
//!
//! Token counts are estimated at four characters per token, rounded up,
//! plus a fixed per-message overhead for role and framing tokens.

use linkscribe_core::error::AppError;

/// Framing tokens charged for every chat message.
pub const MESSAGE_OVERHEAD_TOKENS: u32 = 15;

const CHARS_PER_TOKEN: usize = 4;

const CONTEXT_WINDOWS: &[(&str, u32)] = &[
    ("gpt-3.5-turbo", 4096),
    ("gpt-3.5-turbo-16k", 16384),
    ("gpt-3.5-turbo-0613", 4096),
    ("gpt-3.5-turbo-16k-0613", 16384),
    ("gpt-4", 8192),
    ("gpt-4-0125-preview", 128_000),
    ("gpt-4-turbo", 128_000),
    ("claude-3-sonnet-20240229", 200_000),
    ("gpt-4o-mini", 128_000),
];

/// Models whose output length is capped below their context window.
const COMPLETION_CEILINGS: &[(&str, u32)] = &[
    ("gpt-4-0125-preview", 4096),
    ("gpt-4-turbo", 4096),
    ("gpt-4o-mini", 4096),
];

/// Context window of a known model.
pub fn context_window(model: &str) -> Option<u32> {
    lookup(CONTEXT_WINDOWS, model)
}

fn completion_ceiling(model: &str) -> Option<u32> {
    lookup(COMPLETION_CEILINGS, model)
}

fn lookup(table: &[(&str, u32)], model: &str) -> Option<u32> {
    table
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, tokens)| *tokens)
}

pub fn estimate_tokens(text: &str) -> u32 {
    let tokens = text.chars().count().div_ceil(CHARS_PER_TOKEN);
    u32::try_from(tokens).unwrap_or(u32::MAX)
}

/// Estimated prompt size of a message list.
pub fn prompt_tokens(messages: &[&str]) -> u32 {
    messages.iter().fold(0u32, |total, content| {
        total
            .saturating_add(estimate_tokens(content))
            .saturating_add(MESSAGE_OVERHEAD_TOKENS)
    })
}

/// Tokens the model may generate for `messages`.
///
/// The window left after the prompt, clamped to the model's completion
/// ceiling and to `max_output_tokens`. A prompt that fills the window is a
/// permanent error.
pub fn completion_budget(
    provider: &str,
    model: &str,
    messages: &[&str],
    max_output_tokens: u32,
) -> Result<u32, AppError> {
    let window = context_window(model).ok_or_else(|| AppError::UnsupportedModel {
        provider: provider.to_string(),
        model: model.to_string(),
    })?;

    let prompt = prompt_tokens(messages);
    let remaining = window.saturating_sub(prompt);
    if remaining == 0 {
        return Err(AppError::permanent(
            provider,
            format!("prompt of ~{prompt} tokens exceeds the {window}-token window of {model}"),
        ));
    }

    let ceiling = completion_ceiling(model).unwrap_or(u32::MAX);
    Ok(remaining.min(ceiling).min(max_output_tokens))
}
