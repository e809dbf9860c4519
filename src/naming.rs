//! Output file naming: template rendering and filename sanitization.

use thiserror::Error;
use tracing::warn;

use crate::metadata::TrackMetadata;

const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Pattern used when the user's template cannot be rendered
pub const FALLBACK_TEMPLATE: &str = "{artist} - {title}";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Invalid template variable: '{0}'")]
    UnknownField(String),

    #[error("Unclosed '{{' at position {0}")]
    Unclosed(usize),

    #[error("Single '}}' at position {0}")]
    StrayBrace(usize),
}

/// Replace characters that are illegal in file names and trim stray separators.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if INVALID_CHARS.contains(&c) { '_' } else { c })
        .collect::<String>()
        .trim_matches(|c| c == ' ' || c == '.')
        .to_string()
}

/// Substitute `{field}` placeholders. `{{` and `}}` produce literal braces.
///
/// The output is not sanitized.
pub fn render_template(template: &str, metadata: &TrackMetadata) -> Result<String, TemplateError> {
    let mut rendered = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' if chars.peek().is_some_and(|&(_, next)| next == '{') => {
                chars.next();
                rendered.push('{');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, ch)) => field.push(ch),
                        None => return Err(TemplateError::Unclosed(pos)),
                    }
                }
                let value = metadata
                    .field(&field)
                    .ok_or(TemplateError::UnknownField(field))?;
                rendered.push_str(value);
            }
            '}' if chars.peek().is_some_and(|&(_, next)| next == '}') => {
                chars.next();
                rendered.push('}');
            }
            '}' => return Err(TemplateError::StrayBrace(pos)),
            other => rendered.push(other),
        }
    }

    Ok(rendered)
}

/// Build a sanitized output base name from the template.
///
/// The track number is normalized on a copy of `metadata` first. A template
/// that cannot be rendered falls back to `{artist} - {title}` with a warning.
pub fn format_filename(template: &str, metadata: &TrackMetadata) -> String {
    try_format_filename(template, metadata).unwrap_or_else(|e| {
        warn!("{} in template '{}', using '{}'", e, template, FALLBACK_TEMPLATE);
        fallback_filename(metadata)
    })
}

/// Like [`format_filename`] but hands the template error back instead of falling back
pub fn try_format_filename(template: &str, metadata: &TrackMetadata) -> Result<String, TemplateError> {
    let normalized = metadata.with_normalized_track();
    render_template(template, &normalized).map(|rendered| sanitize_filename(&rendered))
}

pub fn fallback_filename(metadata: &TrackMetadata) -> String {
    sanitize_filename(&format!("{} - {}", metadata.artist, metadata.title))
}
