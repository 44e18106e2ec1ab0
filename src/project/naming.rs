use crate::error::{MeapisError, Result};

const MAX_NAME_LEN: usize = 64;

/// Trim, lowercase and turn whitespace runs into single dashes
pub fn normalize_project_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Normalize `name` and check it is a safe directory slug.
///
/// Accepted names start with `[a-z0-9]`, continue with `[a-z0-9_-]` and are at
/// most 64 characters long.
pub fn validate_project_name(name: &str) -> Result<String> {
    let normalized = normalize_project_name(name);

    let invalid = |reason: &str| MeapisError::InvalidProjectName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if normalized.contains("..") || normalized.contains('/') || normalized.contains('\\') {
        return Err(invalid("path separators are not allowed"));
    }

    let mut chars = normalized.chars();
    match chars.next() {
        None => return Err(invalid("name is empty")),
        Some(first) if !(first.is_ascii_lowercase() || first.is_ascii_digit()) => {
            return Err(invalid("must start with a lowercase letter or digit"));
        }
        Some(_) => {}
    }

    if normalized.len() > MAX_NAME_LEN {
        return Err(invalid("at most 64 characters"));
    }

    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_') {
        return Err(invalid("only a-z, 0-9, '-' and '_' are allowed"));
    }

    Ok(normalized)
}
