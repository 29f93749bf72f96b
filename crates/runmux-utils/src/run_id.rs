//! Run ID sanitization and validation
//!
//! Run IDs become directory and lock file names, so they are sanitized once
//! at subsystem entry. A well-formed ID passes through unchanged, keeping
//! the on-disk layout identical to the caller's naming.

use unicode_normalization::UnicodeNormalization;

/// Error type for run ID validation failures
#[derive(Debug, thiserror::Error)]
pub enum RunIdError {
    #[error("Run ID is empty after sanitization")]
    Empty,

    #[error("Run ID contains only invalid characters")]
    OnlyInvalidCharacters,
}

/// Sanitizes a run ID to ensure it's safe for filesystem use
///
/// This function:
/// - Normalizes Unicode with NFKC to handle confusables
/// - Accepts only [A-Za-z0-9._-]
/// - Replaces invalid characters with underscore
/// - Collapses consecutive dots to prevent path traversal
/// - Rejects IDs that are empty or carry no meaningful content
///
/// # Examples
///
/// ```
/// use runmux_utils::run_id::sanitize_run_id;
///
/// // Valid ID passes through unchanged
/// assert_eq!(sanitize_run_id("run-42_v2.0").unwrap(), "run-42_v2.0");
///
/// // Invalid characters are replaced with underscores
/// assert_eq!(sanitize_run_id("run 42!").unwrap(), "run_42_");
///
/// // Traversal attempts are neutralized
/// assert_eq!(sanitize_run_id("../evil").unwrap(), "___evil");
/// ```
pub fn sanitize_run_id(id: &str) -> Result<String, RunIdError> {
    // Step 1: Normalize with NFKC (Unicode normalization) to handle confusables
    let normalized: String = id.nfkc().collect();

    // Step 2: Filter and replace invalid characters
    let mut sanitized: String = normalized
        .chars()
        .map(|c| {
            // Accept [A-Za-z0-9._-]
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    // Step 3: Replace consecutive dots to prevent path traversal
    while sanitized.contains("..") {
        sanitized = sanitized.replace("..", "__");
    }

    // Step 4: Check if empty after sanitization
    if sanitized.is_empty() {
        return Err(RunIdError::Empty);
    }

    // Step 5: A bare "." would alias the parent of every run directory
    if sanitized == "." {
        return Err(RunIdError::OnlyInvalidCharacters);
    }

    // Step 6: Reject results with no meaningful content. Underscores alone
    // mean every original character was replaced.
    let has_meaningful_content = sanitized
        .chars()
        .any(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if !has_meaningful_content {
        return Err(RunIdError::OnlyInvalidCharacters);
    }

    if sanitized != id {
        tracing::warn!(
            target: "runmux::run_id",
            original = %id,
            sanitized = %sanitized,
            "Run ID sanitized for filesystem use"
        );
    }

    Ok(sanitized)
}
