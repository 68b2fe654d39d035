//! Field validators for workspace, todo and comment inputs.
//!
//! Every validator is pure: it either returns the cleaned value or an
//! [`AuError::Invalid`] and never touches document state. Mutating
//! operations call these before acquiring the document mutex.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::error::{AuError, Result};
use crate::unicode::validate_and_clean_unicode;

/// Shortest accepted workspace alias, after trimming.
pub const MINIMUM_ALIAS_LENGTH: usize = 1;
/// Longest accepted workspace alias.
pub const MAXIMUM_ALIAS_LENGTH: usize = 255;
/// Shortest accepted todo title, after trimming.
pub const MINIMUM_TODO_TITLE_LENGTH: usize = 3;
/// Longest accepted todo title.
pub const MAXIMUM_TODO_TITLE_LENGTH: usize = 200;
/// Longest accepted todo description.
pub const MAXIMUM_DESCRIPTION_LENGTH: usize = 5000;
/// Media type of comments whose content is treated as collaborative text.
pub const DEFAULT_COMMENT_MEDIA_TYPE: &str = "text/markdown";

/// Hostname whose annotation keys follow the scheme this crate controls.
pub const RESERVED_ANNOTATION_HOSTNAME: &str = "aurelian.one";
/// Single-label hostname reserved against accidental use.
pub const RESERVED_ANNOTATION_SHORT_HOSTNAME: &str = "aurelian";

/// Well-known annotation key for ordered listing (integer value, no fragment).
pub const RANK_ANNOTATION_KEY: &str = "https://aurelian.one/annotations/rank";
/// Well-known annotation key prefix for labels (fragment identifies the label).
pub const LABEL_ANNOTATION_KEY: &str = "https://aurelian.one/annotations/label";

/// Validate and clean a workspace alias: single line, trimmed, 1-255 chars.
pub fn validate_workspace_alias(input: &str) -> Result<String> {
    let cleaned = validate_and_clean_unicode(input, false)
        .map_err(|e| AuError::invalid("alias", e.to_string()))?;
    let trimmed = cleaned.trim();
    if trimmed.len() < MINIMUM_ALIAS_LENGTH {
        return Err(AuError::invalid(
            "alias",
            format!("too short, it should be at least {MINIMUM_ALIAS_LENGTH} characters"),
        ));
    }
    if trimmed.len() > MAXIMUM_ALIAS_LENGTH {
        return Err(AuError::invalid(
            "alias",
            format!("too long, it should be at most {MAXIMUM_ALIAS_LENGTH} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Validate and clean a todo title: single line, trimmed, 3-200 chars.
pub fn validate_todo_title(input: &str) -> Result<String> {
    let cleaned = validate_and_clean_unicode(input, false)
        .map_err(|e| AuError::invalid("title", e.to_string()))?;
    let trimmed = cleaned.trim();
    if trimmed.len() < MINIMUM_TODO_TITLE_LENGTH {
        return Err(AuError::invalid(
            "title",
            format!("too short, it should be at least {MINIMUM_TODO_TITLE_LENGTH} characters"),
        ));
    }
    if trimmed.len() > MAXIMUM_TODO_TITLE_LENGTH {
        return Err(AuError::invalid(
            "title",
            format!("too long, it should be at most {MAXIMUM_TODO_TITLE_LENGTH} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Validate and clean a todo description: multi-line, at most 5000 chars.
pub fn validate_todo_description(input: &str) -> Result<String> {
    let cleaned = validate_and_clean_unicode(input, true)
        .map_err(|e| AuError::invalid("description", e.to_string()))?;
    if cleaned.len() > MAXIMUM_DESCRIPTION_LENGTH {
        return Err(AuError::invalid(
            "description",
            format!("too long, it should be at most {MAXIMUM_DESCRIPTION_LENGTH} characters"),
        ));
    }
    Ok(cleaned)
}

/// Validate a todo status: `open` or `closed`.
pub fn validate_todo_status(input: &str) -> Result<String> {
    match input {
        "open" | "closed" => Ok(input.to_string()),
        _ => Err(AuError::invalid("status", "must be open or closed")),
    }
}

fn author_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\S+( \S+)* <\S+@\S+>$").expect("author pattern compiles"))
}

/// Validate an author identity of the form `Name <local@host>`.
pub fn validate_author(input: &str) -> Result<()> {
    if !author_pattern().is_match(input) {
        return Err(AuError::invalid(
            "author",
            "expected 'Name <email>'".to_string(),
        ));
    }
    Ok(())
}

/// Validate a todo annotation key.
///
/// Any URI with a scheme is accepted up to 255 bytes, except that keys in
/// the `aurelian.one` host must match the schema this crate controls and
/// keys in the bare `aurelian` host are always reserved.
pub fn validate_todo_annotation_key(key: &str) -> Result<()> {
    if key.len() > 255 {
        return Err(AuError::invalid("annotation key", "uri is too long"));
    }
    let u = Url::parse(key).map_err(|e| AuError::invalid("annotation key", e.to_string()))?;
    if u.scheme().trim().is_empty() {
        return Err(AuError::invalid("annotation key", "missing a uri scheme"));
    }

    let host = u.host_str().unwrap_or("");
    if host == RESERVED_ANNOTATION_HOSTNAME {
        // we control this schema and there are only particular valid values here
        if u.scheme() != "https" {
            return Err(AuError::invalid(
                "annotation key",
                format!("'{host}' annotations require an https scheme"),
            ));
        }
        if !u.username().is_empty() || u.password().is_some() {
            return Err(AuError::invalid(
                "annotation key",
                format!("'{host}' annotations cannot have user info"),
            ));
        }
        if u.port().is_some() {
            return Err(AuError::invalid(
                "annotation key",
                format!("'{host}' annotations cannot have a port"),
            ));
        }
        if u.query().is_some() {
            return Err(AuError::invalid(
                "annotation key",
                format!("'{host}' annotations cannot have a query string"),
            ));
        }
        let parts: Vec<&str> = u.path().split('/').collect();
        if parts.len() != 3 || parts[1] != "annotations" || parts[2].is_empty() {
            return Err(AuError::invalid(
                "annotation key",
                format!("'{host}' annotation path must match /annotations/* pattern"),
            ));
        }
        match parts[2] {
            "label" => {
                if u.fragment().unwrap_or("").is_empty() {
                    return Err(AuError::invalid(
                        "annotation key",
                        format!("'{host}' 'label' annotation requires a valid fragment"),
                    ));
                }
            }
            "rank" => {
                if u.fragment().is_some() {
                    return Err(AuError::invalid(
                        "annotation key",
                        format!("'{host}' 'rank' annotation cannot have a fragment"),
                    ));
                }
            }
            other => {
                return Err(AuError::invalid(
                    "annotation key",
                    format!("'{host}' '{other}' annotation is not supported"),
                ));
            }
        }
    } else if host == RESERVED_ANNOTATION_SHORT_HOSTNAME {
        return Err(AuError::invalid(
            "annotation key",
            format!("'{host}' annotations are reserved"),
        ));
    }
    Ok(())
}
