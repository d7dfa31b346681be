//! Input validation for worksync
//!
//! Repository ids become directory names under the data root, so they are
//! restricted to a filesystem-safe alphabet. Remote addresses are parsed and
//! normalized to the form the transport expects.

use std::path::Path;
use thiserror::Error;

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid identifier '{0}': {1}")]
    InvalidIdentifier(String, &'static str),

    #[error("Identifier '{0}' is too long (max {1} characters)")]
    TooLong(String, usize),

    #[error("Identifier cannot be empty")]
    Empty,

    #[error("Invalid remote '{0}': {1}")]
    InvalidRemote(String, &'static str),
}

/// Maximum length for identifiers
pub const MAX_IDENTIFIER_LENGTH: usize = 255;

/// Suffix the smart-HTTP transport expects on repository URLs
pub const REMOTE_SUFFIX: &str = ".git";

/// Reserved names that cannot be used
const RESERVED_NAMES: &[&str] = &[
    ".", "..", "con", "prn", "aux", "nul",
    "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8", "com9",
    "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Validate a repository id
///
/// Rules:
/// - Must be 1-255 characters
/// - Only alphanumeric, underscore, and hyphen allowed
/// - Cannot start with a hyphen or underscore
/// - Cannot be a reserved name (case-insensitive)
pub fn validate_repository_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::Empty);
    }

    if id.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::TooLong(id.to_string(), MAX_IDENTIFIER_LENGTH));
    }

    for (i, c) in id.chars().enumerate() {
        if !c.is_ascii_alphanumeric() && c != '_' && c != '-' {
            return Err(ValidationError::InvalidIdentifier(
                id.to_string(),
                "contains invalid characters (only alphanumeric, underscore, and hyphen allowed)",
            ));
        }
        if i == 0 && (c == '-' || c == '_') {
            return Err(ValidationError::InvalidIdentifier(
                id.to_string(),
                "cannot start with hyphen or underscore",
            ));
        }
    }

    if RESERVED_NAMES.contains(&id.to_lowercase().as_str()) {
        return Err(ValidationError::InvalidIdentifier(id.to_string(), "reserved name"));
    }

    Ok(())
}

/// Sanitize an identifier by replacing invalid characters
/// Returns None if the result would be empty or invalid
pub fn sanitize_identifier(input: &str) -> Option<String> {
    if input.is_empty() {
        return None;
    }

    let mut result = String::with_capacity(input.len());

    for (i, c) in input.chars().enumerate() {
        if c.is_ascii_alphanumeric() {
            result.push(c);
        } else if (c == '_' || c == '-') && i > 0 {
            result.push(c);
        } else if !result.is_empty() && !result.ends_with('_') {
            result.push('_');
        }
    }

    let result = result.trim_end_matches('_').to_string();

    if result.is_empty() || validate_repository_id(&result).is_err() {
        None
    } else {
        Some(result)
    }
}

/// Derive a repository id from the last path segment of a remote
pub fn id_from_remote(remote: &str) -> Option<String> {
    let last = remote
        .trim_end_matches('/')
        .rsplit(|c: char| c == '/' || c == '\\' || c == ':')
        .next()?;
    sanitize_identifier(last.strip_suffix(REMOTE_SUFFIX).unwrap_or(last))
}

/// Parse and normalize a remote address
///
/// - `https://` and `http://` remotes lose trailing slashes and gain a `.git`
///   suffix when missing.
/// - `file://` URLs and absolute local paths are kept as-is.
/// - Anything else is rejected.
pub fn normalize_remote(remote: &str) -> Result<String, ValidationError> {
    let trimmed = remote.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidRemote(remote.to_string(), "empty address"));
    }

    match url::Url::parse(trimmed) {
        Ok(parsed) => match parsed.scheme() {
            "https" | "http" => {
                if parsed.host_str().map_or(true, str::is_empty) {
                    return Err(ValidationError::InvalidRemote(
                        remote.to_string(),
                        "missing host",
                    ));
                }
                let path = parsed.path().trim_end_matches('/');
                if path.is_empty() {
                    return Err(ValidationError::InvalidRemote(
                        remote.to_string(),
                        "missing repository path",
                    ));
                }
                let base = trimmed.trim_end_matches('/');
                if base.ends_with(REMOTE_SUFFIX) {
                    Ok(base.to_string())
                } else {
                    Ok(format!("{}{}", base, REMOTE_SUFFIX))
                }
            }
            "file" => Ok(trimmed.to_string()),
            _ => Err(ValidationError::InvalidRemote(
                remote.to_string(),
                "unsupported scheme",
            )),
        },
        Err(_) if Path::new(trimmed).is_absolute() => Ok(trimmed.to_string()),
        Err(_) => Err(ValidationError::InvalidRemote(
            remote.to_string(),
            "not a URL or absolute path",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert!(validate_repository_id("notes").is_ok());
        assert!(validate_repository_id("my-notes").is_ok());
        assert!(validate_repository_id("Vault123").is_ok());
        assert!(validate_repository_id("a").is_ok());
    }

    #[test]
    fn test_path_traversal_blocked() {
        assert!(validate_repository_id("..").is_err());
        assert!(validate_repository_id("../secret").is_err());
        assert!(validate_repository_id("foo/bar").is_err());
        assert!(validate_repository_id("foo\\bar").is_err());
    }

    #[test]
    fn test_invalid_start_and_reserved() {
        assert!(validate_repository_id("-foo").is_err());
        assert!(validate_repository_id("_foo").is_err());
        assert!(validate_repository_id("CON").is_err());
        assert!(validate_repository_id("").is_err());
        assert!(validate_repository_id(&"a".repeat(256)).is_err());
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_identifier("hello world"), Some("hello_world".to_string()));
        assert_eq!(sanitize_identifier("___"), None);
        assert_eq!(sanitize_identifier("-foo"), Some("foo".to_string()));
    }

    #[test]
    fn test_id_from_remote() {
        assert_eq!(
            id_from_remote("https://github.com/alice/notes.git"),
            Some("notes".to_string())
        );
        assert_eq!(
            id_from_remote("https://github.com/alice/my.vault/"),
            Some("my_vault".to_string())
        );
    }

    #[test]
    fn test_normalize_appends_suffix() {
        assert_eq!(
            normalize_remote("https://github.com/alice/notes").unwrap(),
            "https://github.com/alice/notes.git"
        );
        assert_eq!(
            normalize_remote("https://github.com/alice/notes/").unwrap(),
            "https://github.com/alice/notes.git"
        );
        assert_eq!(
            normalize_remote("https://github.com/alice/notes.git").unwrap(),
            "https://github.com/alice/notes.git"
        );
    }

    #[test]
    fn test_normalize_local_remotes() {
        assert_eq!(normalize_remote("/srv/git/notes").unwrap(), "/srv/git/notes");
        assert_eq!(
            normalize_remote("file:///srv/git/notes").unwrap(),
            "file:///srv/git/notes"
        );
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize_remote("").is_err());
        assert!(normalize_remote("not a remote").is_err());
        assert!(normalize_remote("ftp://example.com/notes").is_err());
        assert!(normalize_remote("https://github.com").is_err());
    }
}
