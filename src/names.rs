//! Student display name validation
//!
//! Students type a display name when joining a test. Names are shown on the
//! teacher's monitor, so they are trimmed, length-limited and filtered for
//! inappropriate content before anything is written.

use rustrict::CensorStr;
use serde::Serialize;
use thiserror::Error;

use crate::constants::student::MAX_NAME_LENGTH;

/// Errors that can occur during name validation
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The name is empty or contains only whitespace
    #[error("name cannot be empty")]
    Empty,
    /// The name contains inappropriate content
    #[error("name is inappropriate")]
    Sinful,
    /// The name exceeds the maximum allowed length
    #[error("name is too long")]
    TooLong,
}

/// Validates a display name and returns its cleaned form
///
/// # Errors
///
/// * `Error::TooLong` - Name exceeds 30 characters
/// * `Error::Empty` - Name is empty after trimming whitespace
/// * `Error::Sinful` - Name contains inappropriate content
pub fn validate_name(name: &str) -> Result<String, Error> {
    let name = rustrict::trim_whitespace(name);
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(Error::TooLong);
    }
    if name.is_empty() {
        return Err(Error::Empty);
    }
    if name.is_inappropriate() {
        return Err(Error::Sinful);
    }
    Ok(name.to_owned())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_names_valid() {
        assert_eq!(validate_name("Ada Lovelace"), Ok("Ada Lovelace".to_string()));
    }

    #[test]
    fn test_names_too_long() {
        let long_name = "a".repeat(MAX_NAME_LENGTH + 1);
        assert_eq!(validate_name(&long_name), Err(Error::TooLong));
    }

    #[test]
    fn test_names_max_length_allowed() {
        let max_name = "a".repeat(MAX_NAME_LENGTH);
        assert_eq!(validate_name(&max_name), Ok(max_name));
    }

    #[test]
    fn test_names_length_counts_characters() {
        let name = "é".repeat(MAX_NAME_LENGTH);
        assert!(validate_name(&name).is_ok());
    }

    #[test]
    fn test_names_empty_name() {
        assert_eq!(validate_name(""), Err(Error::Empty));
        assert_eq!(validate_name("   "), Err(Error::Empty));
        assert_eq!(validate_name("\t\n"), Err(Error::Empty));
    }

    #[test]
    fn test_names_whitespace_trimming() {
        assert_eq!(validate_name("  Grace  "), Ok("Grace".to_string()));
    }

    #[test]
    fn test_names_inappropriate_content() {
        for name in ["damn", "fuck", "shit"] {
            assert_eq!(
                validate_name(name),
                Err(Error::Sinful),
                "Expected '{name}' to be flagged as inappropriate"
            );
        }
    }

    #[test]
    fn test_error_display() {
        assert_eq!(Error::Empty.to_string(), "name cannot be empty");
        assert_eq!(Error::Sinful.to_string(), "name is inappropriate");
        assert_eq!(Error::TooLong.to_string(), "name is too long");
    }
}
