/*!
 * Routing key extraction from file names
 *
 * A routing pattern is a regular expression with at least one capture group.
 * The first group's text is the routing key.
 */

use regex::Regex;
use thiserror::Error;
use tracing::error;

/// Pattern used when the configured one is unusable
pub const DEFAULT_ROUTING_PATTERN: &str = r"(?i)_([^_.]+)\.dcm$";

/// Errors that can occur while compiling a routing pattern
#[derive(Error, Debug)]
pub enum PatternError {
    #[error("Invalid routing pattern '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        source: regex::Error,
    },

    #[error("Routing pattern '{pattern}' has no capture group")]
    NoCaptureGroup { pattern: String },
}

/// A compiled routing pattern
#[derive(Debug, Clone)]
pub struct RoutingPattern {
    regex: Regex,
    fallback: bool,
}

impl RoutingPattern {
    /// Compile a pattern, requiring at least one capture group
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let regex = Regex::new(pattern).map_err(|e| PatternError::InvalidRegex {
            pattern: pattern.to_string(),
            source: e,
        })?;

        // captures_len counts the implicit whole-match group
        if regex.captures_len() < 2 {
            return Err(PatternError::NoCaptureGroup {
                pattern: pattern.to_string(),
            });
        }

        Ok(Self {
            regex,
            fallback: false,
        })
    }

    /// Compile a pattern, substituting [`DEFAULT_ROUTING_PATTERN`] when it is unusable
    pub fn compile_or_default(pattern: &str) -> Self {
        match Self::compile(pattern) {
            Ok(compiled) => compiled,
            Err(e) => {
                error!(
                    default = DEFAULT_ROUTING_PATTERN,
                    "{}; falling back to default routing pattern", e
                );
                Self::default_pattern()
            }
        }
    }

    /// The built-in default pattern
    pub fn default_pattern() -> Self {
        Self {
            regex: Regex::new(DEFAULT_ROUTING_PATTERN).expect("default routing pattern is valid"),
            fallback: true,
        }
    }

    /// Pattern source text
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Whether the default pattern was substituted for the configured one
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    /// Extract the routing key from a full file name
    pub fn extract_key(&self, file_name: &str) -> Option<String> {
        extract_key(file_name, self)
    }
}

/// Extract the routing key from `file_name`.
///
/// Returns `None` when the pattern does not match, or when the first capture
/// group did not participate in the match or matched the empty string.
pub fn extract_key(file_name: &str, pattern: &RoutingPattern) -> Option<String> {
    let captures = pattern.regex.captures(file_name)?;
    let key = captures.get(1)?.as_str();
    if key.is_empty() {
        return None;
    }
    Some(key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pattern_extracts_trailing_segment() {
        let pattern = RoutingPattern::default_pattern();
        assert_eq!(
            pattern.extract_key("limbus_site_P123.dcm"),
            Some("P123".to_string())
        );
        assert_eq!(
            pattern.extract_key("scan_0042.DCM"),
            Some("0042".to_string())
        );
    }

    #[test]
    fn test_default_pattern_rejects_other_names() {
        let pattern = RoutingPattern::default_pattern();
        assert_eq!(pattern.extract_key("P123.dcm"), None);
        assert_eq!(pattern.extract_key("limbus_site_P123.txt"), None);
        assert_eq!(pattern.extract_key("limbus_site_.dcm"), None);
    }

    #[test]
    fn test_first_group_wins() {
        let pattern = RoutingPattern::compile(r"^([A-Z]+)-(\d+)\.dcm$").unwrap();
        assert_eq!(pattern.extract_key("ABC-42.dcm"), Some("ABC".to_string()));
    }

    #[test]
    fn test_pattern_applies_to_full_name() {
        // The extension is part of the matched text
        let pattern = RoutingPattern::compile(r"^(\w+)\.dcm$").unwrap();
        assert_eq!(pattern.extract_key("P9.dcm"), Some("P9".to_string()));
        assert_eq!(pattern.extract_key("P9.dcm.part"), None);
    }

    #[test]
    fn test_non_participating_group_is_unmatched() {
        let pattern = RoutingPattern::compile(r"^(?:id_(\w+)|anon)\.dcm$").unwrap();
        assert_eq!(pattern.extract_key("id_77.dcm"), Some("77".to_string()));
        assert_eq!(pattern.extract_key("anon.dcm"), None);
    }

    #[test]
    fn test_empty_group_is_unmatched() {
        let pattern = RoutingPattern::compile(r"^x(\d*)\.dcm$").unwrap();
        assert_eq!(pattern.extract_key("x.dcm"), None);
        assert_eq!(pattern.extract_key("x5.dcm"), Some("5".to_string()));
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let err = RoutingPattern::compile(r"_([A-Z").unwrap_err();
        assert!(matches!(err, PatternError::InvalidRegex { .. }));
    }

    #[test]
    fn test_pattern_without_group_is_rejected() {
        let err = RoutingPattern::compile(r"\.dcm$").unwrap_err();
        assert!(matches!(err, PatternError::NoCaptureGroup { .. }));
    }

    #[test]
    fn test_compile_or_default_falls_back() {
        let pattern = RoutingPattern::compile_or_default("(unclosed");
        assert!(pattern.is_fallback());
        assert_eq!(pattern.as_str(), DEFAULT_ROUTING_PATTERN);

        let pattern = RoutingPattern::compile_or_default(r"^(\d+)_");
        assert!(!pattern.is_fallback());
        assert_eq!(pattern.as_str(), r"^(\d+)_");
    }
}
