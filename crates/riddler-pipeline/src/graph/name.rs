use std::sync::OnceLock;

use regex::Regex;

use riddler_core::error::{Result, RiddleError};

/// Key under which the execution context exposes the most recent result.
pub const LAST_KEY: &str = "last";
/// Key wrapping each step's recorded output inside the execution context.
pub const RESULT_KEY: &str = "result";
/// Key holding the accumulated snapshot handed to yield functions.
pub const WEB_REQUEST_KEY: &str = "webRequest";

/// Names that would shadow the context's own accessors or read as literals
/// inside a guard expression.
const RESERVED: &[&str] = &[LAST_KEY, RESULT_KEY, WEB_REQUEST_KEY, "true", "false", "null"];

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("identifier pattern is a valid regex")
    })
}

/// Whether `name` is one of the reserved context words.
pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(&name)
}

/// Validate a step or yield point name.
///
/// Names must look like identifiers (dashes allowed) so that a dotted guard
/// string `"step.field"` can always be split unambiguously.
pub fn validate_step_name(name: &str) -> Result<()> {
    if is_reserved(name) {
        return Err(RiddleError::ReservedName(name.to_string()));
    }
    if !identifier_pattern().is_match(name) {
        return Err(RiddleError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_names() {
        assert!(validate_step_name("detect").is_ok());
        assert!(validate_step_name("inputClassification").is_ok());
        assert!(validate_step_name("input-complete").is_ok());
        assert!(validate_step_name("_private2").is_ok());
    }

    #[test]
    fn test_rejects_context_accessors() {
        for name in ["last", "result", "webRequest"] {
            assert!(matches!(
                validate_step_name(name),
                Err(RiddleError::ReservedName(_))
            ));
        }
    }

    #[test]
    fn test_rejects_literal_words() {
        assert!(matches!(
            validate_step_name("true"),
            Err(RiddleError::ReservedName(_))
        ));
        assert!(matches!(
            validate_step_name("null"),
            Err(RiddleError::ReservedName(_))
        ));
    }

    #[test]
    fn test_rejects_non_identifiers() {
        for name in ["", "a.b", "1st", "has space", "semi;colon"] {
            assert!(
                matches!(validate_step_name(name), Err(RiddleError::InvalidName(_))),
                "{name:?} should be invalid"
            );
        }
    }
}
