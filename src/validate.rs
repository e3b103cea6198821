//! Payload validation
//!
//! Inbound payloads are validated before any state is touched. The typed
//! request structs in [`crate::protocol`] carry declarative rules plus the
//! custom checks defined here; a failed validation collects every
//! violation into one `Invalid …` message for the acknowledgement
//! callback.

use garde::Validate;

use crate::{
    constants::AVATARS,
    error::{EngineError, EngineResult},
};

/// Validates a value and folds all violations into a single error message
///
/// # Errors
///
/// `EngineError::Validation` naming every failed field, e.g.
/// `Invalid name, Invalid avatar`.
pub fn check<T: Validate<Context = ()>>(value: &T) -> EngineResult<()> {
    match value.validate() {
        Ok(()) => Ok(()),
        Err(report) => {
            let message = report
                .iter()
                .map(|(path, _)| format!("Invalid {path}"))
                .collect::<Vec<_>>()
                .join(", ");
            Err(EngineError::Validation(message))
        }
    }
}

/// Room codes are exactly six `[A-Z0-9]` characters
pub fn room_code(value: &str, _ctx: &()) -> garde::Result {
    if value.len() == 6
        && value
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        Ok(())
    } else {
        Err(garde::Error::new("must be 6 characters A-Z0-9"))
    }
}

/// Player names are letters, digits, and spaces only
pub fn player_name(value: &str, _ctx: &()) -> garde::Result {
    if value.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ') {
        Ok(())
    } else {
        Err(garde::Error::new("must be letters, numbers, and spaces"))
    }
}

/// Avatars must come from the fixed emoji set
pub fn avatar(value: &str, _ctx: &()) -> garde::Result {
    if AVATARS.contains(&value) {
        Ok(())
    } else {
        Err(garde::Error::new("not in the avatar set"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Validate)]
    struct Probe {
        #[garde(custom(room_code))]
        code: String,
        #[garde(length(chars, min = 1, max = 20), custom(player_name))]
        name: String,
        #[garde(custom(super::avatar))]
        avatar: String,
    }

    fn probe(code: &str, name: &str, avatar: &str) -> Probe {
        Probe {
            code: code.into(),
            name: name.into(),
            avatar: avatar.into(),
        }
    }

    #[test]
    fn valid_payload_passes() {
        assert!(check(&probe("K7MN2P", "Alice", "🦊")).is_ok());
    }

    #[test]
    fn violations_name_the_field() {
        let err = check(&probe("bad", "Alice", "🦊")).unwrap_err();
        assert_eq!(err.to_string(), "Invalid code");
    }

    #[test]
    fn all_violations_are_concatenated() {
        let err = check(&probe("bad", "", "💩")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Invalid code"));
        assert!(message.contains("Invalid name"));
        assert!(message.contains("Invalid avatar"));
    }

    #[test]
    fn name_charset_is_enforced() {
        assert!(check(&probe("K7MN2P", "Alice 2", "🦊")).is_ok());
        assert!(check(&probe("K7MN2P", "Alice!", "🦊")).is_err());
        assert!(check(&probe("K7MN2P", "Ålice", "🦊")).is_err());
    }

    #[test]
    fn name_length_bounds_are_enforced() {
        assert!(check(&probe("K7MN2P", &"a".repeat(20), "🦊")).is_ok());
        assert!(check(&probe("K7MN2P", &"a".repeat(21), "🦊")).is_err());
        assert!(check(&probe("K7MN2P", "", "🦊")).is_err());
    }
}
