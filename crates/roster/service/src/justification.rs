use crate::JustificationError;
use roster_types::ActionType;

pub const MIN_JUSTIFICATION_CHARS: usize = 3;
pub const MAX_JUSTIFICATION_CHARS: usize = 500;

/// Trim and bound-check a justification.
pub fn validate(raw: &str) -> Result<String, JustificationError> {
    let trimmed = raw.trim();
    let len = trimmed.chars().count();
    if len < MIN_JUSTIFICATION_CHARS {
        return Err(JustificationError::TooShort {
            min: MIN_JUSTIFICATION_CHARS,
            len,
        });
    }
    if len > MAX_JUSTIFICATION_CHARS {
        return Err(JustificationError::TooLong {
            max: MAX_JUSTIFICATION_CHARS,
            len,
        });
    }
    Ok(trimmed.to_string())
}

/// The justification to log for `action`.
///
/// Clears may be issued without one; a blank clear is logged with a fixed
/// description instead. Anything typed is still bound-checked.
pub fn for_action(action: ActionType, raw: &str) -> Result<String, JustificationError> {
    if !action.requires_justification() && raw.trim().is_empty() {
        return Ok(clear_description(action).to_string());
    }
    validate(raw)
}

fn clear_description(action: ActionType) -> &'static str {
    match action {
        ActionType::ClearWarnings => "manual reset of warnings",
        ActionType::ClearNotifications => "manual reset of notifications",
        _ => "manual reset of warnings and notifications",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_count_characters_not_bytes() {
        assert!(validate("ok").is_err());
        assert_eq!(validate("  não ").unwrap(), "não");
        assert_eq!(validate(&"é".repeat(500)).unwrap().chars().count(), 500);
        assert_eq!(
            validate(&"a".repeat(501)),
            Err(JustificationError::TooLong { max: 500, len: 501 })
        );
    }

    #[test]
    fn blank_clears_get_a_description() {
        assert_eq!(
            for_action(ActionType::ClearAll, "   ").unwrap(),
            "manual reset of warnings and notifications"
        );
        assert_eq!(
            for_action(ActionType::ClearWarnings, "").unwrap(),
            "manual reset of warnings"
        );
        assert!(for_action(ActionType::ClearNotifications, "x").is_err());
    }

    #[test]
    fn penalties_always_need_text() {
        for action in [
            ActionType::Notification,
            ActionType::Warning,
            ActionType::Ban,
            ActionType::Reactivate,
        ] {
            assert_eq!(
                for_action(action, ""),
                Err(JustificationError::TooShort { min: 3, len: 0 })
            );
        }
    }
}
