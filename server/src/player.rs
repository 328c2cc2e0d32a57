use plaza_shared::vec3::Vec3;
use tokio::time::Instant;

use crate::error::JoinError;

/// Connection-scoped player handle. Allocated once, never reused.
pub type PlayerId = u32;

/// Authoritative server-side record of one connected participant.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub nickname: String,
    pub character_type: u32,
    pub position: Vec3,
    /// Yaw around the vertical axis, radians
    pub rotation: f64,
    /// Last accepted move, heartbeat, or join. Drives liveness.
    pub last_update_at: Instant,
    /// Last accepted move, or join. Baseline for speed checks; heartbeats
    /// leave it alone.
    pub last_moved_at: Instant,
}

/// Trim and truncate a requested nickname. Length is counted in characters,
/// not bytes, so multi-byte names are never split mid-codepoint.
pub fn normalize_nickname(raw: Option<&str>, max_len: u32) -> Result<String, JoinError> {
    let trimmed = raw.ok_or(JoinError::MissingNickname)?.trim();
    if trimmed.is_empty() {
        return Err(JoinError::EmptyNickname);
    }
    Ok(trimmed.chars().take(max_len as usize).collect())
}

/// Character types are `0..count`.
pub fn validate_character_type(raw: Option<i64>, count: u32) -> Result<u32, JoinError> {
    match raw {
        Some(t) if t >= 0 && t < count as i64 => Ok(t as u32),
        _ => Err(JoinError::InvalidCharacterType { max: count }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nickname_is_trimmed_and_truncated() {
        let name = normalize_nickname(Some("  Alice123456789  "), 12).unwrap();
        assert_eq!(name, "Alice1234567");
    }

    #[test]
    fn short_nickname_kept_as_is() {
        assert_eq!(normalize_nickname(Some("Bob"), 12).unwrap(), "Bob");
    }

    #[test]
    fn blank_nickname_rejected() {
        assert_eq!(
            normalize_nickname(Some("   \t "), 12),
            Err(JoinError::EmptyNickname)
        );
        assert_eq!(normalize_nickname(None, 12), Err(JoinError::MissingNickname));
    }

    #[test]
    fn multibyte_nickname_truncates_on_char_boundary() {
        let name = normalize_nickname(Some("ÅÄÖåäöÆØæøßü√∂"), 12).unwrap();
        assert_eq!(name.chars().count(), 12);
        assert!(name.starts_with("ÅÄÖ"));
    }

    #[test]
    fn character_type_range_checked() {
        assert_eq!(validate_character_type(Some(0), 3), Ok(0));
        assert_eq!(validate_character_type(Some(2), 3), Ok(2));
        assert_eq!(
            validate_character_type(Some(7), 3),
            Err(JoinError::InvalidCharacterType { max: 3 })
        );
        assert!(validate_character_type(Some(-1), 3).is_err());
        assert!(validate_character_type(None, 3).is_err());
    }
}
