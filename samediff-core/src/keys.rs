use crate::CorrectResponse;

/// The two response keys, fixed for a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMapping {
    pub same_key: char,
    pub diff_key: char,
}

impl KeyMapping {
    /// Flag 0: `z` means same, `/` means different.
    pub const STANDARD: KeyMapping = KeyMapping {
        same_key: 'z',
        diff_key: '/',
    };

    /// Flag 1 swaps the keys; every other value falls back to flag 0.
    pub fn from_flag(flag: u8) -> Self {
        match flag {
            1 => Self::STANDARD.swapped(),
            _ => Self::STANDARD,
        }
    }

    /// Resolves the `response_key_config` parameter, which may be absent or
    /// arbitrary text.
    pub fn resolve(raw: Option<&str>) -> Self {
        let flag = raw.and_then(|s| s.trim().parse::<u8>().ok()).unwrap_or(0);
        Self::from_flag(flag)
    }

    pub fn swapped(self) -> Self {
        Self {
            same_key: self.diff_key,
            diff_key: self.same_key,
        }
    }

    pub fn key_for(&self, response: CorrectResponse) -> char {
        match response {
            CorrectResponse::Same => self.same_key,
            CorrectResponse::Different => self.diff_key,
        }
    }

    pub fn keys(&self) -> [char; 2] {
        [self.same_key, self.diff_key]
    }

    pub fn accepts(&self, key: char) -> bool {
        let key = normalize_key(key);
        key == self.same_key || key == self.diff_key
    }
}

impl Default for KeyMapping {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Key presses are compared case-insensitively so caps lock doesn't turn a
/// `z` into an unmapped key.
pub fn normalize_key(key: char) -> char {
    key.to_ascii_lowercase()
}

/// How a key is named on instruction screens.
pub fn key_label(key: char) -> String {
    match key {
        ' ' => "SPACE".to_string(),
        k => k.to_ascii_uppercase().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_zero_is_standard() {
        let m = KeyMapping::from_flag(0);
        assert_eq!(m.same_key, 'z');
        assert_eq!(m.diff_key, '/');
    }

    #[test]
    fn flag_one_swaps_flag_zero() {
        let zero = KeyMapping::from_flag(0);
        let one = KeyMapping::from_flag(1);
        assert_eq!(one.same_key, zero.diff_key);
        assert_eq!(one.diff_key, zero.same_key);
    }

    #[test]
    fn keys_never_collide() {
        for flag in 0..=u8::MAX {
            let m = KeyMapping::from_flag(flag);
            assert_ne!(m.same_key, m.diff_key);
        }
    }

    #[test]
    fn invalid_config_defaults_to_zero() {
        for raw in [None, Some(""), Some("2"), Some("-1"), Some("yes"), Some("1.0")] {
            assert_eq!(KeyMapping::resolve(raw), KeyMapping::STANDARD, "{raw:?}");
        }
        assert_eq!(KeyMapping::resolve(Some(" 1 ")), KeyMapping::STANDARD.swapped());
    }

    #[test]
    fn key_for_follows_mapping() {
        let m = KeyMapping::from_flag(1);
        assert_eq!(m.key_for(CorrectResponse::Same), '/');
        assert_eq!(m.key_for(CorrectResponse::Different), 'z');
    }

    #[test]
    fn accepts_only_mapped_keys() {
        let m = KeyMapping::STANDARD;
        assert!(m.accepts('z'));
        assert!(m.accepts('Z'));
        assert!(m.accepts('/'));
        assert!(!m.accepts('x'));
        assert!(!m.accepts(' '));
    }

    #[test]
    fn labels() {
        assert_eq!(key_label('z'), "Z");
        assert_eq!(key_label('/'), "/");
        assert_eq!(key_label(' '), "SPACE");
    }
}
