//! UTF-16 variable names

use alloc::vec::Vec;
use core::fmt;

/// Variable name as UTF-16 code units, without the terminating NUL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VarName(Vec<u16>);

impl VarName {
    /// Take code units up to (not including) the first NUL.
    pub fn from_units(units: &[u16]) -> Self {
        let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
        Self(units[..end].to_vec())
    }

    pub fn units(&self) -> &[u16] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length in code units, excluding the terminator.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// UTF-16LE bytes without the terminator (digest input).
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|u| u.to_le_bytes()).collect()
    }

    /// Encoded size including the NUL terminator.
    pub fn encoded_size(&self) -> usize {
        (self.0.len() + 1) * 2
    }

    /// Compare against an ASCII/UTF-8 literal.
    pub fn eq_str(&self, s: &str) -> bool {
        self.0.iter().copied().eq(s.encode_utf16())
    }
}

impl From<&str> for VarName {
    fn from(s: &str) -> Self {
        Self(s.encode_utf16().take_while(|&u| u != 0).collect())
    }
}

impl fmt::Display for VarName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in char::decode_utf16(self.0.iter().copied()) {
            let c = c.unwrap_or(char::REPLACEMENT_CHARACTER);
            fmt::Write::write_char(f, c)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_from_units_stops_at_nul() {
        let name = VarName::from_units(&[b'P' as u16, b'K' as u16, 0, b'X' as u16]);
        assert!(name.eq_str("PK"));
        assert_eq!(name.encoded_size(), 6);
        assert_eq!(name.to_le_bytes(), [b'P', 0, b'K', 0]);
    }

    #[test]
    fn test_display_round_trips_text() {
        let name = VarName::from("Boot0001");
        assert_eq!(name.to_string(), "Boot0001");
        assert!(!name.eq_str("Boot000"));
    }
}
