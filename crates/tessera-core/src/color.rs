//! 24-bit RGB colors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const RGB_MASK: u32 = 0x00ff_ffff;

/// A 24-bit RGB color without alpha.
///
/// The canonical text form is lowercase `#rrggbb`. Parsing also accepts
/// `0xrrggbb` and a bare `rrggbb`, in any case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(u32);

impl Color {
    pub const BLACK: Color = Color(0x000000);
    pub const WHITE: Color = Color(0xffffff);

    /// Build a color from an integer, ignoring anything above 24 bits.
    pub const fn from_u32(value: u32) -> Self {
        Self(value & RGB_MASK)
    }

    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self(((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    pub const fn to_u32(self) -> u32 {
        self.0
    }

    pub const fn rgb(self) -> (u8, u8, u8) {
        ((self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8)
    }

    /// Big-endian bytes used when hashing or signing.
    pub fn to_be_bytes(self) -> [u8; 3] {
        let (r, g, b) = self.rgb();
        [r, g, b]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06x}", self.0)
    }
}

impl FromStr for Color {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix('#')
            .or_else(|| trimmed.strip_prefix("0x"))
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CoreError::InvalidColor(s.to_string()));
        }

        u32::from_str_radix(digits, 16)
            .map(Color)
            .map_err(|_| CoreError::InvalidColor(s.to_string()))
    }
}

impl TryFrom<String> for Color {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_all_accepted_forms() {
        let expected = Color::from_u32(0xfcfcfc);
        assert_eq!("#fcfcfc".parse::<Color>().unwrap(), expected);
        assert_eq!("0xFCFCFC".parse::<Color>().unwrap(), expected);
        assert_eq!("fcfcfc".parse::<Color>().unwrap(), expected);
    }

    #[test]
    fn rejects_alpha_and_short_forms() {
        assert!("#fcfcfcff".parse::<Color>().is_err());
        assert!("#fff".parse::<Color>().is_err());
        assert!("#gggggg".parse::<Color>().is_err());
        assert!("".parse::<Color>().is_err());
    }

    #[test]
    fn canonical_form_is_lowercase_hash() {
        assert_eq!(Color::from_rgb(0xA8, 0x00, 0x20).to_string(), "#a80020");
        assert_eq!(Color::BLACK.to_string(), "#000000");
    }

    #[test]
    fn from_u32_drops_high_bits() {
        assert_eq!(Color::from_u32(0xff12_3456).to_u32(), 0x12_3456);
    }

    #[test]
    fn serializes_as_canonical_string() {
        let json = serde_json::to_string(&Color::from_u32(0xdd00dd)).unwrap();
        assert_eq!(json, "\"#dd00dd\"");
        let parsed: Color = serde_json::from_str("\"0xDD00DD\"").unwrap();
        assert_eq!(parsed, Color::from_u32(0xdd00dd));
    }

    proptest! {
        #[test]
        fn display_then_parse_is_identity(value in 0u32..=RGB_MASK) {
            let color = Color::from_u32(value);
            prop_assert_eq!(color.to_string().parse::<Color>().unwrap(), color);
        }
    }
}
