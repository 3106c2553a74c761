//! The default painting palette.

use crate::color::Color;

/// Colors offered to painters, in display order.
pub const PALETTE: [Color; 55] = [
    Color::from_u32(0x000000),
    Color::from_u32(0xfcfcfc),
    Color::from_u32(0xf8f8f8),
    Color::from_u32(0xbcbcbc),
    Color::from_u32(0x7c7c7c),
    Color::from_u32(0xa4e4fc),
    Color::from_u32(0x3cbcfc),
    Color::from_u32(0x0078f8),
    Color::from_u32(0x0000fc),
    Color::from_u32(0xb8b8f8),
    Color::from_u32(0x6888fc),
    Color::from_u32(0x0058f8),
    Color::from_u32(0x0000bc),
    Color::from_u32(0xd8b8f8),
    Color::from_u32(0x9878f8),
    Color::from_u32(0x6844fc),
    Color::from_u32(0x4428bc),
    Color::from_u32(0xf8b8f8),
    Color::from_u32(0xf878f8),
    Color::from_u32(0xd800cc),
    Color::from_u32(0x940084),
    Color::from_u32(0xf8a4c0),
    Color::from_u32(0xf85898),
    Color::from_u32(0xe40058),
    Color::from_u32(0xa80020),
    Color::from_u32(0xf0d0b0),
    Color::from_u32(0xf87858),
    Color::from_u32(0xf83800),
    Color::from_u32(0xa81000),
    Color::from_u32(0xfce0a8),
    Color::from_u32(0xfca044),
    Color::from_u32(0xe45c10),
    Color::from_u32(0x881400),
    Color::from_u32(0xf8d878),
    Color::from_u32(0xf8b800),
    Color::from_u32(0xac7c00),
    Color::from_u32(0x503000),
    Color::from_u32(0xd8f878),
    Color::from_u32(0xb8f818),
    Color::from_u32(0x00b800),
    Color::from_u32(0x007800),
    Color::from_u32(0xb8f8b8),
    Color::from_u32(0x58d854),
    Color::from_u32(0x00a800),
    Color::from_u32(0x006800),
    Color::from_u32(0xb8f8d8),
    Color::from_u32(0x58f898),
    Color::from_u32(0x00a844),
    Color::from_u32(0x005800),
    Color::from_u32(0x00fcfc),
    Color::from_u32(0x00e8d8),
    Color::from_u32(0x008888),
    Color::from_u32(0x004058),
    Color::from_u32(0xf8d8f8),
    Color::from_u32(0x787878),
];

/// Palette entry by position.
pub fn lookup(index: usize) -> Option<Color> {
    PALETTE.get(index).copied()
}

/// Position of a color in the palette, if it is one of the offered colors.
pub fn position(color: Color) -> Option<usize> {
    PALETTE.iter().position(|c| *c == color)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_starts_with_black_and_has_no_duplicates() {
        assert_eq!(lookup(0), Some(Color::BLACK));
        for (i, color) in PALETTE.iter().enumerate() {
            assert_eq!(position(*color), Some(i));
        }
        assert_eq!(lookup(PALETTE.len()), None);
    }
}
