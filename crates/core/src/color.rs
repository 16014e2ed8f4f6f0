//! Text-mode color palette
//!
//! Every dialect resolves its own color mnemonics to one of the sixteen
//! classic CGA palette entries. The palette is the only place RGB values
//! live; generated programs receive the resolved values, never the names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 24-bit RGB color packed as `0xRRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub u32);

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb(((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    pub fn r(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn g(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn b(self) -> u8 {
        self.0 as u8
    }

    /// Build from an integer produced by a generated program.
    ///
    /// Values outside the 24-bit range are masked.
    pub fn from_int(value: i64) -> Self {
        Rgb((value as u32) & 0x00FF_FFFF)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:06X}", self.0)
    }
}

/// The sixteen CGA palette entries, in hardware index order.
pub const PALETTE: [Rgb; 16] = [
    Rgb::new(0x00, 0x00, 0x00), // black
    Rgb::new(0x00, 0x00, 0xAA), // blue
    Rgb::new(0x00, 0xAA, 0x00), // green
    Rgb::new(0x00, 0xAA, 0xAA), // cyan
    Rgb::new(0xAA, 0x00, 0x00), // red
    Rgb::new(0xAA, 0x00, 0xAA), // magenta
    Rgb::new(0xAA, 0x55, 0x00), // brown
    Rgb::new(0xAA, 0xAA, 0xAA), // light gray
    Rgb::new(0x55, 0x55, 0x55), // dark gray
    Rgb::new(0x55, 0x55, 0xFF), // light blue
    Rgb::new(0x55, 0xFF, 0x55), // light green
    Rgb::new(0x55, 0xFF, 0xFF), // light cyan
    Rgb::new(0xFF, 0x55, 0x55), // light red
    Rgb::new(0xFF, 0x55, 0xFF), // light magenta
    Rgb::new(0xFF, 0xFF, 0x55), // yellow
    Rgb::new(0xFF, 0xFF, 0xFF), // white
];

/// Default foreground (light gray).
pub const DEFAULT_FG: Rgb = PALETTE[7];
/// Default background (black).
pub const DEFAULT_BG: Rgb = PALETTE[0];

/// Look up a palette entry by hardware index.
pub fn palette(index: usize) -> Option<Rgb> {
    PALETTE.get(index).copied()
}

/// Find the palette index of an RGB value, if it is one of the sixteen.
pub fn palette_index(color: Rgb) -> Option<usize> {
    PALETTE.iter().position(|c| *c == color)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_components() {
        let c = Rgb::new(0x12, 0x34, 0x56);
        assert_eq!(c.0, 0x123456);
        assert_eq!((c.r(), c.g(), c.b()), (0x12, 0x34, 0x56));
        assert_eq!(c.to_string(), "0x123456");
    }

    #[test]
    fn test_palette_bounds() {
        assert_eq!(palette(15), Some(Rgb(0xFFFFFF)));
        assert_eq!(palette(1), Some(Rgb(0x0000AA)));
        assert_eq!(palette(16), None);
    }

    #[test]
    fn test_from_int_masks_high_bits() {
        assert_eq!(Rgb::from_int(0x1_00FF_00FF), Rgb(0x00FF_00FF & 0xFFFFFF));
        assert_eq!(Rgb::from_int(-1), Rgb(0xFFFFFF));
    }

    #[test]
    fn test_palette_index_roundtrip_for_known_entry() {
        assert_eq!(palette_index(PALETTE[14]), Some(14));
        assert_eq!(palette_index(Rgb(0x010203)), None);
    }
}
