//! Colors, palettes, and nearest-color matching against the image (spec.md
//! §3, §4.2).

use image::Rgba;

/// Squared-distance tolerance for nearest-color matching, in 8-bit-per-channel
/// units squared. spec.md §9 leaves the exact threshold an open question and
/// suggests "Euclidean distance <= 48 per channel" as a stable default; we
/// fix that here as the crate's one documented constant rather than a magic
/// number scattered through the resolver.
pub const COLOR_MATCH_TOLERANCE_SQ: i32 = 48 * 48;

/// An RGB triple. Alpha is handled separately: the backdrop is "index 0",
/// not a color value, so `Color` itself never carries transparency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b }
    }

    fn distance_sq(&self, px: &Rgba<u8>) -> i32 {
        let dr = self.r as i32 - px[0] as i32;
        let dg = self.g as i32 - px[1] as i32;
        let db = self.b as i32 - px[2] as i32;
        dr * dr + dg * dg + db * db
    }
}

/// 0..=3, where 0 is reserved for the implicit backdrop index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PaletteId(pub u8);

/// Up to three foreground colors, assigned to indices 1, 2, 3 of a
/// [`PaletteId`]. Index 0 is always the backdrop and is never stored here.
#[derive(Debug, Clone, Default)]
pub struct Palette {
    /// `colors[0]` is palette index 1, `colors[1]` is index 2, and so on.
    pub colors: Vec<Color>,
}

impl Palette {
    pub fn color_at(&self, index: u8) -> Option<Color> {
        if index == 0 {
            None
        } else {
            self.colors.get(index as usize - 1).copied()
        }
    }
}

/// All declared palettes plus the backdrop, as assembled by the parser.
#[derive(Debug, Clone, Default)]
pub struct PaletteTable {
    pub backdrop: Color,
    pub palettes: Vec<(PaletteId, Palette)>,
}

impl PaletteTable {
    pub fn get(&self, id: PaletteId) -> Option<&Palette> {
        self.palettes.iter().find(|(pid, _)| *pid == id).map(|(_, p)| p)
    }

    /// Find the nearest declared color (across every palette) to `pixel`,
    /// returning its `(PaletteId, palette-index)`. A fully transparent pixel
    /// resolves to `None` by convention of the caller (the backdrop, index
    /// 0, is never matched here — it's implicit, not declared). Returns
    /// `None` also when no declared color is within tolerance.
    pub fn resolve(&self, pixel: &Rgba<u8>) -> Option<(PaletteId, u8)> {
        let mut best: Option<(i32, PaletteId, u8)> = None;
        for (pid, palette) in &self.palettes {
            for (i, color) in palette.colors.iter().enumerate() {
                let d = color.distance_sq(pixel);
                let index = (i + 1) as u8;
                if d <= COLOR_MATCH_TOLERANCE_SQ {
                    match best {
                        Some((best_d, _, _)) if best_d <= d => {}
                        _ => best = Some((d, *pid, index)),
                    }
                }
            }
        }
        best.map(|(_, pid, index)| (pid, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> PaletteTable {
        PaletteTable {
            backdrop: Color::new(0, 0, 0),
            palettes: vec![(
                PaletteId(0),
                Palette {
                    colors: vec![
                        Color::new(0, 0, 0),
                        Color::new(0xFF, 0, 0),
                        Color::new(0xFF, 0xFF, 0),
                    ],
                },
            )],
        }
    }

    #[test]
    fn resolves_exact_match() {
        let table = sample_table();
        let (pid, index) = table.resolve(&Rgba([0xFF, 0, 0, 0xFF])).unwrap();
        assert_eq!(pid, PaletteId(0));
        assert_eq!(index, 1);
    }

    #[test]
    fn resolves_within_tolerance() {
        let table = sample_table();
        let (_, index) = table.resolve(&Rgba([0xFA, 0x04, 0x02, 0xFF])).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn rejects_out_of_tolerance() {
        let table = sample_table();
        assert!(table.resolve(&Rgba([0, 0xFF, 0xFF, 0xFF])).is_none());
    }
}
