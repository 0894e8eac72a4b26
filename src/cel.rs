//! Cels (animation frames) and the strips that compose them (spec.md §3).

use crate::color::PaletteId;
use crate::geom::{Loc, Rect};
use crate::tables::CelTableEntries;

/// A sub-rectangle of a cel using one palette (spec.md §3).
#[derive(Debug, Clone, Copy)]
pub struct Strip {
    pub palette: PaletteId,
    pub source: Rect,
    /// `None` means "destination equals source top-left" (spec.md §3).
    pub dest: Option<Loc>,
}

impl Strip {
    pub fn dest_origin(&self) -> Loc {
        self.dest
            .unwrap_or(Loc::new(self.source.left, self.source.top))
    }
}

/// One animation frame, as declared by a `frame` block (spec.md §3).
#[derive(Debug, Clone)]
pub struct Cel {
    pub name: String,
    pub clip: Rect,
    pub strips: Vec<Strip>,
    /// `None` until finalized to its spec.md §4.3 default (bottom-center).
    pub hotspot: Option<Loc>,
    pub aliases: Vec<String>,
    pub align: u32,
    pub related: Option<String>,
    pub subset: bool,
    pub table_entries: CelTableEntries,
    /// Assigned by the bank packer; absent until packing completes.
    pub id: Option<u16>,
}

impl Cel {
    pub fn new(name: String, clip: Rect) -> Self {
        Cel {
            name,
            clip,
            strips: Vec::new(),
            hotspot: None,
            aliases: Vec::new(),
            align: 1,
            related: None,
            subset: false,
            table_entries: CelTableEntries::default(),
            id: None,
        }
    }

    /// The effective hotspot: either the explicit `hotspot` directive, or
    /// the bottom-center default of spec.md §4.3 (floor division).
    pub fn effective_hotspot(&self) -> Loc {
        self.hotspot.unwrap_or_else(|| {
            Loc::new(self.clip.left + self.clip.width / 2, self.clip.bottom())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_hotspot_is_bottom_center_floor() {
        let cel = Cel::new("walk0".into(), Rect::new(10, 20, 15, 30));
        // left + width/2 = 10 + 7 (floor) = 17; bottom = 20 + 30 = 50
        assert_eq!(cel.effective_hotspot(), Loc::new(17, 50));
    }

    #[test]
    fn explicit_hotspot_overrides_default() {
        let mut cel = Cel::new("walk0".into(), Rect::new(10, 20, 15, 30));
        cel.hotspot = Some(Loc::new(0, 0));
        assert_eq!(cel.effective_hotspot(), Loc::new(0, 0));
    }

    #[test]
    fn strip_dest_defaults_to_source_top_left() {
        let strip = Strip {
            palette: PaletteId(0),
            source: Rect::new(5, 6, 8, 16),
            dest: None,
        };
        assert_eq!(strip.dest_origin(), Loc::new(5, 6));
    }
}
