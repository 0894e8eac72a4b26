//! 8x16 tiles: the platform's character-memory unit (spec.md §3, §4.4).

pub const TILE_WIDTH: usize = 8;
pub const TILE_HEIGHT: usize = 16;

/// A 16-row x 8-column matrix of palette-index values (0..=3). Tiles are
/// immutable once produced by the rasterizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile(pub [[u8; TILE_WIDTH]; TILE_HEIGHT]);

impl Default for Tile {
    fn default() -> Self {
        Tile([[0u8; TILE_WIDTH]; TILE_HEIGHT])
    }
}

impl Tile {
    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.0[row][col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: u8) {
        self.0[row][col] = value;
    }

    /// Horizontally mirror the tile (reverse each row).
    pub fn hflip(&self) -> Tile {
        let mut out = Tile::default();
        for row in 0..TILE_HEIGHT {
            for col in 0..TILE_WIDTH {
                out.0[row][col] = self.0[row][TILE_WIDTH - 1 - col];
            }
        }
        out
    }

    /// Canonical form per spec.md §4.4: the lexicographically smaller of
    /// `(self, hflip(self))`. Also reports whether the flipped form was
    /// chosen, i.e. whether this tile needs the flip bit set when drawn via
    /// its canonical id.
    pub fn canonicalize(&self) -> (Tile, bool) {
        let flipped = self.hflip();
        if flipped.0 < self.0 {
            (flipped, true)
        } else {
            (*self, false)
        }
    }

    /// Whether `self` is entirely backdrop (palette index 0).
    pub fn is_blank(&self) -> bool {
        self.0.iter().all(|row| row.iter().all(|&px| px == 0))
    }
}

/// spec.md §4.4: "the interner exposes a predicate `pair_candidates(a, b) =
/// (a == hflip(b))`", used by the bank emitter's flipped-pair optimization.
pub fn pair_candidates(a: &Tile, b: &Tile) -> bool {
    *a == b.hflip()
}
