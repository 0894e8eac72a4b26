//! Tile interning: canonicalize tiles modulo horizontal flip and assign
//! stable ids (spec.md §4.4).

use std::collections::{BTreeSet, HashMap};

use crate::color::PaletteId;
use crate::raster::RasterTile;
use crate::tile::{pair_candidates, Tile};

pub type TileId = u32;

/// A cel's drawable content: an interned tile id, a flip bit, and where it
/// goes relative to the cel's hotspot (spec.md §3 `TileRef`).
#[derive(Debug, Clone, Copy)]
pub struct TileRef {
    pub tile: TileId,
    pub hflip: bool,
    pub palette: PaletteId,
    pub dx: i32,
    pub dy: i32,
    /// Front-to-back ordering key, carried from the rasterizer (spec.md
    /// §4.6: "earlier strips are in front").
    pub strip_order: usize,
}

/// The global tile table: canonical tiles indexed by stable [`TileId`].
#[derive(Debug, Clone, Default)]
pub struct TileInterner {
    by_canonical: HashMap<Tile, TileId>,
    tiles: Vec<Tile>,
}

impl TileInterner {
    /// Intern a (possibly non-canonical) tile, returning its id and whether
    /// this particular occurrence needs the flip bit set.
    pub fn intern(&mut self, tile: &Tile) -> (TileId, bool) {
        let (canonical, flip) = tile.canonicalize();
        if let Some(&id) = self.by_canonical.get(&canonical) {
            return (id, flip);
        }
        let id = self.tiles.len() as TileId;
        self.tiles.push(canonical);
        self.by_canonical.insert(canonical, id);
        (id, flip)
    }

    pub fn get(&self, id: TileId) -> &Tile {
        &self.tiles[id as usize]
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// spec.md §4.4 flipped-pair optimization predicate, lifted to ids.
    pub fn pair_candidates(&self, a: TileId, b: TileId) -> bool {
        pair_candidates(self.get(a), self.get(b))
    }
}

/// Intern every tile a cel's rasterized content needs, producing its
/// `TileRef` list.
pub fn intern_cel(interner: &mut TileInterner, raster_tiles: &[RasterTile]) -> Vec<TileRef> {
    raster_tiles
        .iter()
        .map(|rt| {
            let (id, flip) = interner.intern(&rt.pixels);
            TileRef {
                tile: id,
                hflip: flip,
                palette: rt.palette,
                dx: rt.dx,
                dy: rt.dy,
                strip_order: rt.strip_order,
            }
        })
        .collect()
}

/// The distinct set of tile ids a cel needs — the packer's unit of work
/// (spec.md §4.5: "each with a tile-set S_i").
pub fn tile_set(refs: &[TileRef]) -> BTreeSet<TileId> {
    refs.iter().map(|r| r.tile).collect()
}
