#![warn(clippy::all)]

//! Packs a hand-authored sprite sheet (a raster image plus a declarative
//! cel-position file) into banked 8x16 tile data and per-cel metasprite
//! records for an 8-bit console.
//!
//! # Basic usage
//!
//! ```no_run
//! use crunchcel::Pipeline;
//!
//! let source = std::fs::read_to_string("sheet.cel").unwrap();
//! let image = image::open("sheet.png").unwrap().to_rgba8();
//! let result = Pipeline::new(32).run(&source, &image, None).unwrap();
//! println!("{} tiles across {} banks", result.interner.len(), result.layout.banks.len());
//! ```

pub mod cel;
pub mod cli;
pub mod color;
pub mod emit;
pub mod error;
pub mod geom;
pub mod intern;
pub mod lexer;
pub mod metasprite;
pub mod pack;
pub mod parser;
pub mod raster;
pub mod tables;
#[cfg(test)]
mod tests;
pub mod tile;

use std::collections::HashMap;

use image::RgbaImage;
use log::debug;

pub use error::CrunchError;
pub use intern::{TileId, TileInterner, TileRef};
pub use pack::PackedLayout;
pub use parser::Document;

/// The full, assembled result of running a sheet through the pipeline,
/// ready to hand to [`emit::emit`].
pub struct PipelineResult {
    pub document: Document,
    pub interner: TileInterner,
    pub layout: PackedLayout,
    pub cel_refs: HashMap<usize, Vec<TileRef>>,
}

/// Runs the whole conversion: parse, rasterize, intern, pack. Owns the one
/// tunable the CLI exposes beyond the DSL itself -- the bank size.
pub struct Pipeline {
    pub bank_size: usize,
}

impl Pipeline {
    pub fn new(bank_size: usize) -> Self {
        Pipeline { bank_size }
    }

    /// Run the pipeline over `source` against `image`. `flipped_image`, when
    /// given, is used in place of computing `image::imageops::flip_horizontal`
    /// whenever the document's `hflip` directive is set (spec.md §6
    /// `--flip`); otherwise the flip is computed in memory.
    pub fn run(
        &self,
        source: &str,
        image: &RgbaImage,
        flipped_image: Option<&RgbaImage>,
    ) -> Result<PipelineResult, CrunchError> {
        let mut document = parser::parse(source)?;
        debug!("parsed {} cels", document.cels.len());

        // spec.md §4.2: the whole image is flipped once before any rect is
        // interpreted; every strip/clip rect is then read against the
        // flipped image unchanged.
        let working_image: std::borrow::Cow<RgbaImage> = if document.hflip {
            match flipped_image {
                Some(img) => std::borrow::Cow::Borrowed(img),
                None => std::borrow::Cow::Owned(image::imageops::flip_horizontal(image)),
            }
        } else {
            std::borrow::Cow::Borrowed(image)
        };

        let mut interner = TileInterner::default();
        let mut cel_tiles = Vec::with_capacity(document.cels.len());
        let mut cel_refs = HashMap::new();

        for (index, cel) in document.cels.iter().enumerate() {
            let raster_tiles = raster::rasterize_cel(cel, &working_image, &document.palette_table)?;
            let refs = intern::intern_cel(&mut interner, &raster_tiles);
            cel_tiles.push(intern::tile_set(&refs));
            cel_refs.insert(index, refs);
        }
        debug!("interned {} distinct tiles", interner.len());

        let layout = pack::pack(&document, &cel_tiles, self.bank_size)?;
        for (&cel_index, &id) in &layout.cel_id {
            document.cels[cel_index].id = Some(id);
        }
        debug!("packed into {} banks", layout.banks.len());

        Ok(PipelineResult {
            document,
            interner,
            layout,
            cel_refs,
        })
    }
}
