//! End-to-end scenario tests for the full parse -> rasterize -> intern ->
//! pack -> encode pipeline (spec.md §8).

use crate::*;
use image::{Rgba, RgbaImage};
use pretty_assertions::assert_eq;

fn solid_tile_image(width: u32, height: u32, color: Rgba<u8>) -> RgbaImage {
    let mut img = RgbaImage::new(width, height);
    for p in img.pixels_mut() {
        *p = color;
    }
    img
}

const RED: Rgba<u8> = Rgba([0xFF, 0, 0, 0xFF]);
const YELLOW: Rgba<u8> = Rgba([0xFF, 0xFF, 0, 0xFF]);
const BLUE: Rgba<u8> = Rgba([0, 0, 0xFF, 0xFF]);

#[test]
fn single_cel_single_strip_yields_one_bank_one_tile_one_row() {
    let source = "\
palette 0 #000 #F00 #FF0
frame idle 0 0 8 16
strip 0
";
    let image = solid_tile_image(8, 16, RED);
    let result = Pipeline::new(32).run(source, &image, None).unwrap();

    assert_eq!(result.interner.len(), 1);
    assert_eq!(result.layout.banks.len(), 1);

    let refs = &result.cel_refs[&0];
    assert_eq!(refs.len(), 1);
    let mut slot_of = nohash::IntMap::default();
    slot_of.insert(refs[0].tile, 0u8);
    let bytes = metasprite::encode_cel("idle", refs, &slot_of).unwrap();
    // hotspot default: bottom-center of (0,0,8,16) = (4,16); tile at (0,0)
    // offsets to dx=-4, dy=-16 -> excess-128 x=124, y=112.
    assert_eq!(bytes, vec![124, 112, 0x00, 0x00, 0x00]);
}

#[test]
fn hflip_pair_shares_one_canonical_tile() {
    let source = "\
palette 0 #000 #F00 #FF0
frame right 0 0 8 16
strip 0
frame left 8 0 8 16
strip 0
";
    let mut image = RgbaImage::new(16, 16);
    for y in 0..16 {
        for x in 0..4 {
            image.put_pixel(x, y, RED);
            image.put_pixel(15 - x, y, RED);
        }
    }
    let result = Pipeline::new(32).run(source, &image, None).unwrap();
    let right_tile = result.cel_refs[&0][0].tile;
    let left_tile = result.cel_refs[&1][0].tile;
    assert_eq!(right_tile, left_tile);
    assert_ne!(
        result.cel_refs[&0][0].hflip,
        result.cel_refs[&1][0].hflip,
        "exactly one orientation needs the flip bit"
    );
}

#[test]
fn related_cels_forced_together_can_overflow_a_small_bank() {
    let source = "\
palette 0 #000 #F00 #FF0
frame a 0 0 8 16
strip 0
related b
frame b 8 0 8 16
strip 0
";
    // cel a: uniform red tile. cel b: half red, half yellow -- a distinct,
    // non-mirror-symmetric pattern, so the two cels intern to two different
    // tiles. `related` forces them into one bin; bank-size 1 can't hold
    // both.
    let mut image = RgbaImage::new(16, 16);
    for y in 0..16 {
        for x in 0..8 {
            image.put_pixel(x, y, RED);
        }
        for x in 8..12 {
            image.put_pixel(x, y, RED);
        }
        for x in 12..16 {
            image.put_pixel(x, y, YELLOW);
        }
    }
    let err = Pipeline::new(1).run(source, &image, None).unwrap_err();
    assert!(matches!(err, CrunchError::Pack { .. }));
}

#[test]
fn align_directive_pads_to_next_multiple() {
    let source = "\
palette 0 #000 #F00 #FF0
frame x 0 0 8 16
strip 0
align 4
frame y 8 0 8 16
strip 0
";
    let image = solid_tile_image(16, 16, RED);
    let result = Pipeline::new(32).run(source, &image, None).unwrap();
    assert_eq!(result.layout.cel_id[&0], 0);
    assert_eq!(result.layout.cel_id[&1], 4);
}

#[test]
fn row_over_eight_tiles_is_an_encode_error() {
    let source = "\
palette 0 #000 #F00 #FF0
frame wide 0 0 72 16
strip 0
";
    let image = solid_tile_image(72, 16, RED);
    let result = Pipeline::new(64).run(source, &image, None).unwrap();
    let refs = &result.cel_refs[&0];
    assert_eq!(refs.len(), 9);
    let slot_of: nohash::IntMap<_, _> =
        refs.iter().enumerate().map(|(i, r)| (r.tile, i as u8)).collect();
    let err = metasprite::encode_cel("wide", refs, &slot_of).unwrap_err();
    assert!(matches!(err, CrunchError::Encode { .. }));
}

#[test]
fn undeclared_palette_color_is_a_color_error() {
    let source = "\
palette 0 #000 #F00 #FF0
frame idle 0 0 8 16
strip 0
";
    let image = solid_tile_image(8, 16, BLUE);
    let err = Pipeline::new(32).run(source, &image, None).unwrap_err();
    assert!(matches!(err, CrunchError::Color { .. }));
}

#[test]
fn determinism_identical_inputs_yield_identical_layout() {
    let source = "\
palette 0 #000 #F00 #FF0
frame a 0 0 8 16
strip 0
frame b 8 0 8 16
strip 0
frame c 16 0 8 16
strip 0
";
    let image = solid_tile_image(24, 16, RED);
    let r1 = Pipeline::new(32).run(source, &image, None).unwrap();
    let r2 = Pipeline::new(32).run(source, &image, None).unwrap();
    assert_eq!(r1.layout.cel_id, r2.layout.cel_id);
    assert_eq!(r1.layout.cel_bank, r2.layout.cel_bank);
    assert_eq!(r1.interner.len(), r2.interner.len());
}
