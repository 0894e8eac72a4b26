//! Cel rasterization: strips -> hotspot-relative, non-transparent 8x16 tiles
//! (spec.md §4.3).

use image::RgbaImage;

use crate::cel::Cel;
use crate::color::{PaletteId, PaletteTable};
use crate::error::CrunchError;
use crate::geom::Rect;
use crate::tile::{Tile, TILE_HEIGHT, TILE_WIDTH};

/// One non-blank tile produced while rasterizing a cel, still addressed
/// relative to the cel's hotspot (spec.md §4.3: "two cels that look
/// identical but have different hotspots may share tile pixel data but not
/// necessarily metasprite data").
#[derive(Debug, Clone)]
pub struct RasterTile {
    pub dx: i32,
    pub dy: i32,
    pub palette: PaletteId,
    pub pixels: Tile,
    /// Index of the strip that produced this tile, for front-to-back
    /// ordering in the metasprite encoder (spec.md §4.6).
    pub strip_order: usize,
}

fn is_backdrop(pixel: &image::Rgba<u8>, backdrop: &crate::color::Color) -> bool {
    pixel[3] == 0 || (pixel[0] == backdrop.r && pixel[1] == backdrop.g && pixel[2] == backdrop.b)
}

/// Rasterize every strip of `cel` against `image`, returning the non-blank
/// tiles it needs, each offset from the cel's hotspot.
pub fn rasterize_cel(
    cel: &Cel,
    image: &RgbaImage,
    palettes: &PaletteTable,
) -> Result<Vec<RasterTile>, CrunchError> {
    let (img_w, img_h) = image.dimensions();
    let hotspot = cel.effective_hotspot();
    let mut tiles = Vec::new();

    for (strip_order, strip) in cel.strips.iter().enumerate() {
        if !strip.source.fits_within(img_w as i32, img_h as i32) {
            return Err(CrunchError::raster(
                &cel.name,
                format!(
                    "strip source rect {:?} is out of image bounds ({}x{})",
                    strip.source, img_w, img_h
                ),
            ));
        }
        let dest_origin = strip.dest_origin();
        let dest = Rect::new(dest_origin.x, dest_origin.y, strip.source.width, strip.source.height);

        let first_col = dest.left.div_euclid(TILE_WIDTH as i32);
        let last_col = (dest.right() - 1).div_euclid(TILE_WIDTH as i32);
        let first_row = dest.top.div_euclid(TILE_HEIGHT as i32);
        let last_row = (dest.bottom() - 1).div_euclid(TILE_HEIGHT as i32);

        for tile_row in first_row..=last_row {
            for tile_col in first_col..=last_col {
                let tile_left = tile_col * TILE_WIDTH as i32;
                let tile_top = tile_row * TILE_HEIGHT as i32;
                let mut tile = Tile::default();
                let mut any_pixel = false;

                for local_y in 0..TILE_HEIGHT as i32 {
                    let py = tile_top + local_y;
                    if py < dest.top || py >= dest.bottom() {
                        continue;
                    }
                    for local_x in 0..TILE_WIDTH as i32 {
                        let px = tile_left + local_x;
                        if px < dest.left || px >= dest.right() {
                            continue;
                        }
                        let src_x = strip.source.left + (px - dest.left);
                        let src_y = strip.source.top + (py - dest.top);
                        let pixel = image.get_pixel(src_x as u32, src_y as u32);
                        if is_backdrop(pixel, &palettes.backdrop) {
                            continue;
                        }
                        let (pid, index) = palettes.resolve(pixel).ok_or_else(|| {
                            CrunchError::color(
                                &cel.name,
                                format!(
                                    "pixel ({}, {}) = rgb({},{},{}) doesn't match any declared color",
                                    src_x, src_y, pixel[0], pixel[1], pixel[2]
                                ),
                            )
                        })?;
                        if pid != strip.palette {
                            return Err(CrunchError::raster(
                                &cel.name,
                                format!(
                                    "pixel ({}, {}) resolves to palette {} but strip declares palette {}",
                                    src_x, src_y, pid.0, strip.palette.0
                                ),
                            ));
                        }
                        tile.set(local_y as usize, local_x as usize, index);
                        any_pixel = true;
                    }
                }

                if any_pixel && !tile.is_blank() {
                    tiles.push(RasterTile {
                        dx: tile_left - hotspot.x,
                        dy: tile_top - hotspot.y,
                        palette: strip.palette,
                        pixels: tile,
                        strip_order,
                    });
                }
            }
        }
    }

    Ok(tiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cel::Strip;
    use crate::color::{Color, Palette};
    use crate::geom::Loc;
    use image::Rgba;

    fn palettes() -> PaletteTable {
        PaletteTable {
            backdrop: Color::new(0, 0, 0),
            palettes: vec![(
                PaletteId(0),
                Palette {
                    colors: vec![Color::new(0xFF, 0, 0), Color::new(0, 0xFF, 0), Color::new(0, 0, 0xFF)],
                },
            )],
        }
    }

    fn red_tile_image() -> RgbaImage {
        let mut img = RgbaImage::new(8, 16);
        for y in 0..16 {
            for x in 0..8 {
                img.put_pixel(x, y, Rgba([0xFF, 0, 0, 0xFF]));
            }
        }
        img
    }

    #[test]
    fn single_strip_yields_single_tile_at_hotspot_offset() {
        let mut cel = Cel::new("a".into(), Rect::new(0, 0, 8, 16));
        cel.strips.push(Strip {
            palette: PaletteId(0),
            source: Rect::new(0, 0, 8, 16),
            dest: None,
        });
        let tiles = rasterize_cel(&cel, &red_tile_image(), &palettes()).unwrap();
        assert_eq!(tiles.len(), 1);
        let hotspot = cel.effective_hotspot();
        assert_eq!(tiles[0].dx, -hotspot.x);
        assert_eq!(tiles[0].dy, -hotspot.y);
        assert_eq!(tiles[0].pixels.get(0, 0), 1);
    }

    #[test]
    fn blank_tiles_are_dropped() {
        let mut img = RgbaImage::new(8, 16);
        for p in img.pixels_mut() {
            *p = Rgba([0, 0, 0, 0]);
        }
        let mut cel = Cel::new("a".into(), Rect::new(0, 0, 8, 16));
        cel.strips.push(Strip {
            palette: PaletteId(0),
            source: Rect::new(0, 0, 8, 16),
            dest: None,
        });
        let tiles = rasterize_cel(&cel, &img, &palettes()).unwrap();
        assert!(tiles.is_empty());
    }

    #[test]
    fn mixed_palette_pixel_is_raster_error() {
        let mut cel = Cel::new("a".into(), Rect::new(0, 0, 8, 16));
        cel.strips.push(Strip {
            palette: PaletteId(1),
            source: Rect::new(0, 0, 8, 16),
            dest: None,
        });
        let err = rasterize_cel(&cel, &red_tile_image(), &palettes()).unwrap_err();
        assert!(matches!(err, CrunchError::Raster { .. }));
    }

    #[test]
    fn destination_offset_shifts_tile_grid() {
        let mut cel = Cel::new("a".into(), Rect::new(0, 0, 8, 16));
        cel.strips.push(Strip {
            palette: PaletteId(0),
            source: Rect::new(0, 0, 8, 16),
            dest: Some(Loc::new(8, 0)),
        });
        let tiles = rasterize_cel(&cel, &red_tile_image(), &palettes()).unwrap();
        assert_eq!(tiles.len(), 1);
        let hotspot = cel.effective_hotspot();
        assert_eq!(tiles[0].dx, 8 - hotspot.x);
    }

    #[test]
    fn out_of_bounds_strip_is_raster_error() {
        let mut cel = Cel::new("a".into(), Rect::new(0, 0, 8, 16));
        cel.strips.push(Strip {
            palette: PaletteId(0),
            source: Rect::new(4, 0, 8, 16),
            dest: None,
        });
        let err = rasterize_cel(&cel, &red_tile_image(), &palettes()).unwrap_err();
        assert!(matches!(err, CrunchError::Raster { .. }));
    }
}
