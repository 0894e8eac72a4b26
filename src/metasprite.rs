//! Metasprite encoder: groups a cel's [`TileRef`]s into rows and serializes
//! the terminated row byte-stream (spec.md §4.6).

use std::collections::HashMap;

use nohash::IntMap;

use crate::error::CrunchError;
use crate::intern::{TileId, TileRef};
use crate::tile::TILE_WIDTH;

/// Maximum tiles in one row: the length field is 3 bits, storing length-1.
pub const MAX_ROW_LEN: usize = 8;

struct Row<'a> {
    strip_order: usize,
    dy: i32,
    palette: u8,
    tiles: Vec<&'a TileRef>,
}

/// Groups TileRefs into rows of equal y-offset, palette, and strip (spec.md
/// §4.6: "a run of tiles ... at consecutive x-offsets"). Runs that are not
/// x-contiguous split into separate rows; a contiguous run longer than
/// [`MAX_ROW_LEN`] is left oversized so the caller can surface it as an
/// [`CrunchError::Encode`].
fn group_rows(refs: &[TileRef]) -> Vec<Row<'_>> {
    let mut buckets: HashMap<(usize, i32, u8), Vec<&TileRef>> = HashMap::new();
    for r in refs {
        buckets
            .entry((r.strip_order, r.dy, r.palette.0))
            .or_default()
            .push(r);
    }

    let mut rows = Vec::new();
    for ((strip_order, dy, palette), mut tiles) in buckets {
        tiles.sort_by_key(|t| t.dx);
        let mut run: Vec<&TileRef> = Vec::new();
        for t in tiles {
            if let Some(&last) = run.last() {
                if t.dx != last.dx + TILE_WIDTH as i32 {
                    rows.push(Row {
                        strip_order,
                        dy,
                        palette,
                        tiles: std::mem::take(&mut run),
                    });
                }
            }
            run.push(t);
        }
        if !run.is_empty() {
            rows.push(Row {
                strip_order,
                dy,
                palette,
                tiles: run,
            });
        }
    }

    rows.sort_by_key(|row| (row.strip_order, row.dy, row.tiles[0].dx));
    rows
}

fn excess128(value: i32) -> Result<u8, String> {
    if !(-128..=127).contains(&value) {
        return Err(format!("offset {} does not fit in excess-128 encoding", value));
    }
    Ok((value + 128) as u8)
}

/// Encode one cel's drawable content into its terminated metasprite byte
/// stream. `slot_of` maps a tile id to its 0-based intra-bank slot, as
/// decided by the emitter once bank layout is final.
pub fn encode_cel(
    cel_name: &str,
    refs: &[TileRef],
    slot_of: &IntMap<TileId, u8>,
) -> Result<Vec<u8>, CrunchError> {
    let rows = group_rows(refs);
    let mut out = Vec::new();

    for row in &rows {
        if row.tiles.len() > MAX_ROW_LEN {
            return Err(CrunchError::encode(
                cel_name,
                format!(
                    "row of {} tiles at y={} exceeds the {}-tile maximum",
                    row.tiles.len(),
                    row.dy,
                    MAX_ROW_LEN
                ),
            ));
        }

        let x = row.tiles[0].dx;
        let x_byte = excess128(x).map_err(|m| CrunchError::encode(cel_name, m))?;
        if x_byte == 0 {
            return Err(CrunchError::encode(
                cel_name,
                format!("row at x={} encodes to the reserved terminator byte 0x00", x),
            ));
        }
        let y_byte = excess128(row.dy).map_err(|m| CrunchError::encode(cel_name, m))?;

        let flags = (row.palette & 0b11) | (((row.tiles.len() - 1) as u8 & 0b111) << 2);

        out.push(x_byte);
        out.push(y_byte);
        out.push(flags);

        for tile_ref in &row.tiles {
            let slot = *slot_of.get(&tile_ref.tile).ok_or_else(|| {
                CrunchError::encode(
                    cel_name,
                    format!("tile {} was not assigned a bank slot", tile_ref.tile),
                )
            })?;
            if slot > 31 {
                return Err(CrunchError::encode(
                    cel_name,
                    format!("tile slot {} does not fit the 5-bit bank address field", slot),
                ));
            }
            let mut byte = (slot & 0x1F) << 1;
            if tile_ref.hflip {
                byte |= 1 << 6;
            }
            out.push(byte);
        }
    }

    out.push(0x00);
    Ok(out)
}
