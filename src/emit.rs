//! Emitter: CHR tile blob, ca65-style assembly tables, and the optional
//! frame-numbers side file (spec.md §4.7, §6).

use std::collections::HashMap;
use std::fmt::Write as _;

use nohash::IntMap;

use crate::intern::{TileId, TileInterner, TileRef};
use crate::metasprite::encode_cel;
use crate::pack::{Bank, PackedLayout, Slot};
use crate::parser::Document;
use crate::tables::{KeywordKind, TableValue};
use crate::tile::{Tile, TILE_HEIGHT, TILE_WIDTH};
use crate::error::CrunchError;
use image::{Rgba, RgbaImage};

/// Serialize one tile to its CHR planes: one byte per row of low-plane bits
/// (bit 7 = leftmost column), followed by the matching high-plane bytes,
/// top row first.
pub fn tile_bytes(tile: &Tile) -> Vec<u8> {
    let mut low = Vec::with_capacity(TILE_HEIGHT);
    let mut high = Vec::with_capacity(TILE_HEIGHT);
    for row in 0..TILE_HEIGHT {
        let mut lo = 0u8;
        let mut hi = 0u8;
        for col in 0..TILE_WIDTH {
            let bit = 7 - col as u8;
            let value = tile.get(row, col);
            lo |= (value & 0b01) << bit;
            hi |= ((value & 0b10) >> 1) << bit;
        }
        low.push(lo);
        high.push(hi);
    }
    low.extend(high);
    low
}

/// Per-bank tile layout: a deterministic intra-bank slot (0-based, ascending
/// by [`TileId`]) for every tile the bank uses, plus that bank's serialized
/// CHR bytes (`bank_size` tiles, zero-filled past the used slots).
struct BankLayout {
    slot_of: IntMap<TileId, u8>,
    chr: Vec<u8>,
}

fn layout_bank(tiles: &std::collections::BTreeSet<TileId>, interner: &TileInterner, bank_size: usize) -> BankLayout {
    let mut slot_of = IntMap::default();
    let mut chr = Vec::with_capacity(bank_size * 2 * TILE_HEIGHT);
    for (slot, &tile_id) in tiles.iter().enumerate() {
        slot_of.insert(tile_id, slot as u8);
        chr.extend(tile_bytes(interner.get(tile_id)));
    }
    let used_bytes = tiles.len() * 2 * TILE_HEIGHT;
    let total_bytes = bank_size * 2 * TILE_HEIGHT;
    chr.resize(total_bytes.max(used_bytes), 0);
    BankLayout { slot_of, chr }
}

/// Configuration for the assembly/text side of emission (spec.md §6).
pub struct EmitConfig<'a> {
    pub prefix: &'a str,
    pub segment: &'a str,
}

/// Everything the CLI writes to disk.
pub struct Emitted {
    pub chr: Vec<u8>,
    pub assembly: String,
    pub frame_numbers: String,
}

fn asm_ident(prefix: &str, suffix: &str) -> String {
    format!("{}{}", prefix, suffix)
}

fn table_value_kinds(doc: &Document) -> HashMap<String, &'static str> {
    let mut kinds = HashMap::new();
    for kind in doc.registry.keywords().values() {
        match kind {
            KeywordKind::Attribute { table } => {
                kinds.insert(table.clone(), "attribute");
            }
            KeywordKind::Flag { table, .. } => {
                kinds.insert(table.clone(), "flags");
            }
            KeywordKind::ActionPoint { table_x, table_y } => {
                kinds.insert(table_x.clone(), "action_x");
                kinds.insert(table_y.clone(), "action_y");
            }
        }
    }
    kinds
}

fn cel_table_byte(doc: &Document, cel_index: usize, table_name: &str, kind: &str) -> u8 {
    let entries = &doc.cels[cel_index].table_entries.0;
    match kind {
        "attribute" => match entries.get(table_name) {
            Some(TableValue::Attribute(v)) => *v,
            _ => 0,
        },
        "flags" => match entries.get(table_name) {
            Some(TableValue::Flags(bits)) => (*bits & 0xFF) as u8,
            _ => 0,
        },
        "action_x" | "action_y" => {
            // action tables are keyed on the registry's combined table_x/table_y
            // key; find the owning actionpoint declaration for this table name.
            for kw in doc.registry.keywords().values() {
                if let KeywordKind::ActionPoint { table_x, table_y } = kw {
                    let key = format!("{}\0{}", table_x, table_y);
                    if let Some(TableValue::ActionPoint { dx, dy }) = entries.get(&key) {
                        if table_x == table_name {
                            return *dx as u8;
                        }
                        if table_y == table_name {
                            return *dy as u8;
                        }
                    }
                }
            }
            0
        }
        _ => 0,
    }
}

/// Run the full emission stage: build CHR, ca65 assembly text, and the
/// frame-numbers side file.
pub fn emit(
    doc: &Document,
    interner: &TileInterner,
    layout: &PackedLayout,
    cel_refs: &HashMap<usize, Vec<TileRef>>,
    bank_size: usize,
    config: &EmitConfig,
) -> Result<Emitted, CrunchError> {
    let banks: Vec<BankLayout> = layout
        .banks
        .iter()
        .map(|bank| layout_bank(&bank.tiles, interner, bank_size))
        .collect();

    let chr: Vec<u8> = banks.iter().flat_map(|b| b.chr.iter().copied()).collect();

    let num_frames = layout.stream.iter().map(|s| s.len()).sum::<usize>();
    let num_tiles = interner.len();

    let mut asm = String::new();
    writeln!(asm, ".segment \"{}\"", config.segment).ok();
    writeln!(asm).ok();
    writeln!(asm, ".export {}", asm_ident(config.prefix, "NUMFRAMES")).ok();
    writeln!(asm, ".export {}", asm_ident(config.prefix, "NUMTILES")).ok();
    writeln!(asm, "{} = {}", asm_ident(config.prefix, "NUMFRAMES"), num_frames).ok();
    writeln!(asm, "{} = {}", asm_ident(config.prefix, "NUMTILES"), num_tiles).ok();
    writeln!(asm).ok();

    writeln!(asm, ".export {}", asm_ident(config.prefix, "frametobank")).ok();
    writeln!(asm, "{}:", asm_ident(config.prefix, "frametobank")).ok();
    for (bank_index, slots) in layout.stream.iter().enumerate() {
        for _ in slots {
            writeln!(asm, "    .byte {}", bank_index).ok();
        }
    }
    writeln!(asm).ok();

    // Per-cel metasprite byte streams, labeled msp_<name>, skipping padding
    // slots (they occupy an id but have no drawable content).
    let mut cel_label = HashMap::new();
    for (cel_index, cel) in doc.cels.iter().enumerate() {
        let label = format!("msp_{}", cel.name);
        cel_label.insert(cel_index, label);
    }

    writeln!(asm, ".export {}", asm_ident(config.prefix, "mspraddrs")).ok();
    writeln!(asm, "{}:", asm_ident(config.prefix, "mspraddrs")).ok();
    for slots in &layout.stream {
        for slot in slots {
            match slot {
                Slot::Cel { cel_index } => {
                    writeln!(asm, "    .word {}", cel_label[cel_index]).ok();
                }
                Slot::Padding => {
                    writeln!(asm, "    .word 0").ok();
                }
            }
        }
    }
    writeln!(asm).ok();

    for (bank_index, slots) in layout.stream.iter().enumerate() {
        for slot in slots {
            if let Slot::Cel { cel_index } = slot {
                let refs = cel_refs.get(cel_index).map(Vec::as_slice).unwrap_or(&[]);
                let bytes = encode_cel(&doc.cels[*cel_index].name, refs, &banks[bank_index].slot_of)?;
                writeln!(asm, "{}:", cel_label[cel_index]).ok();
                write!(asm, "    .byte ").ok();
                let rendered: Vec<String> = bytes.iter().map(|b| format!("${:02X}", b)).collect();
                writeln!(asm, "{}", rendered.join(", ")).ok();
            }
        }
    }
    writeln!(asm).ok();

    let kinds = table_value_kinds(doc);
    let mut table_names: Vec<&String> = kinds.keys().collect();
    table_names.sort();
    let table_segments: HashMap<&str, &str> = doc
        .registry
        .tables()
        .iter()
        .map(|def| (def.name.as_str(), def.segment.as_str()))
        .collect();
    for table_name in table_names {
        let kind = kinds[table_name];
        let segment = table_segments.get(table_name.as_str()).copied().unwrap_or(config.segment);
        writeln!(asm, ".segment \"{}\"", segment).ok();
        writeln!(asm, ".export {}", asm_ident(config.prefix, &format!("tbl_{}", table_name))).ok();
        writeln!(asm, "{}:", asm_ident(config.prefix, &format!("tbl_{}", table_name))).ok();
        for slots in &layout.stream {
            for slot in slots {
                let byte = match slot {
                    Slot::Cel { cel_index } => cel_table_byte(doc, *cel_index, table_name, kind),
                    Slot::Padding => 0,
                };
                writeln!(asm, "    .byte ${:02X}", byte).ok();
            }
        }
        writeln!(asm).ok();
    }

    let mut frame_numbers = String::new();
    for (cel_index, cel) in doc.cels.iter().enumerate() {
        let id = layout.cel_id[&cel_index];
        let bank = layout.cel_bank[&cel_index];
        let mut names = vec![cel.name.clone()];
        names.extend(cel.aliases.iter().cloned());
        for name in names {
            writeln!(frame_numbers, "FRAME_{}={}", name, id).ok();
            writeln!(frame_numbers, "FRAMEBANK_{}={}", name, bank).ok();
            writeln!(
                frame_numbers,
                "FRAMETILENUM_{}={}",
                name, banks[bank].slot_of.len()
            )
            .ok();
        }
    }

    Ok(Emitted {
        chr,
        assembly: asm,
        frame_numbers,
    })
}

/// Shades a tile's palette indices (0..=3) into grayscale for the `-d`
/// debug-image dump -- no actual palette colors are involved, just a visual
/// sanity check that tiles and banks line up (spec.md §6 `-d`/`--intermediate`).
fn index_to_gray(index: u8) -> Rgba<u8> {
    let v = 255 - index * 85;
    Rgba([v, v, v, 255])
}

/// Render one bank's tiles as a single debug PNG: a left-to-right strip of
/// its tiles in slot order.
pub fn render_bank_debug_image(interner: &TileInterner, bank: &Bank) -> RgbaImage {
    let count = bank.tiles.len().max(1);
    let mut img = RgbaImage::new((count * TILE_WIDTH) as u32, TILE_HEIGHT as u32);
    for (slot, &tile_id) in bank.tiles.iter().enumerate() {
        let tile = interner.get(tile_id);
        for row in 0..TILE_HEIGHT {
            for col in 0..TILE_WIDTH {
                let x = (slot * TILE_WIDTH + col) as u32;
                let y = row as u32;
                img.put_pixel(x, y, index_to_gray(tile.get(row, col)));
            }
        }
    }
    img
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::Tile;

    #[test]
    fn tile_bytes_round_trips_bit_pattern() {
        let mut t = Tile::default();
        t.set(0, 0, 0b11);
        t.set(0, 7, 0b01);
        let bytes = tile_bytes(&t);
        assert_eq!(bytes.len(), 2 * TILE_HEIGHT);
        assert_eq!(bytes[0] & 0b1000_0001, 0b1000_0001); // low plane, cols 0 and 7
        assert_eq!(bytes[TILE_HEIGHT] & 0b1000_0000, 0b1000_0000); // high plane, col 0 only
    }
}
