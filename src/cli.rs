//! Command-line front end (spec.md §6).

use std::fs;
use std::path::PathBuf;

use clap::Parser as ClapParser;
use log::info;

use crate::emit::{self, EmitConfig};
use crate::error::CrunchError;
use crate::Pipeline;

/// Packs a hand-authored sprite sheet into banked tile data and metasprite
/// tables for an 8-bit console.
#[derive(ClapParser, Debug)]
#[command(name = "crunchcel", version, about)]
pub struct Cli {
    /// Cel-position file describing cels, strips, and palettes.
    pub cel_file: PathBuf,

    /// Raster image the cel-position file's rects are drawn against.
    pub image_file: PathBuf,

    /// Output path for the packed CHR tile data. Omit to skip writing it.
    pub chr_out: Option<PathBuf>,

    /// Output path for the ca65-style assembly tables. Omit to skip writing it.
    pub asm_out: Option<PathBuf>,

    /// Alternate pre-flipped image, used instead of computing a flip when
    /// the cel-position file sets `hflip`.
    #[arg(long)]
    pub flip: Option<PathBuf>,

    /// Optional `FRAME_<name>=<id>` side file.
    #[arg(long = "write-frame-numbers")]
    pub write_frame_numbers: Option<PathBuf>,

    /// Prefix applied to every exported assembly symbol.
    #[arg(long, default_value = "")]
    pub prefix: String,

    /// ca65 segment the tables are exported into.
    #[arg(long, default_value = "RODATA")]
    pub segment: String,

    /// Tiles per bank.
    #[arg(long = "bank-size", default_value_t = 32)]
    pub bank_size: usize,

    /// Write per-bank debug PNGs alongside the CHR output.
    #[arg(short = 'd', long = "intermediate")]
    pub intermediate: bool,
}

/// Runs the CLI end to end, buffering every output in memory so a failure
/// partway through never leaves a partial file on disk (spec.md §7: "all
/// errors halt the pipeline; no partial outputs are written").
pub fn run(cli: &Cli) -> Result<(), CrunchError> {
    let source = fs::read_to_string(&cli.cel_file)?;
    let image = image::open(&cli.image_file)
        .map_err(|e| CrunchError::raster("<image>", format!("failed to load image: {}", e)))?
        .to_rgba8();
    let flipped_image = cli
        .flip
        .as_ref()
        .map(|p| image::open(p).map(|i| i.to_rgba8()))
        .transpose()
        .map_err(|e| CrunchError::raster("<image>", format!("failed to load --flip image: {}", e)))?;

    let pipeline = Pipeline::new(cli.bank_size);
    let result = pipeline.run(&source, &image, flipped_image.as_ref())?;
    info!(
        "{} cels, {} tiles, {} banks",
        result.document.cels.len(),
        result.interner.len(),
        result.layout.banks.len()
    );

    let config = EmitConfig {
        prefix: &cli.prefix,
        segment: &cli.segment,
    };
    let emitted = emit::emit(
        &result.document,
        &result.interner,
        &result.layout,
        &result.cel_refs,
        cli.bank_size,
        &config,
    )?;

    let mut debug_images = Vec::new();
    if cli.intermediate {
        if let Some(chr_out) = &cli.chr_out {
            for (i, bank) in result.layout.banks.iter().enumerate() {
                let img = emit::render_bank_debug_image(&result.interner, bank);
                let path = chr_out.with_extension(format!("bank{}.png", i));
                debug_images.push((path, img));
            }
        }
    }

    // Nothing is written until every output has been produced successfully.
    if let Some(path) = &cli.chr_out {
        fs::write(path, &emitted.chr)?;
    }
    if let Some(path) = &cli.asm_out {
        fs::write(path, &emitted.assembly)?;
    }
    if let Some(path) = &cli.write_frame_numbers {
        fs::write(path, &emitted.frame_numbers)?;
    }
    for (path, img) in &debug_images {
        img.save(path)
            .map_err(|e| CrunchError::raster("<debug image>", format!("failed to write {}: {}", path.display(), e)))?;
    }

    Ok(())
}
