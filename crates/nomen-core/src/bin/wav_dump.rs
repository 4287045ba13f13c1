//! Print the chunk table and parsed metadata of a WAV file

use std::fs::File;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use nomen_core::wav;

fn main() -> Result<()> {
    env_logger::init();

    let Some(path) = std::env::args().nth(1).map(PathBuf::from) else {
        bail!("usage: wav-dump <file.wav>");
    };

    let mut file = File::open(&path).with_context(|| format!("open {path:?}"))?;
    let chunks = wav::walk_chunks(&mut file, &path)?;

    println!("{:<8} {:>12} {:>12}  pad", "fourcc", "offset", "size");
    for chunk in &chunks {
        println!(
            "{:<8} {:>12} {:>12}  {}",
            chunk.fourcc_str(),
            chunk.offset,
            chunk.size,
            if chunk.has_pad { "yes" } else { "no" }
        );
    }

    let metadata = wav::read_metadata(&path)?;
    println!();
    println!(
        "{} Hz / {} bit / {} ch, {} frames ({:.3} s), format tag {}",
        metadata.technical.sample_rate,
        metadata.technical.bit_depth,
        metadata.technical.channels,
        metadata.technical.frame_count,
        metadata.technical.duration_seconds,
        metadata.technical.format_tag,
    );

    let present = metadata.fields.present_fields();
    if present.is_empty() {
        println!("no metadata fields");
    } else {
        for field in present {
            println!("{:<16} {}", field, metadata.fields.get(field).unwrap_or(""));
        }
    }
    for (tag, value) in &metadata.custom_fields {
        println!("custom {tag:<14} {value}");
    }
    if let Some(bext) = &metadata.bext {
        println!(
            "bext v{}: description={:?} originator={:?}",
            bext.version, bext.description, bext.originator
        );
    }
    for (id, value) in &metadata.info {
        println!("INFO {id} = {value:?}");
    }
    Ok(())
}
