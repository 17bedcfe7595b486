use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::AlignmentError;
use crate::types::AlignedPair;

/// One compact JSON object per line; non-ASCII text is written as-is.
pub fn write_pairs<W: Write>(mut writer: W, pairs: &[AlignedPair]) -> Result<(), AlignmentError> {
    for pair in pairs {
        serde_json::to_writer(&mut writer, pair)
            .map_err(|e| AlignmentError::json("serialize aligned pair", e))?;
        writer
            .write_all(b"\n")
            .map_err(|e| AlignmentError::io("write aligned pairs", e))?;
    }
    writer
        .flush()
        .map_err(|e| AlignmentError::io("flush aligned pairs", e))
}

pub fn write_jsonl_file(path: &Path, pairs: &[AlignedPair]) -> Result<(), AlignmentError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| AlignmentError::io("create output directory", e))?;
    }
    let file = File::create(path).map_err(|e| AlignmentError::io("create JSONL file", e))?;
    write_pairs(BufWriter::new(file), pairs)
}
