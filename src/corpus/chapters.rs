use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::AlignmentError;

const PREFIX_DIGITS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterPair {
    pub prefix: String,
    pub source: PathBuf,
    pub target: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterPairing {
    /// Sorted by prefix.
    pub pairs: Vec<ChapterPair>,
    pub unmatched_source: Vec<String>,
    pub unmatched_target: Vec<String>,
}

/// `"007_title.txt"` -> `Some("007")`.
pub fn chapter_prefix(file_name: &str) -> Option<&str> {
    let bytes = file_name.as_bytes();
    if bytes.len() > PREFIX_DIGITS
        && bytes[..PREFIX_DIGITS].iter().all(u8::is_ascii_digit)
        && bytes[PREFIX_DIGITS] == b'_'
    {
        Some(&file_name[..PREFIX_DIGITS])
    } else {
        None
    }
}

pub fn pair_chapter_files(
    source_dir: &Path,
    target_dir: &Path,
) -> Result<ChapterPairing, AlignmentError> {
    let mut source = index_chapters(source_dir)?;
    let target = index_chapters(target_dir)?;

    let mut pairing = ChapterPairing::default();
    for (prefix, target_path) in target {
        match source.remove(&prefix) {
            Some(source_path) => pairing.pairs.push(ChapterPair {
                prefix,
                source: source_path,
                target: target_path,
            }),
            None => {
                tracing::warn!(%prefix, path = %target_path.display(), "no source chapter for prefix");
                pairing.unmatched_target.push(prefix);
            }
        }
    }
    for (prefix, source_path) in source {
        tracing::warn!(%prefix, path = %source_path.display(), "no target chapter for prefix");
        pairing.unmatched_source.push(prefix);
    }
    pairing.pairs.sort_by(|a, b| a.prefix.cmp(&b.prefix));

    tracing::info!(
        pairs = pairing.pairs.len(),
        unmatched_source = pairing.unmatched_source.len(),
        unmatched_target = pairing.unmatched_target.len(),
        "paired chapter files"
    );
    Ok(pairing)
}

fn index_chapters(dir: &Path) -> Result<BTreeMap<String, PathBuf>, AlignmentError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| AlignmentError::io("list chapter directory", e))? {
        let entry = entry.map_err(|e| AlignmentError::io("list chapter directory", e))?;
        let file_type = entry
            .file_type()
            .map_err(|e| AlignmentError::io("inspect chapter file", e))?;
        if file_type.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();

    let mut index = BTreeMap::new();
    for path in files {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(prefix) = chapter_prefix(name) else {
            tracing::debug!(path = %path.display(), "ignoring file without chapter prefix");
            continue;
        };
        match index.entry(prefix.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(path);
            }
            Entry::Occupied(kept) => {
                tracing::warn!(
                    prefix,
                    kept = %kept.get().display(),
                    ignored = %path.display(),
                    "duplicate chapter prefix"
                );
            }
        }
    }
    Ok(index)
}

/// One paragraph per line, trimmed, blank lines dropped.
pub fn read_paragraphs(path: &Path) -> Result<Vec<String>, AlignmentError> {
    let text =
        std::fs::read_to_string(path).map_err(|e| AlignmentError::io("read chapter file", e))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
