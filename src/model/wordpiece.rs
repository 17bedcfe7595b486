use std::collections::HashMap;
use std::path::Path;

use crate::error::AlignmentError;

const CLS: &str = "[CLS]";
const SEP: &str = "[SEP]";
const PAD: &str = "[PAD]";
const UNK: &str = "[UNK]";
const CONTINUATION: &str = "##";
const MAX_CHARS_PER_WORD: usize = 100;

/// A padded batch in row-major `(batch, seq_len)` layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EncodedBatch {
    pub ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub batch: usize,
    pub seq_len: usize,
}

/// BERT-style basic + WordPiece tokenizer over a `vocab.txt` (one token per line, id = line).
pub(crate) struct WordPieceTokenizer {
    vocab: HashMap<String, u32>,
    cls_id: u32,
    sep_id: u32,
    pad_id: u32,
    unk_id: u32,
    lowercase: bool,
}

impl WordPieceTokenizer {
    pub(crate) fn load(path: &Path, lowercase: bool) -> Result<Self, AlignmentError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| AlignmentError::io("read vocab.txt", e))?;
        Self::from_vocab_lines(text.lines(), lowercase)
    }

    pub(crate) fn from_vocab_lines<'a>(
        lines: impl IntoIterator<Item = &'a str>,
        lowercase: bool,
    ) -> Result<Self, AlignmentError> {
        let mut vocab = HashMap::new();
        for (id, line) in lines.into_iter().enumerate() {
            let token = line.trim_end_matches(['\r', '\n']);
            if token.is_empty() {
                continue;
            }
            vocab.entry(token.to_string()).or_insert(id as u32);
        }
        let special = |token: &str| {
            vocab.get(token).copied().ok_or_else(|| {
                AlignmentError::invalid_input(format!("vocabulary is missing {token}"))
            })
        };
        Ok(Self {
            cls_id: special(CLS)?,
            sep_id: special(SEP)?,
            pad_id: special(PAD)?,
            unk_id: special(UNK)?,
            vocab,
            lowercase,
        })
    }

    pub(crate) fn vocab_len(&self) -> usize {
        self.vocab.len()
    }

    /// `[CLS] pieces.. [SEP]`, truncated so the whole sequence fits `max_len`.
    pub(crate) fn encode(&self, text: &str, max_len: usize) -> Vec<u32> {
        let budget = max_len.saturating_sub(2);
        let mut ids = Vec::with_capacity(budget.min(64) + 2);
        ids.push(self.cls_id);
        'words: for word in self.basic_tokens(text) {
            for id in self.wordpiece(&word) {
                if ids.len() > budget {
                    break 'words;
                }
                ids.push(id);
            }
        }
        ids.push(self.sep_id);
        ids
    }

    pub(crate) fn encode_batch(&self, texts: &[&str], max_len: usize) -> EncodedBatch {
        let rows: Vec<Vec<u32>> = texts.iter().map(|t| self.encode(t, max_len)).collect();
        let seq_len = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut ids = Vec::with_capacity(rows.len() * seq_len);
        let mut attention_mask = Vec::with_capacity(rows.len() * seq_len);
        for row in &rows {
            ids.extend_from_slice(row);
            attention_mask.extend(std::iter::repeat(1).take(row.len()));
            let pad = seq_len - row.len();
            ids.extend(std::iter::repeat(self.pad_id).take(pad));
            attention_mask.extend(std::iter::repeat(0).take(pad));
        }
        EncodedBatch {
            ids,
            attention_mask,
            batch: rows.len(),
            seq_len,
        }
    }

    /// Whitespace split after cleaning, with punctuation and CJK ideographs as their own words.
    fn basic_tokens(&self, text: &str) -> Vec<String> {
        let mut words = Vec::new();
        let mut cur = String::new();
        let flush = |cur: &mut String, words: &mut Vec<String>| {
            if !cur.is_empty() {
                words.push(std::mem::take(cur));
            }
        };
        for c in text.chars() {
            if c == '\0' || c == '\u{fffd}' || (c.is_control() && !c.is_whitespace()) {
                continue;
            }
            if c.is_whitespace() {
                flush(&mut cur, &mut words);
            } else if is_cjk(c) || is_punctuation(c) {
                flush(&mut cur, &mut words);
                words.push(c.to_string());
            } else if self.lowercase {
                cur.extend(c.to_lowercase());
            } else {
                cur.push(c);
            }
        }
        flush(&mut cur, &mut words);
        words
    }

    /// Greedy longest-match-first; a word with any unmatched remainder becomes `[UNK]`.
    fn wordpiece(&self, word: &str) -> Vec<u32> {
        let chars: Vec<char> = word.chars().collect();
        if chars.len() > MAX_CHARS_PER_WORD {
            return vec![self.unk_id];
        }
        let mut pieces = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let mut end = chars.len();
            let mut found = None;
            while start < end {
                let mut candidate: String = chars[start..end].iter().collect();
                if start > 0 {
                    candidate.insert_str(0, CONTINUATION);
                }
                if let Some(&id) = self.vocab.get(&candidate) {
                    found = Some(id);
                    break;
                }
                end -= 1;
            }
            match found {
                Some(id) => pieces.push(id),
                None => return vec![self.unk_id],
            }
            start = end;
        }
        pieces
    }
}

fn is_cjk(c: char) -> bool {
    matches!(
        c as u32,
        0x4E00..=0x9FFF
            | 0x3400..=0x4DBF
            | 0x20000..=0x2A6DF
            | 0x2A700..=0x2B73F
            | 0x2B740..=0x2B81F
            | 0x2B820..=0x2CEAF
            | 0xF900..=0xFAFF
            | 0x2F800..=0x2FA1F
    )
}

fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(
            c as u32,
            0x2000..=0x206F | 0x3000..=0x303F | 0xFF00..=0xFF0F | 0xFF1A..=0xFF20 | 0xFF3B..=0xFF40 | 0xFF5B..=0xFF65
        )
}
