use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::AlignmentError;

/// Writing system class, which decides how merged units are concatenated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Script {
    SpaceDelimited,
    Logographic,
}

impl Script {
    pub fn joiner(self) -> &'static str {
        match self {
            Self::SpaceDelimited => " ",
            Self::Logographic => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Zh,
    Ja,
    Ko,
}

impl Language {
    pub fn tag(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Zh => "zh",
            Self::Ja => "ja",
            Self::Ko => "ko",
        }
    }

    pub fn script(self) -> Script {
        match self {
            Self::Zh | Self::Ja => Script::Logographic,
            Self::En | Self::Ko => Script::SpaceDelimited,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Language {
    type Err = AlignmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let primary = lowered.split(['-', '_']).next().unwrap_or_default();
        match primary {
            "en" | "eng" | "english" => Ok(Self::En),
            "zh" | "zho" | "chinese" => Ok(Self::Zh),
            "ja" | "jpn" | "japanese" => Ok(Self::Ja),
            "ko" | "kor" | "korean" => Ok(Self::Ko),
            _ => Err(AlignmentError::invalid_input(format!(
                "unsupported language tag '{s}'"
            ))),
        }
    }
}

/// One element of an ordered sequence being aligned (a paragraph or a sentence).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextUnit {
    pub index: usize,
    pub text: String,
    pub language: Language,
}

impl TextUnit {
    pub fn new(index: usize, text: impl Into<String>, language: Language) -> Self {
        Self {
            index,
            text: text.into(),
            language,
        }
    }

    /// Builds a sequence with indices following iteration order.
    pub fn sequence<I, S>(texts: I, language: Language) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| Self::new(index, text, language))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlignmentType {
    /// `source` units matched to `target` units; one side is always 1.
    Merge { source: usize, target: usize },
    Swap1,
    Swap2,
}

impl AlignmentType {
    pub fn one_to(k: usize) -> Self {
        Self::Merge {
            source: 1,
            target: k,
        }
    }

    pub fn to_one(k: usize) -> Self {
        Self::Merge {
            source: k,
            target: 1,
        }
    }

    pub fn is_swap(self) -> bool {
        matches!(self, Self::Swap1 | Self::Swap2)
    }
}

impl fmt::Display for AlignmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merge { source, target } => write!(f, "{source}:{target}"),
            Self::Swap1 => f.write_str("swap_1"),
            Self::Swap2 => f.write_str("swap_2"),
        }
    }
}

impl Serialize for AlignmentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Output record of the aligner. Serializes to the corpus line format
/// `{"en", "zh", "type", "score", "source_para_score"?}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignedPair {
    #[serde(rename = "en")]
    pub source_text: String,
    #[serde(rename = "zh")]
    pub target_text: String,
    #[serde(rename = "type")]
    pub kind: AlignmentType,
    pub score: f32,
    /// Score of the paragraph pair a sentence pair was aligned inside.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_para_score: Option<f32>,
}

impl AlignedPair {
    pub fn new(
        source_text: impl Into<String>,
        target_text: impl Into<String>,
        kind: AlignmentType,
        score: f32,
    ) -> Self {
        Self {
            source_text: source_text.into(),
            target_text: target_text.into(),
            kind,
            score,
            source_para_score: None,
        }
    }

    pub fn with_provenance(mut self, parent_score: f32) -> Self {
        self.source_para_score = Some(parent_score);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    /// One merged pair committed.
    Commit(AlignmentType),
    /// Two crosswise pairs (`swap_1`, `swap_2`) committed.
    Swap,
    /// Source unit judged extra/untranslated.
    DropSource,
    /// Target unit judged extra/untranslated.
    DropTarget,
    DropBoth,
}

/// One loop iteration: where the cursor was and how many units each side gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentStep {
    pub source_start: usize,
    pub target_start: usize,
    pub source_consumed: usize,
    pub target_consumed: usize,
    pub action: StepAction,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AlignmentRun {
    pub pairs: Vec<AlignedPair>,
    pub steps: Vec<AlignmentStep>,
    /// Source units left after the target side ran out.
    pub unconsumed_source: usize,
    /// Target units left after the source side ran out.
    pub unconsumed_target: usize,
}

impl AlignmentRun {
    pub fn dropped_source(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.action, StepAction::DropSource | StepAction::DropBoth))
            .map(|s| s.source_consumed)
            .sum()
    }

    pub fn dropped_target(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.action, StepAction::DropTarget | StepAction::DropBoth))
            .map(|s| s.target_consumed)
            .sum()
    }
}
