use crate::alignment::join::join_units;
use crate::config::StageParams;
use crate::error::AlignmentError;
use crate::types::{AlignmentType, TextUnit};

use super::{Cursor, Scorer};

/// Swap candidates must have both cross scores above `threshold - SWAP_MARGIN`.
pub(crate) const SWAP_MARGIN: f32 = 0.1;

#[derive(Debug, Clone)]
pub(crate) struct CrossPair {
    pub source_text: String,
    pub target_text: String,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub(crate) enum CandidateBody {
    Merge {
        kind: AlignmentType,
        source_text: String,
        target_text: String,
    },
    /// `first` is `(A[i], B[j+1])`, `second` is `(A[i+1], B[j])`.
    Swap { first: CrossPair, second: CrossPair },
}

#[derive(Debug, Clone)]
pub(crate) struct AlignmentCandidate {
    pub score: f32,
    pub source_span: usize,
    pub target_span: usize,
    pub body: CandidateBody,
}

/// Cross scores computed for the swap check, reused by the lookahead.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CrossScores {
    /// `score(A[i], B[j+1])`
    pub source_to_next_target: Option<f32>,
    /// `score(A[i+1], B[j])`
    pub next_source_to_target: Option<f32>,
}

pub(crate) struct Generated {
    pub candidates: Vec<AlignmentCandidate>,
    pub cross: CrossScores,
}

/// Candidates in generation order: for each `k`, `1:k` then `k:1` (k > 1),
/// followed by the swap candidate when it passes its gate.
pub(crate) fn generate(
    source: &[TextUnit],
    target: &[TextUnit],
    cursor: Cursor,
    scorer: &Scorer<'_>,
    params: &StageParams,
) -> Result<Generated, AlignmentError> {
    let Cursor { i, j } = cursor;
    let mut candidates = Vec::with_capacity(2 * params.max_window);

    for k in 1..=params.max_window {
        if j + k <= target.len() {
            let target_text = join_units(&target[j..j + k]);
            let score = scorer.score(&source[i].text, &target_text)?;
            candidates.push(AlignmentCandidate {
                score,
                source_span: 1,
                target_span: k,
                body: CandidateBody::Merge {
                    kind: AlignmentType::one_to(k),
                    source_text: source[i].text.clone(),
                    target_text,
                },
            });
        }

        // k == 1 is already covered by the 1:1 candidate above.
        if k > 1 && i + k <= source.len() {
            let source_text = join_units(&source[i..i + k]);
            let score = scorer.score(&source_text, &target[j].text)?;
            candidates.push(AlignmentCandidate {
                score,
                source_span: k,
                target_span: 1,
                body: CandidateBody::Merge {
                    kind: AlignmentType::to_one(k),
                    source_text,
                    target_text: target[j].text.clone(),
                },
            });
        }
    }

    let mut cross = CrossScores::default();
    if i + 1 < source.len() && j + 1 < target.len() {
        let s1 = scorer.score(&source[i].text, &target[j + 1].text)?;
        let s2 = scorer.score(&source[i + 1].text, &target[j].text)?;
        cross = CrossScores {
            source_to_next_target: Some(s1),
            next_source_to_target: Some(s2),
        };

        // Both cross pairs must clear the gate.
        if s1.min(s2) > params.threshold - SWAP_MARGIN {
            candidates.push(AlignmentCandidate {
                score: (s1 + s2) / 2.0,
                source_span: 2,
                target_span: 2,
                body: CandidateBody::Swap {
                    first: CrossPair {
                        source_text: source[i].text.clone(),
                        target_text: target[j + 1].text.clone(),
                        score: s1,
                    },
                    second: CrossPair {
                        source_text: source[i + 1].text.clone(),
                        target_text: target[j].text.clone(),
                        score: s2,
                    },
                },
            });
        }
    }

    Ok(Generated { candidates, cross })
}

/// Highest score wins; on an exact tie the earliest generated candidate is kept.
pub(crate) fn select_best(candidates: Vec<AlignmentCandidate>) -> Option<AlignmentCandidate> {
    let mut best: Option<AlignmentCandidate> = None;
    for candidate in candidates {
        match &best {
            Some(current) if current.score >= candidate.score => {}
            _ => best = Some(candidate),
        }
    }
    best
}
