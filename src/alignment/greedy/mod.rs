//! Greedy, windowed, single-pass alignment of two ordered unit sequences.
//!
//! At each cursor position the engine scores every 1:k and k:1 merge inside
//! the window plus a 2x2 crosswise swap, commits the best candidate when it
//! clears the threshold, and otherwise resolves the ambiguity by dropping the
//! unit a one-step lookahead marks as extra (or both units). Every iteration
//! consumes at least one unit, so a run takes at most `len(A) + len(B)` steps.
//! Nothing is ever revisited; units left over once either side is exhausted
//! are reported but not aligned.

use crate::config::StageParams;
use crate::error::AlignmentError;
use crate::pipeline::traits::SimilarityOracle;
use crate::types::{AlignedPair, AlignmentRun, AlignmentStep, AlignmentType, StepAction, TextUnit};

mod candidate_generator;
mod recovery;
#[cfg(test)]
mod tests;

use candidate_generator::{AlignmentCandidate, CandidateBody};

/// Next unconsumed index into the source (`i`) and target (`j`) sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cursor {
    pub i: usize,
    pub j: usize,
}

/// Oracle access for one run; rejects failed and non-finite scores.
pub(crate) struct Scorer<'a> {
    oracle: &'a dyn SimilarityOracle,
}

impl Scorer<'_> {
    pub(crate) fn score(&self, a: &str, b: &str) -> Result<f32, AlignmentError> {
        let score = self.oracle.score(a, b)?;
        if !score.is_finite() {
            return Err(AlignmentError::oracle(format!(
                "non-finite similarity {score} for a {}-byte / {}-byte pair",
                a.len(),
                b.len()
            )));
        }
        Ok(score)
    }
}

pub fn align_units(
    source: &[TextUnit],
    target: &[TextUnit],
    oracle: &dyn SimilarityOracle,
    params: &StageParams,
) -> Result<AlignmentRun, AlignmentError> {
    params.validate()?;
    if source.is_empty() || target.is_empty() {
        return Ok(AlignmentRun {
            unconsumed_source: source.len(),
            unconsumed_target: target.len(),
            ..AlignmentRun::default()
        });
    }

    let singles: Vec<&str> = source
        .iter()
        .chain(target)
        .map(|unit| unit.text.as_str())
        .collect();
    oracle.prepare(&singles)?;

    let scorer = Scorer { oracle };
    let mut cursor = Cursor { i: 0, j: 0 };
    let mut pairs = Vec::new();
    let mut steps = Vec::new();

    while cursor.i < source.len() && cursor.j < target.len() {
        let generated = candidate_generator::generate(source, target, cursor, &scorer, params)?;
        let Some(best) = candidate_generator::select_best(generated.candidates) else {
            tracing::debug!(i = cursor.i, j = cursor.j, "greedy: no candidates at boundary");
            break;
        };

        let step = if best.score < params.threshold {
            let action = recovery::resolve(
                source,
                target,
                cursor,
                &scorer,
                params.threshold,
                &generated.cross,
            )?;
            tracing::trace!(
                i = cursor.i,
                j = cursor.j,
                best_score = best.score,
                ?action,
                "greedy: low-confidence recovery"
            );
            recovery::step_for(cursor, action)
        } else {
            commit(best, cursor, &mut pairs)
        };

        debug_assert!(step.source_consumed + step.target_consumed >= 1);
        cursor.i += step.source_consumed;
        cursor.j += step.target_consumed;
        debug_assert!(cursor.i <= source.len() && cursor.j <= target.len());
        steps.push(step);
    }

    let unconsumed_source = source.len() - cursor.i;
    let unconsumed_target = target.len() - cursor.j;
    tracing::debug!(
        source_units = source.len(),
        target_units = target.len(),
        pairs = pairs.len(),
        steps = steps.len(),
        unconsumed_source,
        unconsumed_target,
        threshold = params.threshold,
        max_window = params.max_window,
        "greedy: alignment finished"
    );

    Ok(AlignmentRun {
        pairs,
        steps,
        unconsumed_source,
        unconsumed_target,
    })
}

fn commit(best: AlignmentCandidate, cursor: Cursor, pairs: &mut Vec<AlignedPair>) -> AlignmentStep {
    let action = match best.body {
        CandidateBody::Merge {
            kind,
            source_text,
            target_text,
        } => {
            pairs.push(AlignedPair {
                source_text,
                target_text,
                kind,
                score: best.score,
                source_para_score: None,
            });
            StepAction::Commit(kind)
        }
        CandidateBody::Swap { first, second } => {
            for (cross, kind) in [(first, AlignmentType::Swap1), (second, AlignmentType::Swap2)] {
                pairs.push(AlignedPair {
                    source_text: cross.source_text,
                    target_text: cross.target_text,
                    kind,
                    score: cross.score,
                    source_para_score: None,
                });
            }
            StepAction::Swap
        }
    };

    AlignmentStep {
        source_start: cursor.i,
        target_start: cursor.j,
        source_consumed: best.source_span,
        target_consumed: best.target_span,
        action,
    }
}
