use crate::error::AlignmentError;
use crate::types::{AlignmentStep, StepAction, TextUnit};

use super::candidate_generator::CrossScores;
use super::{Cursor, Scorer};

/// Decides which unit(s) to drop when no candidate clears `threshold`.
///
/// Prefers dropping the target unit when `A[i]` matches `B[j+1]`, then the
/// source unit when `A[i+1]` matches `B[j]`; otherwise drops both so the loop
/// always makes progress.
pub(crate) fn resolve(
    source: &[TextUnit],
    target: &[TextUnit],
    cursor: Cursor,
    scorer: &Scorer<'_>,
    threshold: f32,
    cross: &CrossScores,
) -> Result<StepAction, AlignmentError> {
    let Cursor { i, j } = cursor;

    if j + 1 < target.len() {
        let skip_target_score = match cross.source_to_next_target {
            Some(score) => score,
            None => scorer.score(&source[i].text, &target[j + 1].text)?,
        };
        if skip_target_score > threshold {
            return Ok(StepAction::DropTarget);
        }
    }

    if i + 1 < source.len() {
        let skip_source_score = match cross.next_source_to_target {
            Some(score) => score,
            None => scorer.score(&source[i + 1].text, &target[j].text)?,
        };
        if skip_source_score > threshold {
            return Ok(StepAction::DropSource);
        }
    }

    Ok(StepAction::DropBoth)
}

pub(crate) fn step_for(cursor: Cursor, action: StepAction) -> AlignmentStep {
    let (source_consumed, target_consumed) = match action {
        StepAction::DropTarget => (0, 1),
        StepAction::DropSource => (1, 0),
        _ => (1, 1),
    };
    AlignmentStep {
        source_start: cursor.i,
        target_start: cursor.j,
        source_consumed,
        target_consumed,
        action,
    }
}
