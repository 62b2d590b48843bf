//! Outcome classification for submitted activities.
//!
//! A submission is the ordered list of points the user earned per question. The
//! total is compared against the maximum attainable score for that many answers:
//! a perfect score is an Ikigai, anything strictly above two thirds of the maximum
//! is a Tool, everything else is Trash.

use crate::models::ActivityStatus;

/// Highest weight a single answer can carry.
pub const MAX_ANSWER_POINTS: i16 = 3;

/// Evaluation
///
/// The derived fields of an activity: its point total and the resulting status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub sum: i16,
    pub status: ActivityStatus,
}

/// classify
///
/// Sums `answer_points` and maps the total onto an [`ActivityStatus`].
///
/// Arithmetic is done in `i16` with wrapping semantics, so oversized inputs never
/// panic. An empty submission has a maximum of zero and a sum of zero, which
/// counts as a perfect score and therefore classifies as `Ikigai`.
pub fn classify(answer_points: &[i16]) -> Evaluation {
    let max_points = (answer_points.len() as i16).wrapping_mul(MAX_ANSWER_POINTS);
    let tool_bound = max_points.wrapping_mul(2) / 3;
    let sum = answer_points
        .iter()
        .fold(0i16, |acc, points| acc.wrapping_add(*points));

    let status = if sum == max_points {
        ActivityStatus::Ikigai
    } else if sum > tool_bound {
        ActivityStatus::Tool
    } else {
        ActivityStatus::Trash
    };

    Evaluation { sum, status }
}
