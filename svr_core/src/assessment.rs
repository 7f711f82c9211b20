//! Stack ranking and filtering.
//!
//! Scores stacks with a quality metric, sorts them, and keeps a subset
//! according to a [`FilterMethod`]. Only the geometric `volume` metric is
//! computed here; learned metrics are produced elsewhere and passed in as
//! plain scores.

use crate::alloc_prelude::{vec, Vec};
use crate::error::CoreError;
use crate::stack::Stack;

/// Masked tissue volume of a stack in mm³, truncated to an integer.
///
/// Larger is better.
pub fn volume_score(stack: &Stack) -> f64 {
    let volume = stack.mask_count() as f64
        * stack.resolution_x() as f64
        * stack.resolution_y() as f64
        * stack.gap() as f64;
    libm::trunc(volume)
}

/// How many of the ranked stacks to keep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterMethod {
    /// Keep the best `n`.
    Top(usize),
    /// Drop the worst `n`.
    Bottom(usize),
    /// Drop this fraction (clamped to [0, 1]) of the stacks, worst first.
    Percentage(f64),
    /// Keep stacks whose score is at least (descending) or at most
    /// (ascending) the cutoff.
    Threshold(f64),
    /// Keep everything, only rank.
    None,
}

impl FilterMethod {
    /// Parse a method name with its cutoff.
    pub fn parse(name: &str, cutoff: f64) -> Result<Self, CoreError> {
        let count = || {
            if cutoff.is_finite() && cutoff >= 0.0 {
                Ok(cutoff as usize)
            } else {
                Err(CoreError::InvalidParameter {
                    name: "cutoff",
                    value: cutoff,
                })
            }
        };
        match name {
            "top" => Ok(Self::Top(count()?)),
            "bottom" => Ok(Self::Bottom(count()?)),
            "percentage" => Ok(Self::Percentage(cutoff)),
            "threshold" => Ok(Self::Threshold(cutoff)),
            "none" => Ok(Self::None),
            _ => Err(CoreError::InvalidParameter {
                name: "filter_method",
                value: f64::NAN,
            }),
        }
    }
}

/// Result of ranking `n` stacks.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    /// Stack indices from best to worst.
    pub order: Vec<usize>,
    /// Rank of each stack (0 = best), in input order.
    pub ranks: Vec<usize>,
    /// Whether each stack (in input order) was filtered out.
    pub excluded: Vec<bool>,
    /// Number of stacks kept.
    pub n_keep: usize,
}

impl Ranking {
    /// Indices of the kept stacks, best first.
    pub fn kept(&self) -> &[usize] {
        &self.order[..self.n_keep]
    }

    /// The kept items, best first.
    pub fn select<'a, T>(&self, items: &'a [T]) -> Vec<&'a T> {
        self.kept().iter().map(|&i| &items[i]).collect()
    }
}

/// Rank scores and decide which stacks to keep.
///
/// With `descending` a higher score is better. Ties keep their input order.
pub fn sort_and_filter(scores: &[f64], descending: bool, method: FilterMethod) -> Ranking {
    let n_total = scores.len();
    let n_keep = match method {
        FilterMethod::Top(n) => n.min(n_total),
        FilterMethod::Bottom(n) => n_total.saturating_sub(n),
        FilterMethod::Percentage(p) => {
            let fraction = p.clamp(0.0, 1.0);
            n_total - (n_total as f64 * fraction) as usize
        }
        FilterMethod::Threshold(cutoff) => scores
            .iter()
            .filter(|&&s| if descending { s >= cutoff } else { s <= cutoff })
            .count(),
        FilterMethod::None => n_total,
    };

    let mut order: Vec<usize> = (0..n_total).collect();
    order.sort_by(|&a, &b| {
        let (sa, sb) = (scores[a], scores[b]);
        let cmp = if descending {
            sb.partial_cmp(&sa)
        } else {
            sa.partial_cmp(&sb)
        };
        cmp.unwrap_or(core::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0usize; n_total];
    for (rank, &index) in order.iter().enumerate() {
        ranks[index] = rank;
    }
    let excluded = ranks.iter().map(|&r| r >= n_keep).collect();

    Ranking {
        order,
        ranks,
        excluded,
        n_keep,
    }
}
