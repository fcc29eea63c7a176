//! Ranker: orders fit scores into the final top-K list

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{CoreError, FitScore};

/// One entry of the ranked output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedCompany {
    pub company_id: String,
    pub fit_score: f64,
    pub reasons: Vec<String>,
}

impl From<&FitScore> for RankedCompany {
    fn from(score: &FitScore) -> Self {
        Self {
            company_id: score.company_ref.clone(),
            fit_score: score.score,
            reasons: score.reason_strings(),
        }
    }
}

/// Total order used for ranking: score descending, then recent volume
/// descending, then company id ascending.
pub fn compare_fit(a: &FitScore, b: &FitScore) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.features.recent_volume.total_cmp(&a.features.recent_volume))
        .then_with(|| a.company_ref.cmp(&b.company_ref))
}

/// Return the `top_k` best scores, best first.
///
/// The result is identical for any permutation of `scores`.
pub fn rank(scores: &[FitScore], top_k: usize) -> Result<Vec<RankedCompany>, CoreError> {
    if top_k == 0 {
        return Err(CoreError::Validation("topK must be positive".to_string()));
    }

    let mut ordered: Vec<&FitScore> = scores.iter().collect();
    ordered.sort_by(|a, b| compare_fit(a, b));

    Ok(ordered.into_iter().take(top_k).map(RankedCompany::from).collect())
}
