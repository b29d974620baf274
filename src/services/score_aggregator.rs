//! Weighted score aggregation.
//!
//! Combines per-dimension scorer results into one deterministic scorecard.
//! Missing dimensions (failed or budget-skipped scorers) contribute zero for
//! their weight share; weights are never renormalized, so scorer failure
//! visibly depresses the overall score instead of silently inflating the
//! surviving dimensions.

use crate::domain::models::score::{OVERALL_SCALE, RAW_SCORE_MAX, RAW_SCORE_MIN};
use crate::domain::models::{
    AggregatedScore, DimensionScore, Evidence, Rubric, ScoreBands, ScoreResult,
};

/// Clamp a raw score into the fixed input range. Adversarial or buggy scorer
/// output cannot push the overall score outside its range.
fn clamp_raw(score: f64) -> f64 {
    if score.is_nan() {
        return RAW_SCORE_MIN;
    }
    score.clamp(RAW_SCORE_MIN, RAW_SCORE_MAX)
}

/// Combine scorer results into one aggregated score.
///
/// The rubric is assumed valid (weights summing to 1.0); that invariant is
/// checked at configuration time, not here. Evidence on `results` must
/// already be verified; only `verified` citations are copied into the
/// user-facing evidence list.
pub fn aggregate(rubric: &Rubric, results: &[ScoreResult], bands: ScoreBands) -> AggregatedScore {
    let mut dimension_scores = Vec::with_capacity(rubric.dimensions.len());
    let mut overall = 0.0;

    for dim in &rubric.dimensions {
        let result = results.iter().find(|r| r.dimension == dim.name);
        let (raw, scored) = match result {
            Some(r) => (clamp_raw(r.raw_score), true),
            None => (0.0, false),
        };
        let weighted = raw * dim.weight * OVERALL_SCALE;
        overall += weighted;
        dimension_scores.push(DimensionScore {
            dimension: dim.name.clone(),
            raw,
            weighted,
            weight: dim.weight,
            scored,
        });
    }

    // Guard against float accumulation drift at the range edge.
    let overall = overall.clamp(0.0, RAW_SCORE_MAX * OVERALL_SCALE);

    let confidence = results
        .iter()
        .filter(|r| rubric.dimensions.iter().any(|d| d.name == r.dimension))
        .map(|r| r.confidence.clamp(0.0, 1.0))
        .fold(f64::INFINITY, f64::min);
    let confidence = if confidence.is_finite() { confidence } else { 0.0 };

    let all_evidence: Vec<&Evidence> = results.iter().flat_map(|r| r.evidence.iter()).collect();
    let verified_evidence: Vec<Evidence> =
        all_evidence.iter().filter(|e| e.verified).map(|e| (*e).clone()).collect();
    let verification_rate = if all_evidence.is_empty() {
        1.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        {
            verified_evidence.len() as f64 / all_evidence.len() as f64
        }
    };

    AggregatedScore {
        overall,
        confidence,
        recommendation: bands.recommend(overall),
        dimension_scores,
        evidence: verified_evidence,
        strengths: results.iter().flat_map(|r| r.strengths.iter().cloned()).collect(),
        improvements: results.iter().flat_map(|r| r.improvements.iter().cloned()).collect(),
        verification_rate,
    }
}
