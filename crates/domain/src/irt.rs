//! Three-parameter logistic IRT kernel. Pure, side-effect-free: every
//! function here is a deterministic function of its f64 inputs with no I/O.

pub const THETA_MIN: f64 = -3.0;
pub const THETA_MAX: f64 = 3.0;
pub const SE_FLOOR: f64 = 0.15;
pub const SE_CEIL: f64 = 0.6;

const MAX_NEWTON_ITERATIONS: u32 = 6;
const CONVERGENCE_EPS: f64 = 1e-4;

/// An item response used as evidence in a MAP update.
#[derive(Debug, Clone, Copy)]
pub struct ItemResponse {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub correct: bool,
}

/// Result of a MAP theta re-estimation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThetaUpdate {
    pub theta: f64,
    pub se: f64,
}

/// Probability of a correct response under the 3PL model.
pub fn probability(theta: f64, a: f64, b: f64, c: f64) -> f64 {
    c + (1.0 - c) / (1.0 + (-a * (theta - b)).exp())
}

/// Fisher information at `theta` for an item with parameters (a, b, c).
///
/// Returns 0 when `P` has numerically underflowed to `c` (guessing floor),
/// since the item carries no discriminating evidence at that point.
pub fn information(theta: f64, a: f64, b: f64, c: f64) -> f64 {
    let p = probability(theta, a, b, c);
    if p <= c {
        return 0.0;
    }
    let one_minus_c = 1.0 - c;
    if one_minus_c <= 0.0 {
        return 0.0;
    }
    a * a * one_minus_c * (p - c) * (1.0 - p) / (p * one_minus_c * one_minus_c)
}

fn clamp_theta(theta: f64) -> f64 {
    theta.clamp(THETA_MIN, THETA_MAX)
}

fn clamp_se(se: f64) -> f64 {
    se.max(SE_FLOOR).min(SE_CEIL)
}

/// Newton-Raphson MAP estimate of theta given a Gaussian prior and a batch
/// of item responses, per §4.1.
///
/// `responses = []` returns the prior unchanged (still clamped, to uphold
/// the theta-bounds invariant even for malformed callers).
pub fn map_update(prior_theta: f64, prior_se: f64, responses: &[ItemResponse]) -> ThetaUpdate {
    if responses.is_empty() {
        return ThetaUpdate {
            theta: clamp_theta(prior_theta),
            se: clamp_se(prior_se),
        };
    }

    let prior_variance = prior_se * prior_se;
    let mut theta = prior_theta;

    for _ in 0..MAX_NEWTON_ITERATIONS {
        // Log-posterior gradient/Hessian: prior contributes -(theta -
        // prior_theta)/prior_variance to the gradient and -1/prior_variance
        // to the Hessian; each item contributes its 3PL score/information.
        let mut gradient = -(theta - prior_theta) / prior_variance;
        let mut hessian = -1.0 / prior_variance;

        for r in responses {
            let p = probability(theta, r.a, r.b, r.c);
            let i = information(theta, r.a, r.b, r.c);
            let y = if r.correct { 1.0 } else { 0.0 };

            // d(log L)/d(theta) for the 3PL likelihood of a single item.
            let one_minus_c = (1.0 - r.c).max(f64::EPSILON);
            let score = r.a * (p - r.c) / one_minus_c * (y - p) / p.max(f64::EPSILON);
            gradient += score;
            hessian -= i;
        }

        if hessian.abs() < f64::EPSILON {
            break;
        }

        let delta = -gradient / hessian;
        theta += delta;
        theta = clamp_theta(theta);

        if delta.abs() < CONVERGENCE_EPS {
            break;
        }
    }

    let total_information: f64 = responses
        .iter()
        .map(|r| information(theta, r.a, r.b, r.c))
        .sum();
    let se = (1.0 / prior_variance + total_information).sqrt().recip();

    ThetaUpdate {
        theta: clamp_theta(theta),
        se: clamp_se(se),
    }
}

/// 31 anchor points (theta = -3.0 ..= 3.0 in steps of 0.2) mapping theta to
/// a cumulative-normal-shaped percentile, monotone non-decreasing.
const PERCENTILE_ANCHORS: [(f64, f64); 31] = [
    (-3.0, 0.0),
    (-2.8, 0.3),
    (-2.6, 0.6),
    (-2.4, 1.1),
    (-2.2, 2.0),
    (-2.0, 3.4),
    (-1.8, 5.5),
    (-1.6, 8.2),
    (-1.4, 11.7),
    (-1.2, 16.0),
    (-1.0, 21.2),
    (-0.8, 27.1),
    (-0.6, 33.6),
    (-0.4, 40.5),
    (-0.2, 47.6),
    (0.0, 50.0),
    (0.2, 52.4),
    (0.4, 59.5),
    (0.6, 66.4),
    (0.8, 72.9),
    (1.0, 78.8),
    (1.2, 84.0),
    (1.4, 88.3),
    (1.6, 91.8),
    (1.8, 94.5),
    (2.0, 96.6),
    (2.2, 98.0),
    (2.4, 98.9),
    (2.6, 99.4),
    (2.8, 99.7),
    (3.0, 100.0),
];

/// Maps theta to a percentile in 0..=100 via linear interpolation between
/// the fixed anchor table's 31 points.
pub fn percentile(theta: f64) -> u8 {
    let theta = clamp_theta(theta);

    if theta <= PERCENTILE_ANCHORS[0].0 {
        return PERCENTILE_ANCHORS[0].1.round() as u8;
    }
    let last = PERCENTILE_ANCHORS[PERCENTILE_ANCHORS.len() - 1];
    if theta >= last.0 {
        return last.1.round() as u8;
    }

    for window in PERCENTILE_ANCHORS.windows(2) {
        let (t0, p0) = window[0];
        let (t1, p1) = window[1];
        if theta >= t0 && theta <= t1 {
            let frac = (theta - t0) / (t1 - t0);
            let p = p0 + frac * (p1 - p0);
            return p.round().clamp(0.0, 100.0) as u8;
        }
    }
    unreachable!("theta is clamped to the anchor table's range")
}

/// Scores a numerical answer: within `answer_range` when supplied, else
/// within 0.01 of the correct value.
pub fn score_numerical(student: f64, correct: f64, answer_range: Option<(f64, f64)>) -> bool {
    match answer_range {
        Some((min, max)) => student >= min && student <= max,
        None => (student - correct).abs() < 0.01,
    }
}
