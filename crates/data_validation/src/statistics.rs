//! Two-sample distribution tests.

use std::collections::BTreeMap;

use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Statistic and p-value of a hypothesis test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestOutcome {
    pub statistic: f64,
    pub pvalue: f64,
}

/// Why a test could not be run on the given samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegenerateInput {
    EmptySample,
    TooFewCategories(usize),
}

impl core::fmt::Display for DegenerateInput {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::EmptySample => f.write_str("one of the samples is empty"),
            Self::TooFewCategories(found) => write!(
                f,
                "insufficient overlapping categories ({found} found, at least 2 required)"
            ),
        }
    }
}

/// Two-sample Kolmogorov-Smirnov test with the asymptotic p-value.
///
/// # Errors
///
/// Returns [`DegenerateInput::EmptySample`] if either sample is empty.
pub fn ks_two_sample(base: &[f64], current: &[f64]) -> Result<TestOutcome, DegenerateInput> {
    if base.is_empty() || current.is_empty() {
        return Err(DegenerateInput::EmptySample);
    }

    let mut base = base.to_vec();
    let mut current = current.to_vec();
    base.sort_by(f64::total_cmp);
    current.sort_by(f64::total_cmp);

    #[allow(clippy::cast_precision_loss)]
    let (n, m) = (base.len() as f64, current.len() as f64);

    // Walk both sorted samples, advancing past ties together.
    let (mut i, mut j) = (0, 0);
    let mut statistic: f64 = 0.0;
    while i < base.len() && j < current.len() {
        let value = base[i].min(current[j]);
        while i < base.len() && base[i] <= value {
            i += 1;
        }
        while j < current.len() && current[j] <= value {
            j += 1;
        }

        #[allow(clippy::cast_precision_loss)]
        let gap = (i as f64 / n - j as f64 / m).abs();
        statistic = statistic.max(gap);
    }

    let effective = (n * m / (n + m)).sqrt();
    let lambda = (effective + 0.12 + 0.11 / effective) * statistic;

    Ok(TestOutcome {
        statistic,
        pvalue: kolmogorov_survival(lambda),
    })
}

/// `Q_KS(λ) = 2 Σ (-1)^(k-1) exp(-2 k² λ²)`, clamped to `[0, 1]`.
fn kolmogorov_survival(lambda: f64) -> f64 {
    const EPS_TERM: f64 = 1e-3;
    const EPS_SUM: f64 = 1e-10;

    if lambda < 1e-3 {
        return 1.0;
    }

    let factor = -2.0 * lambda * lambda;
    let mut sign = 2.0;
    let mut sum = 0.0;
    let mut previous_term: f64 = 0.0;

    for k in 1..=100_u32 {
        let k = f64::from(k);
        let term = sign * (factor * k * k).exp();
        sum += term;
        if term.abs() <= EPS_TERM * previous_term.abs() || term.abs() <= EPS_SUM * sum {
            return sum.clamp(0.0, 1.0);
        }
        sign = -sign;
        previous_term = term;
    }

    // The series did not converge, which only happens for tiny statistics.
    1.0
}

/// Chi-square test of homogeneity on a 2×K table (dataset × category).
///
/// Yates' continuity correction is applied when the table has one degree of
/// freedom.
///
/// # Errors
///
/// Returns [`DegenerateInput`] if a sample is empty or fewer than two
/// categories occur.
pub fn chi_square_homogeneity(
    base: &[&str],
    current: &[&str],
) -> Result<TestOutcome, DegenerateInput> {
    if base.is_empty() || current.is_empty() {
        return Err(DegenerateInput::EmptySample);
    }

    let mut table: BTreeMap<&str, [f64; 2]> = BTreeMap::new();
    for &value in base {
        table.entry(value).or_default()[0] += 1.0;
    }
    for &value in current {
        table.entry(value).or_default()[1] += 1.0;
    }

    if table.len() < 2 {
        return Err(DegenerateInput::TooFewCategories(table.len()));
    }

    #[allow(clippy::cast_precision_loss)]
    let row_totals = [base.len() as f64, current.len() as f64];
    let total = row_totals[0] + row_totals[1];

    #[allow(clippy::cast_precision_loss)]
    let dof = (table.len() - 1) as f64;
    let yates = table.len() == 2;

    let statistic: f64 = table
        .values()
        .flat_map(|observed| {
            let column_total = observed[0] + observed[1];
            (0..2).map(move |row| {
                let expected = row_totals[row] * column_total / total;
                let mut deviation = (observed[row] - expected).abs();
                if yates {
                    deviation = (deviation - 0.5).max(0.0);
                }
                deviation * deviation / expected
            })
        })
        .sum();

    let pvalue = ChiSquared::new(dof).map_or(1.0, |distribution| distribution.sf(statistic));

    Ok(TestOutcome { statistic, pvalue })
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn test_ks_identical_samples() {
        let sample: Vec<f64> = (0..200).map(f64::from).collect();
        let outcome = ks_two_sample(&sample, &sample).unwrap();

        assert!(outcome.statistic.abs() < 1e-12);
        assert!((outcome.pvalue - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ks_same_distribution_usually_passes() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut passed = 0;
        for _ in 0..50 {
            let a: Vec<f64> = (0..300).map(|_| rng.gen_range(0.0..1.0)).collect();
            let b: Vec<f64> = (0..300).map(|_| rng.gen_range(0.0..1.0)).collect();
            if ks_two_sample(&a, &b).unwrap().pvalue > 0.05 {
                passed += 1;
            }
        }
        // Expected around 95% at the 5% level.
        assert!(passed >= 42, "only {passed} of 50 trials passed");
    }

    #[test]
    fn test_ks_separated_distributions_fail() {
        let mut rng = StdRng::seed_from_u64(11);
        let a: Vec<f64> = (0..300).map(|_| rng.gen_range(0.0..1.0)).collect();
        let b: Vec<f64> = (0..300).map(|_| rng.gen_range(5.0..6.0)).collect();

        let outcome = ks_two_sample(&a, &b).unwrap();
        assert!((outcome.statistic - 1.0).abs() < 1e-12);
        assert!(outcome.pvalue < 1e-6);
    }

    #[test]
    fn test_ks_known_statistic() {
        // Every base value lies below every current value except the shared 3.
        let outcome = ks_two_sample(&[1.0, 2.0, 3.0], &[3.0, 4.0, 5.0]).unwrap();
        assert!((outcome.statistic - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_ks_empty_sample() {
        assert_eq!(ks_two_sample(&[], &[1.0]), Err(DegenerateInput::EmptySample));
    }

    #[test]
    fn test_chi_square_matches_reference() {
        // 2×3 table [[10, 20, 30], [30, 20, 10]], chi2 = 20.0 with 2 dof.
        let mut base = Vec::new();
        let mut current = Vec::new();
        for (category, a, b) in [("x", 10, 30), ("y", 20, 20), ("z", 30, 10)] {
            base.extend(std::iter::repeat_n(category, a));
            current.extend(std::iter::repeat_n(category, b));
        }

        let outcome = chi_square_homogeneity(&base, &current).unwrap();
        assert!((outcome.statistic - 20.0).abs() < 1e-9);
        assert!((outcome.pvalue - (-10.0_f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn test_chi_square_yates_on_two_categories() {
        // [[10, 10], [10, 10]] has no deviation at all.
        let base: Vec<&str> = [["a"; 10], ["b"; 10]].concat();
        let outcome = chi_square_homogeneity(&base, &base).unwrap();
        assert!(outcome.statistic.abs() < 1e-12);
        assert!((outcome.pvalue - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_chi_square_degenerate() {
        assert_eq!(
            chi_square_homogeneity(&["a", "a"], &["a"]),
            Err(DegenerateInput::TooFewCategories(1))
        );
        assert_eq!(
            chi_square_homogeneity(&[], &["a"]),
            Err(DegenerateInput::EmptySample)
        );
    }
}
