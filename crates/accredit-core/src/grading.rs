//! Grading policy: internal-combination method, pass mark, and grade scale.
//!
//! Passed explicitly to the final-mark calculator; there is no global scale.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::round2;

/// How two internal assessments combine into one internal mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InternalMethod {
    /// The larger of the two.
    Best,
    /// Arithmetic mean, absent marks counting as zero.
    Average,
    /// 40% internal 1, 60% internal 2 when both exist, else the one present.
    Weighted,
}

/// Share of internal 1 under [`InternalMethod::Weighted`].
pub const WEIGHTED_FIRST_SHARE: f64 = 0.4;
/// Share of internal 2 under [`InternalMethod::Weighted`].
pub const WEIGHTED_SECOND_SHARE: f64 = 0.6;

impl fmt::Display for InternalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InternalMethod::Best => write!(f, "best"),
            InternalMethod::Average => write!(f, "average"),
            InternalMethod::Weighted => write!(f, "weighted"),
        }
    }
}

impl FromStr for InternalMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "best" | "max" => Ok(InternalMethod::Best),
            "average" | "avg" | "mean" => Ok(InternalMethod::Average),
            "weighted" => Ok(InternalMethod::Weighted),
            other => Err(format!("unknown internal method: {other}")),
        }
    }
}

impl InternalMethod {
    /// Combine two (already normalized) internal marks.
    pub fn combine(self, first: Option<f64>, second: Option<f64>) -> f64 {
        match self {
            InternalMethod::Best => first.unwrap_or(0.0).max(second.unwrap_or(0.0)),
            InternalMethod::Average => (first.unwrap_or(0.0) + second.unwrap_or(0.0)) / 2.0,
            InternalMethod::Weighted => match (first, second) {
                (Some(a), Some(b)) => a * WEIGHTED_FIRST_SHARE + b * WEIGHTED_SECOND_SHARE,
                (Some(a), None) => a,
                (None, Some(b)) => b,
                (None, None) => 0.0,
            },
        }
    }
}

/// One row of the grading scale. Both bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeBand {
    pub grade: String,
    pub min: f64,
    pub max: f64,
    pub grade_point: f64,
}

impl GradeBand {
    fn new(grade: &str, min: f64, max: f64, grade_point: f64) -> Self {
        Self {
            grade: grade.to_string(),
            min,
            max,
            grade_point,
        }
    }

    pub fn contains(&self, percentage: f64) -> bool {
        percentage >= self.min && percentage <= self.max
    }
}

/// Grading configuration for the final-mark calculator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingPolicy {
    #[serde(default = "default_method")]
    pub internal_method: InternalMethod,
    #[serde(default = "default_pass_percentage")]
    pub pass_percentage: f64,
    #[serde(default = "default_scale")]
    pub scale: Vec<GradeBand>,
}

fn default_method() -> InternalMethod {
    InternalMethod::Best
}

fn default_pass_percentage() -> f64 {
    40.0
}

/// Ten-point scale.
pub fn default_scale() -> Vec<GradeBand> {
    vec![
        GradeBand::new("O", 90.0, 100.0, 10.0),
        GradeBand::new("A+", 85.0, 89.99, 9.0),
        GradeBand::new("A", 80.0, 84.99, 8.0),
        GradeBand::new("B+", 70.0, 79.99, 7.0),
        GradeBand::new("B", 60.0, 69.99, 6.0),
        GradeBand::new("C", 50.0, 59.99, 5.0),
        GradeBand::new("P", 40.0, 49.99, 4.0),
        GradeBand::new("F", 0.0, 39.99, 0.0),
    ]
}

impl Default for GradingPolicy {
    fn default() -> Self {
        Self {
            internal_method: default_method(),
            pass_percentage: default_pass_percentage(),
            scale: default_scale(),
        }
    }
}

impl GradingPolicy {
    /// Grade and grade point for a percentage.
    ///
    /// The percentage is rounded to two decimals first so values between
    /// adjacent bands (e.g. 79.995) still land in a band. Anything outside
    /// every band resolves to the lowest grade.
    pub fn grade_for(&self, percentage: f64) -> (String, f64) {
        let pct = round2(percentage);
        if let Some(band) = self.scale.iter().find(|b| b.contains(pct)) {
            return (band.grade.clone(), band.grade_point);
        }
        self.lowest_band()
            .map(|b| (b.grade.clone(), b.grade_point))
            .unwrap_or_else(|| ("F".to_string(), 0.0))
    }

    pub fn passes(&self, percentage: f64) -> bool {
        percentage >= self.pass_percentage
    }

    fn lowest_band(&self) -> Option<&GradeBand> {
        self.scale
            .iter()
            .min_by(|a, b| a.min.total_cmp(&b.min))
    }

    /// Check the scale is ordered, non-overlapping, and covers 0..=100.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(0.0..=100.0).contains(&self.pass_percentage) {
            return Err(EngineError::Validation(format!(
                "pass percentage {} outside 0..=100",
                self.pass_percentage
            )));
        }
        if self.scale.is_empty() {
            return Err(EngineError::Validation("grading scale is empty".into()));
        }

        let mut bands: Vec<&GradeBand> = self.scale.iter().collect();
        bands.sort_by(|a, b| a.min.total_cmp(&b.min));

        for band in &bands {
            if band.min > band.max {
                return Err(EngineError::Validation(format!(
                    "grade {} has min {} above max {}",
                    band.grade, band.min, band.max
                )));
            }
        }
        if bands[0].min > 0.0 {
            return Err(EngineError::Validation(format!(
                "grading scale starts at {}, not 0",
                bands[0].min
            )));
        }
        if bands[bands.len() - 1].max < 100.0 {
            return Err(EngineError::Validation(format!(
                "grading scale ends at {}, not 100",
                bands[bands.len() - 1].max
            )));
        }
        for pair in bands.windows(2) {
            let (lower, upper) = (pair[0], pair[1]);
            if upper.min <= lower.max {
                return Err(EngineError::Validation(format!(
                    "grades {} and {} overlap",
                    lower.grade, upper.grade
                )));
            }
            // Two-decimal percentages must not fall between bands.
            if round2(upper.min - lower.max) > 0.01 {
                return Err(EngineError::Validation(format!(
                    "gap between grades {} and {}",
                    lower.grade, upper.grade
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scale_is_valid() {
        GradingPolicy::default().validate().unwrap();
    }

    #[test]
    fn band_boundaries_inclusive() {
        let policy = GradingPolicy::default();
        assert_eq!(policy.grade_for(90.0).0, "O");
        assert_eq!(policy.grade_for(89.99).0, "A+");
        assert_eq!(policy.grade_for(75.0), ("B+".to_string(), 7.0));
        assert_eq!(policy.grade_for(40.0).0, "P");
        assert_eq!(policy.grade_for(0.0).0, "F");
    }

    #[test]
    fn between_bands_rounds_into_a_band() {
        let policy = GradingPolicy::default();
        assert_eq!(policy.grade_for(79.996).0, "A");
        assert_eq!(policy.grade_for(79.994).0, "B+");
    }

    #[test]
    fn uncovered_percentage_resolves_to_lowest_grade() {
        let policy = GradingPolicy {
            scale: vec![
                GradeBand::new("Pass", 50.0, 100.0, 5.0),
                GradeBand::new("Fail", 0.0, 30.0, 0.0),
            ],
            ..Default::default()
        };
        assert_eq!(policy.grade_for(40.0), ("Fail".to_string(), 0.0));
        assert_eq!(policy.grade_for(120.0).0, "Fail");
    }

    #[test]
    fn overlapping_scale_rejected() {
        let policy = GradingPolicy {
            scale: vec![
                GradeBand::new("A", 50.0, 100.0, 8.0),
                GradeBand::new("B", 0.0, 60.0, 4.0),
            ],
            ..Default::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn gapped_scale_rejected() {
        let policy = GradingPolicy {
            scale: vec![
                GradeBand::new("A", 50.0, 100.0, 8.0),
                GradeBand::new("B", 0.0, 45.0, 4.0),
            ],
            ..Default::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn combine_methods() {
        assert_eq!(InternalMethod::Best.combine(Some(28.0), Some(30.0)), 30.0);
        assert_eq!(InternalMethod::Best.combine(None, Some(30.0)), 30.0);
        assert_eq!(InternalMethod::Average.combine(Some(28.0), Some(30.0)), 29.0);
        assert_eq!(InternalMethod::Average.combine(Some(28.0), None), 14.0);
        let weighted = InternalMethod::Weighted.combine(Some(28.0), Some(30.0));
        assert!((weighted - 29.2).abs() < 1e-9);
        assert_eq!(InternalMethod::Weighted.combine(None, Some(30.0)), 30.0);
        assert_eq!(InternalMethod::Weighted.combine(None, None), 0.0);
    }

    #[test]
    fn policy_from_partial_toml() {
        let policy: GradingPolicy = toml::from_str(r#"internal_method = "weighted""#).unwrap();
        assert_eq!(policy.internal_method, InternalMethod::Weighted);
        assert_eq!(policy.pass_percentage, 40.0);
        assert_eq!(policy.scale.len(), 8);
    }
}
