use super::defaults::*;
use super::ConfigError;
use crate::model::{Grade, SubScoreKind};
use serde::{Deserialize, Serialize};

/// Owner resolver weights and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverTuning {
    pub name_weight: f64,
    pub address_weight: f64,
    pub llc_affiliation_bonus: f64,
    pub merge_threshold: f64,
    pub block_prefix_len: usize,
    pub max_bucket_size: usize,
}

impl Default for ResolverTuning {
    fn default() -> Self {
        Self {
            name_weight: DEFAULT_NAME_WEIGHT,
            address_weight: DEFAULT_ADDRESS_WEIGHT,
            llc_affiliation_bonus: DEFAULT_LLC_AFFILIATION_BONUS,
            merge_threshold: DEFAULT_MERGE_THRESHOLD,
            block_prefix_len: DEFAULT_BLOCK_PREFIX_LEN,
            max_bucket_size: DEFAULT_MAX_BUCKET_SIZE,
        }
    }
}

impl ResolverTuning {
    /// Fewer merges: same-name mentions must also agree on address, and LLC
    /// address affiliation alone is not enough.
    pub fn precise() -> Self {
        Self {
            merge_threshold: 0.85,
            llc_affiliation_bonus: 0.2,
            ..Self::default()
        }
    }

    /// More merges: close names at the same address merge more readily.
    pub fn inclusive() -> Self {
        Self {
            merge_threshold: 0.65,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("resolver.name_weight", self.name_weight),
            ("resolver.address_weight", self.address_weight),
            ("resolver.llc_affiliation_bonus", self.llc_affiliation_bonus),
            ("resolver.merge_threshold", self.merge_threshold),
        ] {
            check_unit_range(name, value)?;
        }
        if self.merge_threshold == 0.0 {
            return Err(ConfigError::new(
                "resolver.merge_threshold must be greater than 0",
            ));
        }
        if self.block_prefix_len == 0 {
            return Err(ConfigError::new("resolver.block_prefix_len must be at least 1"));
        }
        if self.max_bucket_size < 2 {
            return Err(ConfigError::new("resolver.max_bucket_size must be at least 2"));
        }
        Ok(())
    }
}

/// Monotone mapping from a raw rate to a 0–100 sub-score (100 = best).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transform {
    /// `100 / (1 + (x / ref)^steepness)`
    Logistic { steepness: f64 },
    /// `clamp(100 - 50 * x / ref, 0, 100)`
    CappedLinear,
}

impl Transform {
    /// Map a non-negative raw value; `reference` maps to 50.
    pub fn apply(&self, raw: f64, reference: f64) -> f64 {
        let x = raw.max(0.0);
        let reference = reference.max(f64::MIN_POSITIVE);
        let score = match *self {
            Transform::Logistic { steepness } => {
                100.0 / (1.0 + (x / reference).powf(steepness))
            }
            Transform::CappedLinear => 100.0 - 50.0 * x / reference,
        };
        score.clamp(0.0, 100.0)
    }
}

/// Where the value that maps to 50 comes from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Reference {
    /// Citywide median of the non-null raw values, but never below `floor`.
    CitywideMedian { floor: f64 },
    /// A fixed reference, for backtesting against a frozen calibration.
    Fixed { value: f64 },
}

impl Reference {
    pub fn resolve(&self, citywide_median: Option<f64>) -> f64 {
        match *self {
            Reference::CitywideMedian { floor } => citywide_median.unwrap_or(floor).max(floor),
            Reference::Fixed { value } => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub transform: Transform,
    pub reference: Reference,
}

impl Calibration {
    pub fn logistic(floor: f64) -> Self {
        Self {
            transform: Transform::Logistic {
                steepness: DEFAULT_LOGISTIC_STEEPNESS,
            },
            reference: Reference::CitywideMedian { floor },
        }
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if let Transform::Logistic { steepness } = self.transform {
            if !(steepness.is_finite() && steepness > 0.0) {
                return Err(ConfigError::new(format!(
                    "{name}.transform.steepness must be positive"
                )));
            }
        }
        let reference = match self.reference {
            Reference::CitywideMedian { floor } => floor,
            Reference::Fixed { value } => value,
        };
        if !(reference.is_finite() && reference > 0.0) {
            return Err(ConfigError::new(format!(
                "{name}.reference must be positive"
            )));
        }
        Ok(())
    }
}

/// Per-dimension weights of the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub violation: f64,
    pub complaints: f64,
    pub eviction: f64,
    pub ownership: f64,
    pub resolution: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            violation: DEFAULT_VIOLATION_WEIGHT,
            complaints: DEFAULT_COMPLAINTS_WEIGHT,
            eviction: DEFAULT_EVICTION_WEIGHT,
            ownership: DEFAULT_OWNERSHIP_WEIGHT,
            resolution: DEFAULT_RESOLUTION_WEIGHT,
        }
    }
}

impl ScoreWeights {
    pub fn get(&self, kind: SubScoreKind) -> f64 {
        match kind {
            SubScoreKind::Violation => self.violation,
            SubScoreKind::Complaints => self.complaints,
            SubScoreKind::Eviction => self.eviction,
            SubScoreKind::Ownership => self.ownership,
            SubScoreKind::Resolution => self.resolution,
        }
    }

    pub fn sum(&self) -> f64 {
        SubScoreKind::ALL.iter().map(|kind| self.get(*kind)).sum()
    }
}

/// Severity points per violation class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassWeights {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Default for ClassWeights {
    fn default() -> Self {
        Self {
            a: DEFAULT_CLASS_A_POINTS,
            b: DEFAULT_CLASS_B_POINTS,
            c: DEFAULT_CLASS_C_POINTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplaintRecency {
    pub recent_window_days: i64,
    pub older_weight: f64,
}

impl Default for ComplaintRecency {
    fn default() -> Self {
        Self {
            recent_window_days: DEFAULT_RECENT_WINDOW_DAYS,
            older_weight: DEFAULT_OLDER_COMPLAINT_WEIGHT,
        }
    }
}

/// Whether single-building LLC owners contribute opacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SingletonLlcPolicy {
    /// A one-building, all-LLC owner is fully opaque.
    #[default]
    Penalize,
    /// One-building portfolios carry no opacity.
    Exclude,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnershipPolicy {
    pub opacity_weight: f64,
    pub resolved_llc_weight: f64,
    pub singleton_llc: SingletonLlcPolicy,
}

impl Default for OwnershipPolicy {
    fn default() -> Self {
        Self {
            opacity_weight: DEFAULT_OPACITY_WEIGHT,
            resolved_llc_weight: DEFAULT_RESOLVED_LLC_WEIGHT,
            singleton_llc: SingletonLlcPolicy::Penalize,
        }
    }
}

/// Descending grade cut-offs; anything below `d` is an F.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradeThresholds {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl Default for GradeThresholds {
    fn default() -> Self {
        Self {
            a: DEFAULT_GRADE_A,
            b: DEFAULT_GRADE_B,
            c: DEFAULT_GRADE_C,
            d: DEFAULT_GRADE_D,
        }
    }
}

impl GradeThresholds {
    pub fn grade(&self, overall: f64) -> Grade {
        if overall >= self.a {
            Grade::A
        } else if overall >= self.b {
            Grade::B
        } else if overall >= self.c {
            Grade::C
        } else if overall >= self.d {
            Grade::D
        } else {
            Grade::F
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let ordered = [self.a, self.b, self.c, self.d];
        if ordered.iter().any(|t| !(0.0..=100.0).contains(t)) {
            return Err(ConfigError::new("grade thresholds must lie in [0, 100]"));
        }
        if ordered.windows(2).any(|pair| pair[0] <= pair[1]) {
            return Err(ConfigError::new(
                "grade thresholds must be strictly descending (a > b > c > d)",
            ));
        }
        Ok(())
    }
}

/// Immutable calibration profile threaded through the scoring engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoreWeights,
    pub class_weights: ClassWeights,
    pub complaints: ComplaintRecency,
    pub ownership: OwnershipPolicy,
    /// Share of the resolution score driven by the closed fraction.
    pub closed_weight: f64,
    pub grades: GradeThresholds,
    pub violation_calibration: Calibration,
    pub complaints_calibration: Calibration,
    pub eviction_calibration: Calibration,
    pub ownership_calibration: Calibration,
    pub days_to_close_calibration: Calibration,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            class_weights: ClassWeights::default(),
            complaints: ComplaintRecency::default(),
            ownership: OwnershipPolicy::default(),
            closed_weight: DEFAULT_CLOSED_WEIGHT,
            grades: GradeThresholds::default(),
            violation_calibration: Calibration::logistic(DEFAULT_VIOLATION_REFERENCE_FLOOR),
            complaints_calibration: Calibration::logistic(DEFAULT_COMPLAINTS_REFERENCE_FLOOR),
            eviction_calibration: Calibration::logistic(DEFAULT_EVICTION_REFERENCE_FLOOR),
            ownership_calibration: Calibration::logistic(DEFAULT_OWNERSHIP_REFERENCE_FLOOR),
            days_to_close_calibration: Calibration::logistic(
                DEFAULT_DAYS_TO_CLOSE_REFERENCE_FLOOR,
            ),
        }
    }
}

/// Preset calibration profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ScoringProfile {
    /// Default weights.
    #[default]
    Balanced,
    /// Emphasizes physical conditions (violations, complaints).
    HealthFirst,
    /// Emphasizes ownership transparency and responsiveness.
    Accountability,
}

impl ScoringConfig {
    pub fn from_profile(profile: ScoringProfile) -> Self {
        match profile {
            ScoringProfile::Balanced => Self::balanced(),
            ScoringProfile::HealthFirst => Self::health_first(),
            ScoringProfile::Accountability => Self::accountability(),
        }
    }

    pub fn balanced() -> Self {
        Self::default()
    }

    pub fn health_first() -> Self {
        Self {
            weights: ScoreWeights {
                violation: 0.40,
                complaints: 0.25,
                eviction: 0.20,
                ownership: 0.05,
                resolution: 0.10,
            },
            ..Self::default()
        }
    }

    pub fn accountability() -> Self {
        Self {
            weights: ScoreWeights {
                violation: 0.20,
                complaints: 0.15,
                eviction: 0.20,
                ownership: 0.25,
                resolution: 0.20,
            },
            ..Self::default()
        }
    }

    pub fn calibration(&self, kind: SubScoreKind) -> &Calibration {
        match kind {
            SubScoreKind::Violation => &self.violation_calibration,
            SubScoreKind::Complaints => &self.complaints_calibration,
            SubScoreKind::Eviction => &self.eviction_calibration,
            SubScoreKind::Ownership => &self.ownership_calibration,
            SubScoreKind::Resolution => &self.days_to_close_calibration,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for kind in SubScoreKind::ALL {
            let weight = self.weights.get(kind);
            if !(weight.is_finite() && weight >= 0.0) {
                return Err(ConfigError::new(format!(
                    "scoring weight for {kind:?} must be non-negative"
                )));
            }
        }
        let sum = self.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::new(format!(
                "scoring weights must sum to 1, got {sum:.6}"
            )));
        }
        for (name, value) in [
            ("class_weights.a", self.class_weights.a),
            ("class_weights.b", self.class_weights.b),
            ("class_weights.c", self.class_weights.c),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::new(format!("{name} must be non-negative")));
            }
        }
        if self.complaints.recent_window_days <= 0 {
            return Err(ConfigError::new(
                "complaints.recent_window_days must be positive",
            ));
        }
        check_unit_range("complaints.older_weight", self.complaints.older_weight)?;
        check_unit_range(
            "ownership.resolved_llc_weight",
            self.ownership.resolved_llc_weight,
        )?;
        if !(self.ownership.opacity_weight.is_finite() && self.ownership.opacity_weight >= 0.0) {
            return Err(ConfigError::new(
                "ownership.opacity_weight must be non-negative",
            ));
        }
        check_unit_range("closed_weight", self.closed_weight)?;
        self.grades.validate()?;
        self.violation_calibration.validate("violation_calibration")?;
        self.complaints_calibration.validate("complaints_calibration")?;
        self.eviction_calibration.validate("eviction_calibration")?;
        self.ownership_calibration.validate("ownership_calibration")?;
        self.days_to_close_calibration
            .validate("days_to_close_calibration")?;
        Ok(())
    }
}

fn check_unit_range(name: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::new(format!("{name} must lie in [0, 1]")));
    }
    Ok(())
}
