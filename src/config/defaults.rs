//! Default constants for rentwatch configuration.
//!
//! All calibration numbers are centralized here with documentation.

// =============================================================================
// Owner Resolver Defaults
// =============================================================================

/// Weight of the token-set name similarity in a pair score.
pub const DEFAULT_NAME_WEIGHT: f64 = 0.6;

/// Weight of an exact mailing-address (street + zip) match.
pub const DEFAULT_ADDRESS_WEIGHT: f64 = 0.4;

/// Bonus added when two LLC mentions share an identical mailing address.
/// Sized so that address agreement plus the bonus reaches the merge threshold.
pub const DEFAULT_LLC_AFFILIATION_BONUS: f64 = 0.35;

/// Pairs scoring at or above this value are merged.
pub const DEFAULT_MERGE_THRESHOLD: f64 = 0.75;

/// Number of leading alphanumeric characters of the comparison name used in
/// the name blocking key.
pub const DEFAULT_BLOCK_PREFIX_LEN: usize = 6;

/// Buckets larger than this are compared only within sliding windows of this
/// size (sorted by comparison name) to bound the quadratic step.
pub const DEFAULT_MAX_BUCKET_SIZE: usize = 512;

// =============================================================================
// Scoring Weights (must sum to 1)
// =============================================================================

pub const DEFAULT_VIOLATION_WEIGHT: f64 = 0.30;
pub const DEFAULT_COMPLAINTS_WEIGHT: f64 = 0.20;
pub const DEFAULT_EVICTION_WEIGHT: f64 = 0.25;
pub const DEFAULT_OWNERSHIP_WEIGHT: f64 = 0.15;
pub const DEFAULT_RESOLUTION_WEIGHT: f64 = 0.10;

/// Tolerance used when checking that weights sum to 1.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

// =============================================================================
// Violation Severity
// =============================================================================

/// Severity points per immediately hazardous (class C) violation.
pub const DEFAULT_CLASS_C_POINTS: f64 = 10.0;

/// Severity points per hazardous (class B) violation.
pub const DEFAULT_CLASS_B_POINTS: f64 = 5.0;

/// Severity points per non-hazardous (class A) violation.
pub const DEFAULT_CLASS_A_POINTS: f64 = 1.0;

// =============================================================================
// Complaints Recency
// =============================================================================

/// Complaints newer than this many days before the as-of date count in full.
pub const DEFAULT_RECENT_WINDOW_DAYS: i64 = 365;

/// Weight applied to complaints older than the recent window.
pub const DEFAULT_OLDER_COMPLAINT_WEIGHT: f64 = 0.25;

// =============================================================================
// Ownership & Resolution
// =============================================================================

/// Multiplier on LLC opacity in the ownership pressure metric.
pub const DEFAULT_OPACITY_WEIGHT: f64 = 1.0;

/// Opacity contribution of an LLC building whose owner has an identifiable
/// controller (1.0 would treat it as fully opaque).
pub const DEFAULT_RESOLVED_LLC_WEIGHT: f64 = 0.5;

/// Share of the resolution score driven by the closed fraction; the rest is
/// driven by median days to close.
pub const DEFAULT_CLOSED_WEIGHT: f64 = 0.6;

// =============================================================================
// Transform Calibration
// =============================================================================

/// Steepness of the log-logistic transform `100 / (1 + (x/ref)^k)`.
pub const DEFAULT_LOGISTIC_STEEPNESS: f64 = 1.5;

/// Reference floors: the citywide median is used unless it falls below these.
pub const DEFAULT_VIOLATION_REFERENCE_FLOOR: f64 = 0.5;
pub const DEFAULT_COMPLAINTS_REFERENCE_FLOOR: f64 = 0.1;
pub const DEFAULT_EVICTION_REFERENCE_FLOOR: f64 = 0.01;
pub const DEFAULT_OWNERSHIP_REFERENCE_FLOOR: f64 = 1.0;
pub const DEFAULT_DAYS_TO_CLOSE_REFERENCE_FLOOR: f64 = 30.0;

// =============================================================================
// Grades
// =============================================================================

pub const DEFAULT_GRADE_A: f64 = 90.0;
pub const DEFAULT_GRADE_B: f64 = 75.0;
pub const DEFAULT_GRADE_C: f64 = 55.0;
pub const DEFAULT_GRADE_D: f64 = 35.0;

// =============================================================================
// Publishing
// =============================================================================

/// Maximum number of recent events attached to each building report.
pub const DEFAULT_RECENT_EVENT_LIMIT: usize = 10;

/// Number of entries in each published leaderboard.
pub const DEFAULT_LEADERBOARD_SIZE: usize = 25;

/// Default number of address search results.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Minimum trigram similarity for an address search hit.
pub const DEFAULT_SEARCH_MIN_SIMILARITY: f64 = 0.2;

// =============================================================================
// Pipeline
// =============================================================================

/// Default number of worker threads when not specified.
/// Uses the number of CPU cores.
pub fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(8)
}
