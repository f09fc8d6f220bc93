use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Global thresholds used by the consolidator and the config self-check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum non-null share of a merged column
    pub min_completeness: f64,
    /// Minimum share of values differing from the most frequent one
    pub min_diversity: f64,
    /// Diversity is only judged with at least this many non-null values
    pub diversity_min_sample: usize,
    pub min_groups: usize,
    pub min_priority: u8,
    pub max_priority: u8,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_completeness: 0.9,
            min_diversity: 0.5,
            diversity_min_sample: 20,
            min_groups: 1,
            min_priority: 1,
            max_priority: 10,
        }
    }
}

/// Severity levels for rule violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Minor issue, informational only
    Info,
    /// Notable issue, reported as WARNING
    Warning,
    /// Significant issue, reported as FAILED
    Error,
    /// Critical issue, reported as FAILED
    Critical,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Warning
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// What to do with values outside a field's bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OutlierPolicy {
    /// Clip to the nearest bound
    Clip,
    /// Drop violating rows once the outlier fraction exceeds `tolerance`;
    /// below it the values are clipped
    Exclude { tolerance: f64 },
}

impl Default for OutlierPolicy {
    fn default() -> Self {
        OutlierPolicy::Clip
    }
}

/// Static business bounds for a field. Bounds declared on a canonical field
/// also apply to each of its group's source columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldBounds {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default)]
    pub policy: OutlierPolicy,
}

impl FieldBounds {
    pub fn new(field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            field: field.into(),
            min,
            max,
            policy: OutlierPolicy::Clip,
        }
    }
}

/// A field that must be mostly present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredField {
    pub field: String,
    #[serde(default = "default_max_missing_rate")]
    pub max_missing_rate: f64,
    #[serde(default)]
    pub severity: Severity,
}

fn default_max_missing_rate() -> f64 {
    0.1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningSettings {
    /// Lower-cased tokens treated as missing
    pub placeholder_tokens: Vec<String>,
    pub iqr_enabled: bool,
    pub iqr_multiplier: f64,
    pub iqr_min_sample: usize,
    pub iqr_exempt: Vec<String>,
    pub bounds: Vec<FieldBounds>,
    /// Also clip coordinates to the geographic bounds
    pub apply_geo_bounds: bool,
    pub required_fields: Vec<RequiredField>,
    /// Columns missing more than this share are left unimputed
    pub max_impute_missing_rate: f64,
    /// Share of numeric-looking values for a text column to become numeric
    pub numeric_coercion_ratio: f64,
    pub drop_duplicates: bool,
}

impl Default for CleaningSettings {
    fn default() -> Self {
        Self {
            placeholder_tokens: ["", "n/a", "na", "null", "none", "nan", "-", "?", "--"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            iqr_enabled: true,
            iqr_multiplier: 1.5,
            iqr_min_sample: 10,
            iqr_exempt: Vec::new(),
            bounds: Vec::new(),
            apply_geo_bounds: true,
            required_fields: Vec::new(),
            max_impute_missing_rate: 0.5,
            numeric_coercion_ratio: 0.9,
            drop_duplicates: true,
        }
    }
}

/// Geographic bounding box of the covered market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoSettings {
    pub latitude_field: String,
    pub longitude_field: String,
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl GeoSettings {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&lat)
            && (self.min_longitude..=self.max_longitude).contains(&lon)
    }

    pub fn as_bounds(&self) -> [FieldBounds; 2] {
        [
            FieldBounds::new(
                self.latitude_field.clone(),
                Some(self.min_latitude),
                Some(self.max_latitude),
            ),
            FieldBounds::new(
                self.longitude_field.clone(),
                Some(self.min_longitude),
                Some(self.max_longitude),
            ),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BucketMode {
    /// Cut points are quantiles (0..1) of the source column
    #[default]
    Quantile,
    /// Cut points are absolute values
    Absolute,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexComponent {
    pub field: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Lower raw values score higher
    #[serde(default)]
    pub invert: bool,
}

fn default_weight() -> f64 {
    1.0
}

/// How a derived metric is computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricKind {
    Ratio {
        numerator: String,
        denominator: String,
    },
    Bucket {
        source: String,
        cut_points: Vec<f64>,
        labels: Vec<String>,
        #[serde(default)]
        mode: BucketMode,
    },
    Index {
        components: Vec<IndexComponent>,
    },
    Lookup {
        source: String,
        table: BTreeMap<String, f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<f64>,
    },
    Age {
        source: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reference_year: Option<i32>,
    },
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Ratio { .. } => "ratio",
            MetricKind::Bucket { .. } => "bucket",
            MetricKind::Index { .. } => "index",
            MetricKind::Lookup { .. } => "lookup",
            MetricKind::Age { .. } => "age",
        }
    }

    /// Fields this metric reads.
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            MetricKind::Ratio {
                numerator,
                denominator,
            } => vec![numerator.as_str(), denominator.as_str()],
            MetricKind::Bucket { source, .. }
            | MetricKind::Lookup { source, .. }
            | MetricKind::Age { source, .. } => vec![source.as_str()],
            MetricKind::Index { components } => components.iter().map(|c| c.field.as_str()).collect(),
        }
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self, MetricKind::Bucket { .. })
    }
}

/// A derived metric computed from canonical columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetric {
    pub name: String,
    #[serde(flatten)]
    pub kind: MetricKind,
    /// Plausible numeric range used by the enrichment-coverage check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plausible_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plausible_max: Option<f64>,
}

impl DerivedMetric {
    pub fn new(name: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            name: name.into(),
            kind,
            plausible_min: None,
            plausible_max: None,
        }
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.plausible_min = min;
        self.plausible_max = max;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EnrichmentSettings {
    pub metrics: Vec<DerivedMetric>,
}

/// Score cut points mapping a [0,1] score to a status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CutPoints {
    pub excellent: f64,
    pub passed: f64,
    pub warning: f64,
}

impl Default for CutPoints {
    fn default() -> Self {
        Self {
            excellent: 0.9,
            passed: 0.8,
            warning: 0.6,
        }
    }
}

/// Weights of the five check categories in the global score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryWeights {
    pub basic: f64,
    pub business_rules: f64,
    pub cross_field: f64,
    pub consolidation: f64,
    pub enrichment: f64,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            basic: 0.25,
            business_rules: 0.25,
            cross_field: 0.20,
            consolidation: 0.15,
            enrichment: 0.15,
        }
    }
}

impl CategoryWeights {
    pub fn total(&self) -> f64 {
        self.basic + self.business_rules + self.cross_field + self.consolidation + self.enrichment
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRule {
    pub field: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default)]
    pub severity: Severity,
}

impl BusinessRule {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            required: false,
            allowed_values: None,
            min: None,
            max: None,
            severity: Severity::Warning,
        }
    }
}

/// Flags rows whose numerator/denominator ratio strays beyond `factor` times
/// (or below 1/`factor` of) the population median ratio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioCheck {
    pub numerator: String,
    pub denominator: String,
    #[serde(default = "default_ratio_factor")]
    pub factor: f64,
}

fn default_ratio_factor() -> f64 {
    3.0
}

/// A year-valued field that must not lie in the future
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalCheck {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualitySettings {
    pub cut_points: CutPoints,
    pub weights: CategoryWeights,
    pub min_completeness: f64,
    pub min_uniqueness: f64,
    pub min_type_consistency: f64,
    pub unique_fields: Vec<String>,
    pub business_rules: Vec<BusinessRule>,
    pub ratio_checks: Vec<RatioCheck>,
    pub temporal_checks: Vec<TemporalCheck>,
    /// Abort the Validate phase when a check errors instead of scoring it 0
    pub block_on_error: bool,
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            cut_points: CutPoints::default(),
            weights: CategoryWeights::default(),
            min_completeness: 0.8,
            min_uniqueness: 0.95,
            min_type_consistency: 0.95,
            unique_fields: Vec::new(),
            business_rules: Vec::new(),
            ratio_checks: Vec::new(),
            temporal_checks: Vec::new(),
            block_on_error: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizeSettings {
    pub enabled: bool,
    /// Non-canonical columns missing more than this share are dropped
    pub max_missing_rate: f64,
    pub drop_constant_columns: bool,
    pub downcast_integral_floats: bool,
}

impl Default for OptimizeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_missing_rate: 0.95,
            drop_constant_columns: true,
            downcast_integral_floats: true,
        }
    }
}
