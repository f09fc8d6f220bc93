//! Declarative consolidation catalog.
//!
//! The catalog is loaded once before a run, checked with [`ConsolidationConfig::validate`],
//! wrapped in an `Arc` and handed to every component. Nothing mutates it afterwards.

pub mod groups;
pub mod settings;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{ConsolidatorError, Result};

pub use groups::{ConsolidationGroup, DataType, MergeStrategy, PostRule, SourceField};
pub use settings::{
    BucketMode, BusinessRule, CategoryWeights, CleaningSettings, CutPoints, DerivedMetric,
    EnrichmentSettings, FieldBounds, GeoSettings, IndexComponent, MetricKind, OptimizeSettings,
    OutlierPolicy, QualitySettings, RatioCheck, RequiredField, Severity, TemporalCheck, Thresholds,
};

/// The built-in real-estate catalog
pub const BUILTIN_CATALOG: &str = include_str!("../../config/consolidation.toml");

/// Environment variable naming an alternative catalog file
pub const CONFIG_PATH_ENV: &str = "CONSOLIDATOR_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    pub version: String,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoSettings>,
    #[serde(default)]
    pub cleaning: CleaningSettings,
    #[serde(default)]
    pub enrichment: EnrichmentSettings,
    #[serde(default)]
    pub quality: QualitySettings,
    #[serde(default)]
    pub optimize: OptimizeSettings,
    #[serde(default)]
    pub groups: Vec<ConsolidationGroup>,
}

/// Outcome of a successful self-check
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigCheck {
    pub group_count: usize,
    pub derived_metric_count: usize,
    /// Source fields claimed by more than one group
    pub ambiguous_sources: Vec<String>,
}

/// Where a schema field comes from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum FieldOrigin {
    Canonical { group: String, priority: u8 },
    Derived { metric: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub data_type: DataType,
    #[serde(flatten)]
    pub origin: FieldOrigin,
}

/// Every canonical and derived field the catalog can produce
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct FieldSchema {
    pub fields: Vec<FieldSpec>,
}

impl FieldSchema {
    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn canonical(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields
            .iter()
            .filter(|f| matches!(f.origin, FieldOrigin::Canonical { .. }))
    }

    pub fn derived(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields
            .iter()
            .filter(|f| matches!(f.origin, FieldOrigin::Derived { .. }))
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}

impl ConsolidationConfig {
    /// A catalog with the given groups and default settings everywhere else
    pub fn with_groups(groups: Vec<ConsolidationGroup>) -> Self {
        Self {
            version: "custom".to_string(),
            thresholds: Thresholds::default(),
            geo: None,
            cleaning: CleaningSettings::default(),
            enrichment: EnrichmentSettings::default(),
            quality: QualitySettings::default(),
            optimize: OptimizeSettings::default(),
            groups,
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ConsolidatorError::Configuration(format!("invalid catalog: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ConsolidatorError::Configuration(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    /// Load from `path`, else from `CONSOLIDATOR_CONFIG`, else the built-in catalog.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(p) if !p.trim().is_empty() => Self::from_file(p.trim()),
            _ => Self::builtin(),
        }
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Groups ordered by priority (1 first); ties keep declaration order.
    pub fn groups_by_priority(&self) -> Vec<&ConsolidationGroup> {
        let mut ordered: Vec<&ConsolidationGroup> = self.groups.iter().collect();
        ordered.sort_by_key(|g| g.priority);
        ordered
    }

    pub fn group(&self, canonical_field: &str) -> Option<&ConsolidationGroup> {
        self.groups.iter().find(|g| g.canonical_field == canonical_field)
    }

    /// The group that declares `source` among its source fields.
    pub fn group_for_source(&self, source: &str) -> Option<&ConsolidationGroup> {
        self.groups.iter().find(|g| g.source(source).is_some())
    }

    pub fn source_fields(&self) -> BTreeSet<&str> {
        self.groups.iter().flat_map(|g| g.source_names()).collect()
    }

    pub fn canonical_fields(&self) -> Vec<&str> {
        self.groups_by_priority()
            .into_iter()
            .map(|g| g.canonical_field.as_str())
            .collect()
    }

    pub fn derived_fields(&self) -> Vec<&str> {
        self.enrichment.metrics.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn derived_metric(&self, name: &str) -> Option<&DerivedMetric> {
        self.enrichment.metrics.iter().find(|m| m.name == name)
    }

    /// Declared type of a canonical or derived field.
    pub fn declared_type(&self, field: &str) -> Option<DataType> {
        if let Some(group) = self.group(field) {
            return Some(group.data_type);
        }
        self.derived_metric(field).map(|m| {
            if m.kind.is_categorical() {
                DataType::Categorical
            } else {
                DataType::Numeric
            }
        })
    }

    pub fn schema(&self) -> FieldSchema {
        let mut fields: Vec<FieldSpec> = self
            .groups_by_priority()
            .into_iter()
            .map(|g| FieldSpec {
                name: g.canonical_field.clone(),
                data_type: g.data_type,
                origin: FieldOrigin::Canonical {
                    group: g.name.clone(),
                    priority: g.priority,
                },
            })
            .collect();
        fields.extend(self.enrichment.metrics.iter().map(|m| FieldSpec {
            name: m.name.clone(),
            data_type: if m.kind.is_categorical() {
                DataType::Categorical
            } else {
                DataType::Numeric
            },
            origin: FieldOrigin::Derived {
                metric: m.kind.as_str().to_string(),
            },
        }));
        FieldSchema { fields }
    }

    /// Static bounds for `field`, including geographic bounds when enabled.
    pub fn bounds_for(&self, field: &str) -> Option<FieldBounds> {
        let declared = self.cleaning.bounds.iter().find(|b| b.field == field).cloned();
        if declared.is_some() || !self.cleaning.apply_geo_bounds {
            return declared;
        }
        self.geo
            .as_ref()
            .and_then(|geo| geo.as_bounds().into_iter().find(|b| b.field == field))
    }

    /// Self-check that must pass before any phase runs.
    pub fn validate(&self) -> Result<ConfigCheck> {
        let fail = |msg: String| Err(ConsolidatorError::Configuration(msg));
        let t = &self.thresholds;

        if self.groups.len() < t.min_groups {
            return fail(format!(
                "catalog declares {} groups, at least {} required",
                self.groups.len(),
                t.min_groups
            ));
        }
        if t.min_priority > t.max_priority {
            return fail(format!(
                "priority range [{}, {}] is empty",
                t.min_priority, t.max_priority
            ));
        }
        for (name, value) in [
            ("thresholds.min_completeness", t.min_completeness),
            ("thresholds.min_diversity", t.min_diversity),
            ("quality.min_completeness", self.quality.min_completeness),
            ("quality.min_uniqueness", self.quality.min_uniqueness),
            ("quality.min_type_consistency", self.quality.min_type_consistency),
            ("cleaning.max_impute_missing_rate", self.cleaning.max_impute_missing_rate),
            ("cleaning.numeric_coercion_ratio", self.cleaning.numeric_coercion_ratio),
            ("optimize.max_missing_rate", self.optimize.max_missing_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return fail(format!("{} = {} is outside [0, 1]", name, value));
            }
        }

        let mut canonical = HashSet::new();
        let mut claims: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for group in &self.groups {
            if group.canonical_field.trim().is_empty() {
                return fail(format!("group '{}' has an empty canonical field", group.name));
            }
            if !canonical.insert(group.canonical_field.as_str()) {
                return fail(format!(
                    "canonical field '{}' is declared by more than one group",
                    group.canonical_field
                ));
            }
            if !(t.min_priority..=t.max_priority).contains(&group.priority) {
                return fail(format!(
                    "group '{}' priority {} outside [{}, {}]",
                    group.name, group.priority, t.min_priority, t.max_priority
                ));
            }
            if group.source_fields.is_empty() {
                return fail(format!("group '{}' declares no source fields", group.name));
            }
            if !group.data_type.supports(group.strategy) {
                return fail(format!(
                    "group '{}': strategy '{}' is not valid for {} data",
                    group.name, group.strategy, group.data_type
                ));
            }
            for source in &group.source_fields {
                if let Some(factor) = source.factor {
                    if !(factor.is_finite() && factor > 0.0) {
                        return fail(format!(
                            "group '{}': source '{}' has non-positive factor {}",
                            group.name, source.name, factor
                        ));
                    }
                }
                claims.entry(source.name.as_str()).or_default().push(group.name.as_str());
            }
            for (label, value) in [
                ("min_completeness", group.min_completeness),
                ("min_diversity", group.min_diversity),
            ] {
                if let Some(v) = value {
                    if !(0.0..=1.0).contains(&v) {
                        return fail(format!("group '{}': {} = {} outside [0, 1]", group.name, label, v));
                    }
                }
            }
        }

        let cuts = &self.quality.cut_points;
        if !(cuts.excellent >= cuts.passed && cuts.passed >= cuts.warning && cuts.warning >= 0.0 && cuts.excellent <= 1.0) {
            return fail(format!(
                "quality cut points must descend within [0, 1]: excellent={} passed={} warning={}",
                cuts.excellent, cuts.passed, cuts.warning
            ));
        }
        let weights = &self.quality.weights;
        let all_weights = [
            weights.basic,
            weights.business_rules,
            weights.cross_field,
            weights.consolidation,
            weights.enrichment,
        ];
        if all_weights.iter().any(|w| *w < 0.0) || weights.total() <= 0.0 {
            return fail("quality weights must be non-negative with a positive sum".to_string());
        }

        let mut derived = HashSet::new();
        for metric in &self.enrichment.metrics {
            if canonical.contains(metric.name.as_str()) {
                return fail(format!(
                    "derived metric '{}' collides with a canonical field",
                    metric.name
                ));
            }
            if !derived.insert(metric.name.as_str()) {
                return fail(format!("derived metric '{}' declared twice", metric.name));
            }
            if let MetricKind::Bucket {
                cut_points, labels, ..
            } = &metric.kind
            {
                if labels.len() != cut_points.len() + 1 {
                    return fail(format!(
                        "bucket metric '{}' needs {} labels for {} cut points, got {}",
                        metric.name,
                        cut_points.len() + 1,
                        cut_points.len(),
                        labels.len()
                    ));
                }
                if cut_points.windows(2).any(|w| w[0] >= w[1]) {
                    return fail(format!(
                        "bucket metric '{}' cut points must be strictly ascending",
                        metric.name
                    ));
                }
            }
            if let MetricKind::Index { components } = &metric.kind {
                if components.is_empty() || components.iter().all(|c| c.weight <= 0.0) {
                    return fail(format!(
                        "index metric '{}' needs at least one positively weighted component",
                        metric.name
                    ));
                }
            }
        }

        for bounds in &self.cleaning.bounds {
            if let (Some(min), Some(max)) = (bounds.min, bounds.max) {
                if min > max {
                    return fail(format!("bounds for '{}' are inverted: {} > {}", bounds.field, min, max));
                }
            }
            if let OutlierPolicy::Exclude { tolerance } = bounds.policy {
                if !(0.0..=1.0).contains(&tolerance) {
                    return fail(format!(
                        "bounds for '{}': exclusion tolerance {} outside [0, 1]",
                        bounds.field, tolerance
                    ));
                }
            }
        }

        let ambiguous_sources: Vec<String> = claims
            .into_iter()
            .filter(|(_, owners)| owners.len() > 1)
            .map(|(source, owners)| {
                warn!(
                    "Source field '{}' is claimed by several groups: {}",
                    source,
                    owners.join(", ")
                );
                source.to_string()
            })
            .collect();

        let check = ConfigCheck {
            group_count: self.groups.len(),
            derived_metric_count: self.enrichment.metrics.len(),
            ambiguous_sources,
        };
        info!(
            "Consolidation catalog v{} passed self-check: {} groups, {} derived metrics",
            self.version, check.group_count, check.derived_metric_count
        );
        Ok(check)
    }
}
