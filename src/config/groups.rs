use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a consolidation group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Numeric,
    Categorical,
    Datetime,
    Mixed,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Numeric => "numeric",
            DataType::Categorical => "categorical",
            DataType::Datetime => "datetime",
            DataType::Mixed => "mixed",
        }
    }

    /// Strategies a group of this type may declare.
    pub fn supported_strategies(&self) -> &'static [MergeStrategy] {
        use MergeStrategy::*;
        match self {
            DataType::Numeric => &[FirstValid, Mean, Median, Sum, Max, Min],
            DataType::Categorical => &[FirstValid, MostFrequent, Concatenate],
            DataType::Datetime => &[Latest, Earliest, FirstValid],
            DataType::Mixed => &[
                FirstValid,
                Mean,
                Median,
                Sum,
                Max,
                Min,
                MostFrequent,
                Concatenate,
                Latest,
                Earliest,
            ],
        }
    }

    pub fn supports(&self, strategy: MergeStrategy) -> bool {
        self.supported_strategies().contains(&strategy)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-row combination function applied across a group's source columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    FirstValid,
    Mean,
    Median,
    Sum,
    Max,
    Min,
    MostFrequent,
    Concatenate,
    Latest,
    Earliest,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::FirstValid => "first_valid",
            MergeStrategy::Mean => "mean",
            MergeStrategy::Median => "median",
            MergeStrategy::Sum => "sum",
            MergeStrategy::Max => "max",
            MergeStrategy::Min => "min",
            MergeStrategy::MostFrequent => "most_frequent",
            MergeStrategy::Concatenate => "concatenate",
            MergeStrategy::Latest => "latest",
            MergeStrategy::Earliest => "earliest",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rules applied to a numeric canonical column after merging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostRule {
    /// Null out values <= 0
    Positive,
    /// Null out values < 0
    NonNegative,
    /// Round to the nearest integer
    Integer,
}

/// A source column of a group, with an optional unit conversion factor
/// applied before merging (e.g. 0.092903 for sqft → m²).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SourceFieldSpec", into = "SourceFieldSpec")]
pub struct SourceField {
    pub name: String,
    pub factor: Option<f64>,
}

impl SourceField {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            factor: None,
        }
    }

    pub fn with_factor(name: impl Into<String>, factor: f64) -> Self {
        Self {
            name: name.into(),
            factor: Some(factor),
        }
    }

    pub fn factor_or_one(&self) -> f64 {
        self.factor.unwrap_or(1.0)
    }
}

/// On-disk form: either `"price"` or `{ name = "living_area", factor = 0.092903 }`
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SourceFieldSpec {
    Name(String),
    Detailed {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        factor: Option<f64>,
    },
}

impl From<SourceFieldSpec> for SourceField {
    fn from(spec: SourceFieldSpec) -> Self {
        match spec {
            SourceFieldSpec::Name(name) => SourceField { name, factor: None },
            SourceFieldSpec::Detailed { name, factor } => SourceField { name, factor },
        }
    }
}

impl From<SourceField> for SourceFieldSpec {
    fn from(field: SourceField) -> Self {
        match field.factor {
            None => SourceFieldSpec::Name(field.name),
            Some(factor) => SourceFieldSpec::Detailed {
                name: field.name,
                factor: Some(factor),
            },
        }
    }
}

/// Declarative rule collapsing N source columns into one canonical column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationGroup {
    pub name: String,
    pub canonical_field: String,
    /// Source columns in precedence order
    #[serde(rename = "sources")]
    pub source_fields: Vec<SourceField>,
    #[serde(rename = "type")]
    pub data_type: DataType,
    pub strategy: MergeStrategy,
    #[serde(default)]
    pub rules: Vec<PostRule>,
    /// 1 is the highest priority
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Drop the consumed source columns after a successful merge
    #[serde(default = "default_true")]
    pub drop_sources: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_completeness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_diversity: Option<f64>,
    /// Joiner for the `concatenate` strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
}

fn default_priority() -> u8 {
    5
}

fn default_true() -> bool {
    true
}

pub const DEFAULT_SEPARATOR: &str = " | ";

impl ConsolidationGroup {
    pub fn new(
        name: impl Into<String>,
        canonical_field: impl Into<String>,
        data_type: DataType,
        strategy: MergeStrategy,
        source_fields: Vec<SourceField>,
    ) -> Self {
        Self {
            name: name.into(),
            canonical_field: canonical_field.into(),
            source_fields,
            data_type,
            strategy,
            rules: Vec::new(),
            priority: default_priority(),
            drop_sources: true,
            min_completeness: None,
            min_diversity: None,
            separator: None,
        }
    }

    pub fn with_rules(mut self, rules: Vec<PostRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_thresholds(mut self, min_completeness: Option<f64>, min_diversity: Option<f64>) -> Self {
        self.min_completeness = min_completeness;
        self.min_diversity = min_diversity;
        self
    }

    pub fn keep_sources(mut self) -> Self {
        self.drop_sources = false;
        self
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.source_fields.iter().map(|s| s.name.as_str())
    }

    pub fn source(&self, name: &str) -> Option<&SourceField> {
        self.source_fields.iter().find(|s| s.name == name)
    }

    pub fn separator(&self) -> &str {
        self.separator.as_deref().unwrap_or(DEFAULT_SEPARATOR)
    }
}
