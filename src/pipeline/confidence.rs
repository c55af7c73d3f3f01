//! Per-field and overall confidence scoring for a normalized field map.
//!
//! Each leaf starts at the document base score and receives three additive
//! adjustments (field category, document type, value quality), each step
//! clamped to [0, 1]. Objects average their children; arrays average their
//! elements.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::models::enums::DocumentType;

/// Used when the engine reported no document-level confidence.
pub const DEFAULT_BASE_CONFIDENCE: f64 = 0.7;

/// Confidence thresholds for the three display levels.
pub mod levels {
    pub const HIGH: f64 = 0.90;
    pub const MEDIUM: f64 = 0.70;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= levels::HIGH {
            ConfidenceLevel::High
        } else if score >= levels::MEDIUM {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

/// Category inferred from a field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCategory {
    Identifier,
    Date,
    Currency,
    Text,
    Address,
    Email,
    Phone,
    Percentage,
    Numeric,
}

impl FieldCategory {
    fn adjustment(&self) -> f64 {
        match self {
            FieldCategory::Identifier => 0.05,
            FieldCategory::Date => -0.05,
            FieldCategory::Currency => -0.03,
            FieldCategory::Text => 0.02,
            FieldCategory::Address => -0.05,
            FieldCategory::Email | FieldCategory::Phone => 0.03,
            FieldCategory::Percentage => -0.02,
            FieldCategory::Numeric => 0.0,
        }
    }
}

const EMAIL_TOKENS: &[&str] = &["email", "e_mail"];
const PHONE_TOKENS: &[&str] = &["phone", "tel", "telephone", "fax", "mobile"];
const DATE_TOKENS: &[&str] = &["date", "dob", "expiration", "expires", "birth", "start", "end"];
const ADDRESS_TOKENS: &[&str] = &["address", "street", "city", "zip", "postal"];
const PERCENT_TOKENS: &[&str] = &["percent", "percentage", "pct", "rate", "level"];
const NUMERIC_TOKENS: &[&str] = &["year", "acres", "count", "quantity", "hours"];
const IDENTIFIER_TOKENS: &[&str] = &["number", "id", "ein", "ssn", "no", "parcel", "policy", "four"];
const CURRENCY_TOKENS: &[&str] = &[
    "income", "expenses", "expense", "profit", "loss", "balance", "assets", "liabilities",
    "worth", "rent", "amount", "value", "tax", "price", "cost", "payment", "liability",
];

/// Infer the category from `_`-separated name tokens. Order matters:
/// `tax_year` is numeric, not currency.
pub fn infer_category(field_name: &str) -> FieldCategory {
    let tokens: Vec<&str> = field_name.split('_').filter(|t| !t.is_empty()).collect();
    let has = |set: &[&str]| tokens.iter().any(|t| set.contains(t));
    if has(EMAIL_TOKENS) {
        FieldCategory::Email
    } else if has(PHONE_TOKENS) {
        FieldCategory::Phone
    } else if has(DATE_TOKENS) {
        FieldCategory::Date
    } else if has(ADDRESS_TOKENS) {
        FieldCategory::Address
    } else if has(PERCENT_TOKENS) {
        FieldCategory::Percentage
    } else if has(NUMERIC_TOKENS) {
        FieldCategory::Numeric
    } else if has(IDENTIFIER_TOKENS) {
        FieldCategory::Identifier
    } else if has(CURRENCY_TOKENS) {
        FieldCategory::Currency
    } else {
        FieldCategory::Text
    }
}

pub fn doc_type_adjustment(doc_type: DocumentType) -> f64 {
    match doc_type {
        DocumentType::DriversLicense => 0.05,
        DocumentType::Form1040 => 0.02,
        DocumentType::BankStatement => 0.03,
        DocumentType::ScheduleF | DocumentType::CropInsurance => 0.0,
        DocumentType::BalanceSheet => -0.02,
        DocumentType::LeaseAgreement => -0.03,
        DocumentType::EquipmentInventory => -0.04,
        DocumentType::LandDeed => -0.05,
    }
}

const PLACEHOLDERS: &[&str] = &[
    "n/a", "na", "none", "null", "unknown", "tbd", "xxx", "---", "-", "?", "pending", "illegible",
];

static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[A-Za-z]{2,}$").unwrap());
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?1?[\s.-]?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}$").unwrap());
static CURRENCY_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(?-?\$?\d{1,3}(,\d{3})*(\.\d{2})?\)?$").unwrap());

/// Value-quality adjustment. First matching rule applies.
pub fn quality_adjustment(category: FieldCategory, field_name: &str, value: &Value) -> f64 {
    if !crate::models::value_is_populated(value) {
        return -0.3;
    }
    let Value::String(s) = value else {
        return match (category, value) {
            (FieldCategory::Currency, Value::Number(_)) => 0.03,
            _ => 0.0,
        };
    };
    let s = s.trim();
    if PLACEHOLDERS.contains(&s.to_lowercase().as_str()) {
        return -0.2;
    }
    if field_name.split('_').any(|t| t == "name" || t == "grantor" || t == "grantee") && s.chars().count() < 3 {
        return -0.15;
    }
    match category {
        FieldCategory::Date if ISO_DATE.is_match(s) => 0.05,
        FieldCategory::Email if EMAIL.is_match(s) => 0.05,
        FieldCategory::Phone if PHONE.is_match(s) => 0.04,
        FieldCategory::Currency if CURRENCY_TEXT.is_match(s) => 0.03,
        _ => 0.0,
    }
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Score of one leaf value.
pub fn score_leaf(base: f64, doc_type: DocumentType, field_name: &str, value: &Value) -> f64 {
    let category = infer_category(field_name);
    let s = clamp01(clamp01(base) + category.adjustment());
    let s = clamp01(s + doc_type_adjustment(doc_type));
    clamp01(s + quality_adjustment(category, field_name, value))
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfidenceReport {
    /// Scores of the top-level fields (aggregated for objects and arrays).
    pub fields: BTreeMap<String, f64>,
    /// Leaf scores by dotted path; array elements are index segments
    /// (`items.0.value`), the same syntax mapping source paths use.
    pub leaves: BTreeMap<String, f64>,
    pub overall: f64,
    pub level: ConfidenceLevel,
}

impl ConfidenceReport {
    /// Score for a mapping source path: exact leaf, then top-level field.
    pub fn score_for_path(&self, path: &str) -> Option<f64> {
        self.leaves
            .get(path)
            .or_else(|| self.fields.get(path))
            .or_else(|| path.split('.').next().and_then(|root| self.fields.get(root)))
            .copied()
    }
}

pub fn score_fields(
    doc_type: DocumentType,
    fields: &Map<String, Value>,
    base: Option<f64>,
) -> ConfidenceReport {
    let leaf_base = base.unwrap_or(DEFAULT_BASE_CONFIDENCE);
    let mut leaves = BTreeMap::new();
    let mut top = BTreeMap::new();

    for (name, value) in fields {
        let score = score_value(leaf_base, doc_type, name, name, value, &mut leaves);
        top.insert(name.clone(), score);
    }

    let average = if top.is_empty() {
        None
    } else {
        Some(top.values().sum::<f64>() / top.len() as f64)
    };
    let overall = overall_confidence(average, base);

    ConfidenceReport {
        fields: top,
        leaves,
        overall,
        level: ConfidenceLevel::from_score(overall),
    }
}

/// 0.6 × field average + 0.4 × base when both exist, otherwise whichever exists.
pub fn overall_confidence(field_average: Option<f64>, base: Option<f64>) -> f64 {
    let score = match (field_average, base) {
        (Some(avg), Some(base)) => 0.6 * avg + 0.4 * base,
        (Some(avg), None) => avg,
        (None, Some(base)) => base,
        (None, None) => DEFAULT_BASE_CONFIDENCE,
    };
    clamp01(score)
}

fn score_value(
    base: f64,
    doc_type: DocumentType,
    name: &str,
    path: &str,
    value: &Value,
    leaves: &mut BTreeMap<String, f64>,
) -> f64 {
    match value {
        Value::Object(map) if !map.is_empty() => {
            let scores: Vec<f64> = map
                .iter()
                .map(|(k, v)| score_value(base, doc_type, k, &format!("{path}.{k}"), v, leaves))
                .collect();
            mean(&scores)
        }
        Value::Array(items) if !items.is_empty() => {
            let scores: Vec<f64> = items
                .iter()
                .enumerate()
                .map(|(i, v)| score_value(base, doc_type, name, &format!("{path}.{i}"), v, leaves))
                .collect();
            mean(&scores)
        }
        _ => {
            let score = score_leaf(base, doc_type, name, value);
            leaves.insert(path.to_string(), score);
            score
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
