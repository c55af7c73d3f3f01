//! Labeled-value scanning of OCR free text, one extractor per document type.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::{Map, Value};

use crate::models::enums::DocumentType;
use crate::registry::{schema_for, FieldKind};

/// Pure text extractor for one document type.
pub type Extractor = fn(&str) -> Map<String, Value>;

/// Dispatch table. Adding a document type means adding a row here.
pub static EXTRACTORS: [(DocumentType, Extractor); 9] = [
    (DocumentType::DriversLicense, extract_drivers_license),
    (DocumentType::ScheduleF, extract_schedule_f),
    (DocumentType::Form1040, extract_form_1040),
    (DocumentType::BankStatement, extract_bank_statement),
    (DocumentType::BalanceSheet, extract_balance_sheet),
    (DocumentType::LeaseAgreement, extract_lease_agreement),
    (DocumentType::LandDeed, extract_land_deed),
    (DocumentType::CropInsurance, extract_crop_insurance),
    (DocumentType::EquipmentInventory, extract_equipment_inventory),
];

pub fn extractor_for(doc_type: DocumentType) -> Extractor {
    EXTRACTORS
        .iter()
        .find(|(t, _)| *t == doc_type)
        .map(|(_, f)| *f)
        .unwrap_or(extract_nothing)
}

fn extract_nothing(_text: &str) -> Map<String, Value> {
    Map::new()
}

struct LabelRule {
    field: &'static str,
    pattern: Regex,
}

/// One regex per field: any of the labels at line start, a separator, then the value.
fn rules(spec: &[(&'static str, &[&str])]) -> Vec<LabelRule> {
    spec.iter()
        .map(|(field, labels)| {
            let alternatives = labels
                .iter()
                .map(|l| regex::escape(l).replace(' ', r"\s+"))
                .collect::<Vec<_>>()
                .join("|");
            let pattern = format!(
                r"(?im)^[ \t]*(?:{alternatives})[ \t]*(?::|#|\.{{2,}}|[ \t]{{2,}}|\t)[ \t]*(.+?)[ \t]*$"
            );
            LabelRule {
                field,
                pattern: Regex::new(&pattern).unwrap(),
            }
        })
        .collect()
}

static DRIVERS_LICENSE_RULES: LazyLock<Vec<LabelRule>> = LazyLock::new(|| {
    rules(&[
        ("full_name", &["full name", "name"]),
        ("license_number", &["license number", "license no", "dl number", "dl no", "dl"]),
        ("date_of_birth", &["date of birth", "dob", "birth date"]),
        ("address", &["address", "addr"]),
        ("expiration_date", &["expiration date", "expires", "exp"]),
        ("issue_date", &["issue date", "issued", "iss"]),
        ("issuing_state", &["state", "issuing state"]),
    ])
});

static SCHEDULE_F_RULES: LazyLock<Vec<LabelRule>> = LazyLock::new(|| {
    rules(&[
        ("tax_year", &["tax year", "year"]),
        ("farm_name", &["name of proprietor", "farm name", "proprietor"]),
        ("employer_id", &["employer id number", "employer id", "ein"]),
        ("principal_product", &["principal crop or activity", "principal product", "principal crop"]),
        ("gross_income", &["gross income", "line 9 gross income", "gross farm income"]),
        ("total_expenses", &["total expenses", "line 33 total expenses"]),
        ("net_profit_loss", &["net farm profit or (loss)", "net profit or (loss)", "net farm profit", "net profit"]),
    ])
});

static FORM_1040_RULES: LazyLock<Vec<LabelRule>> = LazyLock::new(|| {
    rules(&[
        ("tax_year", &["tax year", "year"]),
        ("taxpayer_name", &["your first name and last name", "taxpayer name", "name"]),
        ("filing_status", &["filing status"]),
        ("ssn_last_four", &["ssn last four", "ssn (last 4)", "ssn last 4"]),
        ("total_income", &["total income"]),
        ("adjusted_gross_income", &["adjusted gross income", "agi"]),
        ("taxable_income", &["taxable income"]),
        ("total_tax", &["total tax"]),
        ("phone", &["phone", "phone number", "telephone"]),
        ("email", &["email", "email address", "e-mail"]),
    ])
});

static BANK_STATEMENT_RULES: LazyLock<Vec<LabelRule>> = LazyLock::new(|| {
    rules(&[
        ("account_holder", &["account holder", "account name", "customer"]),
        ("bank_name", &["bank name", "bank", "institution"]),
        ("account_number", &["account number", "account no", "acct number", "acct"]),
        ("statement_period_start", &["period start", "statement start", "from"]),
        ("statement_period_end", &["period end", "statement end", "statement date", "through", "to"]),
        ("beginning_balance", &["beginning balance", "opening balance", "previous balance"]),
        ("ending_balance", &["ending balance", "closing balance", "new balance"]),
    ])
});

static BALANCE_SHEET_RULES: LazyLock<Vec<LabelRule>> = LazyLock::new(|| {
    rules(&[
        ("as_of_date", &["as of date", "as of", "statement date", "date"]),
        ("entity_name", &["prepared for", "entity name", "name"]),
        ("current_assets", &["total current assets", "current assets"]),
        ("current_liabilities", &["total current liabilities", "current liabilities"]),
        ("total_assets", &["total assets"]),
        ("total_liabilities", &["total liabilities"]),
        ("net_worth", &["net worth", "owner equity", "owners equity", "equity"]),
    ])
});

static LEASE_AGREEMENT_RULES: LazyLock<Vec<LabelRule>> = LazyLock::new(|| {
    rules(&[
        ("lessor_name", &["lessor", "landlord", "owner"]),
        ("lessee_name", &["lessee", "tenant", "operator"]),
        ("property_description", &["property description", "property", "premises"]),
        ("total_acres", &["total acres", "acres", "acreage"]),
        ("annual_rent", &["annual rent", "cash rent", "rent"]),
        ("lease_start_date", &["lease start date", "start date", "commencement date", "commencing"]),
        ("lease_end_date", &["lease end date", "end date", "termination date", "expiration date"]),
    ])
});

static LAND_DEED_RULES: LazyLock<Vec<LabelRule>> = LazyLock::new(|| {
    rules(&[
        ("grantor", &["grantor", "grantors"]),
        ("grantee", &["grantee", "grantees"]),
        ("legal_description", &["legal description", "description"]),
        ("parcel_number", &["parcel number", "parcel id", "parcel", "apn"]),
        ("county", &["county"]),
        ("total_acres", &["total acres", "acres", "containing"]),
        ("recording_date", &["recording date", "recorded", "date recorded"]),
    ])
});

static CROP_INSURANCE_RULES: LazyLock<Vec<LabelRule>> = LazyLock::new(|| {
    rules(&[
        ("policy_number", &["policy number", "policy no", "policy"]),
        ("insured_name", &["insured name", "insured", "policyholder"]),
        ("insurance_provider", &["insurance provider", "company", "provider", "insurer"]),
        ("crop_year", &["crop year", "reinsurance year", "year"]),
        ("coverage_level", &["coverage level", "coverage"]),
        ("liability_amount", &["liability amount", "total liability", "liability"]),
    ])
});

static EQUIPMENT_INVENTORY_RULES: LazyLock<Vec<LabelRule>> = LazyLock::new(|| {
    rules(&[
        ("owner_name", &["owner name", "owner", "prepared for"]),
        ("as_of_date", &["as of date", "as of", "date"]),
        ("total_value", &["total value", "total equipment value", "total"]),
    ])
});

pub fn extract_drivers_license(text: &str) -> Map<String, Value> {
    scan(text, DocumentType::DriversLicense, &DRIVERS_LICENSE_RULES)
}

pub fn extract_schedule_f(text: &str) -> Map<String, Value> {
    scan(text, DocumentType::ScheduleF, &SCHEDULE_F_RULES)
}

pub fn extract_form_1040(text: &str) -> Map<String, Value> {
    scan(text, DocumentType::Form1040, &FORM_1040_RULES)
}

pub fn extract_bank_statement(text: &str) -> Map<String, Value> {
    scan(text, DocumentType::BankStatement, &BANK_STATEMENT_RULES)
}

pub fn extract_balance_sheet(text: &str) -> Map<String, Value> {
    scan(text, DocumentType::BalanceSheet, &BALANCE_SHEET_RULES)
}

pub fn extract_lease_agreement(text: &str) -> Map<String, Value> {
    scan(text, DocumentType::LeaseAgreement, &LEASE_AGREEMENT_RULES)
}

pub fn extract_land_deed(text: &str) -> Map<String, Value> {
    scan(text, DocumentType::LandDeed, &LAND_DEED_RULES)
}

pub fn extract_crop_insurance(text: &str) -> Map<String, Value> {
    scan(text, DocumentType::CropInsurance, &CROP_INSURANCE_RULES)
}

pub fn extract_equipment_inventory(text: &str) -> Map<String, Value> {
    scan(text, DocumentType::EquipmentInventory, &EQUIPMENT_INVENTORY_RULES)
}

fn scan(text: &str, doc_type: DocumentType, rules: &[LabelRule]) -> Map<String, Value> {
    let schema = schema_for(doc_type);
    let mut fields = Map::new();
    for rule in rules {
        if fields.contains_key(rule.field) {
            continue;
        }
        let Some(raw) = rule
            .pattern
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim())
        else {
            continue;
        };
        if raw.is_empty() {
            continue;
        }
        let kind = schema
            .field(rule.field)
            .map(|f| f.kind)
            .unwrap_or(FieldKind::Text);
        fields.insert(rule.field.to_string(), coerce(raw, kind));
    }
    fields
}

/// Convert a raw captured string into the schema kind's JSON shape.
/// Unparseable values stay as strings so validation can flag them.
pub fn coerce(raw: &str, kind: FieldKind) -> Value {
    match kind {
        FieldKind::Currency => parse_currency(raw).map(number_value),
        FieldKind::Number => parse_number(raw).map(number_value),
        FieldKind::Percentage => parse_percentage(raw).map(number_value),
        FieldKind::Date => parse_date(raw).map(Value::String),
        _ => None,
    }
    .unwrap_or_else(|| Value::String(raw.to_string()))
}

/// `$1,234.50` → 1234.5, `(500)` → -500, `-$12` → -12.
pub fn parse_currency(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let (negative, inner) = if trimmed.starts_with('(') && trimmed.ends_with(')') {
        (true, &trimmed[1..trimmed.len() - 1])
    } else if let Some(rest) = trimmed.strip_prefix('-') {
        (true, rest)
    } else {
        (false, trimmed)
    };
    let cleaned: String = inner
        .trim()
        .trim_start_matches("USD")
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    let (negative, cleaned) = match cleaned.strip_prefix('-') {
        Some(rest) => (!negative, rest.to_string()),
        None => (negative, cleaned),
    };
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    let value: f64 = cleaned.parse().ok()?;
    Some(if negative { -value } else { value })
}

static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?[\d,]*\.?\d+").unwrap());

/// First numeric token, commas ignored (`1,280.5 acres` → 1280.5).
pub fn parse_number(raw: &str) -> Option<f64> {
    let m = LEADING_NUMBER.find(raw.trim())?;
    m.as_str().replace(',', "").parse().ok()
}

/// Keeps the raw scale (`75%` → 75); conversion to a fraction happens at mapping time.
pub fn parse_percentage(raw: &str) -> Option<f64> {
    parse_number(raw.trim().trim_end_matches('%'))
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%m/%d/%y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
    "%Y/%m/%d",
];

/// Parse common US date spellings into ISO-8601 (`YYYY-MM-DD`).
pub fn parse_date(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches('.');
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// Integral values become JSON integers so `125000` compares equal to `json!(125000)`.
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}
