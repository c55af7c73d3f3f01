//! Table interpretation: header/row pairs to records, and label/value
//! tables bucketed into income, expense, asset and liability lines.

use serde::Serialize;
use serde_json::{Map, Value};

use super::keys::normalize_key;
use super::patterns::{number_value, parse_currency};
use super::types::RawTable;

/// Convert a table into one JSON object per row, keyed by normalized header.
/// Cells that read as amounts become numbers.
pub fn table_to_records(table: &RawTable) -> Vec<Map<String, Value>> {
    let headers: Vec<String> = table
        .headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let key = normalize_key(h);
            if key.is_empty() {
                format!("column_{}", i + 1)
            } else {
                key
            }
        })
        .collect();

    table
        .rows
        .iter()
        .filter(|row| row.iter().any(|c| !c.trim().is_empty()))
        .map(|row| {
            let mut record = Map::new();
            for (i, header) in headers.iter().enumerate() {
                let cell = row.get(i).map(|c| c.trim()).unwrap_or("");
                let value = if cell.is_empty() {
                    Value::Null
                } else {
                    parse_currency(cell)
                        .map(number_value)
                        .unwrap_or_else(|| Value::String(cell.to_string()))
                };
                record.insert(header.clone(), value);
            }
            record
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Income,
    Expense,
    Asset,
    Liability,
}

impl Bucket {
    pub fn key(&self) -> &'static str {
        match self {
            Bucket::Income => "income",
            Bucket::Expense => "expense",
            Bucket::Asset => "asset",
            Bucket::Liability => "liability",
        }
    }
}

const LIABILITY_WORDS: &[&str] = &[
    "liabilit", "loan", "debt", "payable", "mortgage", "owed", "line of credit", "accrued",
];
const INCOME_WORDS: &[&str] = &[
    "income", "revenue", "sales", "receipt", "received", "proceeds", "program payment",
];
const EXPENSE_WORDS: &[&str] = &[
    "expense", "cost", "feed", "fertilizer", "seed", "fuel", "repair", "wage", "labor",
    "depreciation", "interest", "chemical", "insurance", "rent", "utilities", "supplies",
    "freight", "veterinary", "taxes",
];
const ASSET_WORDS: &[&str] = &[
    "asset", "cash", "inventory", "receivable", "land", "equipment", "machinery", "livestock",
    "building", "investment", "grain", "checking", "savings",
];
const TOTAL_WORDS: &[&str] = &["total", "gross", "net "];

/// Keyword bucket for a row label. Liabilities are checked first so
/// "equipment loan" is a liability, then income before expense so
/// "interest income" is income.
pub fn classify_label(label: &str) -> Option<Bucket> {
    let lower = label.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    if has(LIABILITY_WORDS) {
        Some(Bucket::Liability)
    } else if has(INCOME_WORDS) {
        Some(Bucket::Income)
    } else if has(EXPENSE_WORDS) {
        Some(Bucket::Expense)
    } else if has(ASSET_WORDS) {
        Some(Bucket::Asset)
    } else {
        None
    }
}

fn is_total_label(label: &str) -> bool {
    let lower = format!("{} ", label.to_lowercase());
    TOTAL_WORDS.iter().any(|w| lower.starts_with(w) || lower.contains(&format!(" {w}")))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BucketSummary {
    pub rows: Vec<BucketRow>,
    /// Total printed on the document, when one was found.
    pub reported_total: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketRow {
    pub label: String,
    pub amount: f64,
}

impl BucketSummary {
    /// Printed total wins over the sum of itemized rows.
    pub fn total(&self) -> f64 {
        self.reported_total
            .unwrap_or_else(|| self.rows.iter().map(|r| r.amount).sum())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinancialSummary {
    pub buckets: std::collections::BTreeMap<Bucket, BucketSummary>,
}

impl FinancialSummary {
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn total(&self, bucket: Bucket) -> Option<f64> {
        self.buckets.get(&bucket).map(|b| b.total())
    }

    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        for (bucket, summary) in &self.buckets {
            let rows: Vec<Value> = summary
                .rows
                .iter()
                .map(|r| serde_json::json!({"label": r.label, "amount": number_value(r.amount)}))
                .collect();
            out.insert(
                bucket.key().to_string(),
                serde_json::json!({"rows": rows, "total": number_value(summary.total())}),
            );
        }
        Value::Object(out)
    }
}

const LABEL_HEADERS: &[&str] = &["item", "description", "category", "account", "label", "line"];
const VALUE_HEADERS: &[&str] = &["amount", "value", "total", "balance", "usd"];

/// Locate the (label, value) column pair of a two-plus column table.
fn label_value_columns(table: &RawTable) -> Option<(usize, usize)> {
    let width = table.headers.len().max(table.rows.iter().map(|r| r.len()).max().unwrap_or(0));
    if width < 2 {
        return None;
    }
    let header = |i: usize| table.headers.get(i).map(|h| h.to_lowercase()).unwrap_or_default();

    let label_col = (0..width)
        .find(|&i| LABEL_HEADERS.iter().any(|w| header(i).contains(w)))
        .unwrap_or(0);

    let numeric_share = |i: usize| {
        let cells: Vec<&String> = table.rows.iter().filter_map(|r| r.get(i)).collect();
        if cells.is_empty() {
            return 0.0;
        }
        cells.iter().filter(|c| parse_currency(c).is_some()).count() as f64 / cells.len() as f64
    };

    let value_col = (0..width)
        .rev()
        .filter(|&i| i != label_col)
        .find(|&i| VALUE_HEADERS.iter().any(|w| header(i).contains(w)))
        .or_else(|| {
            (0..width)
                .rev()
                .filter(|&i| i != label_col)
                .find(|&i| numeric_share(i) >= 0.5)
        })?;

    Some((label_col, value_col))
}

/// Bucket every label/value row across all tables.
pub fn summarize_financial_tables(tables: &[RawTable]) -> FinancialSummary {
    let mut summary = FinancialSummary::default();
    for table in tables {
        let Some((label_col, value_col)) = label_value_columns(table) else {
            continue;
        };
        for row in &table.rows {
            let (Some(label), Some(cell)) = (row.get(label_col), row.get(value_col)) else {
                continue;
            };
            let Some(amount) = parse_currency(cell) else {
                continue;
            };
            let Some(bucket) = classify_label(label) else {
                continue;
            };
            let entry = summary.buckets.entry(bucket).or_default();
            if is_total_label(label) {
                entry.reported_total.get_or_insert(amount);
            } else {
                entry.rows.push(BucketRow {
                    label: label.trim().to_string(),
                    amount,
                });
            }
        }
    }
    summary
}
