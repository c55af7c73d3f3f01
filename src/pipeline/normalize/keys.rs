use serde_json::{Map, Value};

/// Spelling variants seen in engine output, mapped to schema names.
const KEY_ALIASES: &[(&str, &str)] = &[
    ("dob", "date_of_birth"),
    ("birth_date", "date_of_birth"),
    ("name", "full_name"),
    ("dl_number", "license_number"),
    ("license_no", "license_number"),
    ("dl_no", "license_number"),
    ("exp_date", "expiration_date"),
    ("expires", "expiration_date"),
    ("net_profit", "net_profit_loss"),
    ("net_farm_profit_or_loss", "net_profit_loss"),
    ("net_profit_or_loss", "net_profit_loss"),
    ("gross_farm_income", "gross_income"),
    ("total_farm_expenses", "total_expenses"),
    ("agi", "adjusted_gross_income"),
    ("ein", "employer_id"),
    ("acct_number", "account_number"),
    ("account_no", "account_number"),
    ("closing_balance", "ending_balance"),
    ("opening_balance", "beginning_balance"),
    ("acres", "total_acres"),
    ("acreage", "total_acres"),
    ("landlord", "lessor_name"),
    ("tenant", "lessee_name"),
    ("apn", "parcel_number"),
    ("policy_no", "policy_number"),
    ("coverage", "coverage_level"),
    ("equity", "net_worth"),
];

/// Lowercase, collapse runs of non-alphanumerics to `_`, trim, then alias.
pub fn normalize_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }

    KEY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == out)
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or(out)
}

/// Apply `normalize_key` to every object key, recursing into arrays.
pub fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(normalize_object(map)),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

pub fn normalize_object(map: Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in map {
        let key = normalize_key(&key);
        if key.is_empty() {
            continue;
        }
        // First spelling wins when two raw keys collapse to the same name.
        out.entry(key).or_insert_with(|| normalize_keys(value));
    }
    out
}
