//! Expected field shape per document type.
//!
//! Schemas are static tables. Normalization validates against them and the
//! pattern extractors use the field kinds to decide how to coerce raw text.

use serde::Serialize;

use crate::models::enums::DocumentType;

/// Value shape a schema field expects after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Identifier,
    Date,
    Currency,
    Number,
    Percentage,
    Address,
    Email,
    Phone,
    Table,
    Object,
}

impl FieldKind {
    /// Whether a normalized JSON value has the right shape for this kind.
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value;
        match self {
            FieldKind::Text | FieldKind::Identifier | FieldKind::Date | FieldKind::Email | FieldKind::Phone => {
                value.is_string()
            }
            FieldKind::Currency | FieldKind::Number | FieldKind::Percentage => value.is_number(),
            FieldKind::Address => matches!(value, Value::String(_) | Value::Object(_)),
            FieldKind::Table => value.is_array(),
            FieldKind::Object => value.is_object(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

const fn req(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind, required: true }
}

const fn opt(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind, required: false }
}

#[derive(Debug, Serialize)]
pub struct DocumentSchema {
    pub doc_type: DocumentType,
    pub fields: &'static [FieldSpec],
}

impl DocumentSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }
}

use FieldKind::*;

static DRIVERS_LICENSE: DocumentSchema = DocumentSchema {
    doc_type: DocumentType::DriversLicense,
    fields: &[
        req("full_name", Text),
        req("license_number", Identifier),
        req("date_of_birth", Date),
        req("address", Address),
        req("expiration_date", Date),
        opt("issue_date", Date),
        opt("issuing_state", Text),
    ],
};

static SCHEDULE_F: DocumentSchema = DocumentSchema {
    doc_type: DocumentType::ScheduleF,
    fields: &[
        req("tax_year", Number),
        opt("farm_name", Text),
        opt("employer_id", Identifier),
        opt("principal_product", Text),
        req("gross_income", Currency),
        req("total_expenses", Currency),
        req("net_profit_loss", Currency),
        opt("financial_summary", Object),
    ],
};

static FORM_1040: DocumentSchema = DocumentSchema {
    doc_type: DocumentType::Form1040,
    fields: &[
        req("tax_year", Number),
        req("taxpayer_name", Text),
        opt("filing_status", Text),
        opt("ssn_last_four", Identifier),
        opt("total_income", Currency),
        req("adjusted_gross_income", Currency),
        opt("taxable_income", Currency),
        opt("total_tax", Currency),
        opt("phone", Phone),
        opt("email", Email),
    ],
};

static BANK_STATEMENT: DocumentSchema = DocumentSchema {
    doc_type: DocumentType::BankStatement,
    fields: &[
        req("account_holder", Text),
        req("bank_name", Text),
        req("account_number", Identifier),
        opt("statement_period_start", Date),
        req("statement_period_end", Date),
        opt("beginning_balance", Currency),
        req("ending_balance", Currency),
        opt("transactions", Table),
    ],
};

static BALANCE_SHEET: DocumentSchema = DocumentSchema {
    doc_type: DocumentType::BalanceSheet,
    fields: &[
        req("as_of_date", Date),
        opt("entity_name", Text),
        opt("current_assets", Currency),
        opt("current_liabilities", Currency),
        req("total_assets", Currency),
        req("total_liabilities", Currency),
        req("net_worth", Currency),
        opt("financial_summary", Object),
    ],
};

static LEASE_AGREEMENT: DocumentSchema = DocumentSchema {
    doc_type: DocumentType::LeaseAgreement,
    fields: &[
        req("lessor_name", Text),
        req("lessee_name", Text),
        opt("property_description", Text),
        req("total_acres", Number),
        req("annual_rent", Currency),
        req("lease_start_date", Date),
        req("lease_end_date", Date),
    ],
};

static LAND_DEED: DocumentSchema = DocumentSchema {
    doc_type: DocumentType::LandDeed,
    fields: &[
        req("grantor", Text),
        req("grantee", Text),
        req("legal_description", Text),
        opt("parcel_number", Identifier),
        opt("county", Text),
        req("total_acres", Number),
        opt("recording_date", Date),
    ],
};

static CROP_INSURANCE: DocumentSchema = DocumentSchema {
    doc_type: DocumentType::CropInsurance,
    fields: &[
        req("policy_number", Identifier),
        req("insured_name", Text),
        opt("insurance_provider", Text),
        req("crop_year", Number),
        req("coverage_level", Percentage),
        opt("liability_amount", Currency),
        opt("insured_crops", Table),
    ],
};

static EQUIPMENT_INVENTORY: DocumentSchema = DocumentSchema {
    doc_type: DocumentType::EquipmentInventory,
    fields: &[
        opt("owner_name", Text),
        opt("as_of_date", Date),
        req("equipment_items", Table),
        req("total_value", Currency),
    ],
};

/// Static schema for a document type.
pub fn schema_for(doc_type: DocumentType) -> &'static DocumentSchema {
    match doc_type {
        DocumentType::DriversLicense => &DRIVERS_LICENSE,
        DocumentType::ScheduleF => &SCHEDULE_F,
        DocumentType::Form1040 => &FORM_1040,
        DocumentType::BankStatement => &BANK_STATEMENT,
        DocumentType::BalanceSheet => &BALANCE_SHEET,
        DocumentType::LeaseAgreement => &LEASE_AGREEMENT,
        DocumentType::LandDeed => &LAND_DEED,
        DocumentType::CropInsurance => &CROP_INSURANCE,
        DocumentType::EquipmentInventory => &EQUIPMENT_INVENTORY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_type_has_a_schema_with_required_fields() {
        for doc_type in DocumentType::all() {
            let schema = schema_for(*doc_type);
            assert_eq!(schema.doc_type, *doc_type);
            assert!(schema.required_fields().count() > 0, "{doc_type} has no required fields");
        }
    }

    #[test]
    fn field_names_unique_per_schema() {
        for doc_type in DocumentType::all() {
            let schema = schema_for(*doc_type);
            let mut names: Vec<_> = schema.fields.iter().map(|f| f.name).collect();
            names.sort();
            names.dedup();
            assert_eq!(names.len(), schema.fields.len(), "duplicate field in {doc_type}");
        }
    }

    #[test]
    fn kind_acceptance() {
        assert!(Currency.accepts(&json!(125000)));
        assert!(!Currency.accepts(&json!("125,000")));
        assert!(Address.accepts(&json!({"city": "Ames"})));
        assert!(Address.accepts(&json!("1 Main St, Ames, IA 50010")));
        assert!(Table.accepts(&json!([])));
        assert!(!Date.accepts(&json!(20240101)));
    }
}
