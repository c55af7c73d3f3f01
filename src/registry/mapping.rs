//! Versioned field-mapping configuration.
//!
//! Per document type: which module fields each extracted value feeds, the
//! optional transform applied on the way in, whether the target is declared
//! required, and how collisions with existing values are resolved.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::RegistryError;
use crate::models::enums::{DocumentType, ModuleId};

pub const DEFAULT_AUTO_ACCEPT_THRESHOLD: f64 = 0.90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Replace only when the incoming confidence is strictly higher.
    HighestConfidence,
    /// Always replace automated values.
    MostRecent,
    /// Never replace; a human resolves the conflict.
    ManualReview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    Date,
    Currency,
    Percentage,
    Boolean,
    Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldTarget {
    pub module: ModuleId,
    pub field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Dotted path into the normalized field map (`address.city`).
    pub source_path: String,
    pub targets: Vec<FieldTarget>,
    #[serde(default)]
    pub transform: Option<TransformKind>,
    #[serde(default)]
    pub required: bool,
}

impl FieldMapping {
    /// First path segment, i.e. the top-level extracted field.
    pub fn root_field(&self) -> &str {
        self.source_path.split('.').next().unwrap_or(&self.source_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMapping {
    pub conflict_strategy: ConflictStrategy,
    pub fields: Vec<FieldMapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoAcceptSettings {
    pub enabled: bool,
    pub threshold: f64,
    /// Per-field threshold overrides, keyed by extracted field name.
    #[serde(default)]
    pub field_thresholds: HashMap<String, f64>,
}

impl Default for AutoAcceptSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: DEFAULT_AUTO_ACCEPT_THRESHOLD,
            field_thresholds: HashMap::new(),
        }
    }
}

impl AutoAcceptSettings {
    pub fn threshold_for(&self, field_name: &str) -> f64 {
        self.field_thresholds
            .get(field_name)
            .copied()
            .unwrap_or(self.threshold)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    pub version: u32,
    #[serde(default)]
    pub auto_accept: AutoAcceptSettings,
    pub documents: BTreeMap<DocumentType, DocumentMapping>,
}

impl MappingConfig {
    /// Parse and validate a JSON mapping file.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let raw = std::fs::read_to_string(path)?;
        let config: MappingConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        tracing::info!(
            version = config.version,
            document_types = config.documents.len(),
            path = %path.display(),
            "Loaded mapping configuration"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.version == 0 {
            return Err(RegistryError::Invalid("version must be greater than 0".into()));
        }
        let thresholds = std::iter::once(self.auto_accept.threshold)
            .chain(self.auto_accept.field_thresholds.values().copied());
        for t in thresholds {
            if !(0.0..=1.0).contains(&t) {
                return Err(RegistryError::Invalid(format!("threshold {t} outside [0, 1]")));
            }
        }
        for (doc_type, mapping) in &self.documents {
            let mut seen: HashSet<&FieldTarget> = HashSet::new();
            for field in &mapping.fields {
                if field.source_path.trim().is_empty() {
                    return Err(RegistryError::Invalid(format!("{doc_type}: empty source path")));
                }
                if field.targets.is_empty() {
                    return Err(RegistryError::Invalid(format!(
                        "{doc_type}: {} has no targets",
                        field.source_path
                    )));
                }
                for target in &field.targets {
                    if !seen.insert(target) {
                        return Err(RegistryError::Invalid(format!(
                            "{doc_type}: target {}.{} mapped twice",
                            target.module, target.field
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn for_document(&self, doc_type: DocumentType) -> Option<&DocumentMapping> {
        self.documents.get(&doc_type)
    }

    /// Module fields declared required by the mappings of the given document types.
    pub fn declared_required<'a>(
        &'a self,
        doc_types: impl IntoIterator<Item = DocumentType>,
    ) -> HashSet<&'a FieldTarget> {
        doc_types
            .into_iter()
            .filter_map(|t| self.documents.get(&t))
            .flat_map(|m| m.fields.iter())
            .filter(|f| f.required)
            .flat_map(|f| f.targets.iter())
            .collect()
    }

    /// Built-in mapping used when no file is configured.
    pub fn builtin() -> Self {
        use ConflictStrategy::*;
        use DocumentType as D;
        use ModuleId::*;
        use TransformKind as T;

        let mut documents = BTreeMap::new();
        documents.insert(
            D::DriversLicense,
            DocumentMapping {
                conflict_strategy: HighestConfidence,
                fields: vec![
                    map("full_name", &[(M1, "applicant_name")], None, true),
                    map("license_number", &[(M1, "drivers_license_number")], None, true),
                    map("date_of_birth", &[(M1, "date_of_birth")], Some(T::Date), true),
                    map("address", &[(M1, "mailing_address")], Some(T::Address), true),
                    map("expiration_date", &[(M1, "license_expiration")], Some(T::Date), false),
                ],
            },
        );
        documents.insert(
            D::ScheduleF,
            DocumentMapping {
                conflict_strategy: HighestConfidence,
                fields: vec![
                    map("tax_year", &[(M3, "tax_year")], None, false),
                    map("gross_income", &[(M3, "gross_income")], Some(T::Currency), true),
                    map("total_expenses", &[(M3, "total_expenses")], Some(T::Currency), true),
                    map("net_profit_loss", &[(M3, "net_profit_loss")], Some(T::Currency), true),
                    map("principal_product", &[(M4, "principal_product")], None, false),
                ],
            },
        );
        documents.insert(
            D::Form1040,
            DocumentMapping {
                conflict_strategy: HighestConfidence,
                fields: vec![
                    map("taxpayer_name", &[(M1, "applicant_name")], None, false),
                    map("filing_status", &[(M1, "filing_status")], None, false),
                    map("adjusted_gross_income", &[(M3, "adjusted_gross_income")], Some(T::Currency), true),
                    map("total_income", &[(M3, "total_income")], Some(T::Currency), false),
                    map("taxable_income", &[(M3, "taxable_income")], Some(T::Currency), false),
                ],
            },
        );
        documents.insert(
            D::BankStatement,
            DocumentMapping {
                conflict_strategy: MostRecent,
                fields: vec![
                    map("bank_name", &[(M3, "bank_name")], None, false),
                    map("ending_balance", &[(M3, "cash_on_hand")], Some(T::Currency), true),
                    map("statement_period_end", &[(M3, "cash_balance_date")], Some(T::Date), false),
                ],
            },
        );
        documents.insert(
            D::BalanceSheet,
            DocumentMapping {
                conflict_strategy: HighestConfidence,
                fields: vec![
                    map("as_of_date", &[(M3, "balance_sheet_date")], Some(T::Date), false),
                    map("total_assets", &[(M3, "total_assets")], Some(T::Currency), true),
                    map("total_liabilities", &[(M3, "total_liabilities")], Some(T::Currency), true),
                    map("net_worth", &[(M3, "net_worth")], Some(T::Currency), true),
                ],
            },
        );
        documents.insert(
            D::LeaseAgreement,
            DocumentMapping {
                conflict_strategy: HighestConfidence,
                fields: vec![
                    map("lessor_name", &[(M2, "landlord_name")], None, false),
                    map("total_acres", &[(M2, "leased_acres")], None, true),
                    map("annual_rent", &[(M2, "annual_rent")], Some(T::Currency), true),
                    map("lease_end_date", &[(M2, "lease_expiration")], Some(T::Date), true),
                ],
            },
        );
        documents.insert(
            D::LandDeed,
            DocumentMapping {
                conflict_strategy: ManualReview,
                fields: vec![
                    map("legal_description", &[(M2, "legal_description")], None, true),
                    map("total_acres", &[(M2, "owned_acres")], None, true),
                    map("parcel_number", &[(M2, "parcel_number")], None, false),
                    map("county", &[(M2, "county")], None, false),
                ],
            },
        );
        documents.insert(
            D::CropInsurance,
            DocumentMapping {
                conflict_strategy: MostRecent,
                fields: vec![
                    map("policy_number", &[(M4, "crop_insurance_policy")], None, true),
                    map("coverage_level", &[(M4, "coverage_level")], Some(T::Percentage), true),
                    map("crop_year", &[(M4, "crop_year")], None, false),
                    map("insured_crops", &[(M4, "insured_crops")], None, false),
                ],
            },
        );
        documents.insert(
            D::EquipmentInventory,
            DocumentMapping {
                conflict_strategy: MostRecent,
                fields: vec![
                    map("equipment_items", &[(M4, "equipment_items")], None, false),
                    map("total_value", &[(M4, "equipment_total_value")], Some(T::Currency), true),
                ],
            },
        );

        MappingConfig {
            version: 1,
            auto_accept: AutoAcceptSettings::default(),
            documents,
        }
    }
}

fn map(
    source_path: &str,
    targets: &[(ModuleId, &str)],
    transform: Option<TransformKind>,
    required: bool,
) -> FieldMapping {
    FieldMapping {
        source_path: source_path.into(),
        targets: targets
            .iter()
            .map(|(module, field)| FieldTarget {
                module: *module,
                field: (*field).into(),
            })
            .collect(),
        transform,
        required,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_is_valid_and_covers_every_type() {
        let config = MappingConfig::builtin();
        config.validate().unwrap();
        for doc_type in DocumentType::all() {
            assert!(config.for_document(*doc_type).is_some(), "no mapping for {doc_type}");
        }
    }

    #[test]
    fn zero_version_rejected() {
        let mut config = MappingConfig::builtin();
        config.version = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_target_rejected() {
        let mut config = MappingConfig::builtin();
        let mapping = config.documents.get_mut(&DocumentType::ScheduleF).unwrap();
        mapping.fields.push(map("farm_name", &[(ModuleId::M3, "gross_income")], None, false));
        assert!(matches!(config.validate(), Err(RegistryError::Invalid(_))));
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let mut config = MappingConfig::builtin();
        config.auto_accept.field_thresholds.insert("gross_income".into(), 1.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn per_field_threshold_override() {
        let mut settings = AutoAcceptSettings::default();
        settings.field_thresholds.insert("net_worth".into(), 0.95);
        assert_eq!(settings.threshold_for("net_worth"), 0.95);
        assert_eq!(settings.threshold_for("gross_income"), DEFAULT_AUTO_ACCEPT_THRESHOLD);
    }

    #[test]
    fn declared_required_scoped_to_present_types() {
        let config = MappingConfig::builtin();
        let required = config.declared_required([DocumentType::ScheduleF]);
        assert!(required.contains(&FieldTarget { module: ModuleId::M3, field: "net_profit_loss".into() }));
        assert!(!required.iter().any(|t| t.module == ModuleId::M1));
    }

    #[test]
    fn json_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        let config = MappingConfig::builtin();
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = MappingConfig::load(&path).unwrap();
        assert_eq!(loaded.version, config.version);
        assert_eq!(loaded.documents.len(), 9);
        assert_eq!(
            loaded.for_document(DocumentType::LandDeed).unwrap().conflict_strategy,
            ConflictStrategy::ManualReview
        );
    }
}
