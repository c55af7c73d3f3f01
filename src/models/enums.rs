use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }

            pub fn all() -> &'static [$name] {
                &[$(Self::$variant),+]
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(ApplicationStatus {
    Draft => "draft",
    AwaitingDocuments => "awaiting_documents",
    AwaitingAudit => "awaiting_audit",
    Certified => "certified",
    Locked => "locked",
});

str_enum!(DocumentStatus {
    Pending => "pending",
    Uploaded => "uploaded",
    Processing => "processing",
    Completed => "completed",
    Failed => "failed",
    ManualEntry => "manual_entry",
    Audited => "audited",
});

str_enum!(DocumentType {
    DriversLicense => "drivers_license",
    ScheduleF => "schedule_f",
    Form1040 => "form_1040",
    BankStatement => "bank_statement",
    BalanceSheet => "balance_sheet",
    LeaseAgreement => "lease_agreement",
    LandDeed => "land_deed",
    CropInsurance => "crop_insurance",
    EquipmentInventory => "equipment_inventory",
});

str_enum!(ModuleId {
    M1 => "m1",
    M2 => "m2",
    M3 => "m3",
    M4 => "m4",
});

str_enum!(FieldSource {
    AiExtracted => "ai_extracted",
    ProxyEntered => "proxy_entered",
    ProxyEdited => "proxy_edited",
    AuditorVerified => "auditor_verified",
});

str_enum!(Justification {
    OcrCorrection => "ocr_correction",
    SourceVerified => "source_verified",
    ApplicantClarification => "applicant_clarification",
    DataEntryCorrection => "data_entry_correction",
    Other => "other",
});

str_enum!(AuditAction {
    FieldUpdate => "field_update",
    FieldOverride => "field_override",
    FieldVerified => "field_verified",
    StatusChange => "status_change",
    DocumentStatusChange => "document_status_change",
    DocumentUploaded => "document_uploaded",
    DocumentAudited => "document_audited",
    CertificationApproved => "certification_approved",
    AutoAcceptBatch => "auto_accept_batch",
    AuditRequested => "audit_requested",
});

str_enum!(ActorRole {
    Analyst => "analyst",
    Auditor => "auditor",
    System => "system",
});

impl ModuleId {
    /// Human-readable section name.
    pub fn title(&self) -> &'static str {
        match self {
            Self::M1 => "Identity",
            Self::M2 => "Lands",
            Self::M3 => "Financial",
            Self::M4 => "Operations",
        }
    }
}

impl FieldSource {
    /// Human-entered or human-verified values outrank any automated write.
    pub fn is_human(&self) -> bool {
        matches!(
            self,
            Self::ProxyEntered | Self::ProxyEdited | Self::AuditorVerified
        )
    }
}

impl AuditAction {
    /// Actions that count as a human having looked at a specific field.
    pub fn is_field_review(&self) -> bool {
        matches!(self, Self::FieldOverride | Self::FieldVerified)
    }
}

impl DocumentStatus {
    /// Forward edges of the document lifecycle.
    ///
    /// `Failed -> ManualEntry` is listed here but is additionally gated by the
    /// failure counter in the processor.
    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        matches!(
            (*self, next),
            (Pending, Uploaded)
                | (Uploaded, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Processing)
                | (Completed, Audited)
                | (Failed, Processing)
                | (Failed, ManualEntry)
                | (ManualEntry, Audited)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn application_status_round_trip() {
        for status in ApplicationStatus::all() {
            assert_eq!(ApplicationStatus::from_str(status.as_str()).unwrap(), *status);
        }
    }

    #[test]
    fn document_type_round_trip() {
        assert_eq!(DocumentType::all().len(), 9);
        for (variant, s) in [
            (DocumentType::DriversLicense, "drivers_license"),
            (DocumentType::ScheduleF, "schedule_f"),
            (DocumentType::LeaseAgreement, "lease_agreement"),
            (DocumentType::EquipmentInventory, "equipment_inventory"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(DocumentType::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn serde_matches_as_str() {
        let json = serde_json::to_string(&FieldSource::AuditorVerified).unwrap();
        assert_eq!(json, "\"auditor_verified\"");
        let json = serde_json::to_string(&DocumentStatus::ManualEntry).unwrap();
        assert_eq!(json, "\"manual_entry\"");
        let parsed: ModuleId = serde_json::from_str("\"m3\"").unwrap();
        assert_eq!(parsed, ModuleId::M3);
        let json = serde_json::to_string(&DocumentType::Form1040).unwrap();
        assert_eq!(json, "\"form_1040\"");
        assert!(serde_json::from_str::<DocumentType>("\"w2\"").is_err());
    }

    #[test]
    fn human_sources() {
        assert!(!FieldSource::AiExtracted.is_human());
        assert!(FieldSource::ProxyEntered.is_human());
        assert!(FieldSource::ProxyEdited.is_human());
        assert!(FieldSource::AuditorVerified.is_human());
    }

    #[test]
    fn document_lifecycle_edges() {
        use DocumentStatus::*;
        assert!(Pending.can_transition_to(Uploaded));
        assert!(Processing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(ManualEntry));
        assert!(ManualEntry.can_transition_to(Audited));
        assert!(!Pending.can_transition_to(Processing));
        assert!(!Processing.can_transition_to(Processing));
        assert!(!Audited.can_transition_to(Processing));
        for next in DocumentStatus::all() {
            assert!(!Audited.can_transition_to(*next));
        }
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(DocumentType::from_str("w2").is_err());
        assert!(ApplicationStatus::from_str("approved").is_err());
        assert!(Justification::from_str("").is_err());
    }
}
