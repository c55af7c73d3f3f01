use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ApplicationStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub certified_by: Option<Uuid>,
    pub certified_at: Option<DateTime<Utc>>,
}

impl Application {
    /// Fresh draft owned by `owner_id`.
    pub fn new(owner_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            status: ApplicationStatus::Draft,
            created_at: now,
            updated_at: now,
            certified_by: None,
            certified_at: None,
        }
    }

    /// Field data is frozen once the application is certified.
    pub fn accepts_field_edits(&self) -> bool {
        !matches!(
            self.status,
            ApplicationStatus::Certified | ApplicationStatus::Locked
        )
    }
}
