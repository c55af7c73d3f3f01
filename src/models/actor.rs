use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ActorRole;

/// The person (or the pipeline itself) performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: ActorRole,
}

impl Actor {
    pub fn analyst(id: Uuid) -> Self {
        Self { id, role: ActorRole::Analyst }
    }

    pub fn auditor(id: Uuid) -> Self {
        Self { id, role: ActorRole::Auditor }
    }

    /// Fixed identity used for writes the pipeline makes on its own.
    pub fn system() -> Self {
        Self { id: Uuid::nil(), role: ActorRole::System }
    }
}
