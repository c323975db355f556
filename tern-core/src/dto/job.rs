//! Job-creation DTOs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::JobKind;
use crate::domain::refs::Refs;

/// Request to create one CI job: a template bound to the refs of one
/// proposal, plus the merged label set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub kind: JobKind,
    /// Template name.
    pub job: String,
    pub refs: Refs,
    /// Template labels merged with the controller-managed ones.
    pub labels: BTreeMap<String, String>,
    /// Provenance of the request (change id, instance).
    pub annotations: BTreeMap<String, String>,
}

/// Scheduler's acknowledgement of a created job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: Uuid,
    pub job: String,
}
