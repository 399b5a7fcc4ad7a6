use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// A finalized team; the roster is frozen at creation
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Team {
    pub id: String,
    pub course_id: String,
    pub name: String,
    pub members: BTreeSet<String>,
    pub proposal_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Team {
    pub fn has_member(&self, student_id: &str) -> bool {
        self.members.contains(student_id)
    }
}
