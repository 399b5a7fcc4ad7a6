// cohort-service/src/models/directory.rs
use crate::models::ServiceError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// Team size limits any course may configure
pub const MIN_SIZE_FOR_GROUP: usize = 2;
pub const MAX_SIZE_FOR_GROUP: usize = 10;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Course {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub min_team_size: usize,
    pub max_team_size: usize,
    #[serde(default)]
    pub professors: BTreeSet<String>, // usernames
}

impl Course {
    pub fn validate_bounds(&self) -> Result<(), ServiceError> {
        if self.min_team_size < MIN_SIZE_FOR_GROUP
            || self.max_team_size > MAX_SIZE_FOR_GROUP
            || self.min_team_size > self.max_team_size
        {
            return Err(ServiceError::BadRequest(format!(
                "Course '{}' team size bounds [{}, {}] must lie within [{}, {}]",
                self.id, self.min_team_size, self.max_team_size, MIN_SIZE_FOR_GROUP, MAX_SIZE_FOR_GROUP
            )));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Student {
    pub id: String,
    pub username: String,
    pub name: String,
    pub surname: String,
    pub registered: bool,
    #[serde(default)]
    pub courses: BTreeSet<String>,
}

// Seed file layout for the in-memory directory
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct DirectorySeed {
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default)]
    pub students: Vec<Student>,
}

// One parsed row of a roster upload
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StudentRow {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub surname: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RosterStatus {
    Valid,
    AlreadyEnrolled,
    Unregistered,
    NotFound,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RosterReport {
    pub statuses: BTreeMap<String, RosterStatus>,
    pub students: Vec<StudentRow>,
}
