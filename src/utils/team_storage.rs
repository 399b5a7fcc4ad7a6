// cohort-service/src/utils/team_storage.rs
use crate::models::{ServiceError, Team};
use crate::utils::json_storage;
use log::{error, info};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

// Durable state for finalized teams
pub trait TeamStore: Send + Sync {
    fn insert(&self, team: &Team) -> Result<(), ServiceError>;

    fn find(&self, id: &str) -> Result<Option<Team>, ServiceError>;

    fn delete(&self, id: &str) -> Result<bool, ServiceError>;

    fn list(&self) -> Result<Vec<Team>, ServiceError>;

    fn list_for_course(&self, course_id: &str) -> Result<Vec<Team>, ServiceError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|t| t.course_id == course_id)
            .collect())
    }

    fn find_for_student(&self, student_id: &str, course_id: &str) -> Result<Option<Team>, ServiceError> {
        Ok(self
            .list_for_course(course_id)?
            .into_iter()
            .find(|t| t.has_member(student_id)))
    }
}

#[derive(Default)]
pub struct MemoryTeamStore {
    teams: Mutex<HashMap<String, Team>>,
}

impl MemoryTeamStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Team>>, ServiceError> {
        self.teams.lock().map_err(|e| {
            error!("Team store lock poisoned: {:?}", e);
            ServiceError::InternalServerError
        })
    }
}

impl TeamStore for MemoryTeamStore {
    fn insert(&self, team: &Team) -> Result<(), ServiceError> {
        self.guard()?.insert(team.id.clone(), team.clone());
        Ok(())
    }

    fn find(&self, id: &str) -> Result<Option<Team>, ServiceError> {
        Ok(self.guard()?.get(id).cloned())
    }

    fn delete(&self, id: &str) -> Result<bool, ServiceError> {
        Ok(self.guard()?.remove(id).is_some())
    }

    fn list(&self) -> Result<Vec<Team>, ServiceError> {
        Ok(self.guard()?.values().cloned().collect())
    }
}

// One `<id>.json` per team under `<root>/teams`
pub struct FileTeamStore {
    dir: PathBuf,
}

impl FileTeamStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ServiceError> {
        let dir = root.into().join("teams");
        json_storage::ensure_dir(&dir)?;
        info!("Team store at {}", dir.display());
        Ok(Self { dir })
    }
}

impl TeamStore for FileTeamStore {
    fn insert(&self, team: &Team) -> Result<(), ServiceError> {
        json_storage::save_record(&self.dir, &team.id, team)?;
        info!("✅ Saved team: {}", team.id);
        Ok(())
    }

    fn find(&self, id: &str) -> Result<Option<Team>, ServiceError> {
        json_storage::load_record(&self.dir, id)
    }

    fn delete(&self, id: &str) -> Result<bool, ServiceError> {
        let deleted = json_storage::delete_record(&self.dir, id)?;
        if deleted {
            info!("✅ Deleted team: {}", id);
        }
        Ok(deleted)
    }

    fn list(&self) -> Result<Vec<Team>, ServiceError> {
        json_storage::load_all(&self.dir)
    }
}
