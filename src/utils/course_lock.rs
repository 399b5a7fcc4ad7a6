use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use log::{debug, error};

use crate::models::ServiceError;

/// Registry of per-course mutual exclusion.
///
/// Every proposal status transition in a course (creation checks,
/// responses, finalization, sweeping) runs while holding that course's
/// lock; courses never contend with each other.
#[derive(Clone, Default)]
pub struct CourseLockRegistry {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl CourseLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, course_id: &str) -> Result<Arc<Mutex<()>>, ServiceError> {
        let mut locks = self.locks.lock().map_err(|e| {
            error!("Course lock registry poisoned: {:?}", e);
            ServiceError::InternalServerError
        })?;
        Ok(Arc::clone(
            locks.entry(course_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))),
        ))
    }

    // Run `f` while holding the lock of `course_id`
    pub fn with_course<R>(
        &self,
        course_id: &str,
        f: impl FnOnce() -> Result<R, ServiceError>,
    ) -> Result<R, ServiceError> {
        let lock = self.entry(course_id)?;
        // A panic inside a previous holder leaves no partial state behind the
        // unit value, so poisoning is ignored
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        debug!("Holding course lock for {}", course_id);
        f()
    }

    // Drop entries nobody is holding or waiting on
    pub fn cleanup_idle(&self) -> Result<usize, ServiceError> {
        let mut locks = self.locks.lock().map_err(|e| {
            error!("Course lock registry poisoned: {:?}", e);
            ServiceError::InternalServerError
        })?;
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        let removed = before - locks.len();

        if removed > 0 {
            debug!("Removed {} idle course locks", removed);
        }

        Ok(removed)
    }

    pub fn tracked_courses(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}
