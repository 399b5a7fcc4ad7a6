// cohort-service/src/services/directory.rs
use crate::models::{Course, DirectorySeed, ServiceError, Student, Team};
use log::{error, info, warn};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Source of truth for courses, students and enrollment. The formation
/// engine only reads from it, except for attaching and detaching teams.
pub trait Directory: Send + Sync {
    fn course(&self, course_id: &str) -> Result<Option<Course>, ServiceError>;

    fn student(&self, student_id: &str) -> Result<Option<Student>, ServiceError>;

    fn student_has_team(&self, student_id: &str, course_id: &str) -> Result<bool, ServiceError>;

    // Username -> student id
    fn resolve_creator(&self, username: &str) -> Result<Option<String>, ServiceError>;

    fn enrolled_students(&self, course_id: &str) -> Result<Vec<Student>, ServiceError>;

    fn attach_team(&self, team: &Team) -> Result<(), ServiceError>;

    fn detach_team(&self, team: &Team) -> Result<(), ServiceError>;

    fn course_exists(&self, course_id: &str) -> Result<bool, ServiceError> {
        Ok(self.course(course_id)?.is_some())
    }

    fn course_enabled(&self, course_id: &str) -> Result<bool, ServiceError> {
        Ok(self.course(course_id)?.map_or(false, |c| c.enabled))
    }

    fn course_bounds(&self, course_id: &str) -> Result<(usize, usize), ServiceError> {
        self.course(course_id)?
            .map(|c| (c.min_team_size, c.max_team_size))
            .ok_or_else(|| ServiceError::NotFound(format!("course '{}'", course_id)))
    }

    fn student_exists(&self, student_id: &str) -> Result<bool, ServiceError> {
        Ok(self.student(student_id)?.is_some())
    }

    fn student_registered(&self, student_id: &str) -> Result<bool, ServiceError> {
        Ok(self.student(student_id)?.map_or(false, |s| s.registered))
    }

    fn student_enrolled(&self, student_id: &str, course_id: &str) -> Result<bool, ServiceError> {
        Ok(self
            .student(student_id)?
            .map_or(false, |s| s.courses.contains(course_id)))
    }

    // Professors of the course and students enrolled in it
    fn is_authorized(&self, username: &str, course_id: &str) -> Result<bool, ServiceError> {
        let course = match self.course(course_id)? {
            Some(course) => course,
            None => return Ok(false),
        };
        if course.professors.contains(username) {
            return Ok(true);
        }
        match self.resolve_creator(username)? {
            Some(student_id) => self.student_enrolled(&student_id, course_id),
            None => Ok(false),
        }
    }

    fn is_professor(&self, username: &str, course_id: &str) -> Result<bool, ServiceError> {
        Ok(self
            .course(course_id)?
            .map_or(false, |c| c.professors.contains(username)))
    }
}

#[derive(Default)]
struct DirectoryData {
    courses: HashMap<String, Course>,
    students: HashMap<String, Student>,
    // (course id, student id) -> team id
    teams: HashMap<(String, String), String>,
}

#[derive(Default)]
pub struct InMemoryDirectory {
    data: RwLock<DirectoryData>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: DirectorySeed) -> Result<Self, ServiceError> {
        let directory = Self::new();
        for course in seed.courses {
            directory.upsert_course(course)?;
        }
        for student in seed.students {
            directory.upsert_student(student)?;
        }
        Ok(directory)
    }

    // A missing seed file yields an empty directory
    pub fn load(path: &Path) -> Result<Self, ServiceError> {
        if !path.exists() {
            warn!("Directory seed {} not found, starting empty", path.display());
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            error!("Failed to read directory seed {}: {:?}", path.display(), e);
            ServiceError::InternalServerError
        })?;
        let seed: DirectorySeed = serde_json::from_str(&content).map_err(|e| {
            error!("Failed to parse directory seed {}: {:?}", path.display(), e);
            ServiceError::BadRequest(format!("invalid directory seed: {}", e))
        })?;

        info!(
            "📚 Loaded directory seed: {} courses, {} students",
            seed.courses.len(),
            seed.students.len()
        );
        Self::from_seed(seed)
    }

    pub fn upsert_course(&self, course: Course) -> Result<(), ServiceError> {
        course.validate_bounds()?;
        self.write()?.courses.insert(course.id.clone(), course);
        Ok(())
    }

    pub fn upsert_student(&self, student: Student) -> Result<(), ServiceError> {
        self.write()?.students.insert(student.id.clone(), student);
        Ok(())
    }

    pub fn enroll(&self, student_id: &str, course_id: &str) -> Result<(), ServiceError> {
        let mut data = self.write()?;
        if !data.courses.contains_key(course_id) {
            return Err(ServiceError::NotFound(format!("course '{}'", course_id)));
        }
        let student = data
            .students
            .get_mut(student_id)
            .ok_or_else(|| ServiceError::NotFound(format!("student '{}'", student_id)))?;
        student.courses.insert(course_id.to_string());
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, DirectoryData>, ServiceError> {
        self.data.read().map_err(|e| {
            error!("Directory lock poisoned: {:?}", e);
            ServiceError::InternalServerError
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, DirectoryData>, ServiceError> {
        self.data.write().map_err(|e| {
            error!("Directory lock poisoned: {:?}", e);
            ServiceError::InternalServerError
        })
    }
}

impl Directory for InMemoryDirectory {
    fn course(&self, course_id: &str) -> Result<Option<Course>, ServiceError> {
        Ok(self.read()?.courses.get(course_id).cloned())
    }

    fn student(&self, student_id: &str) -> Result<Option<Student>, ServiceError> {
        Ok(self.read()?.students.get(student_id).cloned())
    }

    fn student_has_team(&self, student_id: &str, course_id: &str) -> Result<bool, ServiceError> {
        Ok(self
            .read()?
            .teams
            .contains_key(&(course_id.to_string(), student_id.to_string())))
    }

    fn resolve_creator(&self, username: &str) -> Result<Option<String>, ServiceError> {
        Ok(self
            .read()?
            .students
            .values()
            .find(|s| s.username == username)
            .map(|s| s.id.clone()))
    }

    fn enrolled_students(&self, course_id: &str) -> Result<Vec<Student>, ServiceError> {
        let mut students: Vec<Student> = self
            .read()?
            .students
            .values()
            .filter(|s| s.courses.contains(course_id))
            .cloned()
            .collect();
        students.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(students)
    }

    fn attach_team(&self, team: &Team) -> Result<(), ServiceError> {
        let mut data = self.write()?;
        for member in &team.members {
            data.teams
                .insert((team.course_id.clone(), member.clone()), team.id.clone());
        }
        Ok(())
    }

    fn detach_team(&self, team: &Team) -> Result<(), ServiceError> {
        let mut data = self.write()?;
        data.teams.retain(|(course_id, _), team_id| {
            !(course_id == &team.course_id && team_id == &team.id)
        });
        Ok(())
    }
}
