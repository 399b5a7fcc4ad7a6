// cohort-service/src/services/roster.rs
use crate::models::{RosterReport, RosterStatus, ServiceError, StudentRow};
use crate::services::directory::Directory;
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use std::collections::BTreeMap;

lazy_static! {
    static ref STUDENT_ID: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
}

const COLUMNS: [&str; 4] = ["id", "username", "name", "surname"];

// What the directory knows about one student with respect to a course
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StudentStanding {
    pub exists: bool,
    pub registered: bool,
    pub enrolled: bool,
}

impl StudentStanding {
    pub fn lookup(
        directory: &dyn Directory,
        student_id: &str,
        course_id: &str,
    ) -> Result<Self, ServiceError> {
        let student = match directory.student(student_id)? {
            Some(student) => student,
            None => {
                return Ok(Self { exists: false, registered: false, enrolled: false });
            }
        };
        Ok(Self {
            exists: true,
            registered: student.registered,
            enrolled: student.courses.contains(course_id),
        })
    }

    pub fn roster_status(&self) -> RosterStatus {
        if !self.exists {
            RosterStatus::NotFound
        } else if !self.registered {
            RosterStatus::Unregistered
        } else if self.enrolled {
            RosterStatus::AlreadyEnrolled
        } else {
            RosterStatus::Valid
        }
    }
}

// Classify every candidate against the directory; no state is touched
pub fn classify_roster(
    directory: &dyn Directory,
    course_id: &str,
    rows: Vec<StudentRow>,
) -> Result<RosterReport, ServiceError> {
    let mut statuses = BTreeMap::new();
    for row in &rows {
        let status = StudentStanding::lookup(directory, &row.id, course_id)?.roster_status();
        debug!("Roster row {} -> {:?}", row.id, status);
        statuses.insert(row.id.clone(), status);
    }
    Ok(RosterReport { statuses, students: rows })
}

/// Parse an `id,username,name,surname` upload. The header row is required
/// but columns may come in any order; only `id` is mandatory.
pub fn parse_roster_csv(text: &str) -> Result<Vec<StudentRow>, ServiceError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: csv::StringRecord = reader
        .headers()
        .map_err(|e| ServiceError::BadRequest(format!("unreadable roster header: {}", e)))?
        .iter()
        .map(|name| name.to_lowercase())
        .collect();
    if headers.iter().all(str::is_empty) {
        return Err(ServiceError::BadRequest("roster file is empty".to_string()));
    }
    for name in headers.iter().filter(|name| !COLUMNS.contains(name)) {
        warn!("Ignoring unknown roster column '{}'", name);
    }
    if !headers.iter().any(|name| name == "id") {
        return Err(ServiceError::BadRequest(
            "roster header must contain an 'id' column".to_string(),
        ));
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let mut record = result
            .map_err(|e| ServiceError::BadRequest(format!("malformed roster: {}", e)))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line_no = record.position().map_or(0, |position| position.line());
        // Short rows leave their trailing columns empty
        while record.len() < headers.len() {
            record.push_field("");
        }

        let row: StudentRow = record.deserialize(Some(&headers)).map_err(|e| {
            ServiceError::BadRequest(format!("line {}: {}", line_no, e))
        })?;
        if !STUDENT_ID.is_match(&row.id) {
            return Err(ServiceError::BadRequest(format!(
                "line {}: invalid student id '{}'",
                line_no, row.id
            )));
        }
        rows.push(row);
    }

    debug!("Parsed {} roster rows", rows.len());
    Ok(rows)
}
