use crate::models::{CallerRole, ServiceError};
use crate::routes::proposal_routes::ensure_self_or_professor;
use crate::services::formation::TeamFormationEngine;
use crate::utils::{get_claims_from_request, require_role};
use actix_web::{delete, get, web, HttpRequest, HttpResponse};
use log::info;
use serde_json::json;

// Get all teams of a course
#[get("/courses/{course_id}/teams")]
async fn get_course_teams(
    req: HttpRequest,
    engine: web::Data<TeamFormationEngine>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let claims = get_claims_from_request(&req)?;
    let course_id = path.into_inner();

    let teams = engine.teams_for_course(&course_id, &claims.sub)?;
    info!("✅ Found {} teams in course {}", teams.len(), course_id);

    Ok(HttpResponse::Ok().json(teams))
}

// Students of the course that already belong to a team
#[get("/courses/{course_id}/teams/members")]
async fn get_teamed_students(
    req: HttpRequest,
    engine: web::Data<TeamFormationEngine>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let claims = get_claims_from_request(&req)?;
    let students = engine.students_in_teams(&path.into_inner(), &claims.sub)?;
    Ok(HttpResponse::Ok().json(students))
}

// Students of the course still free to form a team
#[get("/courses/{course_id}/available")]
async fn get_available_students(
    req: HttpRequest,
    engine: web::Data<TeamFormationEngine>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let claims = get_claims_from_request(&req)?;
    let students = engine.available_students(&path.into_inner(), &claims.sub)?;
    Ok(HttpResponse::Ok().json(students))
}

#[get("/students/{student_id}/courses/{course_id}/team")]
async fn get_student_team(
    req: HttpRequest,
    engine: web::Data<TeamFormationEngine>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ServiceError> {
    let claims = get_claims_from_request(&req)?;
    let (student_id, course_id) = path.into_inner();
    ensure_self_or_professor(&engine, &claims, &student_id)?;

    match engine.team_for_student(&student_id, &course_id)? {
        Some(team) => Ok(HttpResponse::Ok().json(team)),
        None => Err(ServiceError::NotFound(format!(
            "team of student '{}' in course '{}'",
            student_id, course_id
        ))),
    }
}

// Delete a team
#[delete("/teams/{team_id}")]
async fn delete_team(
    req: HttpRequest,
    engine: web::Data<TeamFormationEngine>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let claims = get_claims_from_request(&req)?;
    require_role(&claims, CallerRole::Professor)?;
    let team_id = path.into_inner();

    engine.delete_team(&team_id, &claims.sub)?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Team deleted successfully",
        "team_id": team_id
    })))
}

// Register all team routes
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(get_teamed_students)
        .service(get_course_teams)
        .service(get_available_students)
        .service(get_student_team)
        .service(delete_team);
}
