// Roster checks and maintenance triggers, professors only
use crate::models::{CallerRole, ServiceError};
use crate::services::formation::TeamFormationEngine;
use crate::utils::{get_claims_from_request, require_role};
use actix_web::{post, web, HttpRequest, HttpResponse};
use log::info;

// Classify a CSV roster against the directory
#[post("/courses/{course_id}/roster/check")]
async fn check_roster(
    req: HttpRequest,
    engine: web::Data<TeamFormationEngine>,
    path: web::Path<String>,
    body: String,
) -> Result<HttpResponse, ServiceError> {
    let claims = get_claims_from_request(&req)?;
    require_role(&claims, CallerRole::Professor)?;

    let report = engine.check_roster(&path.into_inner(), &body, &claims.sub)?;
    Ok(HttpResponse::Ok().json(report))
}

// Run an expiry sweep now
#[post("/admin/sweep")]
async fn sweep(
    req: HttpRequest,
    engine: web::Data<TeamFormationEngine>,
) -> Result<HttpResponse, ServiceError> {
    let claims = get_claims_from_request(&req)?;
    require_role(&claims, CallerRole::Professor)?;

    info!("🧹 Manual sweep requested by {}", claims.sub);
    Ok(HttpResponse::Ok().json(engine.run_maintenance()))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(check_roster).service(sweep);
}
