// cohort-service/src/routes/proposal_routes.rs
use crate::models::{CallerRole, Claims, ConsentOutcome, CreateProposalRequest, ServiceError};
use crate::services::formation::TeamFormationEngine;
use crate::utils::{get_claims_from_request, require_role};
use actix_web::{delete, get, post, web, HttpRequest, HttpResponse};
use log::info;
use serde_json::json;

// Students may only look at their own proposals; professors at anyone's
pub(crate) fn ensure_self_or_professor(
    engine: &TeamFormationEngine,
    claims: &Claims,
    student_id: &str,
) -> Result<(), ServiceError> {
    if claims.role == CallerRole::Professor {
        return Ok(());
    }
    match engine.directory().resolve_creator(&claims.sub)? {
        Some(id) if id == student_id => Ok(()),
        _ => Err(ServiceError::NotAuthorized),
    }
}

// Propose a new team
#[post("/courses/{course_id}/proposals")]
async fn create_proposal(
    req: HttpRequest,
    engine: web::Data<TeamFormationEngine>,
    path: web::Path<String>,
    data: web::Json<CreateProposalRequest>,
) -> Result<HttpResponse, ServiceError> {
    let claims = get_claims_from_request(&req)?;
    require_role(&claims, CallerRole::Student)?;
    let course_id = path.into_inner();

    let proposal_id =
        engine.create_proposal(&course_id, &data.team_name, &data.member_ids, &claims.sub)?;

    Ok(HttpResponse::Created().json(json!({
        "id": proposal_id,
        "message": "Team proposal created, members have been notified"
    })))
}

#[get("/proposals/{proposal_id}")]
async fn get_proposal(
    req: HttpRequest,
    engine: web::Data<TeamFormationEngine>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let claims = get_claims_from_request(&req)?;
    let proposal = engine.get_proposal(&path.into_inner(), &claims.sub)?;
    Ok(HttpResponse::Ok().json(proposal))
}

#[get("/proposals/{proposal_id}/members")]
async fn get_proposal_members(
    req: HttpRequest,
    engine: web::Data<TeamFormationEngine>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let claims = get_claims_from_request(&req)?;
    let members = engine.proposal_members(&path.into_inner(), &claims.sub)?;
    Ok(HttpResponse::Ok().json(members))
}

#[delete("/proposals/{proposal_id}")]
async fn delete_proposal(
    req: HttpRequest,
    engine: web::Data<TeamFormationEngine>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let claims = get_claims_from_request(&req)?;
    require_role(&claims, CallerRole::Professor)?;
    let proposal_id = path.into_inner();

    engine.delete_proposal(&proposal_id, &claims.sub)?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Proposal deleted successfully",
        "id": proposal_id
    })))
}

#[get("/courses/{course_id}/proposals")]
async fn get_course_proposals(
    req: HttpRequest,
    engine: web::Data<TeamFormationEngine>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let claims = get_claims_from_request(&req)?;
    let proposals = engine.list_proposals_for_course(&path.into_inner(), &claims.sub)?;
    Ok(HttpResponse::Ok().json(proposals))
}

#[get("/courses/{course_id}/proposals/pending")]
async fn get_pending_course_proposals(
    req: HttpRequest,
    engine: web::Data<TeamFormationEngine>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let claims = get_claims_from_request(&req)?;
    let proposals = engine.list_pending_for_course(&path.into_inner(), &claims.sub)?;
    info!("✅ Found {} pending proposals", proposals.len());
    Ok(HttpResponse::Ok().json(proposals))
}

#[get("/students/{student_id}/proposals")]
async fn get_student_proposals(
    req: HttpRequest,
    engine: web::Data<TeamFormationEngine>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let claims = get_claims_from_request(&req)?;
    let student_id = path.into_inner();
    ensure_self_or_professor(&engine, &claims, &student_id)?;
    Ok(HttpResponse::Ok().json(engine.list_proposals_for_student(&student_id)?))
}

#[get("/students/{student_id}/proposals/pending")]
async fn get_pending_student_proposals(
    req: HttpRequest,
    engine: web::Data<TeamFormationEngine>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let claims = get_claims_from_request(&req)?;
    let student_id = path.into_inner();
    ensure_self_or_professor(&engine, &claims, &student_id)?;
    Ok(HttpResponse::Ok().json(engine.list_pending_for_student(&student_id)?))
}

#[get("/students/{student_id}/courses/{course_id}/commitment")]
async fn get_commitment(
    req: HttpRequest,
    engine: web::Data<TeamFormationEngine>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ServiceError> {
    let claims = get_claims_from_request(&req)?;
    let (student_id, course_id) = path.into_inner();
    ensure_self_or_professor(&engine, &claims, &student_id)?;

    let committed = engine.has_accepted_commitment(&student_id, &course_id)?;
    Ok(HttpResponse::Ok().json(json!({
        "student_id": student_id,
        "course_id": course_id,
        "committed": committed
    })))
}

#[get("/students/{student_id}/proposals/{proposal_id}/responded")]
async fn get_response_state(
    req: HttpRequest,
    engine: web::Data<TeamFormationEngine>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ServiceError> {
    let claims = get_claims_from_request(&req)?;
    let (student_id, proposal_id) = path.into_inner();
    ensure_self_or_professor(&engine, &claims, &student_id)?;

    let responded = engine.has_responded(&student_id, &proposal_id)?;
    Ok(HttpResponse::Ok().json(json!({
        "student_id": student_id,
        "proposal_id": proposal_id,
        "responded": responded
    })))
}

// Token links from the notification; the token itself authenticates
async fn respond(
    engine: web::Data<TeamFormationEngine>,
    path: web::Path<String>,
    outcome: ConsentOutcome,
) -> Result<HttpResponse, ServiceError> {
    let outcome = engine.respond(&path.into_inner(), outcome)?;
    Ok(HttpResponse::Ok().json(outcome))
}

async fn accept_proposal(
    engine: web::Data<TeamFormationEngine>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    respond(engine, path, ConsentOutcome::Accept).await
}

async fn decline_proposal(
    engine: web::Data<TeamFormationEngine>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    respond(engine, path, ConsentOutcome::Decline).await
}

// Register authenticated proposal routes
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create_proposal)
        .service(get_course_proposals)
        .service(get_pending_course_proposals)
        .service(get_proposal_members)
        .service(get_proposal)
        .service(delete_proposal)
        .service(get_pending_student_proposals)
        .service(get_student_proposals)
        .service(get_commitment)
        .service(get_response_state);
}

// Register token-link routes (no bearer token needed)
pub fn init_response_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/proposals/respond/{token}/accept")
            .route(web::get().to(accept_proposal))
            .route(web::post().to(accept_proposal)),
    )
    .service(
        web::resource("/proposals/respond/{token}/decline")
            .route(web::get().to(decline_proposal))
            .route(web::post().to(decline_proposal)),
    );
}
