// src/routes/mod.rs
use crate::utils::auth_middleware::Authentication;
use actix_web::web;

pub mod admin_routes;
pub mod proposal_routes;
pub mod team_routes;

// Mount every route: bearer-authenticated ones under /api, token links at the root
pub fn configure(cfg: &mut web::ServiceConfig, jwt_secret: &str) {
    cfg.service(
        web::scope("/api")
            .wrap(Authentication::new(jwt_secret))
            .configure(proposal_routes::init_routes)
            .configure(team_routes::init_routes)
            .configure(admin_routes::init_routes),
    )
    .configure(proposal_routes::init_response_routes);
}
