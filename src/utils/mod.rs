use crate::models::{CallerRole, Claims, ServiceError};
use actix_web::dev::ServiceRequest;
use actix_web::http::header;
use actix_web::{HttpMessage, HttpRequest};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{error, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

pub mod clock;
pub mod course_lock;
pub mod proposal_storage;
pub mod team_storage;
pub mod token;

// JWT utility functions
pub mod jwt {
    use super::*;

    // Generate a new JWT token for a caller
    pub fn generate_token(username: &str, role: CallerRole, secret: &str) -> Result<String, ServiceError> {
        let now = Utc::now();
        let expiration = now
            .checked_add_signed(Duration::days(7))
            .ok_or(ServiceError::InternalServerError)?
            .timestamp() as usize;

        let claims = Claims {
            sub: username.to_string(),
            role,
            exp: expiration,
            iat: now.timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_ref()),
        )
            .map_err(|_| ServiceError::InternalServerError)
    }

    // Validate and decode a JWT token
    pub fn decode_token(token: &str, secret: &str) -> Result<Claims, ServiceError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_ref()),
            &Validation::default(),
        )
            .map(|data| data.claims)
            .map_err(|_| ServiceError::Unauthorized)
    }

    // Extract JWT from Authorization header
    pub fn extract_token_from_header(auth_header: &str) -> Result<String, ServiceError> {
        if !auth_header.starts_with("Bearer ") {
            return Err(ServiceError::Unauthorized);
        }

        Ok(auth_header.trim_start_matches("Bearer ").to_string())
    }
}

// Claims placed in the request extensions by the middleware
pub fn get_claims_from_request(req: &HttpRequest) -> Result<Claims, ServiceError> {
    req.extensions()
        .get::<Claims>()
        .cloned()
        .ok_or(ServiceError::Unauthorized)
}

pub fn require_role(claims: &Claims, role: CallerRole) -> Result<(), ServiceError> {
    if claims.role != role {
        warn!("❌ {} called a {:?}-only operation as {:?}", claims.sub, role, claims.role);
        return Err(ServiceError::NotAuthorized);
    }
    Ok(())
}

// Middleware for JWT authentication
pub mod auth_middleware {
    use super::*;
    use actix_web::dev::{forward_ready, Service, ServiceResponse, Transform};
    use actix_web::{error::ErrorUnauthorized, Error};
    use futures::future::{ok, Ready};
    use std::future::Future;
    use std::pin::Pin;
    use std::rc::Rc;

    pub struct Authentication {
        secret: Rc<String>,
    }

    impl Authentication {
        pub fn new(secret: impl Into<String>) -> Self {
            Self { secret: Rc::new(secret.into()) }
        }
    }

    impl<S, B> Transform<S, ServiceRequest> for Authentication
    where
        S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
        S::Future: 'static,
        B: 'static,
    {
        type Response = ServiceResponse<B>;
        type Error = Error;
        type Transform = AuthenticationMiddleware<S>;
        type InitError = ();
        type Future = Ready<Result<Self::Transform, Self::InitError>>;

        fn new_transform(&self, service: S) -> Self::Future {
            ok(AuthenticationMiddleware {
                service,
                secret: Rc::clone(&self.secret),
            })
        }
    }

    pub struct AuthenticationMiddleware<S> {
        service: S,
        secret: Rc<String>,
    }

    impl<S, B> Service<ServiceRequest> for AuthenticationMiddleware<S>
    where
        S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
        S::Future: 'static,
        B: 'static,
    {
        type Response = ServiceResponse<B>;
        type Error = Error;
        type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

        forward_ready!(service);

        fn call(&self, req: ServiceRequest) -> Self::Future {
            let claims = req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|auth_str| jwt::extract_token_from_header(auth_str).ok())
                .and_then(|token| jwt::decode_token(&token, &self.secret).ok());

            match claims {
                Some(claims) => {
                    req.extensions_mut().insert(claims);
                    let fut = self.service.call(req);
                    Box::pin(async move { fut.await })
                }
                None => Box::pin(async move { Err(ErrorUnauthorized("Unauthorized")) }),
            }
        }
    }
}

// One-JSON-file-per-record helpers shared by the file-backed stores
pub mod json_storage {
    use super::*;

    pub fn ensure_dir(dir: &Path) -> Result<(), ServiceError> {
        if !dir.exists() {
            info!("Creating storage directory {}", dir.display());
            fs::create_dir_all(dir).map_err(|e| {
                error!("Failed to create directory {}: {:?}", dir.display(), e);
                ServiceError::InternalServerError
            })?;
        }
        Ok(())
    }

    pub fn save_record<T: Serialize>(dir: &Path, id: &str, record: &T) -> Result<(), ServiceError> {
        ensure_dir(dir)?;

        let record_json = serde_json::to_string_pretty(record).map_err(|e| {
            error!("Failed to serialize record {}: {:?}", id, e);
            ServiceError::InternalServerError
        })?;

        fs::write(dir.join(format!("{}.json", id)), record_json).map_err(|e| {
            error!("Failed to save record {}: {:?}", id, e);
            ServiceError::InternalServerError
        })
    }

    pub fn load_record<T: DeserializeOwned>(dir: &Path, id: &str) -> Result<Option<T>, ServiceError> {
        let path = dir.join(format!("{}.json", id));
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            error!("Failed to read record file {}: {:?}", path.display(), e);
            ServiceError::InternalServerError
        })?;

        serde_json::from_str(&content).map(Some).map_err(|e| {
            error!("Failed to parse record JSON {}: {:?}", path.display(), e);
            ServiceError::InternalServerError
        })
    }

    pub fn delete_record(dir: &Path, id: &str) -> Result<bool, ServiceError> {
        let path = dir.join(format!("{}.json", id));
        if !path.exists() {
            return Ok(false);
        }

        fs::remove_file(&path).map_err(|e| {
            error!("Failed to delete record file {}: {:?}", path.display(), e);
            ServiceError::InternalServerError
        })?;
        Ok(true)
    }

    // Unparseable files are skipped with a warning
    pub fn load_all<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, ServiceError> {
        ensure_dir(dir)?;

        let mut records = Vec::new();
        for entry_result in fs::read_dir(dir).map_err(|e| {
            error!("Failed to read directory {}: {:?}", dir.display(), e);
            ServiceError::InternalServerError
        })? {
            let entry = entry_result.map_err(|e| {
                error!("Failed to read directory entry: {:?}", e);
                ServiceError::InternalServerError
            })?;

            let path = entry.path();
            if path.is_file() && path.extension().map_or(false, |ext| ext == "json") {
                let content = fs::read_to_string(&path).map_err(|e| {
                    error!("Failed to read record file {}: {:?}", path.display(), e);
                    ServiceError::InternalServerError
                })?;

                match serde_json::from_str(&content) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!("Failed to parse record JSON {}: {:?}", path.display(), e),
                }
            }
        }

        Ok(records)
    }
}
