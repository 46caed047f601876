use actix_web::http::header::{self, Header};
use actix_web::{FromRequest, HttpRequest, web};
use actix_web_httpauth::headers::authorization::{Authorization, Basic};
use futures::future::LocalBoxFuture;

use super::credentials::CredentialVerifier;
use super::models::{CredentialCheck, Identity, PresentedCredentials};
use crate::error::ApiError;

#[derive(Debug)]
enum AuthError {
    NoAuthHeader,
    InvalidCredentials,
}

impl AuthError {
    fn log_message(&self, path: &str) -> String {
        match self {
            AuthError::NoAuthHeader => format!("No Authorization header found for path: {}", path),
            AuthError::InvalidCredentials => {
                format!("Basic credentials rejected for path: {}", path)
            }
        }
    }

    fn client_message(&self) -> &'static str {
        match self {
            AuthError::NoAuthHeader => "Not authenticated",
            AuthError::InvalidCredentials => "Invalid or missing credentials",
        }
    }
}

/// Reads the `Authorization` header without verifying it.
pub fn presented_credentials(req: &HttpRequest) -> PresentedCredentials {
    if !req.headers().contains_key(header::AUTHORIZATION) {
        return PresentedCredentials::Missing;
    }
    let Ok(auth) = Authorization::<Basic>::parse(req) else {
        return PresentedCredentials::Malformed;
    };
    let basic = auth.into_scheme();
    match basic.password() {
        Some(password) => PresentedCredentials::Basic {
            username: basic.user_id().to_string(),
            password: password.to_string(),
        },
        None => PresentedCredentials::Malformed,
    }
}

fn check_request(req: &HttpRequest) -> LocalBoxFuture<'static, Result<CredentialCheck, ApiError>> {
    let presented = presented_credentials(req);
    let verifier = req.app_data::<web::Data<CredentialVerifier>>().cloned();
    Box::pin(async move {
        let verifier = verifier.ok_or_else(|| {
            log::error!("CredentialVerifier missing from application data");
            ApiError::Internal("Authentication is not configured".to_string())
        })?;
        Ok(verifier.check(presented).await?)
    })
}

/// Mandatory authentication: absent or invalid credentials fail the request with 401.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Identity);

impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let path = req.path().to_string();
        let check = check_request(req);
        Box::pin(async move {
            let auth_error = match check.await? {
                CredentialCheck::Valid(identity) => {
                    log::debug!("Authenticated user {} for path: {}", identity.user_id, path);
                    return Ok(AuthenticatedUser(identity));
                }
                CredentialCheck::Absent => AuthError::NoAuthHeader,
                CredentialCheck::Invalid => AuthError::InvalidCredentials,
            };
            log::warn!("{}", auth_error.log_message(&path));
            Err(ApiError::Unauthorized(auth_error.client_message().to_string()))
        })
    }
}

/// Optional authentication: absent or invalid credentials degrade to an anonymous caller.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Identity>);

impl FromRequest for MaybeUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let path = req.path().to_string();
        let check = check_request(req);
        Box::pin(async move {
            let check = check.await?;
            if check == CredentialCheck::Invalid {
                log::info!(
                    "Ignoring invalid credentials on optional-auth path {}; continuing anonymously",
                    path
                );
            }
            Ok(MaybeUser(check.into_optional()))
        })
    }
}
