use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::StatusCode,
    Error, HttpMessage, HttpResponse,
};
use error_types::ServiceError;
use futures::future::{ready, Ready};
use jwt_security::{TokenManager, Verification};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

/// Header carrying the caller's device id.
pub const DEVICE_HEADER: &str = "UniqueId";

/// Identity attached to requests that passed [`JwtAuthMiddleware`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub profile_id: String,
    pub access_uuid: String,
    pub unique_id: String,
}

/// Bearer token check plus device binding.
///
/// The token must pass strict validation and its `unique_id` claim must
/// equal the `UniqueId` request header.
pub struct JwtAuthMiddleware {
    tokens: Arc<TokenManager>,
}

impl JwtAuthMiddleware {
    pub fn new(tokens: Arc<TokenManager>) -> Self {
        Self { tokens }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = JwtAuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddlewareService {
            service: Rc::new(service),
            tokens: self.tokens.clone(),
        }))
    }
}

pub struct JwtAuthMiddlewareService<S> {
    service: Rc<S>,
    tokens: Arc<TokenManager>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let tokens = self.tokens.clone();

        Box::pin(async move {
            let Some(token) = bearer_token(&req) else {
                return Ok(reject(req, ServiceError::Unauthorized));
            };

            let claims = match tokens.validate_access(&token, Verification::Strict).await {
                Ok(claims) => claims,
                Err(e) if e.is_auth_failure() => {
                    tracing::debug!(error = %e, "access token rejected");
                    return Ok(reject(req, ServiceError::Unauthorized));
                }
                Err(e) => {
                    tracing::error!(target: "internal_error", error = %e, "token store lookup failed");
                    return Ok(reject(req, ServiceError::General(e.to_string())));
                }
            };

            let device = req
                .headers()
                .get(DEVICE_HEADER)
                .and_then(|h| h.to_str().ok())
                .unwrap_or_default();
            if device != claims.unique_id {
                tracing::warn!(user_id = %claims.user_id, "device id does not match token");
                return Ok(reject(req, ServiceError::Unauthorized));
            }

            req.extensions_mut().insert(AuthenticatedUser {
                user_id: claims.user_id,
                profile_id: claims.profile_id,
                access_uuid: claims.access_uuid,
                unique_id: claims.unique_id,
            });

            Ok(service.call(req).await?.map_into_left_body())
        })
    }
}

/// `Authorization: Bearer <token>`; anything else yields `None`.
pub fn bearer_token(req: &ServiceRequest) -> Option<String> {
    let header = req.headers().get("Authorization")?.to_str().ok()?;
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token.to_string()),
        _ => None,
    }
}

fn reject<B>(req: ServiceRequest, error: ServiceError) -> ServiceResponse<EitherBody<B>> {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let response = HttpResponse::build(status).json(error.to_response());
    req.into_response(response).map_into_right_body()
}

impl actix_web::FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        _payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        match req.extensions().get::<AuthenticatedUser>() {
            Some(user) => ready(Ok(user.clone())),
            None => ready(Err(actix_web::error::ErrorUnauthorized(
                "User not authenticated",
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_bearer_token_parsing() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer abc.def.ghi"))
            .to_srv_request();
        assert_eq!(bearer_token(&req).as_deref(), Some("abc.def.ghi"));

        let req = TestRequest::default()
            .insert_header(("Authorization", "Basic abc"))
            .to_srv_request();
        assert!(bearer_token(&req).is_none());

        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer a b"))
            .to_srv_request();
        assert!(bearer_token(&req).is_none());

        let req = TestRequest::default().to_srv_request();
        assert!(bearer_token(&req).is_none());
    }
}
