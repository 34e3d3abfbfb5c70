//! Front-door authorization middleware
//!
//! Runs the access decision for every request it wraps. Denied requests never
//! reach a handler and get a `401` with a structured error body. Allowed
//! requests carry an [`AuthContext`] in their extensions; handlers take it as
//! an extractor and treat the user id as already authenticated.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    web, Error, HttpMessage, HttpResponse,
};
use crate::correlation_id::CorrelationId;
use crypto_core::authorization::{extract_token, Authorizer, PolicyDecision};
use error_types::{error_codes, ErrorCategory};
use futures::future::{ready, Ready};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

/// Default query parameter carrying the token on header-less upgrades
pub const DEFAULT_TOKEN_QUERY_PARAM: &str = "token";

/// Identity resolved by the front door
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: String,
    pub roles: Vec<String>,
}

impl AuthContext {
    pub fn from_decision(decision: &PolicyDecision) -> Option<Self> {
        if !decision.is_allowed() {
            return None;
        }
        Some(Self {
            user_id: decision.user_id()?.to_string(),
            roles: decision.roles(),
        })
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Per-request authorization hook
#[derive(Clone)]
pub struct FrontDoor {
    authorizer: Arc<Authorizer>,
    query_param: Arc<str>,
}

impl FrontDoor {
    pub fn new(authorizer: Arc<Authorizer>) -> Self {
        Self::with_query_param(authorizer, DEFAULT_TOKEN_QUERY_PARAM)
    }

    pub fn with_query_param(authorizer: Arc<Authorizer>, query_param: &str) -> Self {
        Self {
            authorizer,
            query_param: Arc::from(query_param),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for FrontDoor
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = FrontDoorService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(FrontDoorService {
            service: Rc::new(service),
            authorizer: self.authorizer.clone(),
            query_param: self.query_param.clone(),
        }))
    }
}

pub struct FrontDoorService<S> {
    service: Rc<S>,
    authorizer: Arc<Authorizer>,
    query_param: Arc<str>,
}

/// Token from the `Authorization` header or, failing that, the query string.
fn request_token(req: &ServiceRequest, query_param: &str) -> Option<String> {
    let mut headers = HashMap::new();
    if let Some(value) = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        headers.insert(AUTHORIZATION.as_str().to_string(), value.to_string());
    }

    let query = web::Query::<HashMap<String, String>>::from_query(req.query_string())
        .map(web::Query::into_inner)
        .unwrap_or_default();

    extract_token(&headers, &query, query_param)
}

impl<S, B> Service<ServiceRequest> for FrontDoorService<S>
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
        let authorizer = self.authorizer.clone();
        let token = request_token(&req, &self.query_param);
        let resource = format!("{} {}", req.method(), req.path());

        Box::pin(async move {
            let decision = authorizer.authorize(&resource, token.as_deref()).await;

            let Some(context) = AuthContext::from_decision(&decision)
                .filter(|_| decision.permits(&resource))
            else {
                let mut body = ErrorCategory::Authentication
                    .to_response(error_codes::TOKEN_INVALID, "Unauthorized");
                let correlation_id = req.extensions().get::<CorrelationId>().map(|c| c.0.clone());
                if let Some(id) = correlation_id {
                    body = body.with_trace_id(id);
                }
                let response = HttpResponse::Unauthorized().json(body);
                return Ok(req.into_response(response).map_into_right_body());
            };

            req.extensions_mut().insert(context);

            let res = service.call(req).await?;
            Ok(res.map_into_left_body())
        })
    }
}

/// FromRequest implementation for AuthContext
impl actix_web::FromRequest for AuthContext {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        _payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        match req.extensions().get::<AuthContext>() {
            Some(context) => ready(Ok(context.clone())),
            None => ready(Err(actix_web::error::ErrorUnauthorized(
                "User not authenticated",
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_core::authorization::Effect;

    #[test]
    fn test_context_only_from_allow() {
        assert!(AuthContext::from_decision(&PolicyDecision::deny_all()).is_none());

        let mut decision = PolicyDecision::deny_all();
        decision.effect = Effect::Allow;
        decision.context.user_id = Some("alice".into());
        decision.context.roles = Some("admin,member".into());

        let context = AuthContext::from_decision(&decision).unwrap();
        assert_eq!(context.user_id, "alice");
        assert!(context.has_role("admin"));
        assert!(!context.has_role("system"));
    }
}
