//! Front-door hook exposed over HTTP for an external gateway.

use crate::state::AppState;
use actix_web::{web, HttpResponse};
use crypto_core::extract_token;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeRequest {
    pub method_arn: String,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
}

/// POST /authorize
///
/// Always `200`; the decision itself says allow or deny.
pub async fn authorize(
    state: web::Data<AppState>,
    body: web::Json<AuthorizeRequest>,
) -> HttpResponse {
    let request = body.into_inner();
    let token = extract_token(
        &request.headers.unwrap_or_default(),
        &request.query_string_parameters.unwrap_or_default(),
        &state.config.jwt.token_query_param,
    );

    let decision = state
        .authorizer
        .authorize(&request.method_arn, token.as_deref())
        .await;

    HttpResponse::Ok().json(decision)
}
