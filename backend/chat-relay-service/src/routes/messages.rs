use crate::{
    error::AppError,
    handlers::{self, SendMessageRequest},
    state::AppState,
};
use actix_middleware::AuthContext;
use actix_web::{web, HttpResponse};

/// POST /messages
pub async fn send_message(
    state: web::Data<AppState>,
    auth: Option<AuthContext>,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let user_id = auth.as_ref().map(|a| a.user_id.as_str());

    let response = handlers::send_message(&state, user_id, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}
