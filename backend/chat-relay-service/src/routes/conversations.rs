use crate::{
    error::AppError,
    handlers::{self, CreateConversationRequest},
    state::AppState,
};
use actix_middleware::AuthContext;
use actix_web::{web, HttpResponse};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// POST /conversations
///
/// System caller only.
pub async fn create_conversation(
    state: web::Data<AppState>,
    auth: Option<AuthContext>,
    body: web::Json<CreateConversationRequest>,
) -> Result<HttpResponse, AppError> {
    let caller_id = auth.as_ref().map(|a| a.user_id.as_str());

    let response = handlers::create_conversation(&state, caller_id, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// GET /conversations/{conversationId}/messages?limit=N
pub async fn list_messages(
    state: web::Data<AppState>,
    auth: Option<AuthContext>,
    path: web::Path<String>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, AppError> {
    let conversation_id = path.into_inner();
    let user_id = auth.as_ref().map(|a| a.user_id.as_str());

    let response = handlers::list_messages(&state, user_id, &conversation_id, query.limit).await?;
    Ok(HttpResponse::Ok().json(response))
}
