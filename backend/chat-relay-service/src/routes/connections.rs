use crate::{error::AppError, handlers, state::AppState};
use actix_middleware::AuthContext;
use actix_web::{web, HttpResponse};

/// POST /connections/{connectionId}
pub async fn connect(
    state: web::Data<AppState>,
    auth: Option<AuthContext>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let connection_id = path.into_inner();
    let user_id = auth.as_ref().map(|a| a.user_id.as_str());

    let body = handlers::on_connect(&state, user_id, Some(&connection_id)).await?;
    Ok(HttpResponse::Ok().json(body))
}

/// DELETE /connections/{connectionId}
pub async fn disconnect(
    state: web::Data<AppState>,
    auth: Option<AuthContext>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let connection_id = path.into_inner();
    let user_id = auth.as_ref().map(|a| a.user_id.as_str());

    let body = handlers::on_disconnect(&state, user_id, Some(&connection_id)).await?;
    Ok(HttpResponse::Ok().json(body))
}
