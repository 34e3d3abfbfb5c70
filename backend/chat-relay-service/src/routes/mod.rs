pub mod authorize;
pub mod connections;
pub mod conversations;
pub mod messages;
pub mod wsroute;

use crate::state::AppState;
use actix_middleware::FrontDoor;
use actix_web::{error::InternalError, web, HttpResponse};
use error_types::{error_codes, ErrorCategory};

/// Malformed JSON bodies become a structured 400.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let body = ErrorCategory::Validation.to_response(error_codes::INVALID_REQUEST, &err.to_string());
        InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
    })
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

/// Fallback for any unknown route
async fn default_route() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

/// Register every route. Only the chat resources sit behind the front door;
/// `/health`, `/authorize` and the fallback do not.
pub fn configure(cfg: &mut web::ServiceConfig, state: &AppState) {
    let front_door = || {
        FrontDoor::with_query_param(state.authorizer.clone(), &state.config.jwt.token_query_param)
    };

    cfg.app_data(json_config())
        .route("/health", web::get().to(health))
        .route("/authorize", web::post().to(authorize::authorize))
        .service(
            web::resource("/connections/{connection_id}")
                .wrap(front_door())
                .route(web::post().to(connections::connect))
                .route(web::delete().to(connections::disconnect)),
        )
        .service(
            web::resource("/conversations")
                .wrap(front_door())
                .route(web::post().to(conversations::create_conversation)),
        )
        .service(
            web::resource("/conversations/{conversation_id}/messages")
                .wrap(front_door())
                .route(web::get().to(conversations::list_messages)),
        )
        .service(
            web::resource("/messages")
                .wrap(front_door())
                .route(web::post().to(messages::send_message)),
        );

    if state.sessions.is_some() {
        cfg.service(
            web::resource("/ws")
                .wrap(front_door())
                .route(web::get().to(wsroute::ws_handler)),
        );
    }

    cfg.default_service(web::to(default_route));
}
