use actix_web::{web, App, HttpServer};
use anyhow::Context;
use chat_relay_service::{config, logging, routes, state::AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let cfg = config::Config::from_env().context("loading configuration")?;
    let bind_addr = format!("0.0.0.0:{}", cfg.port);

    let state = AppState::from_config(cfg)
        .await
        .context("building application state")?;

    tracing::info!(
        %bind_addr,
        store_backend = ?state.config.store_backend,
        push_gateway = ?state.config.push.gateway,
        "starting chat-relay-service"
    );

    let app_state = state.clone();
    HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(actix_middleware::Logging)
            .wrap(actix_middleware::CorrelationIdMiddleware)
            .app_data(web::Data::new(app_state.clone()))
            .configure(|cfg| routes::configure(cfg, &app_state))
    })
    .bind(&bind_addr)
    .with_context(|| format!("binding {bind_addr}"))?
    .run()
    .await
    .context("running HTTP server")?;

    tracing::info!("chat-relay-service stopped");
    Ok(())
}
