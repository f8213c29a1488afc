use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, middleware, web};
use sqlx::sqlite::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::grader::Grader;
use crate::languages::LanguageRegistry;
use crate::routes::{get_languages_handler, json_error_handler, post_submission_handler};
use crate::store::ConfigProblemStore;

pub fn build_server(
    server_config: ServerConfig,
    registry: Arc<LanguageRegistry>,
    grader: Arc<Grader>,
    store: Arc<ConfigProblemStore>,
    db_pool: SqlitePool,
    shutdown_token: CancellationToken,
) -> std::io::Result<Server> {
    let registry = web::Data::from(registry);
    let grader = web::Data::from(grader);
    let store = web::Data::from(store);
    let db_pool = web::Data::new(db_pool);
    let shutdown_token = web::Data::new(shutdown_token);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(registry.clone())
            .app_data(grader.clone())
            .app_data(store.clone())
            .app_data(db_pool.clone())
            .app_data(shutdown_token.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .wrap(middleware::Logger::default())
            .service(post_submission_handler)
            .service(get_languages_handler)
    })
    .bind((
        server_config
            .bind_address
            .unwrap_or("127.0.0.1".to_string()),
        server_config.bind_port.unwrap_or(7800),
    ))?
    .run();

    Ok(server)
}
