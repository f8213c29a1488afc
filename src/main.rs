use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use gradebox::config::{CliArgs, Config};
use gradebox::database as db;
use gradebox::grader::Grader;
use gradebox::languages::LanguageRegistry;
use gradebox::store::ConfigProblemStore;
use gradebox::web_server::build_server;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let db_path = db::get_db_path();
    let cli = CliArgs::parse();

    let Config {
        server: server_config,
        engine: engine_settings,
        problems,
    } = cli.to_config().expect("Failed to load configuration");

    if cli.flush_data {
        db::remove_db(&db_path);
    }

    let db_pool = db::init_db(&db_path)
        .await
        .expect("Failed to initialize database");

    let registry = Arc::new(LanguageRegistry::builtin());
    let grader = Arc::new(Grader::new(Arc::clone(&registry), &engine_settings));
    let store = Arc::new(ConfigProblemStore::new(problems));
    let shutdown_token = CancellationToken::new();

    let server = build_server(
        server_config,
        registry,
        grader,
        store,
        db_pool,
        shutdown_token.clone(),
    )
    .expect("Failed to build server");

    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        res_server = server_task => {
            log::error!("Server terminated unexpectedly: {:?}", res_server);
        }
    }

    // Stop accepting new submissions, then cancel any in-flight grading so
    // spawned child processes are killed rather than orphaned.
    server_handle.stop(true).await;
    shutdown_token.cancel();

    log::info!("Shutdown complete");
    Ok(())
}
