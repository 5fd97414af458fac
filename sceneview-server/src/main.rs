mod documents;
mod handlers;
mod job;
mod models;

use actix_cors::Cors;
use actix_web::http::header;
use actix_web::{middleware, web, App, HttpServer};
use handlers::AppState;
use job::JobController;
use log::{info, warn};
use rustls::ServerConfig;
use rustls_pemfile::{certs, pkcs8_private_keys};
use std::env;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    // Initialize env_logger. You can override the log level with the
    // RUST_LOG environment variable, e.g. `RUST_LOG=debug cargo run`.
    env::set_var("RUST_LOG", env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()));
    env_logger::init();

    let documents_root =
        PathBuf::from(env::var("DOCUMENTS_DIR").unwrap_or_else(|_| "documents".to_string()));
    if !documents_root.is_dir() {
        warn!(
            "Documents folder '{}' does not exist, creating it. Put your files inside.",
            documents_root.display()
        );
        fs::create_dir_all(&documents_root)?;
    }
    let documents_root = documents_root.canonicalize()?;

    let marker_path =
        PathBuf::from(env::var("SIMULATION_MARKER").unwrap_or_else(|_| "simulation.pid".to_string()));
    let simulation_cmd =
        env::var("SIMULATION_CMD").unwrap_or_else(|_| "scene-simulator".to_string());
    let generator_cmd = env::var("GENERATOR_CMD").unwrap_or_else(|_| "scene-generator".to_string());
    let config_path =
        PathBuf::from(env::var("SCENE_CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string()));

    let state = web::Data::new(AppState {
        documents_root,
        job: JobController::new(marker_path, simulation_cmd),
        generator_cmd,
        config_path,
    });

    let port = env::var("PORT").unwrap_or_else(|_| "5002".to_string());
    let addr = format!("0.0.0.0:{}", port);
    info!("Server running at http://{}", addr);

    let mut http_server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
            ])
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .service(handlers::list_files)
            .service(handlers::get_document)
            .service(handlers::get_documents)
            .service(handlers::generate_scene)
            .service(handlers::regenerate_data)
            .service(handlers::start_simulation)
            .service(handlers::simulation_status)
            .service(handlers::clear_simulation)
    });

    if let (Ok(cert_path), Ok(key_path)) = (env::var("CERT_PATH"), env::var("KEY_PATH")) {
        if !Path::new(&cert_path).exists() || !Path::new(&key_path).exists() {
            warn!("CERT_PATH or KEY_PATH points to a non-existent file. Starting without HTTPS.");
            http_server = http_server.bind(addr)?;
        } else {
            info!("Attempting to start HTTPS server...");
            let cert_file = &mut BufReader::new(File::open(cert_path)?);
            let key_file = &mut BufReader::new(File::open(key_path)?);
            let cert_chain = certs(cert_file).collect::<Result<Vec<_>, _>>()?;
            let mut keys = pkcs8_private_keys(key_file).collect::<Result<Vec<_>, _>>()?;

            if keys.is_empty() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "No private keys found in key file",
                ));
            }

            let config = ServerConfig::builder()
                .with_no_client_auth()
                .with_single_cert(cert_chain, keys.remove(0).into())
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

            info!("Successfully configured TLS. Binding to https://{}", addr);
            http_server = http_server.bind_rustls_0_23(addr, config)?;
        }
    } else {
        info!("No CERT_PATH or KEY_PATH found in env. Starting plain HTTP server.");
        http_server = http_server.bind(addr)?;
    }

    http_server.run().await
}
