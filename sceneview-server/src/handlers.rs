use crate::documents;
use crate::job::{self, JobController, JobState, StartRefused};
use crate::models::{DocumentPayload, DocumentsRequest, GenerateForm, GenerateRequest};
use actix_files::NamedFile;
use actix_multipart::form::MultipartForm;
use actix_web::{get, post, web, Either, HttpRequest, HttpResponse};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use serde_json::json;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::fs as tokio_fs;

/// Shared server state, built once in `main` and handed to every worker.
pub struct AppState {
    pub documents_root: PathBuf,
    pub job: JobController,
    pub generator_cmd: String,
    pub config_path: PathBuf,
}

#[get("/list_files")]
pub async fn list_files(state: web::Data<AppState>) -> HttpResponse {
    info!("Received request for the document listing.");
    if !state.documents_root.is_dir() {
        warn!(
            "Documents folder is missing: {}",
            state.documents_root.display()
        );
        return HttpResponse::InternalServerError().json(json!({
            "status": "error",
            "message": "The documents folder does not exist on the server."
        }));
    }
    match documents::list_documents(&state.documents_root) {
        Ok(files) => {
            info!("Listed {} documents.", files.len());
            HttpResponse::Ok().json(json!({ "status": "success", "files": files }))
        }
        Err(e) => {
            warn!("Failed to list documents: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "status": "error",
                "message": "Internal error while reading the documents folder."
            }))
        }
    }
}

#[get("/get_document/{path:.*}")]
pub async fn get_document(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: HttpRequest,
) -> HttpResponse {
    let requested = path.into_inner();
    debug!("Serving document: {}", requested);
    let resolved = match documents::resolve_document(&state.documents_root, &requested) {
        Ok(p) => p,
        Err(e) => {
            warn!("Rejected document path '{}': {}", requested, e);
            return HttpResponse::BadRequest().json(json!({ "status": "error", "message": e }));
        }
    };
    match NamedFile::open_async(&resolved).await {
        Ok(file) => file.into_response(&req),
        Err(e) => {
            warn!("Document not found '{}': {}", requested, e);
            HttpResponse::NotFound()
                .json(json!({ "status": "error", "message": "File not found." }))
        }
    }
}

#[post("/get_documents")]
pub async fn get_documents(
    state: web::Data<AppState>,
    req: web::Json<DocumentsRequest>,
) -> HttpResponse {
    info!("Received batch request for {} documents.", req.documents.len());
    let results: Vec<(String, Result<DocumentPayload, String>)> = stream::iter(&req.documents)
        .then(|name| {
            let root = state.documents_root.clone();
            async move { (name.clone(), read_document(&root, name).await) }
        })
        .collect()
        .await;

    let mut files = HashMap::new();
    let mut errors = HashMap::new();
    for (name, outcome) in results {
        match outcome {
            Ok(payload) => {
                files.insert(name, payload);
            }
            Err(reason) => {
                warn!("Failed to serve '{}' in batch: {}", name, reason);
                errors.insert(name, reason);
            }
        }
    }

    let status = if errors.is_empty() {
        "success"
    } else if files.is_empty() {
        "error"
    } else {
        "partial_success"
    };
    HttpResponse::Ok().json(json!({ "status": status, "files": files, "errors": errors }))
}

async fn read_document(root: &Path, name: &str) -> Result<DocumentPayload, String> {
    let resolved = documents::resolve_document(root, name)?;
    let bytes = tokio_fs::read(&resolved).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            "File not found.".to_string()
        } else {
            format!("Failed to read file: {}", e)
        }
    })?;
    let mime = mime_guess::from_path(&resolved).first_or_octet_stream();
    Ok(DocumentPayload {
        mime_type: mime.to_string(),
        data: BASE64.encode(&bytes),
    })
}

type GeneratePayload = Either<MultipartForm<GenerateForm>, web::Json<GenerateRequest>>;

#[post("/generate_scene")]
pub async fn generate_scene(state: web::Data<AppState>, payload: GeneratePayload) -> HttpResponse {
    trigger_generation(&state, payload, false)
}

#[post("/regenerate_data")]
pub async fn regenerate_data(state: web::Data<AppState>, payload: GeneratePayload) -> HttpResponse {
    trigger_generation(&state, payload, true)
}

/// Fire-and-forget generation trigger: extract the options from either
/// body shape, persist an uploaded config in full, spawn the configured
/// generator detached. No result channel; completion shows up as new
/// documents.
fn trigger_generation(state: &AppState, payload: GeneratePayload, regenerate: bool) -> HttpResponse {
    let action = if regenerate { "regeneration" } else { "generation" };
    let options = match payload {
        Either::Left(form) => {
            let form = form.into_inner();
            let options = match serde_json::from_str::<Vec<String>>(&form.options.0) {
                Ok(options) => options,
                Err(e) => {
                    warn!("Malformed options field in {} request: {}", action, e);
                    return HttpResponse::BadRequest().json(json!({
                        "status": "error",
                        "message": "The 'options' field must be a JSON-encoded list of strings."
                    }));
                }
            };
            if let Some(config) = form.config_file {
                if let Err(e) = fs::copy(config.file.path(), &state.config_path) {
                    warn!("Failed to store uploaded config: {}", e);
                    return HttpResponse::InternalServerError().json(json!({
                        "status": "error",
                        "message": "Failed to store the uploaded configuration file."
                    }));
                }
                info!(
                    "Stored uploaded config ({} bytes) at {}",
                    config.size,
                    state.config_path.display()
                );
            }
            options
        }
        Either::Right(body) => body.into_inner().options,
    };

    if options.is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "status": "error",
            "message": "At least one generation option is required."
        }));
    }

    let mut args = Vec::new();
    if regenerate {
        args.push("--regenerate".to_string());
    }
    args.push("--options".to_string());
    args.push(options.join(","));

    match job::spawn_detached(&state.generator_cmd, &args) {
        Ok(pid) => {
            info!("Scene {} triggered (pid {}, options: {:?})", action, pid, options);
            HttpResponse::Accepted().json(json!({
                "status": "accepted",
                "message": format!("Scene {} started.", action)
            }))
        }
        Err(e) => {
            warn!("Failed to trigger {}: {}", action, e);
            HttpResponse::InternalServerError()
                .json(json!({ "status": "error", "message": e }))
        }
    }
}

#[post("/start_simulation")]
pub async fn start_simulation(state: web::Data<AppState>) -> HttpResponse {
    match state.job.start() {
        Ok(pid) => HttpResponse::Accepted().json(json!({
            "status": JobState::Starting,
            "message": format!("Simulation started (pid {}).", pid)
        })),
        Err(StartRefused::Conflict(job_state)) => {
            warn!("Refused simulation start: state is {:?}", job_state);
            let message = match job_state {
                JobState::Running => "A simulation is already running.",
                _ => "A finished simulation must be cleared before starting a new one.",
            };
            HttpResponse::Conflict().json(json!({ "status": job_state, "message": message }))
        }
        Err(StartRefused::Failed(e)) => {
            warn!("Failed to start simulation: {}", e);
            HttpResponse::InternalServerError()
                .json(json!({ "status": JobState::Error, "message": e }))
        }
    }
}

#[get("/simulation_status")]
pub async fn simulation_status(state: web::Data<AppState>) -> HttpResponse {
    let (job_state, message) = state.job.describe();
    debug!("Simulation status requested: {:?}", job_state);
    HttpResponse::Ok().json(json!({ "status": job_state, "message": message }))
}

#[post("/clear_simulation")]
pub async fn clear_simulation(state: web::Data<AppState>) -> HttpResponse {
    match state.job.clear() {
        Ok(()) => HttpResponse::Ok().json(json!({
            "status": JobState::NotRunning,
            "message": "Simulation marker cleared."
        })),
        Err(e) => {
            warn!("Refused to clear simulation: {}", e);
            HttpResponse::BadRequest()
                .json(json!({ "status": state.job.status(), "message": e }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use serde_json::Value;
    use tempfile::TempDir;

    fn alive(_: u32) -> bool {
        true
    }

    fn dead(_: u32) -> bool {
        false
    }

    fn state_for(dir: &TempDir, probe: fn(u32) -> bool) -> web::Data<AppState> {
        web::Data::new(AppState {
            documents_root: dir.path().join("documents"),
            job: JobController::with_probe(
                dir.path().join("simulation.pid"),
                "true".to_string(),
                probe,
            ),
            generator_cmd: "true".to_string(),
            config_path: dir.path().join("config.yaml"),
        })
    }

    fn seed(dir: &TempDir, files: &[(&str, &[u8])]) {
        for (rel, bytes) in files {
            let path = dir.path().join("documents").join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, bytes).unwrap();
        }
    }

    macro_rules! test_app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data($state.clone())
                    .service(list_files)
                    .service(get_document)
                    .service(get_documents)
                    .service(generate_scene)
                    .service(regenerate_data)
                    .service(start_simulation)
                    .service(simulation_status)
                    .service(clear_simulation),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn list_files_returns_sorted_relative_paths() {
        let dir = TempDir::new().unwrap();
        seed(&dir, &[("docs/readme.txt", b"hi"), ("top.json", b"{}")]);
        let app = test_app!(state_for(&dir, dead));

        let req = test::TestRequest::get().uri("/list_files").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["files"], json!(["docs/readme.txt", "top.json"]));
    }

    #[actix_web::test]
    async fn list_files_without_documents_folder_is_an_error() {
        let dir = TempDir::new().unwrap();
        let app = test_app!(state_for(&dir, dead));

        let req = test::TestRequest::get().uri("/list_files").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 500);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "error");
    }

    #[actix_web::test]
    async fn get_document_serves_nested_files_raw() {
        let dir = TempDir::new().unwrap();
        seed(&dir, &[("docs/readme.txt", b"hello world")]);
        let app = test_app!(state_for(&dir, dead));

        let req = test::TestRequest::get()
            .uri("/get_document/docs/readme.txt")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let body = test::read_body(resp).await;
        assert_eq!(&body[..], b"hello world");
    }

    #[actix_web::test]
    async fn get_document_rejects_root_escapes() {
        let dir = TempDir::new().unwrap();
        seed(&dir, &[("a.txt", b"x")]);
        let app = test_app!(state_for(&dir, dead));

        let req = test::TestRequest::get()
            .uri("/get_document/../secrets.txt")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn get_documents_reports_partial_success_per_item() {
        let dir = TempDir::new().unwrap();
        seed(&dir, &[("top.json", b"{\"k\":1}")]);
        let app = test_app!(state_for(&dir, dead));

        let req = test::TestRequest::post()
            .uri("/get_documents")
            .set_json(json!({ "documents": ["top.json", "missing.bin"] }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "partial_success");
        assert_eq!(body["files"]["top.json"]["mime_type"], "application/json");
        assert_eq!(
            body["files"]["top.json"]["data"],
            BASE64.encode(b"{\"k\":1}")
        );
        assert_eq!(body["errors"]["missing.bin"], "File not found.");
    }

    #[actix_web::test]
    async fn get_documents_with_only_failures_is_an_error() {
        let dir = TempDir::new().unwrap();
        seed(&dir, &[("a.txt", b"x")]);
        let app = test_app!(state_for(&dir, dead));

        let req = test::TestRequest::post()
            .uri("/get_documents")
            .set_json(json!({ "documents": ["../escape", "missing.bin"] }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["files"].as_object().unwrap().len(), 0);
        assert_eq!(body["errors"].as_object().unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn generate_scene_requires_at_least_one_option() {
        let dir = TempDir::new().unwrap();
        let app = test_app!(state_for(&dir, dead));

        let req = test::TestRequest::post()
            .uri("/generate_scene")
            .set_json(json!({ "options": [] }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn generate_scene_accepts_json_options() {
        let dir = TempDir::new().unwrap();
        let app = test_app!(state_for(&dir, dead));

        let req = test::TestRequest::post()
            .uri("/generate_scene")
            .set_json(json!({ "options": ["replicator"] }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 202);
    }

    #[actix_web::test]
    async fn start_twice_conflicts_while_running() {
        let dir = TempDir::new().unwrap();
        let app = test_app!(state_for(&dir, alive));

        let req = test::TestRequest::post().uri("/start_simulation").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 202);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "starting");

        let req = test::TestRequest::post().uri("/start_simulation").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 409);

        let req = test::TestRequest::post().uri("/clear_simulation").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn finished_simulation_refuses_start_until_cleared() {
        let dir = TempDir::new().unwrap();
        let state = state_for(&dir, dead);
        fs::write(dir.path().join("simulation.pid"), "12345").unwrap();
        let app = test_app!(state);

        let req = test::TestRequest::get().uri("/simulation_status").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "finished");

        let req = test::TestRequest::post().uri("/start_simulation").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 409);

        let req = test::TestRequest::post().uri("/clear_simulation").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let req = test::TestRequest::get().uri("/simulation_status").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "not_running");

        // Clearing again while not_running stays a success.
        let req = test::TestRequest::post().uri("/clear_simulation").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }
}
