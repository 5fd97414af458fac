use log::debug;
use reqwest::blocking::multipart;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::env;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5002";

/// One fetched document. Bytes are raw here; base64 exists only at the
/// batch-endpoint transport boundary on the server side.
#[derive(Clone, Debug)]
pub struct FetchedFile {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("connection error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server error: {0}")]
    Server(String),
}

#[derive(Deserialize)]
struct ListFilesResponse {
    status: String,
    #[serde(default)]
    files: Vec<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct JobReply {
    status: String,
    message: String,
}

/// A YAML configuration attached to a generation request.
pub struct ConfigUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Blocking HTTP client for the scene server. Lives behind worker
/// threads only; the UI thread never calls into it.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::blocking::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http: reqwest::blocking::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(env::var("SCENEVIEW_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()))
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    pub fn list_files(&self) -> Result<Vec<String>, ApiError> {
        debug!("GET /list_files");
        let response = self
            .http
            .get(self.url("/list_files"))
            .timeout(Duration::from_secs(5))
            .send()?
            .error_for_status()?;
        let body: ListFilesResponse = response.json()?;
        if body.status == "success" {
            Ok(body.files)
        } else {
            Err(ApiError::Server(body.message.unwrap_or_else(|| {
                "file listing failed without a reason".to_string()
            })))
        }
    }

    /// Fetches one document as raw bytes. MIME comes from the response
    /// header, falling back to a guess from the path.
    pub fn get_document(&self, path: &str) -> Result<FetchedFile, ApiError> {
        debug!("GET /get_document/{}", path);
        let response = self
            .http
            .get(self.url(&format!("/get_document/{}", path)))
            .timeout(Duration::from_secs(30))
            .send()?
            .error_for_status()?;
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| mime_guess::from_path(path).first_or_octet_stream().to_string());
        let bytes = response.bytes()?.to_vec();
        Ok(FetchedFile { mime_type, bytes })
    }

    /// Triggers scene generation. When a config is attached the request
    /// goes out as multipart with `options` as a JSON-encoded string,
    /// matching the server's form contract; otherwise as plain JSON.
    pub fn generate_scene(
        &self,
        options: &[String],
        config: Option<ConfigUpload>,
    ) -> Result<(), ApiError> {
        self.trigger("/generate_scene", options, config)
    }

    pub fn regenerate_data(&self, options: &[String]) -> Result<(), ApiError> {
        self.trigger("/regenerate_data", options, None)
    }

    fn trigger(
        &self,
        endpoint: &str,
        options: &[String],
        config: Option<ConfigUpload>,
    ) -> Result<(), ApiError> {
        debug!("POST {} (options: {:?})", endpoint, options);
        let request = self
            .http
            .post(self.url(endpoint))
            .timeout(Duration::from_secs(60));
        let response = match config {
            Some(upload) => {
                let encoded = serde_json::to_string(options)
                    .map_err(|e| ApiError::Server(format!("failed to encode options: {}", e)))?;
                let form = multipart::Form::new().text("options", encoded).part(
                    "config_file",
                    multipart::Part::bytes(upload.bytes)
                        .file_name(upload.file_name)
                        .mime_str("application/x-yaml")?,
                );
                request.multipart(form).send()?
            }
            None => request
                .json(&serde_json::json!({ "options": options }))
                .send()?,
        };
        response.error_for_status()?;
        Ok(())
    }

    pub fn start_simulation(&self) -> Result<String, ApiError> {
        self.job_call(reqwest::Method::POST, "/start_simulation")
            .map(|reply| reply.message)
    }

    /// Returns `(state, message)` for display.
    pub fn simulation_status(&self) -> Result<(String, String), ApiError> {
        self.job_call(reqwest::Method::GET, "/simulation_status")
            .map(|reply| (reply.status, reply.message))
    }

    pub fn clear_simulation(&self) -> Result<String, ApiError> {
        self.job_call(reqwest::Method::POST, "/clear_simulation")
            .map(|reply| reply.message)
    }

    /// Job-control calls answer JSON on refusals (409/400) too; the
    /// server's message is worth surfacing either way.
    fn job_call(&self, method: reqwest::Method, endpoint: &str) -> Result<JobReply, ApiError> {
        debug!("{} {}", method, endpoint);
        let response = self
            .http
            .request(method, self.url(endpoint))
            .timeout(Duration::from_secs(10))
            .send()?;
        let ok = response.status().is_success();
        let reply: JobReply = response.json()?;
        if ok {
            Ok(reply)
        } else {
            Err(ApiError::Server(reply.message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_loses_its_trailing_slash() {
        let client = ApiClient::new("http://localhost:5002/");
        assert_eq!(
            client.url("/list_files"),
            "http://localhost:5002/list_files"
        );
    }
}
