use actix_multipart::form::{tempfile::TempFile, text::Text, MultipartForm};
use serde::{Deserialize, Serialize};

/// Body of `POST /get_documents`.
#[derive(Deserialize)]
pub struct DocumentsRequest {
    pub documents: Vec<String>,
}

/// Per-document payload in the batch response; bytes travel as base64.
#[derive(Serialize)]
pub struct DocumentPayload {
    pub mime_type: String,
    pub data: String,
}

/// JSON body of the generation triggers.
#[derive(Deserialize)]
pub struct GenerateRequest {
    pub options: Vec<String>,
}

/// Multipart body of the generation triggers: an optional YAML config
/// upload plus an `options` field holding a JSON-encoded list of strings.
#[derive(MultipartForm)]
pub struct GenerateForm {
    #[multipart(limit = "1MB")]
    pub config_file: Option<TempFile>,
    pub options: Text<String>,
}
