use crate::api::FetchedFile;
use log::{info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Extensions handed to the out-of-process 3D viewer.
pub const POINT_CLOUD_EXTENSIONS: [&str; 2] = ["npy", "pcd"];

const HEX_BYTES_PER_LINE: usize = 16;

/// Renderer choice for a fetched document. Precedence: point-cloud
/// extension, then image MIME, then text/JSON MIME, then hex dump.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreviewKind {
    PointCloud,
    Image,
    Text,
    Binary,
}

pub fn classify(path: &str, mime_type: &str) -> PreviewKind {
    let extension = Path::new(path)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if POINT_CLOUD_EXTENSIONS.contains(&extension.as_str()) {
        PreviewKind::PointCloud
    } else if mime_type.starts_with("image/") {
        PreviewKind::Image
    } else if mime_type.starts_with("text/") || mime_type.contains("json") {
        PreviewKind::Text
    } else {
        PreviewKind::Binary
    }
}

/// What the viewer pane shows. Images carry decoded pixels; the texture
/// is created lazily on the UI thread.
pub enum PreviewContent {
    Image(egui::ColorImage),
    Text(String),
    Hex(String),
    /// The content went to an external process; only a notice remains.
    Handoff(String),
    /// Something about the content itself failed (decode, disk).
    Message(String),
}

/// Prepares the preview for one fetched document: writes the bytes into
/// the scratch directory, then dispatches by `classify`.
pub fn build_preview(
    path: &str,
    file: &FetchedFile,
    scratch_root: &Path,
    viewer_cmd: Option<&str>,
) -> PreviewContent {
    let scratch_file = match write_scratch(scratch_root, path, &file.bytes) {
        Ok(dest) => Some(dest),
        Err(e) => {
            warn!("Failed to write scratch copy of '{}': {}", path, e);
            None
        }
    };

    match classify(path, &file.mime_type) {
        PreviewKind::PointCloud => {
            let Some(scratch_file) = scratch_file else {
                return PreviewContent::Message(format!(
                    "Cannot open the 3D viewer: no scratch copy of '{}'.",
                    path
                ));
            };
            match launch_viewer(&scratch_file, viewer_cmd) {
                Ok(()) => {
                    PreviewContent::Handoff(format!("Opening the 3D viewer for '{}'...", path))
                }
                Err(e) => PreviewContent::Message(format!("Failed to open the 3D viewer: {}", e)),
            }
        }
        PreviewKind::Image => match decode_image(&file.bytes) {
            Ok(image) => PreviewContent::Image(image),
            Err(e) => PreviewContent::Message(e),
        },
        PreviewKind::Text => PreviewContent::Text(render_text(&file.bytes)),
        PreviewKind::Binary => PreviewContent::Hex(format_hex_dump(&file.bytes)),
    }
}

/// Writes fetched bytes under the scratch root, keeping the relative
/// layout so sibling files land next to each other.
pub fn write_scratch(scratch_root: &Path, relative: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    let mut dest = scratch_root.to_path_buf();
    for segment in relative.split('/') {
        dest.push(segment);
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&dest, bytes)?;
    Ok(dest)
}

/// Hands a scratch file to the external viewer: the configured command
/// when set, the OS default handler otherwise. Fire-and-forget; no
/// liveness tracking, no result channel.
fn launch_viewer(scratch_file: &Path, viewer_cmd: Option<&str>) -> Result<(), String> {
    match viewer_cmd {
        Some(command) => {
            let mut parts = command.split_whitespace();
            let program = parts
                .next()
                .ok_or_else(|| "empty viewer command".to_string())?;
            Command::new(program)
                .args(parts)
                .arg(scratch_file)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .map_err(|e| format!("failed to spawn '{}': {}", program, e))?;
            info!("Launched 3D viewer '{}' for {}", program, scratch_file.display());
            Ok(())
        }
        None => {
            open::that_detached(scratch_file).map_err(|e| e.to_string())?;
            info!("Opened {} with the OS handler", scratch_file.display());
            Ok(())
        }
    }
}

pub fn decode_image(bytes: &[u8]) -> Result<egui::ColorImage, String> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| format!("Failed to decode image: {}", e))?
        .to_rgba8();
    let size = [decoded.width() as usize, decoded.height() as usize];
    Ok(egui::ColorImage::from_rgba_unmultiplied(
        size,
        decoded.as_raw(),
    ))
}

/// Uniform downscale to fit the viewport; never upscales.
pub fn fit_size(image: egui::Vec2, available: egui::Vec2) -> egui::Vec2 {
    let scale = (available.x / image.x)
        .min(available.y / image.y)
        .min(1.0);
    image * scale
}

/// Text rendering: UTF-8 (lossy) with JSON pretty-printed at 4-space
/// indent when the content parses, raw text otherwise.
pub fn render_text(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    pretty_json(&text).unwrap_or_else(|| text.into_owned())
}

pub fn pretty_json(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value.serialize(&mut serializer).ok()?;
    String::from_utf8(buffer).ok()
}

/// Classic hex dump: 8-digit uppercase offset, 16 space-joined uppercase
/// byte pairs padded to a fixed column, printable ASCII on the right.
pub fn format_hex_dump(data: &[u8]) -> String {
    let mut lines = Vec::new();
    for (line_index, chunk) in data.chunks(HEX_BYTES_PER_LINE).enumerate() {
        let hex_part = chunk
            .iter()
            .map(|byte| format!("{:02X}", byte))
            .collect::<Vec<_>>()
            .join(" ");
        let text_part: String = chunk
            .iter()
            .map(|&byte| {
                if (0x20..0x7f).contains(&byte) {
                    byte as char
                } else {
                    '.'
                }
            })
            .collect();
        lines.push(format!(
            "{:08X}  {:<width$}  |{}|",
            line_index * HEX_BYTES_PER_LINE,
            hex_part,
            text_part,
            width = HEX_BYTES_PER_LINE * 3
        ));
    }
    lines.join("\n")
}
