use crate::api::{ApiClient, ConfigUpload, FetchedFile};
use crate::config_editor::{ConfigEditor, EditorAction};
use crate::fetch::{self, FetchBatch};
use crate::preview::{self, PreviewContent};
use crate::tree::{self, PathNode, SelectionMap};
use log::{info, warn};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender};
use std::thread;

const TREE_LABEL_LEN: usize = 40;
const CARD_DIR_LEN: usize = 45;
const TITLE_LEN: usize = 50;

const SUCCESS_BORDER: egui::Color32 = egui::Color32::from_rgb(0x28, 0xa7, 0x45);
const ERROR_BORDER: egui::Color32 = egui::Color32::from_rgb(0xdc, 0x35, 0x45);

/// Messages marshalled from worker threads back onto the UI thread.
/// Drained at the top of every frame; workers never touch UI state.
enum UiMsg {
    FilesLoaded(Result<Vec<String>, String>),
    GenerationFinished {
        regenerate: bool,
        result: Result<(), String>,
    },
    FetchProgress {
        current: usize,
        total: usize,
        path: String,
    },
    BatchFinished(FetchBatch),
    SingleFinished {
        path: String,
        result: Result<FetchedFile, String>,
    },
    SimulationReply(Result<String, String>),
}

#[derive(Clone, Copy)]
enum SimCall {
    Start,
    Status,
    Clear,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Pane {
    Results,
    Viewer,
}

enum CardAction {
    View(usize),
    Save(usize),
}

pub struct App {
    ctx: egui::Context,
    api: ApiClient,
    tx: Sender<UiMsg>,
    rx: Receiver<UiMsg>,

    status: String,

    // Server file tree and its flat checked-set, rebuilt together on
    // every refresh.
    file_tree: Option<PathNode>,
    tree_note: Option<String>,
    selection: SelectionMap,
    select_all: bool,

    gen_options: Vec<(String, bool)>,

    refreshing: bool,
    generating: bool,
    regenerating: bool,
    fetching: bool,
    sim_busy: bool,

    batch: Option<FetchBatch>,
    pane: Pane,
    viewer_title: String,
    viewer_full_title: String,
    preview: Option<PreviewContent>,
    preview_texture: Option<egui::TextureHandle>,

    simulation_line: String,

    config_path: PathBuf,
    config_editor: Option<ConfigEditor>,
    config_error: Option<String>,

    viewer_cmd: Option<String>,
    scratch: tempfile::TempDir,
}

impl App {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let (tx, rx) = std::sync::mpsc::channel();
        let scratch = tempfile::TempDir::new()?;
        info!("Scratch directory at {}", scratch.path().display());

        let gen_options = ["replicator", "grip", "clamp"]
            .into_iter()
            .enumerate()
            .map(|(index, name)| (name.to_string(), index == 0))
            .collect();

        let mut app = Self {
            ctx: cc.egui_ctx.clone(),
            api: ApiClient::from_env(),
            tx,
            rx,
            status: "Ready.".to_string(),
            file_tree: None,
            tree_note: None,
            selection: SelectionMap::default(),
            select_all: false,
            gen_options,
            refreshing: false,
            generating: false,
            regenerating: false,
            fetching: false,
            sim_busy: false,
            batch: None,
            pane: Pane::Results,
            viewer_title: String::new(),
            viewer_full_title: String::new(),
            preview: None,
            preview_texture: None,
            simulation_line: String::new(),
            config_path: PathBuf::from(
                env::var("SCENEVIEW_CONFIG").unwrap_or_else(|_| "config.yaml".to_string()),
            ),
            config_editor: None,
            config_error: None,
            viewer_cmd: env::var("SCENEVIEW_3D_VIEWER").ok(),
            scratch,
        };
        app.refresh_files();
        Ok(app)
    }

    // ----- worker launchers -------------------------------------------------

    fn refresh_files(&mut self) {
        if self.refreshing {
            return;
        }
        self.refreshing = true;
        self.status = "Refreshing file list...".to_string();
        let api = self.api.clone();
        let tx = self.tx.clone();
        let ctx = self.ctx.clone();
        thread::spawn(move || {
            let result = api.list_files().map_err(|e| e.to_string());
            let _ = tx.send(UiMsg::FilesLoaded(result));
            ctx.request_repaint();
        });
    }

    fn start_generation(&mut self, regenerate: bool) {
        if self.generating || self.regenerating {
            return;
        }
        let options: Vec<String> = self
            .gen_options
            .iter()
            .filter(|(_, enabled)| *enabled)
            .map(|(name, _)| name.clone())
            .collect();
        if options.is_empty() {
            self.status = "Error: select at least one generation option.".to_string();
            return;
        }

        if regenerate {
            self.regenerating = true;
            self.status = "Regeneration in progress...".to_string();
        } else {
            self.generating = true;
            self.status = if self.config_path.exists() {
                "Generating with config.yaml...".to_string()
            } else {
                "Info: config.yaml not found, generating without it.".to_string()
            };
        }

        let api = self.api.clone();
        let tx = self.tx.clone();
        let ctx = self.ctx.clone();
        let config_path = self.config_path.clone();
        thread::spawn(move || {
            let result = if regenerate {
                api.regenerate_data(&options)
            } else {
                // Generation attaches the local config when present;
                // regeneration never does.
                let config = fs::read(&config_path).ok().map(|bytes| ConfigUpload {
                    file_name: config_path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "config.yaml".to_string()),
                    bytes,
                });
                api.generate_scene(&options, config)
            };
            let _ = tx.send(UiMsg::GenerationFinished {
                regenerate,
                result: result.map_err(|e| e.to_string()),
            });
            ctx.request_repaint();
        });
    }

    fn start_fetch(&mut self) {
        if self.fetching {
            return;
        }
        let selected = self.selection.selected();
        if selected.is_empty() {
            self.status = "No file selected.".to_string();
            return;
        }
        self.fetching = true;

        let api = self.api.clone();
        let tx = self.tx.clone();
        let ctx = self.ctx.clone();

        if let [path] = selected.as_slice() {
            // A single selection skips the result list and goes straight
            // to the viewer.
            let path = path.clone();
            self.status = format!("Fetching file: {}...", path);
            thread::spawn(move || {
                let result = api.get_document(&path).map_err(|e| e.to_string());
                let _ = tx.send(UiMsg::SingleFinished { path, result });
                ctx.request_repaint();
            });
        } else {
            self.status = format!("Fetching {} files...", selected.len());
            thread::spawn(move || {
                let progress_tx = tx.clone();
                let progress_ctx = ctx.clone();
                let batch = fetch::fetch_selected(&api, &selected, |current, total, path| {
                    let _ = progress_tx.send(UiMsg::FetchProgress {
                        current,
                        total,
                        path: path.to_string(),
                    });
                    progress_ctx.request_repaint();
                });
                let _ = tx.send(UiMsg::BatchFinished(batch));
                ctx.request_repaint();
            });
        }
    }

    fn simulation_call(&mut self, call: SimCall) {
        if self.sim_busy {
            return;
        }
        self.sim_busy = true;
        self.status = "Contacting the simulation service...".to_string();
        let api = self.api.clone();
        let tx = self.tx.clone();
        let ctx = self.ctx.clone();
        thread::spawn(move || {
            let result = match call {
                SimCall::Start => api.start_simulation(),
                SimCall::Status => api
                    .simulation_status()
                    .map(|(state, message)| format!("{}: {}", state, message)),
                SimCall::Clear => api.clear_simulation(),
            };
            let _ = tx.send(UiMsg::SimulationReply(result.map_err(|e| e.to_string())));
            ctx.request_repaint();
        });
    }

    // ----- message handling -------------------------------------------------

    fn handle_message(&mut self, msg: UiMsg) {
        match msg {
            UiMsg::FilesLoaded(result) => {
                self.refreshing = false;
                self.select_all = false;
                match result {
                    Ok(files) if files.is_empty() => {
                        self.file_tree = None;
                        self.tree_note = Some("No files on the server.".to_string());
                        self.selection.clear();
                        self.status = "No files found on the server.".to_string();
                    }
                    Ok(files) => match tree::build_path_tree(&files) {
                        Ok(root) => {
                            self.selection.rebuild(tree::file_paths(&root));
                            self.file_tree = Some(root);
                            self.tree_note = None;
                            self.status = format!("Found {} files on the server.", files.len());
                        }
                        Err(e) => {
                            warn!("Rejected server listing: {}", e);
                            self.file_tree = None;
                            self.tree_note = Some("Invalid listing from the server.".to_string());
                            self.selection.clear();
                            self.status = format!("Invalid listing: {}", e);
                        }
                    },
                    Err(e) => {
                        self.file_tree = None;
                        self.tree_note = Some("❌ Server unreachable.".to_string());
                        self.selection.clear();
                        self.status = format!("Server unreachable: {}", e);
                    }
                }
            }
            UiMsg::GenerationFinished { regenerate, result } => {
                if regenerate {
                    self.regenerating = false;
                } else {
                    self.generating = false;
                }
                match result {
                    Ok(()) => {
                        self.status = "Operation completed successfully.".to_string();
                        self.refresh_files();
                    }
                    Err(e) => self.status = format!("Connection error: {}", e),
                }
            }
            UiMsg::FetchProgress {
                current,
                total,
                path,
            } => {
                self.status = format!("Fetching {}/{}: {}...", current, total, path);
            }
            UiMsg::BatchFinished(batch) => {
                self.fetching = false;
                self.status = batch.summary();
                self.batch = Some(batch);
                self.pane = Pane::Results;
            }
            UiMsg::SingleFinished { path, result } => {
                self.fetching = false;
                match result {
                    Ok(file) => {
                        self.status = format!("Viewing: {}", path);
                        self.open_viewer(path, file);
                    }
                    Err(e) => {
                        self.status = format!("Error fetching {}: {}", path, e);
                        self.batch = Some(FetchBatch {
                            files: Vec::new(),
                            errors: vec![(path, e)],
                        });
                        self.pane = Pane::Results;
                    }
                }
            }
            UiMsg::SimulationReply(result) => {
                self.sim_busy = false;
                let line = match result {
                    Ok(line) => line,
                    Err(line) => line,
                };
                self.simulation_line = line.clone();
                self.status = line;
            }
        }
    }

    // ----- actions ----------------------------------------------------------

    fn open_viewer(&mut self, path: String, file: FetchedFile) {
        self.viewer_title = truncate_label(&path, TITLE_LEN);
        self.viewer_full_title = path.clone();
        self.preview_texture = None;
        self.preview = Some(preview::build_preview(
            &path,
            &file,
            self.scratch.path(),
            self.viewer_cmd.as_deref(),
        ));
        self.pane = Pane::Viewer;
    }

    fn open_config_editor(&mut self) {
        if self.config_editor.is_some() {
            return;
        }
        if !self.config_path.exists() {
            self.config_error = Some(format!("File '{}' not found.", self.config_path.display()));
            return;
        }
        match ConfigEditor::load(self.config_path.clone()) {
            Ok(editor) => self.config_editor = Some(editor),
            Err(e) => self.config_error = Some(e),
        }
    }

    fn save_file(&mut self, path: &str, bytes: &[u8]) {
        let basename = path.rsplit('/').next().unwrap_or(path);
        let Some(dest) = rfd::FileDialog::new()
            .set_file_name(basename)
            .set_title(format!("Save {}", path))
            .save_file()
        else {
            return;
        };
        match fs::write(&dest, bytes) {
            Ok(()) => self.status = format!("File '{}' saved.", basename),
            Err(e) => self.status = format!("Save error: {}", e),
        }
    }

    // ----- ui ---------------------------------------------------------------

    fn generation_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("Scene Generation");
        ui.add_space(4.0);
        for (name, enabled) in &mut self.gen_options {
            ui.checkbox(enabled, option_label(name));
        }
        ui.add_space(4.0);
        ui.horizontal(|ui| {
            let idle = !self.generating && !self.regenerating;
            let generate_label = if self.generating {
                "In progress..."
            } else {
                "Generate Scene"
            };
            if ui
                .add_enabled(idle, egui::Button::new(generate_label))
                .clicked()
            {
                self.start_generation(false);
            }
            let regenerate_label = if self.regenerating {
                "In progress..."
            } else {
                "Regenerate Data"
            };
            if ui
                .add_enabled(idle, egui::Button::new(regenerate_label))
                .clicked()
            {
                self.start_generation(true);
            }
        });
        if ui.button("Edit Configuration ⚙").clicked() {
            self.open_config_editor();
        }
    }

    fn simulation_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("Simulation");
        ui.add_space(4.0);
        ui.horizontal(|ui| {
            let idle = !self.sim_busy;
            if ui.add_enabled(idle, egui::Button::new("Start")).clicked() {
                self.simulation_call(SimCall::Start);
            }
            if ui.add_enabled(idle, egui::Button::new("Status")).clicked() {
                self.simulation_call(SimCall::Status);
            }
            if ui.add_enabled(idle, egui::Button::new("Clear")).clicked() {
                self.simulation_call(SimCall::Clear);
            }
        });
        if !self.simulation_line.is_empty() {
            ui.weak(&self.simulation_line);
        }
    }

    fn files_ui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("Server Files");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let refresh = ui.add_enabled(!self.refreshing, egui::Button::new("⟳"));
                if refresh.on_hover_text("Refresh the file list").clicked() {
                    self.refresh_files();
                }
            });
        });

        let tree_height = (ui.available_height() - 40.0).max(120.0);
        egui::ScrollArea::vertical()
            .id_salt("file_tree")
            .max_height(tree_height)
            .auto_shrink([false; 2])
            .show(ui, |ui| {
                if let Some(note) = &self.tree_note {
                    ui.add_space(8.0);
                    ui.weak(note);
                } else if let Some(PathNode::Folder(children)) = &self.file_tree {
                    show_tree(ui, children, "", &mut self.selection);
                }
            });

        ui.separator();
        ui.horizontal(|ui| {
            let has_files = !self.selection.is_empty();
            let all_box = ui.add_enabled(
                has_files,
                egui::Checkbox::new(&mut self.select_all, "All"),
            );
            if all_box.changed() {
                self.selection.set_all(self.select_all);
            }
            let fetch_label = if self.fetching {
                "Fetching..."
            } else {
                "Fetch Selected Files"
            };
            if ui
                .add_enabled(has_files && !self.fetching, egui::Button::new(fetch_label))
                .clicked()
            {
                self.start_fetch();
            }
        });
    }

    fn results_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("Fetched Data");
        ui.add_space(4.0);
        let mut action = None;
        egui::ScrollArea::vertical()
            .id_salt("results")
            .auto_shrink([false; 2])
            .show(ui, |ui| match &self.batch {
                Some(batch) if batch.total() > 0 => {
                    for (index, (path, _)) in batch.files.iter().enumerate() {
                        success_card(ui, index, path, &mut action);
                    }
                    for (path, message) in &batch.errors {
                        error_card(ui, path, message);
                    }
                }
                _ => {
                    ui.add_space(8.0);
                    ui.weak("Fetched files will appear here.");
                }
            });

        match action {
            Some(CardAction::View(index)) => {
                if let Some((path, file)) = self
                    .batch
                    .as_ref()
                    .and_then(|batch| batch.files.get(index))
                    .cloned()
                {
                    self.status = format!("Viewing: {}", path);
                    self.open_viewer(path, file);
                }
            }
            Some(CardAction::Save(index)) => {
                if let Some((path, file)) = self
                    .batch
                    .as_ref()
                    .and_then(|batch| batch.files.get(index))
                    .cloned()
                {
                    self.save_file(&path, &file.bytes);
                }
            }
            None => {}
        }
    }

    fn viewer_ui(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.horizontal(|ui| {
            let title = ui.heading(format!("Viewer: {}", self.viewer_title));
            if self.viewer_full_title.chars().count() > TITLE_LEN {
                title.on_hover_text(&self.viewer_full_title);
            }
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("← Back").clicked() {
                    self.pane = Pane::Results;
                }
            });
        });
        ui.separator();

        match &self.preview {
            Some(PreviewContent::Image(image)) => {
                let texture = self.preview_texture.get_or_insert_with(|| {
                    ctx.load_texture("preview_image", image.clone(), egui::TextureOptions::LINEAR)
                });
                let available = ui.available_size() - egui::vec2(20.0, 20.0);
                let size = preview::fit_size(texture.size_vec2(), available);
                ui.centered_and_justified(|ui| {
                    ui.image(egui::load::SizedTexture::new(texture.id(), size));
                });
            }
            Some(PreviewContent::Text(text) | PreviewContent::Hex(text)) => {
                egui::ScrollArea::both()
                    .id_salt("viewer_text")
                    .auto_shrink([false; 2])
                    .show(ui, |ui| {
                        let mut display = text.as_str();
                        ui.add(
                            egui::TextEdit::multiline(&mut display)
                                .font(egui::TextStyle::Monospace)
                                .desired_width(f32::INFINITY),
                        );
                    });
            }
            Some(PreviewContent::Handoff(message) | PreviewContent::Message(message)) => {
                ui.centered_and_justified(|ui| {
                    ui.label(message);
                });
            }
            None => {
                ui.weak("Nothing to display.");
            }
        }
    }
}

impl eframe::App for App {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        while let Ok(msg) = self.rx.try_recv() {
            self.handle_message(msg);
        }

        if let Some(message) = self.config_error.clone() {
            egui::Window::new("Configuration Error")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
                .show(ctx, |ui| {
                    ui.label(message);
                    ui.add_space(8.0);
                    if ui.button("OK").clicked() {
                        self.config_error = None;
                    }
                });
        }

        let mut editor_action = EditorAction::KeepOpen;
        if let Some(editor) = &mut self.config_editor {
            editor_action = editor.show(ctx);
        }
        match editor_action {
            EditorAction::Saved => {
                if let Some(editor) = &self.config_editor {
                    match editor.save() {
                        Ok(()) => {
                            self.status = format!(
                                "Configuration '{}' updated.",
                                self.config_path.display()
                            );
                            self.config_editor = None;
                        }
                        Err(e) => self.config_error = Some(e),
                    }
                }
            }
            EditorAction::Cancelled => self.config_editor = None,
            EditorAction::KeepOpen => {}
        }

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.label(&self.status);
        });

        egui::SidePanel::left("controls")
            .resizable(true)
            .default_width(350.0)
            .min_width(300.0)
            .show(ctx, |ui| {
                self.generation_ui(ui);
                ui.separator();
                self.simulation_ui(ui);
                ui.separator();
                self.files_ui(ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| match self.pane {
            Pane::Results => self.results_ui(ui),
            Pane::Viewer => self.viewer_ui(ui, ctx),
        });
    }
}

/// Depth-first tree rendering: folders before files, collapsed by
/// default, checkboxes bound to the flat selection map by full path.
fn show_tree(
    ui: &mut egui::Ui,
    children: &BTreeMap<String, PathNode>,
    prefix: &str,
    selection: &mut SelectionMap,
) {
    for (name, node) in tree::ordered_children(children) {
        let full = tree::join_path(prefix, name);
        match node {
            PathNode::Folder(grandchildren) => {
                let response = egui::CollapsingHeader::new(format!(
                    "📁 {}",
                    truncate_label(name, TREE_LABEL_LEN)
                ))
                .id_salt(&full)
                .default_open(false)
                .show(ui, |ui| show_tree(ui, grandchildren, &full, selection));
                if name.chars().count() > TREE_LABEL_LEN {
                    response.header_response.on_hover_text(name);
                }
            }
            PathNode::File => {
                if let Some(state) = selection.state_mut(&full) {
                    let response = ui.checkbox(
                        state,
                        format!("📄 {}", truncate_label(name, TREE_LABEL_LEN)),
                    );
                    if name.chars().count() > TREE_LABEL_LEN {
                        response.on_hover_text(name);
                    }
                }
            }
        }
    }
}

fn success_card(ui: &mut egui::Ui, index: usize, path: &str, action: &mut Option<CardAction>) {
    card_frame(SUCCESS_BORDER).show(ui, |ui| {
        ui.set_min_width(ui.available_width());
        ui.horizontal(|ui| {
            ui.vertical(|ui| {
                let (directory, name) = match path.rsplit_once('/') {
                    Some((directory, name)) => (Some(directory), name),
                    None => (None, path),
                };
                if let Some(directory) = directory {
                    ui.label(
                        egui::RichText::new(format!(
                            "In: {}",
                            truncate_label(directory, CARD_DIR_LEN)
                        ))
                        .italics()
                        .weak(),
                    );
                }
                let label = ui.label(
                    egui::RichText::new(format!("- {}", truncate_label(name, TITLE_LEN))).strong(),
                );
                if path.chars().count() > TITLE_LEN {
                    label.on_hover_text(path);
                }
            });
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("View").clicked() {
                    *action = Some(CardAction::View(index));
                }
                if ui.button("Save").clicked() {
                    *action = Some(CardAction::Save(index));
                }
            });
        });
    });
    ui.add_space(4.0);
}

fn error_card(ui: &mut egui::Ui, path: &str, message: &str) {
    card_frame(ERROR_BORDER).show(ui, |ui| {
        ui.set_min_width(ui.available_width());
        ui.vertical(|ui| {
            ui.label(
                egui::RichText::new(format!("❌ {}", truncate_label(path, TITLE_LEN))).strong(),
            );
            ui.label(egui::RichText::new(message).weak());
        });
    });
    ui.add_space(4.0);
}

fn card_frame(border: egui::Color32) -> egui::Frame {
    egui::Frame::new()
        .stroke(egui::Stroke::new(1.0, border))
        .corner_radius(6.0)
        .inner_margin(egui::Margin::same(8))
}

/// Ellipsis truncation for display labels; char-based so multibyte names
/// cannot split.
fn truncate_label(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        let kept: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        text.to_string()
    }
}

fn option_label(name: &str) -> String {
    name.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_keeps_short_labels_untouched() {
        assert_eq!(truncate_label("short.txt", 40), "short.txt");
    }

    #[test]
    fn truncation_cuts_to_the_limit_with_an_ellipsis() {
        let long = "a".repeat(60);
        let truncated = truncate_label(&long, 40);
        assert_eq!(truncated.chars().count(), 40);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn truncation_is_char_safe() {
        let long = "é".repeat(45);
        let truncated = truncate_label(&long, 40);
        assert_eq!(truncated.chars().count(), 40);
    }

    #[test]
    fn option_labels_read_like_titles() {
        assert_eq!(option_label("replicator"), "Replicator");
        assert_eq!(option_label("robot_arm"), "Robot Arm");
    }
}
