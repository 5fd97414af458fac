use log::info;
use serde_yaml::Value;
use std::fs;
use std::path::PathBuf;

/// Editable mirror of a YAML document. Maps and sequences keep their
/// structure; every scalar becomes a text buffer that remembers the kind
/// it had on load so saving can re-type it.
pub enum ConfigNode {
    Map(Vec<(String, ConfigNode)>),
    Seq(Vec<ConfigNode>),
    Scalar(ScalarField),
}

pub struct ScalarField {
    pub buffer: String,
    kind: ScalarKind,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScalarKind {
    Bool,
    Int,
    Float,
    Null,
    Text,
}

impl ConfigNode {
    pub fn from_value(value: &Value) -> ConfigNode {
        match value {
            Value::Mapping(mapping) => ConfigNode::Map(
                mapping
                    .iter()
                    .map(|(key, child)| (key_to_string(key), ConfigNode::from_value(child)))
                    .collect(),
            ),
            Value::Sequence(items) => {
                ConfigNode::Seq(items.iter().map(ConfigNode::from_value).collect())
            }
            scalar => ConfigNode::Scalar(ScalarField::from_value(scalar)),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            ConfigNode::Map(entries) => Value::Mapping(
                entries
                    .iter()
                    .map(|(key, child)| (Value::String(key.clone()), child.to_value()))
                    .collect(),
            ),
            ConfigNode::Seq(items) => {
                Value::Sequence(items.iter().map(ConfigNode::to_value).collect())
            }
            ConfigNode::Scalar(field) => field.to_value(),
        }
    }
}

fn key_to_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

impl ScalarField {
    fn from_value(value: &Value) -> ScalarField {
        let (buffer, kind) = match value {
            Value::Bool(b) => (b.to_string(), ScalarKind::Bool),
            Value::Number(n) if n.is_f64() => (n.to_string(), ScalarKind::Float),
            Value::Number(n) => (n.to_string(), ScalarKind::Int),
            Value::Null => ("null".to_string(), ScalarKind::Null),
            Value::String(s) => (s.clone(), ScalarKind::Text),
            other => (
                serde_yaml::to_string(other)
                    .map(|s| s.trim_end().to_string())
                    .unwrap_or_default(),
                ScalarKind::Text,
            ),
        };
        ScalarField { buffer, kind }
    }

    /// Re-types the edited text against the kind the value had on load,
    /// falling back to a plain string when it no longer parses.
    fn to_value(&self) -> Value {
        let raw = self.buffer.trim();
        match self.kind {
            ScalarKind::Bool => Value::Bool(matches!(
                raw.to_ascii_lowercase().as_str(),
                "true" | "1" | "t" | "y" | "yes"
            )),
            ScalarKind::Int => raw
                .parse::<i64>()
                .map(|n| Value::Number(n.into()))
                .unwrap_or_else(|_| Value::String(raw.to_string())),
            ScalarKind::Float => raw
                .parse::<f64>()
                .map(|n| Value::Number(serde_yaml::Number::from(n)))
                .unwrap_or_else(|_| Value::String(raw.to_string())),
            ScalarKind::Null => {
                if raw.is_empty() || matches!(raw.to_ascii_lowercase().as_str(), "null" | "none" | "~")
                {
                    Value::Null
                } else {
                    Value::String(raw.to_string())
                }
            }
            ScalarKind::Text => Value::String(self.buffer.clone()),
        }
    }
}

pub enum EditorAction {
    KeepOpen,
    Saved,
    Cancelled,
}

/// Modal-ish window editing the local YAML configuration as a recursive
/// form. Saving rewrites the file in full; there is no merge.
pub struct ConfigEditor {
    path: PathBuf,
    root: ConfigNode,
    search: String,
}

impl ConfigEditor {
    pub fn load(path: PathBuf) -> Result<Self, String> {
        let raw = fs::read_to_string(&path)
            .map_err(|e| format!("Cannot read '{}': {}", path.display(), e))?;
        let value: Value = serde_yaml::from_str(&raw)
            .map_err(|e| format!("Invalid YAML in '{}': {}", path.display(), e))?;
        Ok(Self {
            path,
            root: ConfigNode::from_value(&value),
            search: String::new(),
        })
    }

    pub fn save(&self) -> Result<(), String> {
        let text = serde_yaml::to_string(&self.root.to_value())
            .map_err(|e| format!("Failed to serialize configuration: {}", e))?;
        fs::write(&self.path, text)
            .map_err(|e| format!("Cannot write '{}': {}", self.path.display(), e))?;
        info!("Configuration rewritten at {}", self.path.display());
        Ok(())
    }

    pub fn show(&mut self, ctx: &egui::Context) -> EditorAction {
        let mut action = EditorAction::KeepOpen;
        let mut open = true;
        egui::Window::new("YAML Configuration Editor")
            .open(&mut open)
            .default_size([620.0, 640.0])
            .resizable(true)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.label("Search:");
                    ui.add(
                        egui::TextEdit::singleline(&mut self.search)
                            .hint_text("parameter name...")
                            .desired_width(240.0),
                    );
                    if !self.search.is_empty() && ui.small_button("✖").clicked() {
                        self.search.clear();
                    }
                });
                ui.separator();

                let query = self.search.to_lowercase();
                egui::ScrollArea::vertical()
                    .max_height(ui.available_height() - 40.0)
                    .auto_shrink([false; 2])
                    .show(ui, |ui| {
                        node_ui(ui, &mut self.root, &query);
                    });

                ui.separator();
                ui.horizontal(|ui| {
                    if ui.button("Save and Close").clicked() {
                        action = EditorAction::Saved;
                    }
                    if ui.button("Cancel").clicked() {
                        action = EditorAction::Cancelled;
                    }
                });
            });
        if !open {
            action = EditorAction::Cancelled;
        }
        action
    }
}

fn node_ui(ui: &mut egui::Ui, node: &mut ConfigNode, query: &str) {
    match node {
        ConfigNode::Map(entries) => {
            for (key, child) in entries {
                let matched = !query.is_empty() && key.to_lowercase().contains(query);
                let mut label = egui::RichText::new(format!("{}:", key)).strong();
                if matched {
                    label = label.background_color(ui.visuals().selection.bg_fill);
                }
                match child {
                    ConfigNode::Scalar(field) => {
                        ui.horizontal(|ui| {
                            ui.label(label);
                            ui.add(
                                egui::TextEdit::singleline(&mut field.buffer)
                                    .desired_width(f32::INFINITY),
                            );
                        });
                    }
                    _ => {
                        ui.label(label);
                        ui.indent(key.as_str(), |ui| node_ui(ui, child, query));
                    }
                }
            }
        }
        ConfigNode::Seq(items) => {
            for (index, item) in items.iter_mut().enumerate() {
                ui.label(egui::RichText::new(format!("- item {}", index)).weak());
                ui.indent(index, |ui| node_ui(ui, item, query));
            }
        }
        ConfigNode::Scalar(field) => {
            ui.add(egui::TextEdit::singleline(&mut field.buffer).desired_width(f32::INFINITY));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(yaml: &str) -> Value {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        ConfigNode::from_value(&value).to_value()
    }

    #[test]
    fn untouched_document_round_trips_with_types_intact() {
        let yaml = "name: test scene\ncount: 3\nscale: 1.5\nenabled: true\nseed: null\ntags:\n  - a\n  - b\nnested:\n  depth: 2\n";
        let expected: Value = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(roundtrip(yaml), expected);
    }

    #[test]
    fn key_order_is_preserved() {
        let yaml = "zebra: 1\nalpha: 2\nmiddle: 3\n";
        let value = roundtrip(yaml);
        let Value::Mapping(mapping) = value else {
            panic!("expected a mapping");
        };
        let keys: Vec<String> = mapping.keys().map(key_to_string).collect();
        assert_eq!(keys, vec!["zebra", "alpha", "middle"]);
    }

    #[test]
    fn edited_bool_accepts_friendly_spellings() {
        let value: Value = serde_yaml::from_str("flag: false").unwrap();
        let mut root = ConfigNode::from_value(&value);
        if let ConfigNode::Map(entries) = &mut root {
            if let ConfigNode::Scalar(field) = &mut entries[0].1 {
                field.buffer = "yes".to_string();
            }
        }
        let expected: Value = serde_yaml::from_str("flag: true").unwrap();
        assert_eq!(root.to_value(), expected);
    }

    #[test]
    fn a_number_edited_into_garbage_degrades_to_a_string() {
        let value: Value = serde_yaml::from_str("count: 3").unwrap();
        let mut root = ConfigNode::from_value(&value);
        if let ConfigNode::Map(entries) = &mut root {
            if let ConfigNode::Scalar(field) = &mut entries[0].1 {
                field.buffer = "three".to_string();
            }
        }
        let expected: Value = serde_yaml::from_str("count: three").unwrap();
        assert_eq!(root.to_value(), expected);
    }

    #[test]
    fn null_stays_null_until_given_real_content() {
        let value: Value = serde_yaml::from_str("seed: null").unwrap();
        let root = ConfigNode::from_value(&value);
        assert_eq!(root.to_value(), value);

        let mut root = ConfigNode::from_value(&value);
        if let ConfigNode::Map(entries) = &mut root {
            if let ConfigNode::Scalar(field) = &mut entries[0].1 {
                field.buffer = "42".to_string();
            }
        }
        let expected: Value = serde_yaml::from_str("seed: \"42\"").unwrap();
        assert_eq!(root.to_value(), expected);
    }
}
