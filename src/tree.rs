use std::collections::BTreeMap;
use std::fmt;

/// A node in the server file tree: folders carry their children by name,
/// files are bare leaves. The tree is a pure presentation structure,
/// rebuilt from the flat server listing on every refresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathNode {
    Folder(BTreeMap<String, PathNode>),
    File,
}

#[derive(Debug, PartialEq, Eq)]
pub enum TreeError {
    /// A path names an existing node of the other kind (file vs folder).
    Conflict { path: String },
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeError::Conflict { path } => {
                write!(f, "'{}' is listed as both a file and a folder", path)
            }
        }
    }
}

/// Builds a folder-rooted tree from `/`-delimited relative paths. Every
/// strict prefix becomes a folder, every full path a file leaf. Inputs
/// are trusted (no `..`/absolute normalization).
pub fn build_path_tree(paths: &[String]) -> Result<PathNode, TreeError> {
    let mut root = BTreeMap::new();
    for path in paths {
        insert_path(&mut root, path)?;
    }
    Ok(PathNode::Folder(root))
}

fn insert_path(root: &mut BTreeMap<String, PathNode>, path: &str) -> Result<(), TreeError> {
    let segments: Vec<&str> = path.split('/').collect();
    let mut node = root;
    for (depth, segment) in segments.iter().enumerate() {
        if depth + 1 == segments.len() {
            if let Some(PathNode::Folder(_)) = node.get(*segment) {
                return Err(TreeError::Conflict {
                    path: path.to_string(),
                });
            }
            node.insert((*segment).to_string(), PathNode::File);
        } else {
            let child = node
                .entry((*segment).to_string())
                .or_insert_with(|| PathNode::Folder(BTreeMap::new()));
            match child {
                PathNode::Folder(children) => node = children,
                PathNode::File => {
                    return Err(TreeError::Conflict {
                        path: segments[..=depth].join("/"),
                    })
                }
            }
        }
    }
    Ok(())
}

/// Children in display order: folders before files, case-sensitive
/// alphabetical within each group.
pub fn ordered_children(children: &BTreeMap<String, PathNode>) -> Vec<(&String, &PathNode)> {
    let mut items: Vec<_> = children.iter().collect();
    items.sort_by(|(a_name, a_node), (b_name, b_node)| {
        let a_is_folder = matches!(a_node, PathNode::Folder(_));
        let b_is_folder = matches!(b_node, PathNode::Folder(_));
        if a_is_folder != b_is_folder {
            return b_is_folder.cmp(&a_is_folder);
        }
        a_name.cmp(b_name)
    });
    items
}

/// All file leaves as full reconstructed paths, in depth-first display
/// order. This is the insertion order of the selection map.
pub fn file_paths(root: &PathNode) -> Vec<String> {
    let mut out = Vec::new();
    if let PathNode::Folder(children) = root {
        collect_paths(children, "", &mut out);
    }
    out
}

fn collect_paths(children: &BTreeMap<String, PathNode>, prefix: &str, out: &mut Vec<String>) {
    for (name, node) in ordered_children(children) {
        let full = join_path(prefix, name);
        match node {
            PathNode::Folder(grandchildren) => collect_paths(grandchildren, &full, out),
            PathNode::File => out.push(full),
        }
    }
}

pub fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Flat path -> selected mapping, the sole source of truth for what to
/// fetch. Entries keep their insertion order; batch fetches walk them in
/// exactly that order.
#[derive(Default)]
pub struct SelectionMap {
    entries: Vec<(String, bool)>,
}

impl SelectionMap {
    /// Discards all entries and re-creates one unselected entry per path.
    pub fn rebuild(&mut self, paths: impl IntoIterator<Item = String>) {
        self.entries = paths.into_iter().map(|path| (path, false)).collect();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn state_mut(&mut self, path: &str) -> Option<&mut bool> {
        self.entries
            .iter_mut()
            .find(|(entry, _)| entry == path)
            .map(|(_, selected)| selected)
    }

    /// Flips every existing entry in one pass; never changes which
    /// entries exist.
    pub fn set_all(&mut self, selected: bool) {
        for (_, state) in &mut self.entries {
            *state = selected;
        }
    }

    /// Selected paths in insertion order.
    pub fn selected(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, selected)| *selected)
            .map(|(path, _)| path.clone())
            .collect()
    }
}
