// ABOUTME: Structure tree produced by the generation pipeline
// ABOUTME: Flattens file/folder nodes into root-prefixed path + content records

use serde::{Deserialize, Serialize};

/// Node kind in a generated structure tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    File,
    Folder,
}

/// One node of the structure tree, as emitted by the developer agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureNode {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<StructureNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// A flattened file: full slash-separated path plus content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatFile {
    pub path: String,
    pub content: String,
}

/// Flatten a structure tree into path + content pairs, depth first, in order.
///
/// Files without content become empty files. Folders without children are
/// dropped since there is nothing to write for them.
pub fn flatten_structure(nodes: &[StructureNode]) -> Vec<FlatFile> {
    let mut files = Vec::new();
    flatten_into(nodes, "", &mut files);
    files
}

fn flatten_into(nodes: &[StructureNode], base: &str, out: &mut Vec<FlatFile>) {
    for node in nodes {
        let path = if base.is_empty() {
            node.name.trim_matches('/').to_string()
        } else {
            format!("{}/{}", base, node.name.trim_matches('/'))
        };

        match node.node_type {
            NodeType::File => out.push(FlatFile {
                path,
                content: node.content.clone().unwrap_or_default(),
            }),
            NodeType::Folder => {
                if let Some(children) = &node.children {
                    flatten_into(children, &path, out);
                }
            }
        }
    }
}

/// Normalize a generated path into the layout the preview expects.
///
/// Models like to put the Vite entry under `public/`; Vite wants it at the
/// frontend root.
pub fn normalize_project_path(path: &str) -> String {
    let normalized = path.trim();

    if normalized == "frontend/public/index.html" {
        return "frontend/index.html".to_string();
    }

    normalized.to_string()
}
