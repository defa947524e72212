//! Scene snapshot returned by the `dump_hierarchy` command.
//!
//! The host describes its scene as a tree of [`SceneNode`]s; the snapshot
//! sent on the wire is the flattened, depth-first [`SceneDump`] in which
//! every object records the id of its parent (`0` for roots).

use serde::{Deserialize, Serialize};

use crate::constants::NO_ACTIVE_SCENE;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ONE: Self = Self {
        x: 1.0,
        y: 1.0,
        z: 1.0,
    };
}

/// One object of a flattened scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDump {
    pub name: String,
    pub id: i64,
    pub parent_id: i64,
    pub active: bool,
    pub is_static: bool,
    pub tag: String,
    pub layer: String,
    /// World-space position.
    pub pos: Vec3,
    /// World-space euler rotation in degrees.
    pub rot: Vec3,
    pub scale: Vec3,
    /// Component type names; disabled components carry a ` (Disabled)` suffix.
    pub components: Vec<String>,
}

/// Snapshot of the host's active scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDump {
    pub scene_name: String,
    #[serde(default)]
    pub objects: Vec<ObjectDump>,
}

/// A node of the host's scene tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneNode {
    pub name: String,
    pub id: i64,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default = "default_layer")]
    pub layer: String,
    #[serde(default)]
    pub pos: Vec3,
    #[serde(default)]
    pub rot: Vec3,
    #[serde(default = "default_scale")]
    pub scale: Vec3,
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub children: Vec<SceneNode>,
}

fn default_true() -> bool {
    true
}

fn default_tag() -> String {
    "Untagged".into()
}

fn default_layer() -> String {
    "Default".into()
}

fn default_scale() -> Vec3 {
    Vec3::ONE
}

impl SceneDump {
    /// Snapshot reported when no scene is loaded.
    pub fn empty() -> Self {
        Self {
            scene_name: NO_ACTIVE_SCENE.into(),
            objects: Vec::new(),
        }
    }

    /// Flattens a scene tree, visiting each node before its children.
    pub fn from_roots(scene_name: impl Into<String>, roots: &[SceneNode]) -> Self {
        let mut dump = Self {
            scene_name: scene_name.into(),
            objects: Vec::new(),
        };
        for root in roots {
            dump.push_subtree(root, 0);
        }
        dump
    }

    fn push_subtree(&mut self, node: &SceneNode, parent_id: i64) {
        self.objects.push(ObjectDump {
            name: node.name.clone(),
            id: node.id,
            parent_id,
            active: node.active,
            is_static: node.is_static,
            tag: node.tag.clone(),
            layer: node.layer.clone(),
            pos: node.pos,
            rot: node.rot,
            scale: node.scale,
            components: node.components.clone(),
        });
        for child in &node.children {
            self.push_subtree(child, node.id);
        }
    }

    /// Pretty-printed JSON, the form sent back to the requesting client.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
