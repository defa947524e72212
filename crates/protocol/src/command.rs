//! Command and response payloads carried in text frames.
//!
//! Every message is a JSON object of the form
//! `{"cmd": "<name>", "params": {...}}`. The relay itself only needs the
//! `cmd` name (and in its default mode not even that); the typed
//! [`ToolCommand`] variants describe what the host asks the generator tools
//! to build.

use serde::{Deserialize, Serialize};

/// Generic `{"cmd", "params"}` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub cmd: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,
}

impl CommandEnvelope {
    /// Parses a text payload into an envelope.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Responses the relay sends back to the client that issued a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Reply to the liveness check.
    Pong,
    /// Acknowledges that a command was relayed to the other clients.
    Relayed,
    /// Serialized scene snapshot, sent as-is.
    Snapshot(String),
    /// Command execution failed.
    Error(String),
}

impl Response {
    /// Renders the response as the JSON text put on the wire.
    pub fn to_json(&self) -> String {
        match self {
            Self::Pong => serde_json::json!({ "status": "pong" }).to_string(),
            Self::Relayed => serde_json::json!({ "status": "relayed" }).to_string(),
            Self::Snapshot(json) => json.clone(),
            Self::Error(message) => serde_json::json!({ "error": message }).to_string(),
        }
    }
}

/// Kind of nature asset the generator builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NatureKind {
    Tree,
    Rock,
}

/// Parameters of `generate_house`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseParams {
    pub level: u32,
    pub width: u32,
    pub depth: u32,
    pub seed: u32,
    /// Asset folder of the host project the tool exports into.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub export_path: String,
}

/// Parameters of `generate_nature`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NatureParams {
    #[serde(rename = "type")]
    pub kind: NatureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f32>,
    pub seed: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub export_path: String,
}

/// Parameters of `generate_humanoid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanoidParams {
    pub style: String,
    pub seed: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub export_path: String,
}

/// Commands the host relays to the generator tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params", rename_all = "snake_case")]
pub enum ToolCommand {
    GenerateHouse(HouseParams),
    GenerateNature(NatureParams),
    GenerateHumanoid(HumanoidParams),
}

/// Styles of the six-variant villager set.
pub const VILLAGER_STYLES: [&str; 6] = [
    "villager",
    "guard",
    "elder",
    "female_villager",
    "female_villager",
    "female_elder",
];

/// Number of levels in a house evolution batch.
pub const HOUSE_EVOLUTION_LEVELS: u32 = 5;

impl ToolCommand {
    pub fn house(level: u32, width: u32, depth: u32, seed: u32, export_path: &str) -> Self {
        Self::GenerateHouse(HouseParams {
            level,
            width,
            depth,
            seed,
            export_path: export_path.to_string(),
        })
    }

    pub fn tree(height: f32, seed: u32, export_path: &str) -> Self {
        Self::GenerateNature(NatureParams {
            kind: NatureKind::Tree,
            height: Some(height),
            scale: None,
            seed,
            export_path: export_path.to_string(),
        })
    }

    pub fn rock(scale: f32, seed: u32, export_path: &str) -> Self {
        Self::GenerateNature(NatureParams {
            kind: NatureKind::Rock,
            height: None,
            scale: Some(scale),
            seed,
            export_path: export_path.to_string(),
        })
    }

    pub fn humanoid(style: &str, seed: u32, export_path: &str) -> Self {
        Self::GenerateHumanoid(HumanoidParams {
            style: style.to_string(),
            seed,
            export_path: export_path.to_string(),
        })
    }

    /// Houses for levels 1 through 5, footprint growing by one unit per level.
    ///
    /// `seed` is called once per level.
    pub fn house_evolution(mut seed: impl FnMut() -> u32, export_path: &str) -> Vec<Self> {
        (1..=HOUSE_EVOLUTION_LEVELS)
            .map(|level| {
                let size = 5 + (level - 1);
                Self::house(level, size, size, seed(), export_path)
            })
            .collect()
    }

    /// One humanoid per entry of [`VILLAGER_STYLES`].
    pub fn villager_set(mut seed: impl FnMut() -> u32, export_path: &str) -> Vec<Self> {
        VILLAGER_STYLES
            .iter()
            .map(|style| Self::humanoid(style, seed(), export_path))
            .collect()
    }

    /// Command name as it appears in the `cmd` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GenerateHouse(_) => crate::constants::CMD_GENERATE_HOUSE,
            Self::GenerateNature(_) => crate::constants::CMD_GENERATE_NATURE,
            Self::GenerateHumanoid(_) => crate::constants::CMD_GENERATE_HUMANOID,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
