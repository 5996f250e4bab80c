use crate::foundation::error::{RiterError, RiterResult};
use std::path::Path;
use std::str::FromStr;

/// The mini-language a show is written in. Each kind maps to exactly one backend.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ShowKind {
    /// Static text rasterized against the built-in glyph atlas.
    #[serde(alias = "text")]
    Glyph,
    /// Draw-loop program with `setup()`/`draw()`.
    #[serde(alias = "p5")]
    Imperative,
    /// GLSL-like fragment expression.
    Shader,
    /// WebAssembly control module writing packed frames.
    #[serde(alias = "wasm")]
    ByteProgram,
}

impl ShowKind {
    /// All kinds, in dispatch order.
    pub const ALL: [ShowKind; 4] = [
        ShowKind::Glyph,
        ShowKind::Imperative,
        ShowKind::Shader,
        ShowKind::ByteProgram,
    ];

    /// Canonical name used on the command line and in JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Glyph => "glyph",
            Self::Imperative => "imperative",
            Self::Shader => "shader",
            Self::ByteProgram => "byte-program",
        }
    }
}

impl std::fmt::Display for ShowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShowKind {
    type Err = RiterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "glyph" | "text" => Ok(Self::Glyph),
            "imperative" | "p5" => Ok(Self::Imperative),
            "shader" => Ok(Self::Shader),
            "byte-program" | "byteprogram" | "wasm" => Ok(Self::ByteProgram),
            other => Err(RiterError::configuration(format!(
                "unknown show kind '{other}'"
            ))),
        }
    }
}

/// Immutable snapshot of a show handed over by the catalog.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ShowProgram {
    /// Which backend runs the program.
    pub kind: ShowKind,
    /// Program text, opaque to everything but its backend.
    pub source: String,
}

impl ShowProgram {
    /// Build a program from a kind and its source text.
    pub fn new(kind: ShowKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }

    /// Parse the JSON form `{"kind": "...", "source": "..."}`.
    pub fn from_json_str(s: &str) -> RiterResult<Self> {
        serde_json::from_str(s)
            .map_err(|e| RiterError::configuration(format!("invalid show json: {e}")))
    }

    /// Read the JSON form from a file.
    pub fn from_path(path: impl AsRef<Path>) -> RiterResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}
