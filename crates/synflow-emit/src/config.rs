use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    pub use_colors: bool,
    pub indent_style: IndentStyle,
    /// Print successor lists after each node.
    pub show_edges: bool,
    /// Print parameter and local types in function headers.
    pub show_types: bool,
    pub halves: Halves,
    /// Skip nodes an analysis never reached instead of marking them.
    pub hide_unreached: bool,
    pub format: OutputFormat,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            use_colors: true,
            indent_style: IndentStyle::Spaces(4),
            show_edges: true,
            show_types: true,
            halves: Halves::Both,
            hide_unreached: false,
            format: OutputFormat::Text,
        }
    }
}

impl EmitterConfig {
    /// Uncoloured text, for logs and tests.
    pub fn plain() -> Self {
        Self {
            use_colors: false,
            ..Self::default()
        }
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndentStyle {
    Spaces(usize),
    Tabs,
}

impl IndentStyle {
    pub fn unit(&self) -> String {
        match self {
            IndentStyle::Spaces(n) => " ".repeat(*n),
            IndentStyle::Tabs => "\t".to_string(),
        }
    }
}

/// Which side of each node to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Halves {
    In,
    Out,
    Both,
}

impl Halves {
    pub fn shows_in(&self) -> bool {
        matches!(self, Halves::In | Halves::Both)
    }

    pub fn shows_out(&self) -> bool {
        matches!(self, Halves::Out | Halves::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    /// Statistics as JSON. Graphs and values are always text.
    Json,
}
