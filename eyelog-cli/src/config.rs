//! Configuration loading and parsing

use anyhow::{Context, Result};
use eyelog_parser::ParserConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputConfig {
    /// Folder scanned for input files
    pub folder: Option<PathBuf>,
    /// Accepted file extensions, without the leading dot
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            folder: None,
            extensions: default_extensions(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    ["asc", "edf", "tar.xz"].iter().map(|ext| ext.to_string()).collect()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConverterConfig {
    /// Executable used to turn `.edf` recordings into text logs
    #[serde(default = "default_edf2asc")]
    pub edf2asc_binary: PathBuf,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            edf2asc_binary: default_edf2asc(),
        }
    }
}

fn default_edf2asc() -> PathBuf {
    PathBuf::from("edf2asc")
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Output file (default: stdout)
    pub path: Option<PathBuf>,
    /// Output format; inferred from the file extension when not set
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Csv,
    Tsv,
}

impl OutputFormat {
    /// Guess the format from an output file name
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(OutputFormat::Json),
            "csv" => Some(OutputFormat::Csv),
            "tsv" | "txt" => Some(OutputFormat::Tsv),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RunConfig {
    /// Worker threads (default: one per CPU)
    pub jobs: Option<usize>,
}

impl AppConfig {
    /// Effective output format: explicit setting, then file extension, then JSON
    pub fn output_format(&self) -> OutputFormat {
        self.output
            .format
            .or_else(|| self.output.path.as_deref().and_then(OutputFormat::from_path))
            .unwrap_or(OutputFormat::Json)
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .parser
        .validate()
        .with_context(|| format!("Invalid parser settings in {:?}", path))?;

    Ok(config)
}
