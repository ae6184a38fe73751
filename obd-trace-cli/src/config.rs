//! Project file loading and parsing

use anyhow::{bail, Context, Result};
use obd_trace::{
    BufferLimits, FilterDefinition, FilterMode, InputBindings, InputLabel, Interpolation, MathChannelDefinition,
    PipelineConfig, TimeWindow,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Project description (loaded from project.toml)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub view: ViewConfig,
    pub recordings: Vec<RecordingConfig>,
    #[serde(default)]
    pub math_channels: Vec<MathChannelConfig>,
    /// Top of the list has the highest precedence
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
}

/// Visible window and rendering budget
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ViewConfig {
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub point_budget: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordingConfig {
    pub path: PathBuf,
    pub name: Option<String>,
    #[serde(default)]
    pub offset: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MathChannelConfig {
    pub name: String,
    #[serde(default)]
    pub unit: String,
    pub expression: String,
    pub inputs: BTreeMap<String, String>,
    pub interpolation: Option<Interpolation>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterConfig {
    pub name: String,
    pub expression: String,
    pub inputs: BTreeMap<String, String>,
    #[serde(default)]
    pub mode: FilterMode,
    #[serde(default)]
    pub buffer: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ViewConfig {
    /// Window to render, filling open ends from the data's full range
    pub fn window(&self, full: Option<TimeWindow>) -> Option<TimeWindow> {
        if self.start.is_none() && self.end.is_none() {
            return None;
        }
        let full = full?;
        Some(TimeWindow::new(
            self.start.unwrap_or(full.start),
            self.end.unwrap_or(full.end),
        ))
    }
}

impl RecordingConfig {
    /// Relative paths are resolved against the project file's directory
    pub fn resolve_path(&self, base_dir: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            base_dir.join(&self.path)
        }
    }

    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.path.display().to_string()),
        }
    }
}

impl MathChannelConfig {
    pub fn to_definition(&self) -> Result<MathChannelDefinition> {
        let inputs = parse_bindings(&self.inputs)
            .with_context(|| format!("Invalid inputs for math channel '{}'", self.name))?;
        let definition = MathChannelDefinition::new(&self.name, &self.unit, &self.expression, inputs)
            .with_context(|| format!("Invalid math channel '{}'", self.name))?;
        Ok(match self.interpolation {
            Some(mode) => definition.with_interpolation(mode),
            None => definition,
        })
    }
}

impl FilterConfig {
    pub fn to_definition(&self, limits: BufferLimits) -> Result<FilterDefinition> {
        let inputs = parse_bindings(&self.inputs)
            .with_context(|| format!("Invalid inputs for filter '{}'", self.name))?;
        let definition = FilterDefinition::new(&self.name, &self.expression, inputs, self.mode, self.buffer, limits)
            .with_context(|| format!("Invalid filter '{}'", self.name))?;
        Ok(definition.with_enabled(self.enabled))
    }
}

/// Turn a `{ A = "rpm", B = "speed" }` table into input bindings
pub fn parse_bindings(inputs: &BTreeMap<String, String>) -> Result<InputBindings> {
    let pairs = inputs
        .iter()
        .map(|(label, channel)| Ok((label.parse::<InputLabel>()?, channel.clone())))
        .collect::<Result<Vec<_>>>()?;
    Ok(InputBindings::from_pairs(pairs)?)
}

/// Load a project from a TOML file
pub fn load_config(path: &Path) -> Result<ProjectConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read project file: {:?}", path))?;

    let config: ProjectConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse project file: {:?}", path))?;

    if config.recordings.is_empty() {
        bail!("Project file {:?} lists no recordings", path);
    }

    Ok(config)
}
