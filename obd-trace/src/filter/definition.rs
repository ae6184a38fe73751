use crate::config::BufferLimits;
use crate::expression::Expression;
use crate::types::{FilterError, InputBindings};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a filter does with the timestamps inside its interval union
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Force covered timestamps visible
    #[default]
    Show,
    /// Force covered timestamps hidden
    Hide,
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterMode::Show => write!(f, "show"),
            FilterMode::Hide => write!(f, "hide"),
        }
    }
}

/// A named, validated visibility filter
///
/// Can only be built through [`FilterDefinition::new`], so a stored filter
/// always holds a boolean expression and an in-range buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterDefinition {
    name: String,
    expression: Expression,
    inputs: InputBindings,
    mode: FilterMode,
    buffer_secs: f64,
    enabled: bool,
}

impl FilterDefinition {
    pub fn new(
        name: &str,
        expression: &str,
        inputs: InputBindings,
        mode: FilterMode,
        buffer_secs: f64,
        limits: BufferLimits,
    ) -> Result<Self, FilterError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FilterError::EmptyName);
        }
        if !limits.contains(buffer_secs) {
            return Err(FilterError::BufferOutOfRange {
                buffer: buffer_secs,
                min: limits.min,
                max: limits.max,
            });
        }
        let expression = Expression::compile_boolean(expression, &inputs.labels())?;

        Ok(Self {
            name: name.to_string(),
            expression,
            inputs,
            mode,
            buffer_secs,
            enabled: true,
        })
    }

    /// Builder method: set the enabled flag
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn inputs(&self) -> &InputBindings {
        &self.inputs
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn buffer_secs(&self) -> f64 {
        self.buffer_secs
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}
