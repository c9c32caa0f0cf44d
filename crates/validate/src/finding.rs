//! Validation findings.

use serde::{Deserialize, Serialize};

/// Finding severity.
///
/// - `Error`: structural violation; the episode is rejected
/// - `Warn`: quality problem; the episode is written but marked invalid
/// - `Info`: statistics only; no effect on classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Cannot compile
    Error,
    /// Compile but mark invalid
    Warn,
    /// No action
    Info,
}

impl Severity {
    /// Check if this is an error
    pub fn is_error(&self) -> bool {
        matches!(self, Severity::Error)
    }

    /// Check if this is a warning
    pub fn is_warn(&self) -> bool {
        matches!(self, Severity::Warn)
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warn => "WARN",
            Severity::Info => "INFO",
        }
    }

    /// Parse `ERROR` / `WARN` / `INFO` (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ERROR" => Some(Severity::Error),
            "WARN" | "WARNING" => Some(Severity::Warn),
            "INFO" => Some(Severity::Info),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One diagnostic emitted by a validator.
///
/// Validators fill severity, code, message and the locators they know;
/// the runner stamps `validator` and `episode_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Severity level
    pub severity: Severity,
    /// Rule code (`E001`, `W030`, ...)
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Emitting validator
    #[serde(default)]
    pub validator: String,
    /// Episode where the finding occurred
    #[serde(default)]
    pub episode_id: Option<String>,
    /// Step index, when step-specific
    #[serde(default)]
    pub step_index: Option<usize>,
    /// Affected field (`action`, `observation.images.front`, ...)
    #[serde(default)]
    pub field: Option<String>,
    /// Offending value, for debugging
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Finding {
    /// New finding with no locators.
    pub fn new(severity: Severity, code: impl Into<String>, message: impl Into<String>) -> Self {
        Finding {
            severity,
            code: code.into(),
            message: message.into(),
            validator: String::new(),
            episode_id: None,
            step_index: None,
            field: None,
            value: None,
        }
    }

    /// `ERROR` finding
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    /// `WARN` finding
    pub fn warn(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warn, code, message)
    }

    /// `INFO` finding
    pub fn info(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, code, message)
    }

    /// Attach a step index
    pub fn at_step(mut self, step_index: usize) -> Self {
        self.step_index = Some(step_index);
        self
    }

    /// Attach a field name
    pub fn on_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Attach the offending value
    pub fn with_value(mut self, value: impl std::fmt::Display) -> Self {
        self.value = Some(value.to_string());
        self
    }
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.code, self.message)?;
        if let Some(id) = &self.episode_id {
            write!(f, " (episode {}", id)?;
            if let Some(step) = self.step_index {
                write!(f, ", step {}", step)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}
