pub mod campaign;
pub mod research;

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::engine::types::RunHandle;

pub use campaign::Campaign;
pub use research::Research;

/// A named stage of a backend pipeline, surfaced for progress display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub name: &'static str,
    pub message: &'static str,
}

/// Binds one workflow variant's data types and fixed parameters.
///
/// Implemented by zero-sized markers so the machine, stores and sources can be
/// written once and instantiated per variant.
pub trait WorkflowKind: Sized + Send + Sync + 'static {
    type Input: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static;
    type Results: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Short identifier used in logs and on the command line.
    const NAME: &'static str;
    /// Key under which completed results are persisted.
    const HISTORY_KEY: &'static str;
    /// Maximum number of retained history entries.
    const HISTORY_CAPACITY: usize;
    /// Message recorded when the backend reports an `error` status.
    const FAILURE_MESSAGE: &'static str;
    /// Fallback message when a submission fails without a description.
    const SUBMIT_FAILURE_MESSAGE: &'static str;
    /// Prefix of mock-generated run handles.
    const HANDLE_PREFIX: &'static str;
    /// JSON field carrying the handle in the submission response.
    const HANDLE_FIELD: &'static str;
    /// Backend submission endpoint.
    const SUBMIT_PATH: &'static str;
    /// Backend status endpoint; `{id}` is replaced by the run handle.
    const STATUS_PATH: &'static str;
    /// Ordered pipeline stages reported while a run is in progress.
    const STAGES: &'static [Stage];

    /// Check user input at the boundary, before anything is submitted.
    fn validate(input: &Self::Input) -> Result<(), ValidationErrors>;

    /// Bring terminal results into canonical form before they are stored.
    /// Results that cannot be made valid are rejected with a message.
    fn normalize(_results: &mut Self::Results) -> Result<(), String> {
        Ok(())
    }

    /// Handle of the run that produced `results`.
    fn run_handle(results: &Self::Results) -> &RunHandle;

    fn status_path(handle: &str) -> String {
        Self::STATUS_PATH.replace("{id}", handle)
    }
}

/// Analysis scope shared by both workflow variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    #[default]
    #[serde(rename = "Market Analysis")]
    MarketAnalysis,
    #[serde(rename = "Technical Feasibility")]
    TechnicalFeasibility,
    #[serde(rename = "User Research")]
    UserResearch,
    #[serde(rename = "Competitive Analysis")]
    CompetitiveAnalysis,
}

impl Scope {
    pub const ALL: [Scope; 4] = [
        Scope::MarketAnalysis,
        Scope::TechnicalFeasibility,
        Scope::UserResearch,
        Scope::CompetitiveAnalysis,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Scope::MarketAnalysis => "Market Analysis",
            Scope::TechnicalFeasibility => "Technical Feasibility",
            Scope::UserResearch => "User Research",
            Scope::CompetitiveAnalysis => "Competitive Analysis",
        }
    }
}

/// Analysis depth shared by both workflow variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Depth {
    Quick,
    #[default]
    Standard,
    Deep,
}

impl Depth {
    pub const ALL: [Depth; 3] = [Depth::Quick, Depth::Standard, Depth::Deep];

    pub fn label(self) -> &'static str {
        match self {
            Depth::Quick => "Quick",
            Depth::Standard => "Standard",
            Depth::Deep => "Deep",
        }
    }

    /// Indicative wall-clock time for a run at this depth.
    pub fn estimate(self) -> &'static str {
        match self {
            Depth::Quick => "5 min",
            Depth::Standard => "15 min",
            Depth::Deep => "30 min",
        }
    }
}

macro_rules! labelled_enum {
    ($ty:ty, $what:literal) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.pad(self.label())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = $crate::workflows::fold_label(s);
                <$ty>::ALL
                    .into_iter()
                    .find(|v| $crate::workflows::fold_label(v.label()) == wanted)
                    .ok_or_else(|| format!("Invalid {}: {}", $what, s))
            }
        }
    };
}
pub(crate) use labelled_enum;

labelled_enum!(Scope, "scope");
labelled_enum!(Depth, "depth");

/// A single failed field check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Every field check that failed for one input, in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|e| e.field == name)
            .map(|e| e.message.as_str())
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let summary = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&summary)
    }
}

impl std::error::Error for ValidationErrors {}

/// Required free text with trimmed minimum and raw maximum length.
pub(crate) fn check_text(
    errors: &mut ValidationErrors,
    field: &'static str,
    label: &str,
    value: &str,
    min: usize,
    max: usize,
) {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.push(field, format!("{} is required", label));
    } else if trimmed.chars().count() < min {
        errors.push(field, format!("{} must be at least {} characters", label, min));
    } else if value.chars().count() > max {
        errors.push(field, format!("{} must not exceed {} characters", label, max));
    }
}

/// Normalise a categorical label for lenient parsing: `Market Analysis`,
/// `market-analysis` and `market_analysis` all compare equal.
pub(crate) fn fold_label(s: &str) -> String {
    s.trim()
        .chars()
        .filter_map(|c| match c {
            ' ' | '-' | '_' => None,
            c => Some(c.to_ascii_lowercase()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_text_reports_first_failing_rule() {
        let mut errors = ValidationErrors::default();
        check_text(&mut errors, "q", "Query", "   ", 10, 500);
        check_text(&mut errors, "r", "Query", "  short   ", 10, 500);
        check_text(&mut errors, "s", "Query", &"x".repeat(501), 10, 500);
        check_text(&mut errors, "t", "Query", "long enough text", 10, 500);

        assert_eq!(errors.field("q"), Some("Query is required"));
        assert_eq!(errors.field("r"), Some("Query must be at least 10 characters"));
        assert_eq!(errors.field("s"), Some("Query must not exceed 500 characters"));
        assert_eq!(errors.field("t"), None);
    }

    #[test]
    fn fold_label_ignores_case_and_separators() {
        assert_eq!(fold_label("Market Analysis"), fold_label("market-analysis"));
        assert_eq!(fold_label("brand_awareness"), "brandawareness");
    }

    #[test]
    fn scope_and_depth_parse_leniently() {
        assert_eq!("market-analysis".parse::<Scope>(), Ok(Scope::MarketAnalysis));
        assert_eq!("User Research".parse::<Scope>(), Ok(Scope::UserResearch));
        assert_eq!("deep".parse::<Depth>(), Ok(Depth::Deep));
        assert!("thorough".parse::<Depth>().unwrap_err().contains("Invalid depth"));
    }

    #[test]
    fn scope_serializes_as_display_label() {
        let json = serde_json::to_string(&Scope::CompetitiveAnalysis).unwrap();
        assert_eq!(json, "\"Competitive Analysis\"");
    }

    #[test]
    fn validation_errors_display_joins_fields() {
        let mut errors = ValidationErrors::default();
        errors.push("kpis", "At least one KPI must be selected");
        errors.push("platforms", "At least one platform must be selected");
        assert_eq!(
            errors.to_string(),
            "kpis: At least one KPI must be selected; platforms: At least one platform must be selected"
        );
    }
}
