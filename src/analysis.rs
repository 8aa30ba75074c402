use crate::error::{AnalysisError, Result};
use crate::ir::{ChartDescriptor, ChartKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_ANALYSIS_TITLE: &str = "Untitled Analysis";
pub const DEFAULT_AUTHOR: &str = "Unknown Author";
pub const DEFAULT_PLOT_TITLE: &str = "Untitled Plot";

/// Authenticated identity of whoever issued the request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Caller {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Caller {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), display_name: None }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Axes the plot was generated from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlotConfiguration {
    #[serde(default)]
    pub x_axis: String,
    #[serde(default)]
    pub y_axes: Vec<String>,
}

/// A chart as stored inside an analysis. `data` stays opaque until render time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedPlot {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ChartKind,
    pub configuration: PlotConfiguration,
    pub data: Value,
}

impl SavedPlot {
    pub fn descriptor(&self) -> std::result::Result<ChartDescriptor, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}

/// A saved, named bundle of charts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub id: String,
    pub owner: String,
    pub title: String,
    pub author_name: String,
    pub description: String,
    pub plots: Vec<SavedPlot>,
    #[serde(default)]
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Analysis {
    /// Validate a draft and apply defaults. Nothing is stored here.
    pub fn from_draft(caller: &Caller, draft: AnalysisDraft) -> Result<Self> {
        let plots = validate_plots(draft.plots)?;
        let now = Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner: caller.id.clone(),
            title: non_empty(draft.title).unwrap_or_else(|| DEFAULT_ANALYSIS_TITLE.to_string()),
            author_name: non_empty(draft.author_name)
                .or_else(|| non_empty(caller.display_name.clone()))
                .unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
            description: draft.description.unwrap_or_default(),
            plots,
            is_public: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a partial update. Supplied plots replace the list wholesale.
    pub fn apply_patch(&mut self, patch: AnalysisPatch) -> Result<()> {
        let plots = match patch.plots {
            Some(plots) => Some(validate_plots(plots)?),
            None => None,
        };

        if let Some(title) = non_empty(patch.title) {
            self.title = title;
        }
        if let Some(author) = non_empty(patch.author_name) {
            self.author_name = author;
        }
        if let Some(description) = non_empty(patch.description) {
            self.description = description;
        }
        if let Some(plots) = plots {
            self.plots = plots;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Download name: non-alphanumerics become `_`, lowercased.
    pub fn file_stem(&self) -> String {
        self.title
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect()
    }
}

/// Client-supplied plot before validation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlotDraft {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub configuration: Option<PlotConfiguration>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl PlotDraft {
    /// Draft for a freshly built chart.
    pub fn from_chart(
        kind: ChartKind,
        title: Option<String>,
        configuration: PlotConfiguration,
        chart: &ChartDescriptor,
    ) -> Result<Self> {
        let data = serde_json::to_value(chart)
            .map_err(|e| AnalysisError::Validation(format!("Plot data is not serializable: {}", e)))?;
        Ok(Self {
            title,
            description: None,
            kind: Some(kind.to_string()),
            configuration: Some(configuration),
            data: Some(data),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisDraft {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub plots: Vec<PlotDraft>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub plots: Option<Vec<PlotDraft>>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn is_blank(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    }
}

/// Check every plot has a known type and non-empty data; messages are 1-based.
pub fn validate_plots(plots: Vec<PlotDraft>) -> Result<Vec<SavedPlot>> {
    if plots.is_empty() {
        return Err(AnalysisError::Validation("At least one plot is required".to_string()));
    }

    plots
        .into_iter()
        .enumerate()
        .map(|(index, plot)| -> Result<SavedPlot> {
            let number = index + 1;
            let kind = match non_empty(plot.kind) {
                Some(kind) => kind.parse::<ChartKind>()?,
                None => {
                    return Err(AnalysisError::Validation(format!(
                        "Plot #{} is missing required field: type",
                        number
                    )))
                }
            };
            let data = match plot.data {
                Some(data) if !is_blank(&data) => data,
                _ => {
                    return Err(AnalysisError::Validation(format!(
                        "Plot #{} is missing required field: data",
                        number
                    )))
                }
            };
            Ok(SavedPlot {
                title: non_empty(plot.title).unwrap_or_else(|| DEFAULT_PLOT_TITLE.to_string()),
                description: plot.description.unwrap_or_default(),
                kind,
                configuration: plot.configuration.unwrap_or_default(),
                data,
            })
        })
        .collect()
}
