use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Plot request
// =============================================================================

/// Chart kinds the series builder knows how to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Scatter,
    Line,
    Bar,
    Area,
    Pie,
    Histogram,
    Box,
    Heatmap,
}

impl ChartKind {
    pub const ALL: [ChartKind; 8] = [
        ChartKind::Scatter,
        ChartKind::Line,
        ChartKind::Bar,
        ChartKind::Area,
        ChartKind::Pie,
        ChartKind::Histogram,
        ChartKind::Box,
        ChartKind::Heatmap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Scatter => "scatter",
            ChartKind::Line => "line",
            ChartKind::Bar => "bar",
            ChartKind::Area => "area",
            ChartKind::Pie => "pie",
            ChartKind::Histogram => "histogram",
            ChartKind::Box => "box",
            ChartKind::Heatmap => "heatmap",
        }
    }

    /// "Bar Plot", "Heatmap Plot", ...
    pub fn plot_title(&self) -> String {
        let name = self.as_str();
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => format!("{}{} Plot", first.to_ascii_uppercase(), chars.as_str()),
            None => "Plot".to_string(),
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartKind {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChartKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| AnalysisError::UnsupportedChartType(s.to_string()))
    }
}

/// One plot request against a stored table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlotRequest {
    pub table_id: String,
    #[serde(rename = "plot_type")]
    pub kind: String,
    #[serde(default, rename = "x_axis")]
    pub x: Option<String>,
    #[serde(default, rename = "y_axis")]
    pub ys: Vec<String>,
}

/// Column indices after validation and header resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAxes {
    pub kind: ChartKind,
    pub x: Option<(String, usize)>,
    pub ys: Vec<(String, usize)>,
}

// =============================================================================
// Chart descriptor (plotly trace vocabulary)
// =============================================================================

/// Either raw labels or coerced numbers along one axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Values {
    Numbers(Vec<f64>),
    Labels(Vec<String>),
}

impl Values {
    pub fn len(&self) -> usize {
        match self {
            Values::Numbers(v) => v.len(),
            Values::Labels(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render every entry as a label.
    pub fn labels(&self) -> Vec<String> {
        match self {
            Values::Numbers(v) => v.iter().map(|n| n.to_string()).collect(),
            Values::Labels(v) => v.clone(),
        }
    }

    /// Numeric view using the same lenient coercion as column extraction.
    pub fn numbers(&self) -> Vec<f64> {
        match self {
            Values::Numbers(v) => v.clone(),
            Values::Labels(v) => v.iter().map(|s| crate::data::coerce_number(s)).collect(),
        }
    }

    /// Numbers only when every label parses cleanly.
    pub fn strict_numbers(&self) -> Option<Vec<f64>> {
        match self {
            Values::Numbers(v) => Some(v.clone()),
            Values::Labels(v) => v.iter().map(|s| s.trim().parse::<f64>().ok()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceType {
    Scatter,
    Bar,
    Pie,
    Histogram,
    Box,
    Heatmap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "markers")]
    Markers,
    #[serde(rename = "lines")]
    Lines,
    #[serde(rename = "lines+markers")]
    LinesMarkers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fill {
    #[serde(rename = "tozeroy")]
    ToZeroY,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Marker {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<String>>,
}

/// A single chart-library trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    #[serde(rename = "type")]
    pub trace: TraceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<Values>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<Values>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<Vec<Vec<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<Fill>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<Marker>,
}

impl Series {
    pub fn new(trace: TraceType) -> Self {
        Self {
            trace,
            mode: None,
            name: None,
            x: None,
            y: None,
            z: None,
            labels: None,
            values: None,
            fill: None,
            marker: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AxisTitle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Layout {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub xaxis: AxisTitle,
    #[serde(default)]
    pub yaxis: AxisTitle,
}

/// Everything a renderer needs to draw one chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartDescriptor {
    pub data: Vec<Series>,
    #[serde(default)]
    pub layout: Layout,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_parse() {
        assert_eq!("pie".parse::<ChartKind>().unwrap(), ChartKind::Pie);
        let err = "radar".parse::<ChartKind>().unwrap_err();
        assert_eq!(err, AnalysisError::UnsupportedChartType("radar".to_string()));
        // kinds are case-sensitive like column names
        assert!("Bar".parse::<ChartKind>().is_err());
    }

    #[test]
    fn test_plot_title() {
        assert_eq!(ChartKind::Bar.plot_title(), "Bar Plot");
        assert_eq!(ChartKind::Heatmap.plot_title(), "Heatmap Plot");
    }

    #[test]
    fn test_series_wire_shape() {
        let mut series = Series::new(TraceType::Scatter);
        series.mode = Some(Mode::LinesMarkers);
        series.x = Some(Values::Labels(vec!["a".into()]));
        series.y = Some(Values::Numbers(vec![1.0]));
        let value = serde_json::to_value(&series).unwrap();
        assert_eq!(
            value,
            json!({"type": "scatter", "mode": "lines+markers", "x": ["a"], "y": [1.0]})
        );
    }

    #[test]
    fn test_descriptor_from_client_json() {
        let value = json!({
            "data": [{"type": "bar", "name": "score", "x": ["Alice", "Bob"], "y": [10, 20],
                      "marker": {"color": "rgba(1, 2, 3, 0.7)"}}],
            "layout": {"title": "Bar Plot", "xaxis": {"title": "name"}, "yaxis": {"title": "score"}}
        });
        let descriptor: ChartDescriptor = serde_json::from_value(value).unwrap();
        assert_eq!(descriptor.data[0].trace, TraceType::Bar);
        assert_eq!(descriptor.data[0].y, Some(Values::Numbers(vec![10.0, 20.0])));
        assert_eq!(descriptor.data[0].x.as_ref().unwrap().labels(), vec!["Alice", "Bob"]);
        assert_eq!(descriptor.layout.xaxis.title.as_deref(), Some("name"));
    }

    #[test]
    fn test_values_views() {
        let labels = Values::Labels(vec!["1".into(), "x".into()]);
        assert_eq!(labels.numbers(), vec![1.0, 0.0]);
        assert_eq!(labels.strict_numbers(), None);
        let numeric = Values::Labels(vec!["1".into(), "2.5".into()]);
        assert_eq!(numeric.strict_numbers(), Some(vec![1.0, 2.5]));
    }
}
