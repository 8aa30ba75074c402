use crate::data::TableData;
use crate::error::{AnalysisError, Result};
use crate::ir::{ChartKind, PlotRequest, ResolvedAxes};

/// Parse the kind and check the per-kind axis rules. Touches no data.
pub fn validate_request(request: &PlotRequest) -> Result<ChartKind> {
    let kind: ChartKind = request.kind.parse()?;
    let x = request.x.as_deref().filter(|x| !x.is_empty());
    validate_axes(kind, x, &request.ys)?;
    Ok(kind)
}

/// Axis rules per chart kind.
pub fn validate_axes(kind: ChartKind, x: Option<&str>, ys: &[String]) -> Result<()> {
    match kind {
        ChartKind::Scatter | ChartKind::Bar | ChartKind::Line | ChartKind::Area => {
            if x.is_none() || ys.is_empty() {
                return Err(AnalysisError::Validation(
                    "X-axis and at least one Y-axis are required for this plot type".to_string(),
                ));
            }
        }
        ChartKind::Pie => {
            if x.is_none() {
                return Err(AnalysisError::Validation("X-axis is required for pie charts".to_string()));
            }
        }
        ChartKind::Heatmap => {
            if x.is_none() || ys.is_empty() {
                return Err(AnalysisError::Validation(
                    "X-axis and at least one Y-axis are required for heatmap".to_string(),
                ));
            }
            if ys.len() > 2 {
                return Err(AnalysisError::Validation(format!(
                    "Heatmap supports at most 2 Y-axis variables, got {}",
                    ys.len()
                )));
            }
        }
        ChartKind::Box => {
            if ys.is_empty() {
                return Err(AnalysisError::Validation(
                    "At least one Y-axis is required for box plot".to_string(),
                ));
            }
        }
        ChartKind::Histogram => {
            if ys.is_empty() {
                return Err(AnalysisError::Validation(
                    "At least one Y-axis is required for histogram".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Resolve every requested column against the header before any series is built.
pub fn resolve_axes(
    kind: ChartKind,
    x: Option<&str>,
    ys: &[String],
    data: &TableData,
) -> Result<ResolvedAxes> {
    let x = match x.filter(|x| !x.is_empty()) {
        Some(name) => Some((name.to_string(), data.resolve_index(name)?)),
        None => None,
    };

    let ys = ys
        .iter()
        .map(|name| Ok((name.clone(), data.resolve_index(name)?)))
        .collect::<Result<Vec<_>>>()?;

    Ok(ResolvedAxes { kind, x, ys })
}
