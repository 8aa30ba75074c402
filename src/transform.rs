use crate::data::{coerce_number, TableData};
use crate::error::{AnalysisError, Result};
use crate::ir::{
    AxisTitle, ChartDescriptor, ChartKind, Fill, Layout, Marker, Mode, ResolvedAxes, Series,
    TraceType, Values,
};
use crate::palette::ColorSource;
use indexmap::{IndexMap, IndexSet};
use log::debug;

/// Separator between column values in a composite group key.
pub const GROUP_KEY_SEPARATOR: &str = "|";

/// Composite key -> rows sharing it, in first-seen key order.
pub type GroupResult = IndexMap<String, Vec<Vec<String>>>;

/// Main entry point: turn resolved axes plus table data into a chart descriptor.
pub fn build_chart(
    axes: &ResolvedAxes,
    data: &TableData,
    colors: &mut dyn ColorSource,
) -> Result<ChartDescriptor> {
    let series = match axes.kind {
        ChartKind::Scatter => xy_series(axes, data, |s| {
            s.mode = Some(Mode::Markers);
        })?,
        ChartKind::Line => xy_series(axes, data, |s| {
            s.mode = Some(Mode::LinesMarkers);
        })?,
        ChartKind::Area => xy_series(axes, data, |s| {
            s.mode = Some(Mode::Lines);
            s.fill = Some(Fill::ToZeroY);
        })?,
        ChartKind::Bar => {
            let mut s = xy_series(axes, data, |_| {})?;
            s.trace = TraceType::Bar;
            s.marker = Some(Marker {
                color: Some(colors.next_color()),
                colors: None,
            });
            s
        }
        ChartKind::Pie => pie_series(axes, data, colors)?,
        ChartKind::Histogram => {
            let (name, idx) = first_y(axes)?;
            let mut s = Series::new(TraceType::Histogram);
            s.name = Some(name.clone());
            s.x = Some(Values::Numbers(data.extract_numeric_column(*idx)));
            s
        }
        ChartKind::Box => {
            let (name, idx) = first_y(axes)?;
            let mut s = Series::new(TraceType::Box);
            s.name = Some(name.clone());
            s.y = Some(Values::Numbers(data.extract_numeric_column(*idx)));
            s
        }
        ChartKind::Heatmap => heatmap_series(axes, data)?,
    };

    debug!(
        "Built {} series with {} points",
        axes.kind,
        series.x.as_ref().or(series.y.as_ref()).map_or(0, Values::len)
    );

    Ok(ChartDescriptor {
        data: vec![series],
        layout: build_layout(axes),
    })
}

fn build_layout(axes: &ResolvedAxes) -> Layout {
    let y_title = if axes.ys.is_empty() {
        None
    } else {
        Some(axes.ys.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>().join(", "))
    };
    Layout {
        title: axes.kind.plot_title(),
        xaxis: AxisTitle {
            title: axes.x.as_ref().map(|(n, _)| n.clone()),
        },
        yaxis: AxisTitle { title: y_title },
    }
}

fn first_y(axes: &ResolvedAxes) -> Result<&(String, usize)> {
    axes.ys.first().ok_or_else(|| {
        AnalysisError::Validation(format!("At least one Y-axis is required for {} plot", axes.kind))
    })
}

fn x_axis(axes: &ResolvedAxes) -> Result<&(String, usize)> {
    axes.x
        .as_ref()
        .ok_or_else(|| AnalysisError::Validation(format!("X-axis is required for {} plot", axes.kind)))
}

/// Scatter-shaped x/y pairs from the x column and the first y column.
fn xy_series(
    axes: &ResolvedAxes,
    data: &TableData,
    decorate: impl FnOnce(&mut Series),
) -> Result<Series> {
    let (_, x_idx) = x_axis(axes)?;
    let (y_name, y_idx) = first_y(axes)?;

    let mut s = Series::new(TraceType::Scatter);
    s.name = Some(y_name.clone());
    s.x = Some(Values::Labels(data.extract_column(*x_idx)));
    s.y = Some(Values::Numbers(data.extract_numeric_column(*y_idx)));
    decorate(&mut s);
    Ok(s)
}

fn pie_series(axes: &ResolvedAxes, data: &TableData, colors: &mut dyn ColorSource) -> Result<Series> {
    let (_, x_idx) = x_axis(axes)?;
    let raw_labels = data.extract_column(*x_idx);

    let (labels, values) = match axes.ys.first() {
        Some((_, y_idx)) => (raw_labels, data.extract_numeric_column(*y_idx)),
        None => count_by_label(raw_labels),
    };

    let slice_colors = labels.iter().map(|_| colors.next_color()).collect();

    let mut s = Series::new(TraceType::Pie);
    s.labels = Some(labels);
    s.values = Some(values);
    s.marker = Some(Marker {
        color: None,
        colors: Some(slice_colors),
    });
    Ok(s)
}

/// Distinct labels in first-seen order with their occurrence counts.
fn count_by_label(labels: Vec<String>) -> (Vec<String>, Vec<f64>) {
    let mut counts: IndexMap<String, f64> = IndexMap::new();
    for label in labels {
        *counts.entry(label).or_insert(0.0) += 1.0;
    }
    counts.into_iter().unzip()
}

/// Heatmap cells: x categories along x, second-y categories (or the first y's
/// name) along y, summing the first y column into `z[y][x]`.
fn heatmap_series(axes: &ResolvedAxes, data: &TableData) -> Result<Series> {
    let (_, x_idx) = x_axis(axes)?;
    let (value_name, value_idx) = first_y(axes)?;
    let column_idx = axes.ys.get(1).map(|(_, idx)| *idx);

    let x_cats: IndexSet<String> = data.extract_column(*x_idx).into_iter().collect();
    let y_cats: IndexSet<String> = match column_idx {
        Some(idx) => data.extract_column(idx).into_iter().collect(),
        None => std::iter::once(value_name.clone()).collect(),
    };

    let mut z = vec![vec![0.0; x_cats.len()]; y_cats.len()];
    for row in &data.rows {
        let x_key = row.get(*x_idx).map(String::as_str).unwrap_or_default();
        let y_key = match column_idx {
            Some(idx) => row.get(idx).map(String::as_str).unwrap_or_default(),
            None => value_name.as_str(),
        };
        if let (Some(xi), Some(yi)) = (x_cats.get_index_of(x_key), y_cats.get_index_of(y_key)) {
            z[yi][xi] += row.get(*value_idx).map_or(0.0, |cell| coerce_number(cell));
        }
    }

    let mut s = Series::new(TraceType::Heatmap);
    s.name = Some(value_name.clone());
    s.x = Some(Values::Labels(x_cats.into_iter().collect()));
    s.y = Some(Values::Labels(y_cats.into_iter().collect()));
    s.z = Some(z);
    Ok(s)
}

/// Partition rows by the `|`-joined raw values of `columns`.
pub fn group_by(data: &TableData, columns: &[String]) -> Result<GroupResult> {
    if columns.is_empty() {
        return Err(AnalysisError::Validation("At least one group-by column is required".to_string()));
    }

    let indices = columns
        .iter()
        .map(|c| data.resolve_index(c))
        .collect::<Result<Vec<_>>>()?;

    let mut groups = GroupResult::new();
    for row in &data.rows {
        let key = indices
            .iter()
            .map(|&i| row.get(i).map(String::as_str).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(GROUP_KEY_SEPARATOR);
        groups.entry(key).or_default().push(row.clone());
    }

    debug!("Grouped {} rows into {} buckets", data.rows.len(), groups.len());
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::ColorPalette;
    use crate::resolve::resolve_axes;

    fn make_data() -> TableData {
        TableData::from_csv("name,score,team,year\nAlice,10,red,2020\nBob,20,blue,2020\nCara,oops,red,2021")
            .unwrap()
    }

    fn build(kind: ChartKind, x: Option<&str>, ys: &[&str]) -> Result<ChartDescriptor> {
        let data = make_data();
        let ys: Vec<String> = ys.iter().map(|s| s.to_string()).collect();
        let axes = resolve_axes(kind, x, &ys, &data)?;
        build_chart(&axes, &data, &mut ColorPalette::category10())
    }

    #[test]
    fn test_scatter() {
        let chart = build(ChartKind::Scatter, Some("name"), &["score"]).unwrap();
        assert_eq!(chart.data.len(), 1);
        let s = &chart.data[0];
        assert_eq!(s.trace, TraceType::Scatter);
        assert_eq!(s.mode, Some(Mode::Markers));
        assert_eq!(s.name.as_deref(), Some("score"));
        assert_eq!(s.x.as_ref().unwrap().labels(), vec!["Alice", "Bob", "Cara"]);
        assert_eq!(s.y, Some(Values::Numbers(vec![10.0, 20.0, 0.0])));
        assert_eq!(chart.layout.title, "Scatter Plot");
    }

    #[test]
    fn test_line_and_area_modes() {
        let line = build(ChartKind::Line, Some("name"), &["score"]).unwrap();
        assert_eq!(line.data[0].mode, Some(Mode::LinesMarkers));
        assert_eq!(line.data[0].fill, None);

        let area = build(ChartKind::Area, Some("name"), &["score"]).unwrap();
        assert_eq!(area.data[0].trace, TraceType::Scatter);
        assert_eq!(area.data[0].mode, Some(Mode::Lines));
        assert_eq!(area.data[0].fill, Some(Fill::ToZeroY));
    }

    #[test]
    fn test_bar_has_one_fill_color() {
        let chart = build(ChartKind::Bar, Some("name"), &["score"]).unwrap();
        let s = &chart.data[0];
        assert_eq!(s.trace, TraceType::Bar);
        let marker = s.marker.as_ref().unwrap();
        assert_eq!(marker.color.as_deref(), Some("rgba(31, 119, 180, 0.7)"));
        assert!(marker.colors.is_none());
        assert_eq!(chart.layout.xaxis.title.as_deref(), Some("name"));
        assert_eq!(chart.layout.yaxis.title.as_deref(), Some("score"));
    }

    #[test]
    fn test_only_first_y_feeds_single_series_kinds() {
        let chart = build(ChartKind::Line, Some("name"), &["score", "year"]).unwrap();
        assert_eq!(chart.data.len(), 1);
        assert_eq!(chart.data[0].name.as_deref(), Some("score"));
        assert_eq!(chart.layout.yaxis.title.as_deref(), Some("score, year"));
    }

    #[test]
    fn test_pie_with_values() {
        let chart = build(ChartKind::Pie, Some("team"), &["score"]).unwrap();
        let s = &chart.data[0];
        assert_eq!(s.trace, TraceType::Pie);
        assert_eq!(s.labels.as_ref().unwrap(), &vec!["red", "blue", "red"]);
        assert_eq!(s.values.as_ref().unwrap(), &vec![10.0, 20.0, 0.0]);
        assert_eq!(s.marker.as_ref().unwrap().colors.as_ref().unwrap().len(), 3);
        assert!(s.x.is_none());
    }

    #[test]
    fn test_pie_without_values_counts_labels() {
        let chart = build(ChartKind::Pie, Some("team"), &[]).unwrap();
        let s = &chart.data[0];
        assert_eq!(s.labels.as_ref().unwrap(), &vec!["red", "blue"]);
        assert_eq!(s.values.as_ref().unwrap(), &vec![2.0, 1.0]);
        assert_eq!(chart.layout.yaxis.title, None);
    }

    #[test]
    fn test_histogram_and_box_use_first_y() {
        let hist = build(ChartKind::Histogram, None, &["score"]).unwrap();
        assert_eq!(hist.data[0].trace, TraceType::Histogram);
        assert_eq!(hist.data[0].x, Some(Values::Numbers(vec![10.0, 20.0, 0.0])));
        assert_eq!(hist.layout.xaxis.title, None);

        let boxed = build(ChartKind::Box, None, &["year", "score"]).unwrap();
        assert_eq!(boxed.data[0].trace, TraceType::Box);
        assert_eq!(boxed.data[0].name.as_deref(), Some("year"));
        assert_eq!(boxed.data[0].y, Some(Values::Numbers(vec![2020.0, 2020.0, 2021.0])));
    }

    #[test]
    fn test_heatmap_single_y() {
        let chart = build(ChartKind::Heatmap, Some("team"), &["score"]).unwrap();
        let s = &chart.data[0];
        assert_eq!(s.x.as_ref().unwrap().labels(), vec!["red", "blue"]);
        assert_eq!(s.y.as_ref().unwrap().labels(), vec!["score"]);
        assert_eq!(s.z.as_ref().unwrap(), &vec![vec![10.0, 20.0]]);
    }

    #[test]
    fn test_heatmap_two_y() {
        let chart = build(ChartKind::Heatmap, Some("team"), &["score", "year"]).unwrap();
        let s = &chart.data[0];
        assert_eq!(s.y.as_ref().unwrap().labels(), vec!["2020", "2021"]);
        // z[year][team]
        assert_eq!(s.z.as_ref().unwrap(), &vec![vec![10.0, 20.0], vec![0.0, 0.0]]);
    }

    #[test]
    fn test_group_by_single_column() {
        let data = TableData::from_csv("c1\na\nb\na").unwrap();
        let groups = group_by(&data, &["c1".to_string()]).unwrap();
        assert_eq!(groups.len(), 2);
        let keys: Vec<&String> = groups.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(groups["a"].len(), 2);
        assert_eq!(groups["b"].len(), 1);
    }

    #[test]
    fn test_group_by_composite_key() {
        let data = make_data();
        let groups = group_by(&data, &["team".to_string(), "year".to_string()]).unwrap();
        let keys: Vec<&String> = groups.keys().collect();
        assert_eq!(keys, vec!["red|2020", "blue|2020", "red|2021"]);
        assert_eq!(groups["red|2020"][0][0], "Alice");
    }

    #[test]
    fn test_group_by_preserves_row_order() {
        let data = make_data();
        let groups = group_by(&data, &["team".to_string()]).unwrap();
        let names: Vec<&str> = groups["red"].iter().map(|r| r[0].as_str()).collect();
        assert_eq!(names, vec!["Alice", "Cara"]);
    }

    #[test]
    fn test_group_by_errors() {
        let data = make_data();
        assert_eq!(
            group_by(&data, &["missing".to_string()]).unwrap_err(),
            AnalysisError::UnknownColumn("missing".to_string())
        );
        assert!(matches!(group_by(&data, &[]), Err(AnalysisError::Validation(_))));
    }

    #[test]
    fn test_group_result_serializes_in_order() {
        let data = TableData::from_csv("k\nz\na\nz").unwrap();
        let groups = group_by(&data, &["k".to_string()]).unwrap();
        let json = serde_json::to_string(&groups).unwrap();
        assert_eq!(json, r#"{"z":[["z"],["z"]],"a":[["a"]]}"#);
    }
}
