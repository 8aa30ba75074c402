use crate::analysis::{Analysis, SavedPlot, DEFAULT_PLOT_TITLE};
use crate::error::{AnalysisError, Result};
use crate::ir::{ChartDescriptor, Fill, Layout, Mode, Series, TraceType};
use crate::palette::CATEGORY10;
use crate::scale::{histogram, pad_range, zero_based_range, BoxStats, XAxis, HISTOGRAM_BINS};
use crate::{OutputFormat, RenderOptions};
use image::ImageEncoder;
use log::debug;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::f64::consts::PI;

/// Height of the title block above the first chart.
const HEADER_HEIGHT: u32 = 80;

/// Largest document we agree to allocate, in pixels.
pub const MAX_PIXELS: usize = 64_000_000;

/// Turns a saved analysis into one downloadable document.
pub trait Renderer {
    fn render(&self, analysis: &Analysis, options: &RenderOptions) -> Result<Vec<u8>>;
}

/// Draws every chart as a stacked panel with plotters, encoded as PNG or SVG.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlottersRenderer;

impl Renderer for PlottersRenderer {
    fn render(&self, analysis: &Analysis, options: &RenderOptions) -> Result<Vec<u8>> {
        let charts = parse_charts(analysis)?;
        if charts.is_empty() {
            return Err(AnalysisError::Render(format!(
                "Analysis '{}' has no plots to render",
                analysis.id
            )));
        }

        let (width, height) = canvas_size(options, charts.len())?;
        debug!(
            "Rendering {} charts for analysis {} as {:?} ({}x{})",
            charts.len(),
            analysis.id,
            options.format,
            width,
            height
        );

        match options.format {
            OutputFormat::Png => {
                let mut buffer = vec![0u8; width as usize * height as usize * 3];
                {
                    let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
                    draw_document(&root, analysis, &charts)?;
                    root.present().context("Failed to present drawing")?;
                }
                encode_png(&buffer, width, height)
            }
            OutputFormat::Svg => {
                let mut svg = String::new();
                {
                    let root = SVGBackend::with_string(&mut svg, (width, height)).into_drawing_area();
                    draw_document(&root, analysis, &charts)?;
                    root.present().context("Failed to present drawing")?;
                }
                Ok(svg.into_bytes())
            }
        }
    }
}

/// Full document size: one header plus `chart_count` panels stacked vertically.
fn canvas_size(options: &RenderOptions, chart_count: usize) -> Result<(u32, u32)> {
    if options.width == 0 || options.height == 0 {
        return Err(AnalysisError::Render(format!(
            "Chart size must be positive, got {}x{}",
            options.width, options.height
        )));
    }

    let too_large = || {
        AnalysisError::Render(format!(
            "{} charts of {}x{} exceed the {} pixel limit",
            chart_count, options.width, options.height, MAX_PIXELS
        ))
    };
    let height = (options.height as usize)
        .checked_mul(chart_count)
        .and_then(|h| h.checked_add(HEADER_HEIGHT as usize))
        .ok_or_else(too_large)?;
    let pixels = (options.width as usize).checked_mul(height).ok_or_else(too_large)?;
    if pixels > MAX_PIXELS {
        return Err(too_large());
    }
    let height = u32::try_from(height).map_err(|_| too_large())?;
    Ok((options.width, height))
}

/// Map any backend error onto `AnalysisError::Render`.
trait RenderContext<T> {
    fn context(self, what: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> RenderContext<T> for std::result::Result<T, E> {
    fn context(self, what: &str) -> Result<T> {
        self.map_err(|e| AnalysisError::Render(format!("{}: {}", what, e)))
    }
}

fn parse_charts(analysis: &Analysis) -> Result<Vec<(&SavedPlot, ChartDescriptor)>> {
    analysis
        .plots
        .iter()
        .enumerate()
        .map(|(idx, plot)| {
            let chart = plot.descriptor().map_err(|e| {
                AnalysisError::Render(format!("Plot #{} ('{}') has malformed data: {}", idx + 1, plot.title, e))
            })?;
            if chart.data.is_empty() {
                return Err(AnalysisError::Render(format!(
                    "Plot #{} ('{}') has no series",
                    idx + 1,
                    plot.title
                )));
            }
            Ok((plot, chart))
        })
        .collect()
}

fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let mut png_bytes = Vec::new();
    image::codecs::png::PngEncoder::new(&mut png_bytes)
        .write_image(buffer, width, height, image::ColorType::Rgb8)
        .context("Failed to encode PNG")?;
    Ok(png_bytes)
}

fn draw_document<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    analysis: &Analysis,
    charts: &[(&SavedPlot, ChartDescriptor)],
) -> Result<()> {
    root.fill(&WHITE).context("Failed to fill background")?;

    let (header, body) = root.split_vertically(HEADER_HEIGHT as i32);
    header
        .draw(&Text::new(analysis.title.clone(), (20, 12), ("sans-serif", 28).into_font()))
        .context("Failed to draw title")?;
    let byline = if analysis.description.is_empty() {
        format!("by {}", analysis.author_name)
    } else {
        format!("by {} | {}", analysis.author_name, analysis.description)
    };
    header
        .draw(&Text::new(byline, (20, 50), ("sans-serif", 16).into_font()))
        .context("Failed to draw byline")?;

    let panels = body.split_evenly((charts.len(), 1));
    for (panel, (plot, chart)) in panels.iter().zip(charts) {
        let caption = if plot.title == DEFAULT_PLOT_TITLE {
            chart.layout.title.clone()
        } else {
            plot.title.clone()
        };
        draw_chart(panel, &caption, chart)?;
    }
    Ok(())
}

fn draw_chart<DB: DrawingBackend>(area: &DrawingArea<DB, Shift>, caption: &str, chart: &ChartDescriptor) -> Result<()> {
    let first = chart.data[0].trace;
    let series: Vec<&Series> = chart.data.iter().filter(|s| s.trace == first).collect();

    match first {
        TraceType::Scatter | TraceType::Bar => draw_xy(area, caption, &chart.layout, &series),
        TraceType::Pie => draw_pie(area, caption, series[0]),
        TraceType::Histogram => draw_histogram(area, caption, &chart.layout, &series),
        TraceType::Box => draw_box(area, caption, &chart.layout, &series),
        TraceType::Heatmap => draw_heatmap(area, caption, &chart.layout, series[0]),
    }
}

fn format_tick(x: f64) -> String {
    let rounded = (x * 100.0).round() / 100.0;
    format!("{}", rounded)
}

fn axis_desc(title: &Option<String>) -> String {
    title.clone().unwrap_or_default()
}

fn series_color(series: &Series, idx: usize) -> RGBAColor {
    series
        .marker
        .as_ref()
        .and_then(|m| m.color.as_deref())
        .and_then(parse_color)
        .unwrap_or_else(|| fallback_color(idx).mix(0.9))
}

fn fallback_color(idx: usize) -> RGBColor {
    let (r, g, b) = CATEGORY10[idx % CATEGORY10.len()];
    RGBColor(r, g, b)
}

/// Lines, markers, filled areas and bars over a shared x axis.
fn draw_xy<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    caption: &str,
    layout: &Layout,
    series: &[&Series],
) -> Result<()> {
    let is_bar = series[0].trace == TraceType::Bar;

    let mut prepared = Vec::with_capacity(series.len());
    for s in series {
        let x = s
            .x
            .as_ref()
            .ok_or_else(|| AnalysisError::Render("Series is missing x values".to_string()))?;
        let y = s
            .y
            .as_ref()
            .ok_or_else(|| AnalysisError::Render("Series is missing y values".to_string()))?
            .numbers();
        if x.len() != y.len() {
            return Err(AnalysisError::Render(format!(
                "X and Y data must have the same length (x: {}, y: {})",
                x.len(),
                y.len()
            )));
        }
        prepared.push((XAxis::from_values(x, is_bar), y));
    }

    // first series decides the axis type and labels
    let axis = &prepared[0].0;
    let x_range = match axis {
        XAxis::Continuous(_) => {
            let all_x: Vec<f64> = prepared.iter().flat_map(|(a, _)| a.positions().to_vec()).collect();
            pad_range(&all_x)
        }
        XAxis::Categorical { .. } => {
            let widest = prepared.iter().map(|(a, _)| a.range().end).fold(f64::NEG_INFINITY, f64::max);
            -0.5..widest
        }
    };
    let all_y: Vec<f64> = prepared.iter().flat_map(|(_, y)| y.clone()).collect();
    let needs_zero = is_bar || series.iter().any(|s| s.fill.is_some());
    let y_range = if needs_zero { zero_based_range(&all_y) } else { pad_range(&all_y) };

    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .caption(caption, ("sans-serif", 20))
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_range, y_range)
        .context("Failed to build chart")?;

    let x_ticks = match axis {
        XAxis::Categorical { categories, .. } => categories.len().max(1),
        XAxis::Continuous(_) => 10,
    };
    chart
        .configure_mesh()
        .x_labels(x_ticks)
        .x_desc(axis_desc(&layout.xaxis.title))
        .y_desc(axis_desc(&layout.yaxis.title))
        .x_label_formatter(&|x| axis.category_label(*x).unwrap_or_else(|| format_tick(*x)))
        .y_label_formatter(&|y| format_tick(*y))
        .draw()
        .context("Failed to draw mesh")?;

    for (idx, ((x_axis, y), s)) in prepared.iter().zip(series).enumerate() {
        let color = series_color(s, idx);
        let points: Vec<(f64, f64)> = x_axis.positions().iter().cloned().zip(y.iter().cloned()).collect();

        if is_bar {
            chart
                .draw_series(points.iter().map(|&(x, y)| {
                    Rectangle::new([(x - 0.4, 0.0), (x + 0.4, y)], color.filled())
                }))
                .context("Failed to draw bar")?;
            continue;
        }

        if s.fill == Some(Fill::ToZeroY) {
            chart
                .draw_series(AreaSeries::new(points.clone(), 0.0, color.mix(0.3)).border_style(color))
                .context("Failed to draw area series")?;
        }

        let mode = s.mode.unwrap_or(Mode::Markers);
        if matches!(mode, Mode::Lines | Mode::LinesMarkers) && s.fill.is_none() {
            chart
                .draw_series(LineSeries::new(points.clone(), color.stroke_width(2)))
                .context("Failed to draw line series")?;
        }
        if matches!(mode, Mode::Markers | Mode::LinesMarkers) {
            chart
                .draw_series(points.iter().map(|&(x, y)| Circle::new((x, y), 3, color.filled())))
                .context("Failed to draw point series")?;
        }
    }

    Ok(())
}

/// Wedges drawn as polygons in pixel space.
fn draw_pie<DB: DrawingBackend>(area: &DrawingArea<DB, Shift>, caption: &str, series: &Series) -> Result<()> {
    let inner = area.titled(caption, ("sans-serif", 20).into_font()).context("Failed to draw caption")?;

    let values: Vec<f64> = series.values.clone().unwrap_or_default().into_iter().map(|v| v.max(0.0)).collect();
    let labels = series.labels.clone().unwrap_or_default();
    let slice_colors = series.marker.as_ref().and_then(|m| m.colors.clone()).unwrap_or_default();
    let total: f64 = values.iter().sum();

    let (w, h) = inner.dim_in_pixel();
    let center = (w as f64 / 2.0, h as f64 / 2.0);
    let radius = (w.min(h) as f64) * 0.35;

    if total <= 0.0 {
        inner
            .draw(&Text::new("No data", (center.0 as i32 - 30, center.1 as i32), ("sans-serif", 16).into_font()))
            .context("Failed to draw pie placeholder")?;
        return Ok(());
    }

    let mut start = -PI / 2.0;
    for (idx, value) in values.iter().enumerate() {
        let sweep = value / total * 2.0 * PI;
        if sweep <= 0.0 {
            continue;
        }
        let color = slice_colors
            .get(idx)
            .and_then(|c| parse_color(c))
            .unwrap_or_else(|| fallback_color(idx).mix(0.9));

        let steps = ((sweep / (PI / 90.0)).ceil() as usize).max(1);
        let mut points = vec![(center.0 as i32, center.1 as i32)];
        for step in 0..=steps {
            let angle = start + sweep * step as f64 / steps as f64;
            points.push((
                (center.0 + radius * angle.cos()) as i32,
                (center.1 + radius * angle.sin()) as i32,
            ));
        }
        inner.draw(&Polygon::new(points, color.filled())).context("Failed to draw pie slice")?;

        let mid = start + sweep / 2.0;
        let label = labels.get(idx).cloned().unwrap_or_default();
        let text = format!("{} ({:.1}%)", label, value / total * 100.0);
        let anchor = (
            (center.0 + radius * 1.15 * mid.cos()) as i32,
            (center.1 + radius * 1.15 * mid.sin()) as i32,
        );
        inner
            .draw(&Text::new(text, anchor, ("sans-serif", 12).into_font()))
            .context("Failed to draw pie label")?;

        start += sweep;
    }
    Ok(())
}

fn draw_histogram<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    caption: &str,
    layout: &Layout,
    series: &[&Series],
) -> Result<()> {
    let values = series[0]
        .x
        .as_ref()
        .ok_or_else(|| AnalysisError::Render("Histogram series is missing x values".to_string()))?
        .numbers();
    let bins = histogram(&values, HISTOGRAM_BINS);

    let edges: Vec<f64> = bins.iter().flat_map(|b| [b.start, b.end]).collect();
    let counts: Vec<f64> = bins.iter().map(|b| b.count as f64).collect();

    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .caption(caption, ("sans-serif", 20))
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(pad_range(&edges), zero_based_range(&counts))
        .context("Failed to build chart")?;

    chart
        .configure_mesh()
        .x_desc(axis_desc(&series[0].name.clone().or_else(|| layout.yaxis.title.clone())))
        .y_desc("count")
        .x_label_formatter(&|x| format_tick(*x))
        .y_label_formatter(&|y| format_tick(*y))
        .draw()
        .context("Failed to draw mesh")?;

    let color = series_color(series[0], 0);
    chart
        .draw_series(bins.iter().map(|b| {
            Rectangle::new([(b.start, 0.0), (b.end, b.count as f64)], color.filled())
        }))
        .context("Failed to draw histogram")?;
    Ok(())
}

/// One box per series, placed side by side.
fn draw_box<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    caption: &str,
    layout: &Layout,
    series: &[&Series],
) -> Result<()> {
    let mut stats = Vec::with_capacity(series.len());
    let mut names = Vec::with_capacity(series.len());
    let mut all_y = Vec::new();
    for (idx, s) in series.iter().enumerate() {
        let ys = s
            .y
            .as_ref()
            .ok_or_else(|| AnalysisError::Render("Box series is missing y values".to_string()))?
            .numbers();
        all_y.extend(ys.iter().cloned());
        stats.push(BoxStats::compute(&ys));
        names.push(s.name.clone().unwrap_or_else(|| format!("series {}", idx + 1)));
    }

    let x_range = -0.5..(series.len() as f64 - 0.5);
    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .caption(caption, ("sans-serif", 20))
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_range, pad_range(&all_y))
        .context("Failed to build chart")?;

    let label_x = |x: &f64| {
        let idx = x.round();
        if idx < 0.0 || (x - idx).abs() > 1e-6 {
            String::new()
        } else {
            names.get(idx as usize).cloned().unwrap_or_default()
        }
    };
    chart
        .configure_mesh()
        .x_labels(series.len())
        .x_label_formatter(&label_x)
        .y_label_formatter(&|y| format_tick(*y))
        .y_desc(axis_desc(&layout.yaxis.title))
        .draw()
        .context("Failed to draw mesh")?;

    for (idx, (stat, s)) in stats.iter().zip(series).enumerate() {
        let Some(stat) = stat else { continue };
        let x = idx as f64;
        let color = series_color(s, idx);
        let half = 0.25;

        chart
            .draw_series(std::iter::once(Rectangle::new([(x - half, stat.q3), (x + half, stat.q1)], color.filled())))
            .context("Failed to draw box")?;

        let lines = vec![
            vec![(x, stat.lower_whisker), (x, stat.q1)],
            vec![(x, stat.q3), (x, stat.upper_whisker)],
            vec![(x - half / 2.0, stat.lower_whisker), (x + half / 2.0, stat.lower_whisker)],
            vec![(x - half / 2.0, stat.upper_whisker), (x + half / 2.0, stat.upper_whisker)],
        ];
        chart
            .draw_series(lines.into_iter().map(|pts| PathElement::new(pts, color.stroke_width(2))))
            .context("Failed to draw whiskers")?;
        chart
            .draw_series(std::iter::once(PathElement::new(
                vec![(x - half, stat.median), (x + half, stat.median)],
                WHITE.stroke_width(2),
            )))
            .context("Failed to draw median")?;
        chart
            .draw_series(stat.outliers.iter().map(|&v| Circle::new((x, v), 3, color.filled())))
            .context("Failed to draw outliers")?;
    }
    Ok(())
}

fn draw_heatmap<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    caption: &str,
    layout: &Layout,
    series: &Series,
) -> Result<()> {
    let x_labels = series.x.as_ref().map(|v| v.labels()).unwrap_or_default();
    let y_labels = series.y.as_ref().map(|v| v.labels()).unwrap_or_default();
    let z = series
        .z
        .as_ref()
        .ok_or_else(|| AnalysisError::Render("Heatmap series is missing z values".to_string()))?;

    let flat: Vec<f64> = z.iter().flatten().cloned().collect();
    let min = flat.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = flat.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let span = if max > min { max - min } else { 1.0 };

    let nx = x_labels.len().max(z.iter().map(Vec::len).max().unwrap_or(0)).max(1);
    let ny = y_labels.len().max(z.len()).max(1);

    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .caption(caption, ("sans-serif", 20))
        .x_label_area_size(40)
        .y_label_area_size(80)
        .build_cartesian_2d(-0.5..(nx as f64 - 0.5), -0.5..(ny as f64 - 0.5))
        .context("Failed to build chart")?;

    let pick = |labels: &[String], v: f64| {
        let idx = v.round();
        if idx < 0.0 || (v - idx).abs() > 1e-6 {
            String::new()
        } else {
            labels.get(idx as usize).cloned().unwrap_or_default()
        }
    };
    let label_x = |x: &f64| pick(&x_labels, *x);
    let label_y = |y: &f64| pick(&y_labels, *y);
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(nx)
        .y_labels(ny)
        .x_label_formatter(&label_x)
        .y_label_formatter(&label_y)
        .x_desc(axis_desc(&layout.xaxis.title))
        .y_desc(axis_desc(&layout.yaxis.title))
        .draw()
        .context("Failed to draw mesh")?;

    let cells = z.iter().enumerate().flat_map(|(yi, row)| {
        row.iter().enumerate().map(move |(xi, &v)| (xi as f64, yi as f64, v))
    });
    chart
        .draw_series(cells.map(|(x, y, v)| {
            let t = ((v - min) / span).clamp(0.0, 1.0);
            let shade = |lo: f64, hi: f64| (lo + (hi - lo) * t) as u8;
            let color = RGBColor(shade(247.0, 8.0), shade(251.0, 48.0), shade(255.0, 107.0));
            Rectangle::new([(x - 0.5, y - 0.5), (x + 0.5, y + 0.5)], color.filled())
        }))
        .context("Failed to draw heatmap cells")?;
    Ok(())
}

/// Parse a CSS-ish color: a few names, `#rrggbb`, `rgb(...)` or `rgba(...)`.
pub fn parse_color(color_str: &str) -> Option<RGBAColor> {
    let s = color_str.trim();
    let named = match s {
        "red" => Some(RED),
        "green" => Some(GREEN),
        "blue" => Some(BLUE),
        "black" => Some(BLACK),
        "yellow" => Some(YELLOW),
        "cyan" => Some(CYAN),
        "magenta" => Some(MAGENTA),
        "white" => Some(WHITE),
        _ => None,
    };
    if let Some(c) = named {
        return Some(c.mix(1.0));
    }

    if let Some(hex) = s.strip_prefix('#') {
        if hex.len() != 6 {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        return Some(RGBColor(channel(0)?, channel(2)?, channel(4)?).mix(1.0));
    }

    let inner = s
        .strip_prefix("rgba(")
        .or_else(|| s.strip_prefix("rgb("))?
        .strip_suffix(')')?;
    let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }
    let channel = |p: &str| p.parse::<f64>().ok().map(|v| v.clamp(0.0, 255.0) as u8);
    let alpha = match parts.get(3) {
        Some(a) => a.parse::<f64>().ok()?.clamp(0.0, 1.0),
        None => 1.0,
    };
    Some(RGBColor(channel(parts[0])?, channel(parts[1])?, channel(parts[2])?).mix(alpha))
}
