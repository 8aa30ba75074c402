use jigyasa::analysis::{AnalysisDraft, Caller, PlotConfiguration, PlotDraft};
use jigyasa::ir::{ChartKind, PlotRequest, TraceType};
use jigyasa::palette::ColorPalette;
use jigyasa::store::{JsonFileStore, MemoryStore};
use jigyasa::graph::PlottersRenderer;
use jigyasa::{AnalysisError, OutputFormat, RenderOptions, Workspace};
use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn survey_csv() -> String {
    fs::read_to_string("tests/fixtures/survey.csv").expect("Failed to read survey fixture")
}

/// Check if bytes are a valid PNG
fn is_valid_png(bytes: &[u8]) -> bool {
    bytes.len() > 8 && bytes[0..8] == [137, 80, 78, 71, 13, 10, 26, 10]
}

fn request(table_id: &str, kind: &str, x: Option<&str>, ys: &[&str]) -> PlotRequest {
    PlotRequest {
        table_id: table_id.to_string(),
        kind: kind.to_string(),
        x: x.map(str::to_string),
        ys: ys.iter().map(|s| s.to_string()).collect(),
    }
}

fn memory_workspace() -> Workspace<MemoryStore, PlottersRenderer> {
    Workspace::in_memory().with_colors(ColorPalette::category10())
}

/// Build one plot per kind and save them all as a single analysis.
fn save_every_kind(ws: &Workspace<MemoryStore, PlottersRenderer>, caller: &Caller) -> String {
    let table = ws.ingest(&survey_csv(), caller).unwrap();
    let cases: Vec<(&str, Option<&str>, Vec<&str>)> = vec![
        ("scatter", Some("hours"), vec!["satisfaction"]),
        ("line", Some("year"), vec!["satisfaction"]),
        ("bar", Some("team"), vec!["satisfaction"]),
        ("area", Some("respondent"), vec!["hours"]),
        ("pie", Some("team"), vec![]),
        ("histogram", None, vec!["hours"]),
        ("box", None, vec!["satisfaction"]),
        ("heatmap", Some("team"), vec!["satisfaction", "year"]),
    ];

    let plots = cases
        .into_iter()
        .map(|(kind, x, ys)| {
            let chart = ws.build_plot(&request(&table.table_id, kind, x, &ys), caller).unwrap();
            let configuration = PlotConfiguration {
                x_axis: x.unwrap_or_default().to_string(),
                y_axes: ys.iter().map(|s| s.to_string()).collect(),
            };
            PlotDraft::from_chart(kind.parse::<ChartKind>().unwrap(), None, configuration, &chart).unwrap()
        })
        .collect();

    let draft = AnalysisDraft {
        title: Some("Team Pulse 2024".to_string()),
        description: Some("Quarterly check-in".to_string()),
        plots,
        ..Default::default()
    };
    ws.save_analysis(caller, draft).unwrap().id
}

#[test]
fn test_ingest_shape_and_coercion() {
    let ws = memory_workspace();
    let caller = Caller::new("alice");
    let summary = ws.ingest(&survey_csv(), &caller).unwrap();
    assert_eq!(summary.columns, vec!["respondent", "team", "year", "satisfaction", "hours"]);
    assert_eq!(summary.rows, 6);

    let chart = ws
        .build_plot(&request(&summary.table_id, "histogram", None, &["hours"]), &caller)
        .unwrap();
    let hours = chart.data[0].x.as_ref().unwrap().numbers();
    assert_eq!(hours, vec![12.5, 8.0, 15.0, 0.0, 9.5, 20.0]);
}

#[test]
fn test_bar_series_from_small_table() {
    let ws = memory_workspace();
    let caller = Caller::new("alice");
    let summary = ws.ingest("name,score\nAlice,10\nBob,20", &caller).unwrap();
    let chart = ws
        .build_plot(&request(&summary.table_id, "bar", Some("name"), &["score"]), &caller)
        .unwrap();
    assert_eq!(chart.data.len(), 1);
    assert_eq!(chart.data[0].trace, TraceType::Bar);
    assert_eq!(chart.data[0].x.as_ref().unwrap().labels(), vec!["Alice", "Bob"]);
    assert_eq!(chart.data[0].y.as_ref().unwrap().numbers(), vec![10.0, 20.0]);
    assert_eq!(chart.layout.title, "Bar Plot");
}

#[test]
fn test_group_by_preserves_order() {
    let ws = memory_workspace();
    let caller = Caller::new("alice");
    let summary = ws.ingest(&survey_csv(), &caller).unwrap();
    let groups = ws
        .group_by(&summary.table_id, &["team".to_string(), "year".to_string()], &caller)
        .unwrap();
    let keys: Vec<&String> = groups.keys().collect();
    assert_eq!(keys, vec!["red|2023", "blue|2023", "red|2024", "green|2024", "blue|2024"]);
    assert_eq!(groups["red|2023"].len(), 2);
    assert_eq!(groups["red|2023"][1][0], "r6");

    let err = ws
        .group_by(&summary.table_id, &["department".to_string()], &caller)
        .unwrap_err();
    assert_eq!(err, AnalysisError::UnknownColumn("department".to_string()));
}

#[test]
fn test_publish_renders_every_kind_to_png() {
    let ws = memory_workspace();
    let caller = Caller::new("alice");
    let id = save_every_kind(&ws, &caller);

    let artifact = ws.publish(&id, &caller, &RenderOptions::default()).unwrap();
    assert_eq!(artifact.file_name, "team_pulse_2024.png");
    assert_eq!(artifact.content_type, "image/png");
    assert!(is_valid_png(&artifact.bytes), "Output is not a valid PNG");

    let exported = ws.export_public(&id, &RenderOptions::default()).unwrap();
    assert!(is_valid_png(&exported.bytes));
}

#[test]
fn test_publish_svg() {
    let ws = memory_workspace();
    let caller = Caller::new("alice");
    let id = save_every_kind(&ws, &caller);

    let options = RenderOptions {
        width: 640,
        height: 400,
        format: OutputFormat::Svg,
    };
    let artifact = ws.publish(&id, &caller, &options).unwrap();
    assert_eq!(artifact.file_name, "team_pulse_2024.svg");
    let text = String::from_utf8(artifact.bytes).unwrap();
    assert!(text.contains("<svg"));
}

#[test]
fn test_json_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let caller = Caller::new("alice");

    let (table_id, analysis_id) = {
        let ws = Workspace::new(JsonFileStore::open(dir.path()).unwrap(), PlottersRenderer)
            .with_colors(ColorPalette::category10());
        let table = ws.ingest("name,score\nAlice,10\nBob,20", &caller).unwrap();
        let chart = ws
            .build_plot(&request(&table.table_id, "pie", Some("name"), &["score"]), &caller)
            .unwrap();
        let plot = PlotDraft::from_chart(ChartKind::Pie, Some("Scores".to_string()), Default::default(), &chart)
            .unwrap();
        let saved = ws
            .save_analysis(&caller, AnalysisDraft { plots: vec![plot], ..Default::default() })
            .unwrap();
        (table.table_id, saved.id)
    };

    let ws = Workspace::new(JsonFileStore::open(dir.path()).unwrap(), PlottersRenderer);
    assert_eq!(ws.list_tables(&caller).unwrap()[0].table_id, table_id);
    let analysis = ws.get_analysis(&analysis_id, &caller).unwrap();
    assert_eq!(analysis.plots[0].title, "Scores");
    assert_eq!(analysis.title, "Untitled Analysis");
    assert!(matches!(
        ws.get_analysis(&analysis_id, &Caller::new("bob")),
        Err(AnalysisError::Forbidden { .. })
    ));
}

#[test]
fn test_two_workspaces_on_one_directory_keep_both_writes() {
    let dir = tempfile::tempdir().unwrap();
    let alice = Caller::new("alice");
    let bob = Caller::new("bob");

    let first = Workspace::new(JsonFileStore::open(dir.path()).unwrap(), PlottersRenderer);
    let second = Workspace::new(JsonFileStore::open(dir.path()).unwrap(), PlottersRenderer);
    first.ingest("a\n1", &alice).unwrap();
    second.ingest("b\n2", &bob).unwrap();
    first.save_analysis(&alice, AnalysisDraft {
        plots: vec![PlotDraft {
            kind: Some("bar".to_string()),
            data: Some(serde_json::json!({"data": [{"type": "bar", "x": ["a"], "y": [1]}]})),
            ..Default::default()
        }],
        ..Default::default()
    })
    .unwrap();

    let reopened = Workspace::new(JsonFileStore::open(dir.path()).unwrap(), PlottersRenderer);
    assert_eq!(reopened.list_tables(&alice).unwrap().len(), 1);
    assert_eq!(reopened.list_tables(&bob).unwrap().len(), 1);
    assert_eq!(reopened.list_analyses(&alice).unwrap().len(), 1);
}

// =============================================================================
// Binary
// =============================================================================

fn run_jigyasa(data_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_jigyasa"))
        .args(args)
        .env("JIGYASA_DATA_DIR", data_dir)
        .env("JIGYASA_USER", "alice")
        .env_remove("JIGYASA_DISPLAY_NAME")
        .current_dir(data_dir)
        .output()
        .expect("Failed to run jigyasa")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "Command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

#[test]
fn test_cli_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("survey.csv");
    fs::write(&csv_path, survey_csv()).unwrap();
    let csv_arg = csv_path.to_str().unwrap();

    let summary = stdout_json(&run_jigyasa(dir.path(), &["ingest", csv_arg]));
    assert_eq!(summary["rows"], 6);
    let table_id = summary["table_id"].as_str().unwrap().to_string();

    let chart = stdout_json(&run_jigyasa(
        dir.path(),
        &["plot", "--table", &table_id, "--kind", "bar", "--x", "team", "--y", "satisfaction"],
    ));
    assert_eq!(chart["data"][0]["type"], "bar");
    assert_eq!(chart["layout"]["title"], "Bar Plot");

    let groups = stdout_json(&run_jigyasa(dir.path(), &["group-by", "--table", &table_id, "team"]));
    assert_eq!(groups["red"].as_array().unwrap().len(), 3);

    let saved = stdout_json(&run_jigyasa(
        dir.path(),
        &[
            "plot", "--table", &table_id, "--kind", "line", "--x", "year", "--y", "hours", "--save-as", "Hours Trend",
        ],
    ));
    let analysis_id = saved["id"].as_str().unwrap().to_string();
    assert_eq!(saved["plots"][0]["type"], "line");

    let listed = stdout_json(&run_jigyasa(dir.path(), &["analyses"]));
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let published = stdout_json(&run_jigyasa(dir.path(), &["publish", &analysis_id]));
    assert_eq!(published["file_name"], "hours_trend.png");
    let bytes = fs::read(dir.path().join("hours_trend.png")).unwrap();
    assert!(is_valid_png(&bytes));
}

#[test]
fn test_cli_reports_client_errors() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_jigyasa(dir.path(), &["show", "does-not-exist"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("does-not-exist"), "stderr: {}", stderr);

    let output = run_jigyasa(
        dir.path(),
        &["plot", "--table", "whatever", "--kind", "radar", "--x", "a"],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unsupported plot type: radar"));
}
