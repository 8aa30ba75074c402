// Workspace: the operations a transport drives, with ownership checks

use crate::analysis::{Analysis, AnalysisDraft, AnalysisPatch, Caller};
use crate::data::{Table, TableData, TableSummary};
use crate::error::{AnalysisError, Result};
use crate::graph::{PlottersRenderer, Renderer};
use crate::ir::{ChartDescriptor, PlotRequest};
use crate::palette::{ColorSource, RandomColors};
use crate::resolve::{resolve_axes, validate_request};
use crate::store::{MemoryStore, Store};
use crate::transform::{self, GroupResult};
use crate::RenderOptions;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

/// A rendered analysis ready to hand to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    pub file_name: String,
    pub content_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// Tables, analyses and the renderer behind one facade.
pub struct Workspace<S: Store, R: Renderer> {
    store: S,
    renderer: R,
    colors: Mutex<Box<dyn ColorSource + Send>>,
}

impl Workspace<MemoryStore, PlottersRenderer> {
    /// In-memory store, plotters renderer, random colors.
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new(), PlottersRenderer)
    }
}

impl<S: Store, R: Renderer> Workspace<S, R> {
    pub fn new(store: S, renderer: R) -> Self {
        Self {
            store,
            renderer,
            colors: Mutex::new(Box::new(RandomColors)),
        }
    }

    /// Swap the color source (a fixed palette makes descriptors reproducible).
    pub fn with_colors(self, colors: impl ColorSource + Send + 'static) -> Self {
        Self {
            colors: Mutex::new(Box::new(colors)),
            ..self
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // -------------------------------------------------------------------------
    // Tables
    // -------------------------------------------------------------------------

    /// Parse raw CSV text and store it under a new id.
    pub fn ingest(&self, raw_text: &str, caller: &Caller) -> Result<TableSummary> {
        let data = TableData::from_csv(raw_text)?;
        self.insert_table(data, caller)
    }

    /// Same as `ingest` for a JSON array of flat records.
    pub fn ingest_json(&self, value: &Value, caller: &Caller) -> Result<TableSummary> {
        let data = TableData::from_json(value)?;
        self.insert_table(data, caller)
    }

    fn insert_table(&self, data: TableData, caller: &Caller) -> Result<TableSummary> {
        let table = Table::new(caller.id.clone(), data);
        let summary = table.summary();
        self.store.insert_table(table)?;
        info!(
            "Ingested table {} for {} ({} columns, {} rows)",
            summary.table_id,
            caller.id,
            summary.columns.len(),
            summary.rows
        );
        Ok(summary)
    }

    pub fn get_table(&self, table_id: &str, caller: &Caller) -> Result<Table> {
        let table = self
            .store
            .table(table_id)?
            .ok_or_else(|| AnalysisError::not_found("table", table_id))?;
        if table.owner != caller.id {
            return Err(AnalysisError::forbidden("table", table_id));
        }
        Ok(table)
    }

    pub fn list_tables(&self, caller: &Caller) -> Result<Vec<TableSummary>> {
        Ok(self.store.tables_for(&caller.id)?.iter().map(Table::summary).collect())
    }

    // -------------------------------------------------------------------------
    // Charts
    // -------------------------------------------------------------------------

    /// Validate the request, resolve its columns, then build the descriptor.
    pub fn build_plot(&self, request: &PlotRequest, caller: &Caller) -> Result<ChartDescriptor> {
        let kind = validate_request(request)?;
        let table = self.get_table(&request.table_id, caller)?;
        let axes = resolve_axes(kind, request.x.as_deref(), &request.ys, &table.data)?;
        debug!(
            "Building {} for table {} (x: {:?}, y: {:?})",
            kind, request.table_id, request.x, request.ys
        );
        let mut colors = self.colors.lock();
        transform::build_chart(&axes, &table.data, &mut **colors)
    }

    pub fn group_by(&self, table_id: &str, columns: &[String], caller: &Caller) -> Result<GroupResult> {
        let table = self.get_table(table_id, caller)?;
        transform::group_by(&table.data, columns)
    }

    // -------------------------------------------------------------------------
    // Analyses
    // -------------------------------------------------------------------------

    pub fn save_analysis(&self, caller: &Caller, draft: AnalysisDraft) -> Result<Analysis> {
        let analysis = Analysis::from_draft(caller, draft)?;
        self.store.put_analysis(analysis.clone())?;
        info!(
            "Saved analysis {} '{}' with {} plots for {}",
            analysis.id,
            analysis.title,
            analysis.plots.len(),
            caller.id
        );
        Ok(analysis)
    }

    /// Fetch an analysis the caller owns.
    pub fn get_analysis(&self, id: &str, caller: &Caller) -> Result<Analysis> {
        let analysis = self
            .store
            .analysis(id)?
            .ok_or_else(|| AnalysisError::not_found("analysis", id))?;
        if analysis.owner != caller.id {
            return Err(AnalysisError::forbidden("analysis", id));
        }
        Ok(analysis)
    }

    pub fn list_analyses(&self, caller: &Caller) -> Result<Vec<Analysis>> {
        self.store.analyses_for(&caller.id)
    }

    pub fn update_analysis(&self, id: &str, caller: &Caller, patch: AnalysisPatch) -> Result<Analysis> {
        let mut analysis = self.get_analysis(id, caller)?;
        analysis.apply_patch(patch)?;
        self.store.put_analysis(analysis.clone())?;
        info!("Updated analysis {}", id);
        Ok(analysis)
    }

    pub fn delete_analysis(&self, id: &str, caller: &Caller) -> Result<()> {
        self.get_analysis(id, caller)?;
        if !self.store.remove_analysis(id)? {
            return Err(AnalysisError::not_found("analysis", id));
        }
        info!("Deleted analysis {}", id);
        Ok(())
    }

    /// Mark the analysis public, persist that, then render it.
    ///
    /// The flag is stored before rendering, so a render failure leaves the
    /// analysis public without an artifact.
    pub fn publish(&self, id: &str, caller: &Caller, options: &RenderOptions) -> Result<Artifact> {
        let mut analysis = self.get_analysis(id, caller)?;
        if !analysis.is_public {
            analysis.is_public = true;
            self.store.put_analysis(analysis.clone())?;
            info!("Published analysis {}", id);
        }

        self.render(&analysis, options).map_err(|e| {
            warn!("Analysis {} is public but failed to render: {}", id, e);
            e
        })
    }

    /// Render a public analysis for anyone.
    pub fn export_public(&self, id: &str, options: &RenderOptions) -> Result<Artifact> {
        let analysis = self
            .store
            .analysis(id)?
            .ok_or_else(|| AnalysisError::not_found("analysis", id))?;
        if !analysis.is_public {
            return Err(AnalysisError::forbidden("analysis", id));
        }
        self.render(&analysis, options)
    }

    fn render(&self, analysis: &Analysis, options: &RenderOptions) -> Result<Artifact> {
        let bytes = self.renderer.render(analysis, options)?;
        debug!("Rendered analysis {} to {} bytes", analysis.id, bytes.len());
        Ok(Artifact {
            file_name: format!("{}.{}", analysis.file_stem(), options.format.extension()),
            content_type: options.format.content_type().to_string(),
            bytes,
        })
    }
}
