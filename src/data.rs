use crate::error::{AnalysisError, Result};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Header row plus raw data rows of one upload. Cells are never type-inferred.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableData {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Parse delimited text. The first record is the header; every cell is trimmed.
    ///
    /// Ragged rows are accepted by the reader and then padded with empty cells
    /// (or cut) to the header width so the stored table stays rectangular.
    pub fn from_csv(text: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let mut records = reader.records();
        let headers: Vec<String> = match records.next() {
            Some(record) => record?.iter().map(str::to_string).collect(),
            None => return Err(AnalysisError::Parse("upload contains no header row".to_string())),
        };

        let width = headers.len();
        let mut rows = Vec::new();
        for (row_idx, record) in records.enumerate() {
            let record = record?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            if row.len() != width {
                warn!(
                    "Row {} has {} cells but the header has {}; normalizing to header width",
                    row_idx + 1,
                    row.len(),
                    width
                );
                row.resize(width, String::new());
            }
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    /// Create TableData from a JSON Array of Objects
    pub fn from_json(value: &Value) -> Result<Self> {
        let array = value
            .as_array()
            .ok_or_else(|| AnalysisError::Parse("Input data must be a JSON array of objects".to_string()))?;

        let first = array
            .first()
            .ok_or_else(|| AnalysisError::Parse("Input data array is empty".to_string()))?;

        // Headers in the first object's key order
        let first_obj = first
            .as_object()
            .ok_or_else(|| AnalysisError::Parse("Items in array must be objects".to_string()))?;
        let headers: Vec<String> = first_obj.keys().cloned().collect();

        let mut rows = Vec::with_capacity(array.len());
        for item in array {
            let obj = item
                .as_object()
                .ok_or_else(|| AnalysisError::Parse("Items in array must be objects".to_string()))?;

            let mut row = Vec::with_capacity(headers.len());
            for header in &headers {
                let cell = match obj.get(header) {
                    Some(Value::String(s)) => s.trim().to_string(),
                    Some(Value::Number(n)) => n.to_string(),
                    Some(Value::Bool(b)) => b.to_string(),
                    Some(Value::Null) | None => String::new(),
                    _ => {
                        return Err(AnalysisError::Parse(format!(
                            "Unsupported value type for field '{}'",
                            header
                        )))
                    }
                };
                row.push(cell);
            }
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    /// Position of `name` in the header. Exact, case-sensitive; the first match
    /// wins when headers repeat.
    pub fn resolve_index(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| AnalysisError::UnknownColumn(name.to_string()))
    }

    /// Raw cells of one column, one per data row.
    pub fn extract_column(&self, index: usize) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| row.get(index).cloned().unwrap_or_default())
            .collect()
    }

    /// Numeric view of one column; cells that do not coerce become 0.
    pub fn extract_numeric_column(&self, index: usize) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| row.get(index).map_or(0.0, |cell| coerce_number(cell)))
            .collect()
    }
}

/// Lenient numeric coercion. Dirty cells are zeroed rather than reported.
pub fn coerce_number(cell: &str) -> f64 {
    match cell.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// A stored upload, owned by the user who ingested it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub id: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub data: TableData,
}

impl Table {
    pub fn new(owner: impl Into<String>, data: TableData) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner: owner.into(),
            created_at: Utc::now(),
            data,
        }
    }

    pub fn summary(&self) -> TableSummary {
        TableSummary {
            table_id: self.id.clone(),
            columns: self.data.headers.clone(),
            rows: self.data.rows.len(),
        }
    }
}

/// What an ingest hands back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSummary {
    pub table_id: String,
    pub columns: Vec<String>,
    pub rows: usize,
}
