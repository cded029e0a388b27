//! Batch predictions over a spreadsheet of coordinates (CSV or Excel)

use crate::error::VisionError;
use crate::pipeline::{display_path, OutputPaths, SolarPipeline};
use calamine::{open_workbook_auto, Data, Reader};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use solarscan_core::geo::validate_coordinates;
use solarscan_core::{PredictionRecord, SampleId};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const SAMPLE_ID_COLUMNS: &[&str] = &["sample_id", "sampleid", "sampleId", "SampleID", "id"];
const LAT_COLUMNS: &[&str] = &["lat", "latitude", "Latitude", "LAT", "Lat"];
const LON_COLUMNS: &[&str] = &["lon", "longitude", "Longitude", "LON", "Lon"];
const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// One usable spreadsheet row
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSample {
    /// 1-based data row number
    pub row: usize,
    pub sample_id: SampleId,
    pub lat: f64,
    pub lon: f64,
}

/// Parsed spreadsheet plus the number of rows that were rejected
#[derive(Debug, Clone, Default)]
pub struct BatchInput {
    pub samples: Vec<BatchSample>,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub verifiable: usize,
    pub with_solar: usize,
    pub output_file: String,
}

/// Index of the first alias present in the header row
fn find_column<S: AsRef<str>>(headers: &[S], aliases: &[&str]) -> Option<usize> {
    aliases
        .iter()
        .find_map(|alias| headers.iter().position(|h| h.as_ref().trim() == *alias))
}

fn parse_coordinate(cell: Option<&str>) -> Option<f64> {
    cell.and_then(|c| c.trim().parse::<f64>().ok())
}

/// Resolved positions of the id and coordinate columns
struct Columns {
    sample_id: Option<usize>,
    lat: usize,
    lon: usize,
}

impl Columns {
    fn resolve<S: AsRef<str>>(headers: &[S]) -> Result<Self, VisionError> {
        let lat = find_column(headers, LAT_COLUMNS)
            .ok_or_else(|| VisionError::Batch(format!("no latitude column (expected one of {:?})", LAT_COLUMNS)))?;
        let lon = find_column(headers, LON_COLUMNS)
            .ok_or_else(|| VisionError::Batch(format!("no longitude column (expected one of {:?})", LON_COLUMNS)))?;
        let sample_id = find_column(headers, SAMPLE_ID_COLUMNS);
        if sample_id.is_none() {
            warn!("No sample id column; using row numbers");
        }
        Ok(Self { sample_id, lat, lon })
    }
}

impl BatchInput {
    /// Add data row `row` (1-based), or count it as skipped
    fn push_row<S: AsRef<str>>(&mut self, columns: &Columns, row: usize, cells: &[S]) {
        let cell = |col: usize| cells.get(col).map(|c| c.as_ref());

        let (lat, lon) = match (parse_coordinate(cell(columns.lat)), parse_coordinate(cell(columns.lon))) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => {
                warn!("Skipping row {}: missing or unparsable coordinates", row);
                self.skipped += 1;
                return;
            }
        };
        if let Err(e) = validate_coordinates(lat, lon) {
            warn!("Skipping row {}: {}", row, e);
            self.skipped += 1;
            return;
        }

        let sample_id = columns
            .sample_id
            .and_then(cell)
            .and_then(SampleId::parse)
            .unwrap_or(SampleId::Number(row as i64));

        self.samples.push(BatchSample { row, sample_id, lat, lon });
    }
}

/// Read samples from CSV text. Rows with unusable coordinates are skipped.
pub fn parse_samples<R: Read>(reader: R) -> Result<BatchInput, VisionError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
    let columns = Columns::resolve(&headers)?;

    let mut input = BatchInput::default();
    for (index, result) in csv_reader.records().enumerate() {
        let row = index + 1;
        match result {
            Ok(record) => {
                let cells: Vec<&str> = record.iter().collect();
                input.push_row(&columns, row, &cells);
            }
            Err(e) => {
                warn!("Skipping row {}: {}", row, e);
                input.skipped += 1;
            }
        }
    }

    Ok(input)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        other => other.to_string(),
    }
}

/// Read samples from the first worksheet of an Excel or OpenDocument workbook
pub fn read_workbook(path: &Path) -> Result<BatchInput, VisionError> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| VisionError::Batch(format!("{} has no worksheets", path.display())))??;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| VisionError::Batch(format!("{} has an empty first sheet", path.display())))?
        .iter()
        .map(cell_text)
        .collect();
    let columns = Columns::resolve(&headers)?;

    let mut input = BatchInput::default();
    for (index, cells) in rows.enumerate() {
        let cells: Vec<String> = cells.iter().map(cell_text).collect();
        input.push_row(&columns, index + 1, &cells);
    }

    Ok(input)
}

fn is_workbook(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| WORKBOOK_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Read a batch spreadsheet, `.xlsx`/`.xls`/`.ods` as a workbook and anything else as CSV
pub fn read_samples(path: &Path) -> Result<BatchInput, VisionError> {
    if is_workbook(path) {
        return read_workbook(path);
    }
    let file = fs::File::open(path)
        .map_err(|e| VisionError::Batch(format!("cannot open {}: {}", path.display(), e)))?;
    parse_samples(file)
}

/// Runs the pipeline over every row of a spreadsheet
pub struct BatchRunner<'a> {
    pipeline: &'a SolarPipeline,
    output_dir: PathBuf,
    concurrency: usize,
}

impl<'a> BatchRunner<'a> {
    pub fn new(pipeline: &'a SolarPipeline) -> Self {
        let batch = &pipeline.config().batch;
        Self {
            pipeline,
            output_dir: batch.output_dir.clone(),
            concurrency: batch.concurrency,
        }
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub async fn run_file(&self, input: &Path) -> Result<BatchSummary, VisionError> {
        info!("Reading batch input {:?}", input);
        let parsed = read_samples(input)?;
        self.run(parsed).await
    }

    /// Process samples in input order and write the predictions file
    pub async fn run(&self, input: BatchInput) -> Result<BatchSummary, VisionError> {
        fs::create_dir_all(self.output_dir.join("tiles"))?;
        fs::create_dir_all(self.output_dir.join("overlays"))?;

        let total = input.samples.len();
        let tile_size = self.pipeline.config().tiles.batch_tile_size;
        let output_dir = self.output_dir.as_path();

        let results: Vec<Result<PredictionRecord, VisionError>> = stream::iter(input.samples.into_iter().enumerate())
            .map(|(i, sample)| async move {
                info!("[{}/{}] Processing {}", i + 1, total, sample.sample_id);
                let paths = OutputPaths::for_sample(output_dir, &sample.sample_id);
                self.pipeline
                    .run_single(sample.sample_id, sample.lat, sample.lon, &paths, tile_size)
                    .await
            })
            .buffered(self.concurrency.max(1))
            .collect()
            .await;

        let mut skipped = input.skipped;
        let mut records = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!("Skipping sample: {}", e);
                    skipped += 1;
                }
            }
        }

        let output_file = self.output_dir.join(&self.pipeline.config().batch.predictions_file);
        let json = serde_json::to_string_pretty(&records)
            .map_err(|e| VisionError::Batch(format!("cannot serialize predictions: {}", e)))?;
        fs::write(&output_file, json)?;

        let summary = BatchSummary {
            processed: records.len(),
            skipped,
            verifiable: records.iter().filter(|r| r.is_verifiable()).count(),
            with_solar: records.iter().filter(|r| r.has_solar).count(),
            output_file: display_path(&output_file),
        };
        info!(
            "Batch complete: {} processed, {} skipped, {} verifiable, saved to {}",
            summary.processed, summary.skipped, summary.verifiable, summary.output_file
        );
        Ok(summary)
    }
}
