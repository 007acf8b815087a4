use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;

use crate::client::{ClientError, Prediction};

/// Column names of an exported results file
pub const CSV_HEADER: [&str; 4] = ["Product", "Category", "Category path", "Confidence (%)"];

/// Writes classification results as CSV, one row per prediction.
pub fn write_results_csv<W: Write>(writer: W, results: &[Prediction]) -> Result<(), ClientError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(CSV_HEADER)?;
    for prediction in results {
        let confidence = format!("{:.2}", prediction.confidence_percent());
        csv_writer.write_record([
            prediction.product_name.as_str(),
            prediction.category.as_str(),
            prediction.category_path.as_deref().unwrap_or(""),
            confidence.as_str(),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Writes `results` to `path`. Nothing is written for an empty result set.
pub fn export_results(path: &Path, results: &[Prediction]) -> Result<usize, ClientError> {
    if results.is_empty() {
        return Err(ClientError::Validation("No results to export".into()));
    }
    let file = File::create(path)?;
    write_results_csv(BufWriter::new(file), results)?;
    info!("Exported {} results to {:?}", results.len(), path);
    Ok(results.len())
}

/// `classifications_<unix millis>.csv`
pub fn default_export_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("classifications_{}.csv", millis)
}
