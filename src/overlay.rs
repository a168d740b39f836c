//! User-uploaded CSV points drawn over the boundaries.

use crate::types::OverlayPoint;
use csv::ReaderBuilder;
use std::io::Read;
use thiserror::Error;

pub const LAT_COLUMN: &str = "LAT";
pub const LON_COLUMN: &str = "LON";

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("column '{0}' not found in the uploaded file")]
    MissingColumn(&'static str),
    #[error("row {row}: '{value}' is not a number in column {column}")]
    InvalidNumber {
        row: usize,
        column: &'static str,
        value: String,
    },
    #[error("row {row}: coordinates ({lat}, {lon}) are out of range")]
    OutOfRange { row: usize, lat: f64, lon: f64 },
    #[error("could not read CSV: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub points: Vec<OverlayPoint>,
    /// Rows skipped because LAT or LON was empty.
    pub dropped: usize,
}

/// Parses a CSV with `LAT` / `LON` columns. Rows missing either value are
/// dropped; anything else malformed fails the whole upload.
pub fn parse_points<R: Read>(input: R) -> Result<Overlay, OverlayError> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);
    let headers = rdr.headers()?.clone();

    let lat_idx = headers.iter().position(|h| h == LAT_COLUMN)
        .ok_or(OverlayError::MissingColumn(LAT_COLUMN))?;
    let lon_idx = headers.iter().position(|h| h == LON_COLUMN)
        .ok_or(OverlayError::MissingColumn(LON_COLUMN))?;

    let mut points = Vec::new();
    let mut dropped = 0;

    for (i, result) in rdr.records().enumerate() {
        let record = result?;
        // Header is line 1.
        let row = i + 2;

        let lat = record.get(lat_idx).filter(|v| !v.is_empty());
        let lon = record.get(lon_idx).filter(|v| !v.is_empty());
        let (lat, lon) = match (lat, lon) {
            (Some(lat), Some(lon)) => (
                parse_coordinate(lat, LAT_COLUMN, row)?,
                parse_coordinate(lon, LON_COLUMN, row)?,
            ),
            _ => {
                dropped += 1;
                continue;
            }
        };

        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(OverlayError::OutOfRange { row, lat, lon });
        }

        points.push(OverlayPoint { latitude: lat, longitude: lon });
    }

    Ok(Overlay { points, dropped })
}

fn parse_coordinate(value: &str, column: &'static str, row: usize) -> Result<f64, OverlayError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| OverlayError::InvalidNumber {
            row,
            column,
            value: value.to_string(),
        })
}
