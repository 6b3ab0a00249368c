//! Batch summary files.
//!
//! The CSV layout (`;` separator, French column names) is the one the ratio
//! analysis and the spreadsheets downstream read. A JSON dump of the same
//! records is written next to it.

use std::{
    borrow::Cow,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use chrono::Local;
use tracing::warn;

use crate::{
    error::{NucleiError, Result},
    record::DetectionRecord,
};

pub const COL_FILE: &str = "Fichier";
pub const COL_MARKER: &str = "Marqueur";
pub const COL_LEVEL: &str = "Niveau";
pub const COL_STAIN_THRESHOLD: &str = "Seuil_DAB";
pub const COL_MIN_AREA: &str = "Min_Area";
pub const COL_MAX_AREA: &str = "Max_Area";
pub const COL_COUNT: &str = "Noyaux_detectés";
pub const COL_MASKED_AREA: &str = "Surface_masquée (px)";
pub const COL_DENSITY: &str = "Densité_noyaux (%)";

pub const SUMMARY_COLUMNS: [&str; 9] = [
    COL_FILE,
    COL_MARKER,
    COL_LEVEL,
    COL_STAIN_THRESHOLD,
    COL_MIN_AREA,
    COL_MAX_AREA,
    COL_COUNT,
    COL_MASKED_AREA,
    COL_DENSITY,
];

pub const SEPARATOR: char = ';';

/// Quote `field` when it holds the separator, a quote or a line break
pub fn quote_field(field: &str) -> Cow<'_, str> {
    if field.contains([SEPARATOR, '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Split CSV text into rows of unquoted fields
pub fn split_rows(content: &str) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if quoted {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => quoted = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => quoted = true,
            SEPARATOR => row.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }
    if quoted {
        return Err(NucleiError::InvalidSummary("unterminated quoted field".to_string()));
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows.retain(|row| !(row.len() == 1 && row[0].trim().is_empty()));
    Ok(rows)
}

pub fn records_to_csv(records: &[DetectionRecord]) -> String {
    let mut out = SUMMARY_COLUMNS.join(";");
    out.push('\n');
    for r in records {
        let row = [
            quote_field(&r.file).into_owned(),
            quote_field(&r.marker).into_owned(),
            r.level.to_string(),
            r.stain_threshold.to_string(),
            r.min_area.to_string(),
            r.max_area.to_string(),
            r.object_count.to_string(),
            r.masked_area.to_string(),
            r.density_percent.to_string(),
        ];
        out.push_str(&row.join(";"));
        out.push('\n');
    }
    out
}

/// Parse a summary CSV; only file, marker and count columns are required
pub fn records_from_csv(content: &str) -> Result<Vec<DetectionRecord>> {
    let mut rows = split_rows(content.trim_start_matches('\u{feff}'))?.into_iter();
    let header: Vec<String> = rows
        .next()
        .ok_or_else(|| NucleiError::InvalidSummary("empty summary".to_string()))?
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();

    let column = |name: &str| header.iter().position(|h| h == name);
    let required = |name: &str| {
        column(name).ok_or_else(|| NucleiError::InvalidSummary(format!("missing column {name}")))
    };
    let file = required(COL_FILE)?;
    let marker = required(COL_MARKER)?;
    let count = required(COL_COUNT)?;

    let mut records = Vec::new();
    for (number, fields) in rows.enumerate() {
        let field = |index: Option<usize>| index.and_then(|i| fields.get(i)).map(String::as_str);
        let parse = |index: Option<usize>, name: &str| -> Result<Option<f64>> {
            field(index)
                .map(|value| {
                    value.trim().parse::<f64>().map_err(|_| {
                        NucleiError::InvalidSummary(format!("row {}: bad {name} {value:?}", number + 2))
                    })
                })
                .transpose()
        };

        let object_count = parse(Some(count), COL_COUNT)?
            .ok_or_else(|| NucleiError::InvalidSummary(format!("row {}: missing count", number + 2)))?;
        records.push(DetectionRecord {
            file: field(Some(file)).unwrap_or_default().to_string(),
            marker: field(Some(marker)).unwrap_or_default().trim().to_string(),
            level: parse(column(COL_LEVEL), COL_LEVEL)?.unwrap_or(0.0) as u32,
            stain_threshold: parse(column(COL_STAIN_THRESHOLD), COL_STAIN_THRESHOLD)?.unwrap_or(0.0) as f32,
            min_area: parse(column(COL_MIN_AREA), COL_MIN_AREA)?.unwrap_or(0.0),
            max_area: parse(column(COL_MAX_AREA), COL_MAX_AREA)?.unwrap_or(0.0),
            object_count: object_count as usize,
            masked_area: parse(column(COL_MASKED_AREA), COL_MASKED_AREA)?.unwrap_or(0.0) as u64,
            density_percent: parse(column(COL_DENSITY), COL_DENSITY)?.unwrap_or(0.0),
            partial: false,
        });
    }
    Ok(records)
}

/// `<stem>_<YYYYmmdd-HHMMSS>.<ext>` next to `path`
pub fn timestamped_path(path: &Path, stamp: &str) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_{stamp}.{ext}"),
        None => format!("{stem}_{stamp}"),
    };
    path.with_file_name(name)
}

/// Write through `write`, retrying under a timestamped name when the target
/// is locked by another program. Returns the path actually written.
pub fn write_with_fallback<F>(path: &Path, mut write: F) -> Result<PathBuf>
where
    F: FnMut(&Path) -> std::io::Result<()>,
{
    match write(path) {
        Ok(()) => Ok(path.to_path_buf()),
        Err(err) if err.kind() == ErrorKind::PermissionDenied => {
            let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
            let alternative = timestamped_path(path, &stamp);
            warn!(
                locked = %path.display(),
                written = %alternative.display(),
                "Output file is locked, writing under another name"
            );
            write(&alternative)?;
            Ok(alternative)
        }
        Err(err) => Err(err.into()),
    }
}

pub fn write_summary_csv(path: &Path, records: &[DetectionRecord]) -> Result<PathBuf> {
    let content = records_to_csv(records);
    write_with_fallback(path, |target| fs::write(target, &content))
}

pub fn write_summary_json(path: &Path, records: &[DetectionRecord]) -> Result<PathBuf> {
    let content = serde_json::to_string_pretty(records)?;
    write_with_fallback(path, |target| fs::write(target, &content))
}

/// Load records from a `.json` or `.csv` summary
pub fn read_summary(path: &Path) -> Result<Vec<DetectionRecord>> {
    let content = fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(serde_json::from_str(&content)?),
        Some("csv") => records_from_csv(&content),
        other => Err(NucleiError::UnsupportedFormat(other.unwrap_or("<none>").to_string())),
    }
}
