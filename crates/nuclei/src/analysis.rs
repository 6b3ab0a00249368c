//! Loss-marker to reference-marker ratio per patient.
//!
//! Counts from the detection summary are summed per patient and marker; a
//! patient is flagged when the loss marker falls to within a tolerance of the
//! configured percentage of the reference marker.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use tracing::info;

use crate::{
    error::Result,
    io::summary::{quote_field, write_with_fallback},
    record::DetectionRecord,
};

/// Analysis parameters file looked up next to a detection summary
pub const PARAMS_FILE: &str = "params.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RatioAnalysis {
    /// Numerator marker, expected to drop in suspect patients
    pub loss_marker: String,
    /// Denominator marker
    pub reference_marker: String,
    #[serde(alias = "seuil_percent", alias = "seuil_cd7_percent")]
    pub threshold_percent: f64,
    /// Points added to the threshold before flagging
    pub tolerance_percent: f64,
}

impl Default for RatioAnalysis {
    fn default() -> Self {
        Self {
            loss_marker: "CD7".to_string(),
            reference_marker: "CD3".to_string(),
            threshold_percent: 10.0,
            tolerance_percent: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRatio {
    pub patient: String,
    pub loss_count: usize,
    pub reference_count: usize,
    /// `100 * loss / reference` rounded to 3 decimals, absent without reference objects
    pub ratio_percent: Option<f64>,
    pub suspect: bool,
}

/// `10` becomes `10p`, `12.5` becomes `12.5p`
pub fn format_percent(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}p", value as i64)
    } else {
        let text = format!("{value:.2}");
        format!("{}p", text.trim_end_matches('0').trim_end_matches('.'))
    }
}

/// File name without extension and without any `_<marker>` part
pub fn patient_id(file: &str, markers: &BTreeSet<String>) -> String {
    let mut base = match file.rfind('.') {
        Some(dot) => file[..dot].to_string(),
        None => file.to_string(),
    };
    for marker in markers {
        base = base.replace(&format!("_{marker}"), "");
    }
    base
}

impl RatioAnalysis {
    pub fn new(loss_marker: impl Into<String>, reference_marker: impl Into<String>) -> Self {
        Self {
            loss_marker: loss_marker.into(),
            reference_marker: reference_marker.into(),
            ..Self::default()
        }
    }

    /// Load parameters from a JSON file; missing keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn with_threshold(mut self, threshold_percent: f64, tolerance_percent: f64) -> Self {
        self.threshold_percent = threshold_percent;
        self.tolerance_percent = tolerance_percent;
        self
    }

    pub fn is_suspect(&self, reference_count: usize, ratio_percent: Option<f64>) -> bool {
        if reference_count == 0 {
            return true;
        }
        match ratio_percent {
            None => false,
            Some(ratio) if ratio > 100.0 => false,
            Some(ratio) => ratio <= self.threshold_percent + self.tolerance_percent,
        }
    }

    /// One row per patient, sorted by patient id
    pub fn analyze(&self, records: &[DetectionRecord]) -> Vec<PatientRatio> {
        let markers: BTreeSet<String> = records.iter().map(|r| r.marker.clone()).collect();
        let mut counts: BTreeMap<String, (usize, usize)> = BTreeMap::new();

        for record in records {
            let entry = counts.entry(patient_id(&record.file, &markers)).or_default();
            if record.marker == self.loss_marker {
                entry.0 += record.object_count;
            }
            if record.marker == self.reference_marker {
                entry.1 += record.object_count;
            }
        }

        counts
            .into_iter()
            .map(|(patient, (loss_count, reference_count))| {
                let ratio_percent = (reference_count > 0).then(|| {
                    let ratio = 100.0 * loss_count as f64 / reference_count as f64;
                    (ratio * 1000.0).round() / 1000.0
                });
                PatientRatio {
                    suspect: self.is_suspect(reference_count, ratio_percent),
                    patient,
                    loss_count,
                    reference_count,
                    ratio_percent,
                }
            })
            .collect()
    }

    /// `analyse_<loss>_vs_<reference>_seuil_<pct>p.csv`
    pub fn output_file_name(&self) -> String {
        format!(
            "analyse_{}_vs_{}_seuil_{}.csv",
            self.loss_marker,
            self.reference_marker,
            format_percent(self.threshold_percent)
        )
    }

    pub fn to_csv(&self, rows: &[PatientRatio]) -> String {
        let mut out = format!(
            "Patient;{loss};{reference};Ratio_{loss}/{reference}_%;Seuil_%;Tolerance_%;Suspect\n",
            loss = self.loss_marker,
            reference = self.reference_marker
        );
        for row in rows {
            let ratio = row.ratio_percent.map(|r| r.to_string()).unwrap_or_default();
            out.push_str(&format!(
                "{};{};{};{};{};{};{}\n",
                quote_field(&row.patient),
                row.loss_count,
                row.reference_count,
                ratio,
                self.threshold_percent,
                self.tolerance_percent,
                if row.suspect { "True" } else { "False" }
            ));
        }
        out
    }

    /// Analyze `records` and write the CSV into `output_dir`
    pub fn write(&self, records: &[DetectionRecord], output_dir: &Path) -> Result<(PathBuf, Vec<PatientRatio>)> {
        fs::create_dir_all(output_dir)?;
        let rows = self.analyze(records);
        let content = self.to_csv(&rows);
        let path = write_with_fallback(&output_dir.join(self.output_file_name()), |target| {
            fs::write(target, &content)
        })?;
        info!(
            patients = rows.len(),
            suspects = rows.iter().filter(|r| r.suspect).count(),
            output = %path.display(),
            "Ratio analysis written"
        );
        Ok((path, rows))
    }
}
