use std::{path::Path, time::Duration};

use nuclei::{analysis::PARAMS_FILE, DetectionConfig, NucleiError, ProgressSink, RatioAnalysis, SlideOutcome};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Nuclei(#[from] NucleiError),
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error("Summary {0} holds no detection record")]
    EmptySummary(String),
}

/// Overrides given on the command line, applied on top of the configuration file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub level: Option<u32>,
    pub stain_threshold: Option<f32>,
    pub timeout_s: Option<f64>,
}

/// Load the configuration file if any, apply overrides and validate
pub fn load_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<DetectionConfig, CliError> {
    let mut config = match path {
        Some(path) => DetectionConfig::from_file(path)?,
        None => DetectionConfig::default(),
    };
    if let Some(level) = overrides.level {
        config = config.with_level(level);
    }
    if let Some(threshold) = overrides.stain_threshold {
        config = config.with_stain_threshold(threshold);
    }
    if let Some(timeout_s) = overrides.timeout_s {
        config = config.with_timeout_s(timeout_s);
    }
    config.validate()?;
    Ok(config)
}

/// Ratio analysis flags given on the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisOverrides {
    pub loss_marker: Option<String>,
    pub reference_marker: Option<String>,
    pub threshold_percent: Option<f64>,
    pub tolerance_percent: Option<f64>,
}

/// Analysis parameters from `params` if given, else from a `params.json`
/// next to the summary when present, then command-line overrides
pub fn load_analysis(
    params: Option<&Path>,
    summary: &Path,
    overrides: &AnalysisOverrides,
) -> Result<RatioAnalysis, CliError> {
    let beside_summary = summary
        .parent()
        .map(|dir| dir.join(PARAMS_FILE))
        .filter(|path| path.is_file());
    let mut analysis = match params.map(Path::to_path_buf).or(beside_summary) {
        Some(path) => {
            info!(params = %path.display(), "Loading analysis parameters");
            RatioAnalysis::from_file(path)?
        }
        None => RatioAnalysis::default(),
    };
    if let Some(loss) = &overrides.loss_marker {
        analysis.loss_marker = loss.clone();
    }
    if let Some(reference) = &overrides.reference_marker {
        analysis.reference_marker = reference.clone();
    }
    if let Some(threshold) = overrides.threshold_percent {
        analysis.threshold_percent = threshold;
    }
    if let Some(tolerance) = overrides.tolerance_percent {
        analysis.tolerance_percent = tolerance;
    }
    Ok(analysis)
}

/// Progress sink that reports through `tracing`
#[derive(Debug, Default)]
pub struct TracingProgress {
    current: String,
}

impl ProgressSink for TracingProgress {
    fn on_image_start(&mut self, index: usize, total: usize, name: &str) {
        self.current = name.to_string();
        info!("→ {}/{} : {}", index + 1, total, name);
    }

    fn on_image_progress(&mut self, elapsed: Duration, note: Option<&str>) {
        match note {
            Some(note) => warn!(slide = %self.current, "{} ({:.1}s)", note, elapsed.as_secs_f64()),
            None => info!(slide = %self.current, "Decoded in {:.1}s", elapsed.as_secs_f64()),
        }
    }

    fn on_image_done(&mut self, index: usize, total: usize, outcome: &SlideOutcome) {
        match outcome {
            Ok(record) => info!(
                "✓ {}/{} {}: {} nuclei{}",
                index + 1,
                total,
                record.file,
                record.object_count,
                if record.partial { " (partial)" } else { "" }
            ),
            Err(reason) => warn!("⚠ {}/{} {}: {}", index + 1, total, self.current, reason.description()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_file_values() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "level = 0\nstain_threshold = 0.05\n").expect("Should write config");

        let overrides = ConfigOverrides {
            level: Some(2),
            timeout_s: Some(30.0),
            ..Default::default()
        };
        let config = load_config(Some(&path), &overrides).expect("Should load config");
        assert_eq!(config.level, 2);
        assert_eq!(config.stain_threshold, 0.05);
        assert_eq!(config.timeout_s, 30.0);
    }

    #[test]
    fn analysis_params_are_found_next_to_summary() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let summary = dir.path().join("resume_detection.json");
        std::fs::write(
            dir.path().join("params.json"),
            r#"{"loss_marker": "CD5", "reference_marker": "CD2", "seuil_percent": 20}"#,
        )
        .expect("Should write params");

        let overrides = AnalysisOverrides {
            tolerance_percent: Some(0.5),
            ..Default::default()
        };
        let analysis = load_analysis(None, &summary, &overrides).expect("Should load params");
        assert_eq!(analysis.loss_marker, "CD5");
        assert_eq!(analysis.reference_marker, "CD2");
        assert_eq!(analysis.threshold_percent, 20.0);
        assert_eq!(analysis.tolerance_percent, 0.5);
    }

    #[test]
    fn analysis_defaults_without_params() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let summary = dir.path().join("resume_detection.json");
        let overrides = AnalysisOverrides {
            loss_marker: Some("CD4".to_string()),
            ..Default::default()
        };
        let analysis = load_analysis(None, &summary, &overrides).expect("Should build analysis");
        assert_eq!(analysis.loss_marker, "CD4");
        assert_eq!(analysis.reference_marker, "CD3");
        assert_eq!(analysis.threshold_percent, 10.0);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let overrides = ConfigOverrides {
            timeout_s: Some(-1.0),
            ..Default::default()
        };
        assert!(load_config(None, &overrides).is_err());
    }
}
