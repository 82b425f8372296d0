//! Command-line surface: `run`, `render`, `verify`. spec.md §6.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sentinel", version, about = "Web-analytics anomaly detection and digest engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Loads every enabled property, runs the four detectors, consolidates
    /// and persists the digest, and delivers it when recipients are given.
    Run {
        /// Overrides the clock's notion of "today" (YYYY-MM-DD). Analysis
        /// date is this minus the settling window.
        #[arg(long, value_name = "YYYY-MM-DD")]
        reference_date: Option<String>,

        /// Restrict the run to these property ids (comma-separated).
        #[arg(long, value_delimiter = ',')]
        properties: Option<Vec<String>>,

        /// Restrict the run to these detectors (comma-separated: disaster,spam,record,trend).
        #[arg(long, value_delimiter = ',')]
        detectors: Option<Vec<String>>,

        /// Email recipients for the rendered digest (comma-separated).
        #[arg(long, value_delimiter = ',')]
        recipients: Vec<String>,

        /// Skip artifact writes and delivery; log what would have happened.
        #[arg(long)]
        dry_run: bool,
    },
    /// Renders a previously persisted digest JSON file to HTML and text,
    /// without running a new analysis.
    Render {
        /// Path to a `digest.json` file on local disk.
        #[arg(long)]
        from: std::path::PathBuf,

        /// Path to write the rendered HTML to.
        #[arg(long)]
        out: std::path::PathBuf,
    },
    /// Validates a local `clean_dataset` blob the way the loader would,
    /// without touching a blob store or running detectors.
    Verify {
        /// Path to a `clean_dataset/{property_id}/{date}.json` file on local disk.
        #[arg(long)]
        dataset: std::path::PathBuf,

        /// Property id the dataset belongs to (used only in error messages).
        #[arg(long, default_value = "unknown")]
        property_id: String,
    },
}

/// Parses `--detectors=disaster,spam` into `DetectorKind`s. Unknown names are
/// a configuration error, not silently ignored (spec.md §7 `ConfigError`).
pub fn parse_detector_filter(names: &[String]) -> Result<Vec<crate::alert::DetectorKind>, String> {
    use crate::alert::DetectorKind;
    names
        .iter()
        .map(|name| match name.trim() {
            "disaster" => Ok(DetectorKind::Disaster),
            "spam" => Ok(DetectorKind::Spam),
            "record" => Ok(DetectorKind::Record),
            "trend" => Ok(DetectorKind::Trend),
            other => Err(format!("unknown detector '{other}'")),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_detector_names() {
        let kinds = parse_detector_filter(&["disaster".to_string(), "trend".to_string()]).unwrap();
        assert_eq!(kinds, vec![crate::alert::DetectorKind::Disaster, crate::alert::DetectorKind::Trend]);
    }

    #[test]
    fn rejects_unknown_detector_name() {
        assert!(parse_detector_filter(&["nonsense".to_string()]).is_err());
    }
}
