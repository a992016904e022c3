/// Run log for overlay plots
///
/// Every rendered spectrum is recorded with the values that decided how it
/// looks: resolved contour start, level sequence, color and row filter.
/// Re-running the same configuration on the same data reproduces the plot;
/// the log says what that plot was.
///
/// The log can be exported as human-readable text or JSON.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

use crate::pipeline::overlay::RenderedEntry;

/// One rendered spectrum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogEntry {
    /// Draw order (1-based)
    pub sequence: usize,
    pub timestamp: DateTime<Local>,
    /// Display name, else data path
    pub spectrum: String,
    pub path: String,
    pub query: Option<String>,
    /// Rows left after filtering
    pub rows: usize,
    pub threshold_method: String,
    pub threshold: f64,
    pub levels: Vec<f64>,
    pub color: String,
    pub negative_threshold: Option<f64>,
}

impl RunLogEntry {
    pub fn to_text(&self) -> String {
        let mut text = format!(
            "[{:03}] {} | {} | {} rows\n      File:      {}\n      Threshold: {} = {:.4e}",
            self.sequence,
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.spectrum,
            self.rows,
            self.path,
            self.threshold_method,
            self.threshold,
        );
        if let Some(q) = &self.query {
            text.push_str(&format!("\n      Query:     {}", q));
        }
        if let (Some(first), Some(last)) = (self.levels.first(), self.levels.last()) {
            text.push_str(&format!(
                "\n      Levels:    {} from {:.4e} to {:.4e}",
                self.levels.len(),
                first,
                last
            ));
        }
        text.push_str(&format!("\n      Color:     {}", self.color));
        if let Some(neg) = self.negative_threshold {
            text.push_str(&format!("\n      Negative:  start {:.4e}", neg));
        }
        text
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLog {
    pub run_id: String,
    pub started: DateTime<Local>,
    pub config: String,
    pub software_version: String,
    pub entries: Vec<RunLogEntry>,
    /// Files written by the run
    pub outputs: Vec<String>,
}

impl RunLog {
    pub fn new(config: &Path) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started: Local::now(),
            config: config.display().to_string(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            entries: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn record(&mut self, rendered: &RenderedEntry) {
        let sequence = self.entries.len() + 1;
        self.entries.push(RunLogEntry {
            sequence,
            timestamp: Local::now(),
            spectrum: rendered.identity.clone(),
            path: rendered.path.display().to_string(),
            query: rendered.query.clone(),
            rows: rendered.rows,
            threshold_method: rendered.threshold_method.clone(),
            threshold: rendered.threshold,
            levels: rendered.levels.clone(),
            color: rendered.color.to_hex(),
            negative_threshold: rendered.negative_threshold,
        });
        log::info!(
            "[LOG {:03}] {} | cs={:.3e}",
            sequence,
            rendered.identity,
            rendered.threshold
        );
    }

    pub fn record_output(&mut self, path: &Path) {
        self.outputs.push(path.display().to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str("═══════════════════════════════════════════════════════════════\n");
        out.push_str("  NMR Contour Overlay Run Log\n");
        out.push_str("═══════════════════════════════════════════════════════════════\n");
        out.push_str(&format!("  Run ID:    {}\n", self.run_id));
        out.push_str(&format!(
            "  Started:   {}\n",
            self.started.format("%Y-%m-%d %H:%M:%S")
        ));
        out.push_str(&format!("  Config:    {}\n", self.config));
        out.push_str(&format!("  Software:  nmr-contour v{}\n", self.software_version));
        out.push_str(&format!("  Spectra:   {}\n", self.entries.len()));
        out.push_str("───────────────────────────────────────────────────────────────\n\n");
        for entry in &self.entries {
            out.push_str(&entry.to_text());
            out.push_str("\n\n");
        }
        if !self.outputs.is_empty() {
            out.push_str("  Outputs:\n");
            for o in &self.outputs {
                out.push_str(&format!("    {}\n", o));
            }
        }
        out.push_str("═══════════════════════════════════════════════════════════════\n");
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn save_text(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.to_text())
    }

    /// Save as JSON, or as text when the extension is `.txt` / `.log`.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("txt") | Some("log") => self.save_text(path),
            _ => std::fs::write(path, self.to_json().map_err(io::Error::from)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::colors::Rgb;
    use std::path::PathBuf;

    fn rendered(name: &str, threshold: f64) -> RenderedEntry {
        RenderedEntry {
            identity: name.to_string(),
            path: PathBuf::from("hsqc.ft2"),
            query: Some("Z==0".to_string()),
            rows: 196,
            threshold_method: "auto-split".to_string(),
            threshold,
            levels: vec![threshold, threshold * 1.2],
            color: Rgb(0xe4, 0x1a, 0x1c),
            negative_threshold: None,
            legend_label: Some(name.to_string()),
        }
    }

    #[test]
    fn test_record_sequences_entries() {
        let mut log = RunLog::new(Path::new("spectra.toml"));
        assert!(log.is_empty());
        log.record(&rendered("HSQC", 1e6));
        log.record(&rendered("HSQC 2", 2e6));
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries[1].sequence, 2);
        assert_eq!(log.entries[0].color, "#e41a1c");
    }

    #[test]
    fn test_text_export() {
        let mut log = RunLog::new(Path::new("spectra.toml"));
        log.record(&rendered("HSQC", 1e6));
        log.record_output(Path::new("test.png"));
        let text = log.to_text();
        assert!(text.contains("HSQC"));
        assert!(text.contains("Query:     Z==0"));
        assert!(text.contains("test.png"));
        assert!(text.contains("spectra.toml"));
    }

    #[test]
    fn test_json_roundtrip() {
        let mut log = RunLog::new(Path::new("spectra.toml"));
        log.record(&rendered("HSQC", 1e6));
        let json = log.to_json().unwrap();
        let back = RunLog::from_json(&json).unwrap();
        assert_eq!(back.run_id, log.run_id);
        assert_eq!(back.entries[0].levels, vec![1e6, 1.2e6]);
    }
}
