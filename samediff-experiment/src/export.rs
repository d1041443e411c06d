use crate::config::Condition;
use crate::error::ExportError;
use crate::summary::RunSummary;
use crate::timeline::SaveRequest;
use samediff_core::TrialOutcome;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// `{participant}_condition{N}.csv`, with anything outside `[A-Za-z0-9_-]`
/// in the participant code replaced by `_` so the name stays a single file
/// inside the data directory.
pub fn export_filename(participant: &str, condition: Condition) -> String {
    let stem: String = participant
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{stem}_condition{condition}.csv")
}

fn summary_filename(request: &SaveRequest) -> String {
    let stem = request
        .filename
        .strip_suffix(".csv")
        .unwrap_or(&request.filename);
    format!("{stem}_summary.json")
}

/// Main-task outcomes in completion order; practice responses are dropped.
pub fn main_task_rows(outcomes: &[TrialOutcome]) -> Vec<&TrialOutcome> {
    outcomes.iter().filter(|o| !o.is_practice).collect()
}

const COLUMNS: [&str; 16] = [
    "subject",
    "condition",
    "sequence_index",
    "trial_index",
    "trial_type",
    "category",
    "pair",
    "list_condition",
    "left_image",
    "right_image",
    "correct_response",
    "response",
    "rt",
    "correct_key",
    "correct",
    "is_practice",
];

/// One header line, then one line per outcome. Metadata columns the trial
/// list carried beyond the known ones follow the fixed columns.
pub fn to_csv(request: &SaveRequest, rows: &[&TrialOutcome]) -> String {
    let mut extra_columns: Vec<&str> = Vec::new();
    for row in rows {
        for (name, _) in &row.extra {
            if !extra_columns.contains(&name.as_str()) {
                extra_columns.push(name.as_str());
            }
        }
    }

    let mut out = String::new();
    let header: Vec<&str> = COLUMNS.iter().copied().chain(extra_columns.iter().copied()).collect();
    push_record(&mut out, header.iter().map(|h| h.to_string()));

    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    for row in rows {
        let fixed = [
            request.participant.clone(),
            request.condition.to_string(),
            row.sequence_index.to_string(),
            opt(&row.trial_index),
            opt(&row.trial_type),
            opt(&row.category),
            opt(&row.pair),
            opt(&row.list_condition),
            row.left_image.clone(),
            row.right_image.clone(),
            row.correct_response.to_string(),
            row.response.to_string(),
            format!("{:.3}", row.rt_ms),
            row.correct_key.to_string(),
            row.correct.to_string(),
            row.is_practice.to_string(),
        ];
        let extra = extra_columns.iter().map(|name| {
            row.extra
                .iter()
                .find(|(k, _)| k.as_str() == *name)
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        });
        push_record(&mut out, fixed.into_iter().chain(extra));
    }
    out
}

fn push_record(out: &mut String, fields: impl Iterator<Item = String>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(&field);
        }
    }
    out.push('\n');
}

/// Somewhere results can be sent.
pub trait ResultSink {
    fn describe(&self) -> String;

    fn deliver(&self, filename: &str, body: &str) -> Result<(), ExportError>;

    /// Sinks that keep files locally also keep the run summary.
    fn deliver_summary(&self, _filename: &str, _summary: &RunSummary) -> Result<(), ExportError> {
        Ok(())
    }
}

/// Writes into a local data directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn write(&self, filename: &str, contents: &[u8]) -> Result<(), ExportError> {
        let io_err = |path: PathBuf| move |source: std::io::Error| ExportError::Io { path, source };
        std::fs::create_dir_all(&self.dir).map_err(io_err(self.dir.clone()))?;
        let path = self.dir.join(filename);
        std::fs::write(&path, contents).map_err(io_err(path.clone()))?;
        debug!(path = %path.display(), bytes = contents.len(), "wrote file");
        Ok(())
    }
}

impl ResultSink for DirectorySink {
    fn describe(&self) -> String {
        self.dir.display().to_string()
    }

    fn deliver(&self, filename: &str, body: &str) -> Result<(), ExportError> {
        self.write(filename, body.as_bytes())
    }

    fn deliver_summary(&self, filename: &str, summary: &RunSummary) -> Result<(), ExportError> {
        let json = serde_json::to_vec_pretty(summary).map_err(|source| ExportError::Encode {
            filename: filename.to_string(),
            source,
        })?;
        self.write(filename, &json)
    }
}

#[derive(Serialize)]
struct UploadBody<'a> {
    filename: &'a str,
    data: &'a str,
}

/// POSTs `{"filename", "data"}` as JSON to a collection endpoint.
#[derive(Debug, Clone)]
pub struct HttpSink {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpSink {
    /// `timeout` of `None` waits as long as the transport does.
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> reqwest::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

impl ResultSink for HttpSink {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn deliver(&self, filename: &str, body: &str) -> Result<(), ExportError> {
        let response = self
            .client
            .post(&self.url)
            .json(&UploadBody {
                filename,
                data: body,
            })
            .send()
            .map_err(|source| ExportError::Transport {
                filename: filename.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExportError::Rejected {
                filename: filename.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub rows: usize,
    pub destination: String,
}

pub struct ResultExporter {
    sink: Box<dyn ResultSink>,
}

impl ResultExporter {
    pub fn new(sink: impl ResultSink + 'static) -> Self {
        Self {
            sink: Box::new(sink),
        }
    }

    /// Sends the main-task rows of `outcomes` under the request's filename.
    pub fn export(
        &self,
        request: &SaveRequest,
        outcomes: &[TrialOutcome],
    ) -> Result<ExportReport, ExportError> {
        let rows = main_task_rows(outcomes);
        let body = to_csv(request, &rows);
        self.sink.deliver(&request.filename, &body)?;

        let summary = RunSummary::new(request, outcomes);
        summary.log();
        let summary_name = summary_filename(request);
        if let Err(e) = self.sink.deliver_summary(&summary_name, &summary) {
            warn!(filename = %summary_name, error = %e, "run summary not saved");
        }

        let report = ExportReport {
            rows: rows.len(),
            destination: self.sink.describe(),
        };
        info!(
            filename = %request.filename,
            rows = report.rows,
            destination = %report.destination,
            "results exported"
        );
        Ok(report)
    }
}
