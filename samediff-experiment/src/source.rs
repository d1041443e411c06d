use crate::config::{Condition, ExperimentConfig};
use crate::error::LoadError;
use samediff_core::{Atom, TrialRecord};
use std::path::PathBuf;
use tracing::{debug, info};

/// Where condition trial lists come from.
pub trait TrialListSource {
    /// Full name of `resource` as shown in diagnostics: a path or a URL.
    fn locate(&self, resource: &str) -> String;

    fn fetch(&self, resource: &str) -> Result<String, LoadError>;
}

/// Trial lists stored under a local directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TrialListSource for DirectorySource {
    fn locate(&self, resource: &str) -> String {
        self.root.join(resource).display().to_string()
    }

    fn fetch(&self, resource: &str) -> Result<String, LoadError> {
        let path = self.root.join(resource);
        std::fs::read_to_string(&path).map_err(|e| LoadError::Unavailable {
            resource: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

/// Trial lists served over HTTP, relative to a base URL.
#[derive(Debug, Clone)]
pub struct HttpSource {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl TrialListSource for HttpSource {
    fn locate(&self, resource: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            resource.trim_start_matches('/')
        )
    }

    fn fetch(&self, resource: &str) -> Result<String, LoadError> {
        let url = self.locate(resource);
        debug!(%url, "fetching trial list");
        let unavailable = |e: reqwest::Error| LoadError::Unavailable {
            resource: url.clone(),
            message: e.to_string(),
        };
        let response = self.client.get(&url).send().map_err(unavailable)?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status {
                resource: url.clone(),
                status: status.as_u16(),
            });
        }
        response.text().map_err(unavailable)
    }
}

/// Fetches and parses the trial list for `condition`.
pub fn load_trial_list(
    source: &dyn TrialListSource,
    config: &ExperimentConfig,
    condition: Condition,
) -> Result<Vec<TrialRecord>, LoadError> {
    let resource = config.trial_list_resource(condition);
    let text = source.fetch(&resource)?;
    let records = parse_trial_list(&source.locate(&resource), &text)?;
    info!(
        condition = condition.number(),
        trials = records.len(),
        resource = %source.locate(&resource),
        "trial list loaded"
    );
    Ok(records)
}

const KNOWN_COLUMNS: [&str; 8] = [
    "left_image",
    "right_image",
    "correct_response",
    "trial_type",
    "category",
    "pair",
    "condition",
    "trial_index",
];

/// Parses header-first comma-separated text. Values are trimmed, blank lines
/// skipped, and embedded commas are not supported.
pub fn parse_trial_list(resource: &str, text: &str) -> Result<Vec<TrialRecord>, LoadError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());

    let header: Vec<&str> = lines
        .next()
        .ok_or_else(|| LoadError::Empty {
            resource: resource.to_string(),
        })?
        .split(',')
        .map(str::trim)
        .collect();

    let column = |name: &'static str| {
        header
            .iter()
            .position(|h| *h == name)
            .ok_or_else(|| LoadError::MissingColumn {
                resource: resource.to_string(),
                column: name,
            })
    };
    let left = column("left_image")?;
    let right = column("right_image")?;
    let answer = column("correct_response")?;
    let optional = |name: &str| header.iter().position(|h| *h == name);
    let (trial_type, category, pair, condition, trial_index) = (
        optional("trial_type"),
        optional("category"),
        optional("pair"),
        optional("condition"),
        optional("trial_index"),
    );
    let extra_columns: Vec<(usize, &str)> = header
        .iter()
        .enumerate()
        .filter(|(_, h)| !KNOWN_COLUMNS.contains(*h))
        .map(|(i, h)| (i, *h))
        .collect();

    let records = lines
        .map(|line| {
            let values: Vec<&str> = line.split(',').map(str::trim).collect();
            let value = |i: usize| values.get(i).copied().unwrap_or("");
            let meta = |col: Option<usize>| {
                col.map(value)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
            };
            TrialRecord {
                left_image: Atom::from(value(left)),
                right_image: Atom::from(value(right)),
                correct_response: value(answer).to_string(),
                trial_type: meta(trial_type),
                category: meta(category),
                pair: meta(pair),
                condition: meta(condition),
                trial_index: meta(trial_index),
                extra: extra_columns
                    .iter()
                    .map(|(i, name)| (name.to_string(), value(*i).to_string()))
                    .collect(),
            }
        })
        .collect();
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = "\
trial_index,condition,trial_type,category,pair,left_image,right_image,correct_response,randomize_lr
1,1,identity,cat,cat1_vs_cat1,images/identity/cat1.png,images/identity/cat1.png,same,False
2, 1 ,category,dog,dog1_dog2, images/category/dog1.png ,images/category/dog2.png,different,True
";

    #[test]
    fn parses_rows_and_metadata() {
        let rows = parse_trial_list("list.csv", LIST).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(&*rows[0].left_image, "images/identity/cat1.png");
        assert_eq!(rows[0].correct_response, "same");
        assert_eq!(rows[0].trial_type.as_deref(), Some("identity"));
        assert_eq!(rows[1].condition.as_deref(), Some("1"));
        assert_eq!(&*rows[1].left_image, "images/category/dog1.png");
        assert_eq!(rows[1].extra, vec![("randomize_lr".to_string(), "True".to_string())]);
    }

    #[test]
    fn skips_blank_lines_and_handles_crlf() {
        let text = "left_image,right_image,correct_response\r\n\r\na.png,a.png,same\r\n  \r\n";
        let rows = parse_trial_list("list.csv", text).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].correct_response, "same");
        assert!(rows[0].trial_type.is_none());
    }

    #[test]
    fn short_rows_get_empty_values() {
        let text = "left_image,right_image,correct_response,category\na.png,b.png";
        let rows = parse_trial_list("list.csv", text).unwrap();
        assert_eq!(rows[0].correct_response, "");
        assert!(rows[0].category.is_none());
    }

    #[test]
    fn missing_required_column() {
        let err = parse_trial_list("list.csv", "left_image,correct_response\na.png,same").unwrap_err();
        assert!(matches!(
            err,
            LoadError::MissingColumn { column: "right_image", .. }
        ));
    }

    #[test]
    fn empty_text_has_no_header() {
        let err = parse_trial_list("list.csv", "\n\n").unwrap_err();
        assert!(matches!(err, LoadError::Empty { .. }));
    }

    #[test]
    fn directory_source_reads_condition_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("trial_lists")).unwrap();
        std::fs::write(
            dir.path().join("trial_lists/trials_condition_2.csv"),
            LIST,
        )
        .unwrap();

        let source = DirectorySource::new(dir.path());
        let config = ExperimentConfig::default();
        let rows = load_trial_list(&source, &config, Condition::new(2).unwrap()).unwrap();
        assert_eq!(rows.len(), 2);

        let err = load_trial_list(&source, &config, Condition::new(3).unwrap()).unwrap_err();
        assert!(err.resource().ends_with("trials_condition_3.csv"));
        assert!(matches!(err, LoadError::Unavailable { .. }));
    }

    #[test]
    fn http_source_joins_urls() {
        let source = HttpSource::new("http://localhost:8000/");
        assert_eq!(
            source.locate("trial_lists/trials_condition_1.csv"),
            "http://localhost:8000/trial_lists/trials_condition_1.csv"
        );
    }
}
