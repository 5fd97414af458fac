use crate::api::{ApiClient, ApiError, FetchedFile};
use log::warn;

/// Outcome of one batch fetch. Successes and failures keep the order in
/// which their paths were attempted; together they cover every requested
/// path exactly once.
#[derive(Debug, Default)]
pub struct FetchBatch {
    pub files: Vec<(String, FetchedFile)>,
    pub errors: Vec<(String, String)>,
}

impl FetchBatch {
    pub fn total(&self) -> usize {
        self.files.len() + self.errors.len()
    }

    /// Terminal status line: "Fetched N file(s)." plus a failure count
    /// when anything went wrong.
    pub fn summary(&self) -> String {
        let mut line = format!("Fetched {} file(s).", self.files.len());
        if !self.errors.is_empty() {
            line.push_str(&format!(" Failed: {}.", self.errors.len()));
        }
        line
    }
}

/// Fetches every path sequentially, in the given (selection) order. Each
/// item is attempted independently; a failure is recorded and the batch
/// moves on. `progress` fires before each attempt with (1-based index,
/// total, path).
pub fn run_batch<F, P>(paths: &[String], mut fetch_one: F, mut progress: P) -> FetchBatch
where
    F: FnMut(&str) -> Result<FetchedFile, ApiError>,
    P: FnMut(usize, usize, &str),
{
    let mut batch = FetchBatch::default();
    let total = paths.len();
    for (index, path) in paths.iter().enumerate() {
        progress(index + 1, total, path);
        match fetch_one(path) {
            Ok(file) => batch.files.push((path.clone(), file)),
            Err(e) => {
                warn!("Failed to fetch '{}': {}", path, e);
                batch.errors.push((path.clone(), e.to_string()));
            }
        }
    }
    batch
}

/// The production wiring: one `GET /get_document` per selected path.
pub fn fetch_selected<P>(client: &ApiClient, paths: &[String], progress: P) -> FetchBatch
where
    P: FnMut(usize, usize, &str),
{
    run_batch(paths, |path| client.get_document(path), progress)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn stub_file() -> FetchedFile {
        FetchedFile {
            mime_type: "text/plain".to_string(),
            bytes: b"content".to_vec(),
        }
    }

    #[test]
    fn partial_failure_covers_every_path_exactly_once() {
        let input = paths(&["a.txt", "bad/b.txt", "c.txt", "bad/d.txt", "e.txt"]);
        let batch = run_batch(
            &input,
            |path| {
                if path.starts_with("bad/") {
                    Err(ApiError::Server("File not found.".to_string()))
                } else {
                    Ok(stub_file())
                }
            },
            |_, _, _| {},
        );

        assert_eq!(batch.files.len(), 3);
        assert_eq!(batch.errors.len(), 2);
        assert_eq!(batch.total(), input.len());
        assert_eq!(batch.summary(), "Fetched 3 file(s). Failed: 2.");
    }

    #[test]
    fn all_successes_keep_selection_order() {
        let input = paths(&["z.txt", "a.txt", "m.txt"]);
        let batch = run_batch(&input, |_| Ok(stub_file()), |_, _, _| {});

        let fetched: Vec<&str> = batch.files.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(fetched, vec!["z.txt", "a.txt", "m.txt"]);
        assert_eq!(batch.summary(), "Fetched 3 file(s).");
    }

    #[test]
    fn progress_fires_once_per_item_in_order() {
        let input = paths(&["one", "two", "three"]);
        let mut seen = Vec::new();
        run_batch(
            &input,
            |_| Ok(stub_file()),
            |index, total, path| seen.push((index, total, path.to_string())),
        );

        assert_eq!(
            seen,
            vec![
                (1, 3, "one".to_string()),
                (2, 3, "two".to_string()),
                (3, 3, "three".to_string()),
            ]
        );
    }

    #[test]
    fn a_failure_never_aborts_the_remaining_items() {
        let input = paths(&["a", "b", "c"]);
        let mut calls = 0;
        let batch = run_batch(
            &input,
            |path| {
                calls += 1;
                if path == "a" {
                    Err(ApiError::Server("boom".to_string()))
                } else {
                    Ok(stub_file())
                }
            },
            |_, _, _| {},
        );

        assert_eq!(calls, 3);
        assert_eq!(batch.errors[0].0, "a");
        assert_eq!(batch.files.len(), 2);
    }

    #[test]
    fn empty_batch_is_empty() {
        let batch = run_batch(&[], |_| Ok(stub_file()), |_, _, _| {});
        assert_eq!(batch.total(), 0);
        assert_eq!(batch.summary(), "Fetched 0 file(s).");
    }
}
