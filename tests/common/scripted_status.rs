//! Parses the status and list notation used by the feature files.

use batchwatch::compute::ResourceKind;
use batchwatch::jobs::JobStatus;

/// Splits a comma-separated list, dropping blanks.
pub fn list(text: &str) -> Vec<&str> {
    text.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}

/// Maps a remote status string; `NOT FOUND` stands for a missing job.
pub fn status(text: &str) -> JobStatus {
    match text {
        "NOT FOUND" => JobStatus::NotFound,
        other => JobStatus::from_remote(other),
    }
}

/// Maps `instance`, `reservation` or `template` to its kind.
pub fn resource_kinds(text: &str) -> Vec<ResourceKind> {
    list(text)
        .into_iter()
        .map(|name| match name {
            "instance" => ResourceKind::Instance,
            "reservation" => ResourceKind::Reservation,
            "template" => ResourceKind::Template,
            other => panic!("unknown resource kind {other}"),
        })
        .collect()
}
