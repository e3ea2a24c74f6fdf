use serde::Serialize;

/// Outcome of a backup run, printed at the end of the CLI run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    pub new_snapshot: Option<String>,
    pub kept_snapshots: Vec<String>,
    pub pruned_snapshots: Vec<String>,
    pub repositories: Vec<RepositoryReport>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct RepositoryReport {
    pub repository: String,
    pub accessible: bool,
    pub created_archives: Vec<String>,
    pub deleted_archives: Vec<String>,
    pub compacted: bool,
}
