mod config;
mod report;

pub use self::config::{
    BackupConfig, BorgConfig, BtrfsConfig, DEFAULT_DATETIME_FORMAT, RetentionConfig,
};
pub use self::report::{RepositoryReport, RunReport};
