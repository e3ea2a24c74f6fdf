pub mod backup;
pub mod borg;
pub mod btrfs;
pub mod exec;
pub mod model;
pub mod retention;
pub mod stamp;
