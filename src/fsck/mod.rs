pub mod bitmap;
pub mod blocks;
#[allow(clippy::module_inception)]
pub mod fsck;
pub mod fsck_backend;
pub mod fsck_types;
pub mod graph;
pub mod inodes;

pub use fsck::run_fsck;
pub use fsck_backend::{BlockStore, FsImage};
pub use fsck_types::{CheckOptions, ErrorKind, FsckError, FsckReport, Stage, StageFailure};
