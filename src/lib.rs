mod fs;
pub mod dir;
pub mod fsck;
pub mod mkfs;

pub use crate::fs::{
    bit_is_set,
    DirEntryDisk,
    FileKind,
    FsLayout,
    InodeDisk,
    SuperblockDisk,
    BPB,
    BSIZE,
    DIRSIZ,
    DPB,
    IPB,
    MAXFILE,
    NDIRECT,
    NINDIRECT,
    ROOT_INO,
    T_DEV,
    T_DIR,
    T_FILE,
    T_UNUSED,
};
pub use crate::fsck::{run_fsck, CheckOptions, ErrorKind, FsckError, FsckReport, Stage};
pub use crate::mkfs::{ImageBuilder, MkfsError};
