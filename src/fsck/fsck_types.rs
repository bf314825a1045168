/*Tipos compartidos por todas las fases del fsck:
errores (uno por regla violada) y su categoría,
opciones de ejecución, y el reporte final */

use std::fmt;

use thiserror::Error;

/// Origen de una dirección de bloque dentro de un inodo.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddrKind {
    Direct,
    Indirect,
}

impl fmt::Display for AddrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddrKind::Direct => f.write_str("direct"),
            AddrKind::Indirect => f.write_str("indirect"),
        }
    }
}

/// Categoría de una violación. Todas son fatales.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// La imagen no se puede interpretar (tamaño, geometría, bloque inexistente).
    Image,
    Format,
    AddressRange,
    DirectoryFormat,
    BitmapConsistency,
    DuplicateAddress,
    ReferenceCount,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FsckError {
    #[error("image too small: superblock needs {needed} blocks, image holds {available}")]
    ImageTooSmall { needed: u64, available: u64 },
    #[error("bad file system geometry: {0}")]
    BadGeometry(String),
    #[error("block {block} is outside the image")]
    BlockOutOfRange { block: u32 },
    #[error("inode {inum} is outside the inode table")]
    InodeOutOfRange { inum: u32 },

    #[error("bad inode: inode {inum} has unknown type {kind}")]
    BadInodeType { inum: u32, kind: i16 },

    #[error("bad direct address in inode {inum}: block {addr}")]
    BadDirectAddress { inum: u32, addr: u32 },
    #[error("bad indirect address in inode {inum}: block {addr}")]
    BadIndirectAddress { inum: u32, addr: u32 },

    #[error("root directory does not exist")]
    RootMissing,
    #[error("directory not properly formatted: inode {inum}")]
    MalformedDirectory { inum: u32 },
    #[error("directory {dir} has an entry '{name}' naming nonexistent inode {inum}")]
    BadDirectoryEntry { dir: u32, name: String, inum: u32 },

    #[error("address used by inode but marked free in bitmap: inode {inum}, block {addr}")]
    AddressMarkedFree { inum: u32, addr: u32 },
    #[error("bitmap marks block in use but it is not in use: block {block}")]
    BitmapMarkedUnused { block: u32 },

    #[error("{kind} address used more than once: block {addr} (inode {inum})")]
    DuplicateAddress { kind: AddrKind, addr: u32, inum: u32 },

    #[error("inode marked use but not found in a directory: inode {inum}")]
    InodeNotInDirectory { inum: u32 },
    #[error("inode referred to in directory but marked free: inode {inum}")]
    InodeReferencedButFree { inum: u32 },
    #[error("bad reference count for file: inode {inum} has nlink {nlink}, found {refs} references")]
    BadReferenceCount { inum: u32, nlink: i16, refs: u32 },
    #[error("directory appears more than once in file system: inode {inum}")]
    DirectoryLinkedTwice { inum: u32 },
}

impl FsckError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FsckError::ImageTooSmall { .. }
            | FsckError::BadGeometry(_)
            | FsckError::BlockOutOfRange { .. }
            | FsckError::InodeOutOfRange { .. } => ErrorKind::Image,
            FsckError::BadInodeType { .. } => ErrorKind::Format,
            FsckError::BadDirectAddress { .. } | FsckError::BadIndirectAddress { .. } => {
                ErrorKind::AddressRange
            }
            FsckError::RootMissing
            | FsckError::MalformedDirectory { .. }
            | FsckError::BadDirectoryEntry { .. } => ErrorKind::DirectoryFormat,
            FsckError::AddressMarkedFree { .. } | FsckError::BitmapMarkedUnused { .. } => {
                ErrorKind::BitmapConsistency
            }
            FsckError::DuplicateAddress { .. } => ErrorKind::DuplicateAddress,
            FsckError::InodeNotInDirectory { .. }
            | FsckError::InodeReferencedButFree { .. }
            | FsckError::BadReferenceCount { .. }
            | FsckError::DirectoryLinkedTwice { .. } => ErrorKind::ReferenceCount,
        }
    }
}

/// Fases del fsck, en el orden fijo en que se ejecutan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Init,
    PerInodeScan,
    BitmapCrossCheck,
    DuplicateScan,
    DirectoryGraphScan,
    Success,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::PerInodeScan => "per-inode scan",
            Stage::BitmapCrossCheck => "bitmap cross-check",
            Stage::DuplicateScan => "duplicate scan",
            Stage::DirectoryGraphScan => "directory graph scan",
            Stage::Success => "success",
        };
        f.write_str(name)
    }
}

/// Primera violación encontrada y la fase que la detectó.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{error}")]
pub struct StageFailure {
    pub stage: Stage,
    pub error: FsckError,
}

impl StageFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Si es `true`, un bloque marcado en el bitmap sin ningún inodo que lo
    /// use es fatal en vez de una advertencia.
    pub strict_bitmap: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FsckReport {
    pub live_inodes: u32,
    pub directories: u32,
    pub files: u32,
    pub devices: u32,
    /// Bloques distintos referenciados por algún inodo.
    pub referenced_blocks: u32,
    /// Bloques de datos marcados en el bitmap que ningún inodo usa.
    pub unreferenced_marked: Vec<u32>,
}

impl FsckReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_clean(&self) -> bool {
        self.unreferenced_marked.is_empty()
    }
}
