// src/dir.rs
use tracing::trace;

use crate::fs::{InodeDisk, ROOT_INO};
use crate::fsck::fsck_backend::{BlockStore, FsImage};
use crate::fsck::fsck_types::FsckError;

/// Entrada de directorio ocupada (`inum != 0`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub inum: u32,
    pub name: String,
    pub is_dot: bool,
    pub is_dotdot: bool,
}

impl DirEntry {
    /// `.` y `..` no cuentan como referencias en el grafo.
    pub fn is_special(&self) -> bool {
        self.is_dot || self.is_dotdot
    }
}

// --------- Funciones usadas por el fsck ---------

pub fn is_directory<S: BlockStore + ?Sized>(img: &FsImage<'_, S>, inum: u32) -> Result<bool, FsckError> {
    Ok(img.inode(inum)?.is_dir())
}

/// Entradas ocupadas del directorio, en orden: bloques directos y luego los
/// del bloque indirecto.
pub fn list_directory<S: BlockStore + ?Sized>(
    img: &FsImage<'_, S>,
    dir: &InodeDisk,
) -> Result<Vec<DirEntry>, FsckError> {
    let mut entries = Vec::new();
    for block in img.content_blocks(dir)? {
        for de in img.dir_entries(block)?.filter(|de| de.inum != 0) {
            entries.push(DirEntry {
                inum: u32::from(de.inum),
                name: de.name_lossy(),
                is_dot: de.is_dot(),
                is_dotdot: de.is_dotdot(),
            });
        }
    }
    Ok(entries)
}

/// Verifica `.` y `..` de un directorio.
///
/// - Exactamente un `.`, que apunta al propio directorio.
/// - Exactamente un `..`; en la raíz apunta a sí misma, en cualquier otro
///   directorio a un inodo distinto.
pub fn check_directory<S: BlockStore + ?Sized>(
    img: &FsImage<'_, S>,
    inum: u32,
    dir: &InodeDisk,
) -> Result<(), FsckError> {
    let mut dots = 0;
    let mut dotdots = 0;

    for entry in list_directory(img, dir)? {
        if entry.is_dot {
            dots += 1;
            if entry.inum != inum {
                return Err(FsckError::MalformedDirectory { inum });
            }
        } else if entry.is_dotdot {
            dotdots += 1;
            if inum == ROOT_INO && entry.inum != inum {
                return Err(FsckError::RootMissing);
            }
            if inum != ROOT_INO && entry.inum == inum {
                return Err(FsckError::MalformedDirectory { inum });
            }
        }
    }

    trace!(inum, dots, dotdots, "directory entries scanned");
    if dots != 1 || dotdots != 1 {
        return Err(FsckError::MalformedDirectory { inum });
    }
    Ok(())
}
