/*Recorrido del árbol de directorios desde la raíz.
Se cuenta cuántas entradas (sin `.` ni `..`) nombran a cada inodo y luego se
compara ese conteo con el estado de cada inodo. */

use tracing::{debug, trace};

use crate::dir::{is_directory, list_directory};
use crate::fs::{FileKind, ROOT_INO};

use super::fsck_backend::{BlockStore, FsImage};
use super::fsck_types::FsckError;

/// Incrementa `refs` por cada entrada alcanzable desde `root`. Los
/// directorios pendientes van en una pila explícita, así la profundidad del
/// árbol no consume pila del hilo. Solo se encola un directorio la primera
/// vez que se ve, así un directorio enlazado dos veces no provoca un ciclo
/// infinito (el conteo sí queda en 2 y se reporta después).
pub fn traverse<S: BlockStore + ?Sized>(
    img: &FsImage<'_, S>,
    root: u32,
    refs: &mut [u32],
) -> Result<(), FsckError> {
    let mut pending = vec![root];

    while let Some(dir_inum) = pending.pop() {
        let dir = img.inode(dir_inum)?;
        if !dir.is_dir() {
            continue;
        }

        for entry in list_directory(img, &dir)? {
            if entry.is_special() {
                continue;
            }
            let Some(count) = refs.get_mut(entry.inum as usize) else {
                return Err(FsckError::BadDirectoryEntry {
                    dir: dir_inum,
                    name: entry.name,
                    inum: entry.inum,
                });
            };
            *count += 1;
            trace!(dir = dir_inum, name = %entry.name, inum = entry.inum, refs = *count, "entry");

            if *count == 1 && is_directory(img, entry.inum)? {
                pending.push(entry.inum);
            }
        }
    }
    Ok(())
}

/// Conteo de referencias de todo el árbol. Los inodos 0 y 1 se siembran con 1.
pub fn reference_counts<S: BlockStore + ?Sized>(img: &FsImage<'_, S>) -> Result<Vec<u32>, FsckError> {
    let mut refs = vec![0u32; img.ninodes() as usize];
    refs[0] = 1;
    refs[ROOT_INO as usize] = 1;
    traverse(img, ROOT_INO, &mut refs)?;
    Ok(refs)
}

pub fn check_inode_refs(inum: u32, kind: FileKind, nlink: i16, refs: u32) -> Result<(), FsckError> {
    if kind != FileKind::Unused && refs == 0 {
        return Err(FsckError::InodeNotInDirectory { inum });
    }
    if refs > 0 && kind == FileKind::Unused {
        return Err(FsckError::InodeReferencedButFree { inum });
    }
    if kind == FileKind::File && i64::from(nlink) != i64::from(refs) {
        return Err(FsckError::BadReferenceCount { inum, nlink, refs });
    }
    if kind == FileKind::Directory && refs > 1 {
        return Err(FsckError::DirectoryLinkedTwice { inum });
    }
    Ok(())
}

pub fn check_directory_graph<S: BlockStore + ?Sized>(img: &FsImage<'_, S>) -> Result<(), FsckError> {
    let refs = reference_counts(img)?;

    for inum in 2..img.ninodes() {
        let inode = img.inode(inum)?;
        let kind = inode
            .file_kind()
            .ok_or(FsckError::BadInodeType { inum, kind: inode.kind })?;
        check_inode_refs(inum, kind, inode.nlink, refs[inum as usize])?;
    }

    debug!(
        reachable = refs.iter().skip(2).filter(|&&r| r > 0).count(),
        "directory graph consistent"
    );
    Ok(())
}
