/*Validación por inodo: tipo, direcciones directas e indirectas.
Ninguna fase posterior indexa con una dirección que no haya pasado por aquí. */

use crate::fs::{FileKind, InodeDisk, ROOT_INO};

use super::fsck_backend::{BlockStore, FsImage};
use super::fsck_types::FsckError;

pub fn validate_type(inum: u32, inode: &InodeDisk) -> Result<FileKind, FsckError> {
    match inode.file_kind() {
        Some(kind @ (FileKind::Directory | FileKind::File | FileKind::Device)) => Ok(kind),
        _ => Err(FsckError::BadInodeType { inum, kind: inode.kind }),
    }
}

pub fn check_direct<S: BlockStore + ?Sized>(
    img: &FsImage<'_, S>,
    inum: u32,
    inode: &InodeDisk,
) -> Result<(), FsckError> {
    let layout = img.layout();
    match inode
        .direct()
        .iter()
        .find(|&&addr| addr != 0 && !layout.is_valid_addr(addr))
    {
        Some(&addr) => Err(FsckError::BadDirectAddress { inum, addr }),
        None => Ok(()),
    }
}

/// El bloque indirecto y cada dirección guardada en él.
pub fn check_indirect<S: BlockStore + ?Sized>(
    img: &FsImage<'_, S>,
    inum: u32,
    inode: &InodeDisk,
) -> Result<(), FsckError> {
    let layout = img.layout();
    let indirect = inode.indirect();
    if indirect == 0 {
        return Ok(());
    }
    if !layout.is_valid_addr(indirect) {
        return Err(FsckError::BadIndirectAddress { inum, addr: indirect });
    }

    match img
        .indirect_addrs(indirect)?
        .find(|&addr| addr != 0 && !layout.is_valid_addr(addr))
    {
        Some(addr) => Err(FsckError::BadIndirectAddress { inum, addr }),
        None => Ok(()),
    }
}

/// El inodo 1 debe existir y ser un directorio.
pub fn check_root<S: BlockStore + ?Sized>(img: &FsImage<'_, S>) -> Result<(), FsckError> {
    if !img.inode(ROOT_INO)?.is_dir() {
        return Err(FsckError::RootMissing);
    }
    Ok(())
}

pub fn check_inode<S: BlockStore + ?Sized>(
    img: &FsImage<'_, S>,
    inum: u32,
    inode: &InodeDisk,
) -> Result<FileKind, FsckError> {
    let kind = validate_type(inum, inode)?;
    check_direct(img, inum, inode)?;
    check_indirect(img, inum, inode)?;
    Ok(kind)
}
