/*EL ARCHIVO PRINCIPAL DE FSCK. Ejecuta las fases en orden fijo:
inodos, bitmap, duplicados y grafo de directorios.
Cada fase asume que las anteriores ya rechazaron direcciones fuera de rango.
La primera violación detiene todo. */

use tracing::{debug, info};

use crate::dir::check_directory;
use crate::fs::FileKind;

use super::fsck_backend::{BlockStore, FsImage};
use super::fsck_types::*;
use super::{bitmap, blocks, graph, inodes};

fn run_stage<T>(stage: Stage, check: impl FnOnce() -> Result<T, FsckError>) -> Result<T, StageFailure> {
    debug!(%stage, "entering stage");
    check().map_err(|error| {
        debug!(%stage, %error, "stage failed");
        StageFailure { stage, error }
    })
}

/// Validación por inodo: raíz, tipo, direcciones y, para directorios,
/// las entradas `.` y `..`.
fn check_inodes<S: BlockStore + ?Sized>(img: &FsImage<'_, S>, report: &mut FsckReport) -> Result<(), FsckError> {
    inodes::check_root(img)?;

    for item in img.inodes() {
        let (inum, inode) = item?;
        if !inode.is_allocated() {
            continue;
        }

        let kind = inodes::check_inode(img, inum, &inode)?;
        report.live_inodes += 1;
        match kind {
            FileKind::Directory => {
                check_directory(img, inum, &inode)?;
                report.directories += 1;
            }
            FileKind::File => report.files += 1,
            FileKind::Device => report.devices += 1,
            FileKind::Unused => {}
        }
    }

    debug!(
        live = report.live_inodes,
        directories = report.directories,
        files = report.files,
        devices = report.devices,
        "inode scan done"
    );
    Ok(())
}

pub fn run_fsck<S: BlockStore + ?Sized>(store: &S, options: &CheckOptions) -> Result<FsckReport, StageFailure> {
    let mut report = FsckReport::new();

    // --- Paso 0: superblock y layout ---
    let img = run_stage(Stage::Init, || FsImage::open(store))?;

    // --- Paso 1: validación por inodo ---
    run_stage(Stage::PerInodeScan, || check_inodes(&img, &mut report))?;

    // --- Paso 2: bitmap ---
    run_stage(Stage::BitmapCrossCheck, || bitmap::check_bitmap(&img, options, &mut report))?;

    // --- Paso 3: bloques usados más de una vez ---
    run_stage(Stage::DuplicateScan, || blocks::check_duplicates(&img))?;

    // --- Paso 4: grafo de directorios y conteo de referencias ---
    run_stage(Stage::DirectoryGraphScan, || graph::check_directory_graph(&img))?;

    info!(
        stage = %Stage::Success,
        live_inodes = report.live_inodes,
        referenced_blocks = report.referenced_blocks,
        warnings = report.unreferenced_marked.len(),
        "file system is consistent"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{ROOT_INO, T_UNUSED};
    use crate::mkfs::ImageBuilder;

    #[test]
    fn reports_counts_for_valid_image() {
        let mut builder = ImageBuilder::new(256, 32).unwrap();
        let sub = builder.mkdir(ROOT_INO, "sub").unwrap();
        builder.add_file(sub, "f", b"hello").unwrap();
        builder.add_device(ROOT_INO, "console", 1, 1).unwrap();
        let bytes = builder.finish();

        let report = run_fsck(&bytes, &CheckOptions::default()).unwrap();
        assert_eq!(report.live_inodes, 4);
        assert_eq!(report.directories, 2);
        assert_eq!(report.files, 1);
        assert_eq!(report.devices, 1);
        assert!(report.is_clean());
    }

    #[test]
    fn unallocated_root_is_rejected_first() {
        let mut builder = ImageBuilder::new(128, 32).unwrap();
        let mut root = builder.inode(ROOT_INO).unwrap();
        root.kind = T_UNUSED;
        builder.set_inode(ROOT_INO, &root).unwrap();
        let bytes = builder.finish();

        let failure = run_fsck(&bytes, &CheckOptions::default()).unwrap_err();
        assert_eq!(failure.stage, Stage::PerInodeScan);
        assert_eq!(failure.error, FsckError::RootMissing);
    }

    #[test]
    fn failure_carries_stage() {
        let mut builder = ImageBuilder::new(128, 32).unwrap();
        let file = builder.add_file(ROOT_INO, "f", b"x").unwrap();
        builder.remove_entry(ROOT_INO, "f").unwrap();
        let bytes = builder.finish();

        let failure = run_fsck(&bytes, &CheckOptions::default()).unwrap_err();
        assert_eq!(failure.stage, Stage::DirectoryGraphScan);
        assert_eq!(failure.kind(), ErrorKind::ReferenceCount);
        assert_eq!(failure.error, FsckError::InodeNotInDirectory { inum: file });
    }

    #[test]
    fn garbage_image_fails_in_init() {
        let bytes = vec![0u8; 4096];
        let failure = run_fsck(&bytes, &CheckOptions::default()).unwrap_err();
        assert_eq!(failure.stage, Stage::Init);
        assert_eq!(failure.kind(), ErrorKind::Image);
    }
}
