/*Cruce entre el bitmap de bloques libres y las direcciones de los inodos.
Ida: toda dirección usada por un inodo vivo debe estar marcada (fatal).
Vuelta: todo bloque de datos marcado debe estar usado por algún inodo
(advertencia, o fatal con `strict_bitmap`). */

use tracing::debug;

use super::fsck_backend::{BlockStore, FsImage};
use super::fsck_types::{CheckOptions, FsckError, FsckReport};

/// Recorre todas las direcciones de los inodos vivos y devuelve, por número
/// de bloque, si algún inodo lo usa.
pub fn check_marked_in_use<S: BlockStore + ?Sized>(img: &FsImage<'_, S>) -> Result<Vec<bool>, FsckError> {
    let mut checked = vec![false; img.total_blocks() as usize];

    for item in img.inodes() {
        let (inum, inode) = item?;
        if !inode.is_allocated() {
            continue;
        }
        for block_ref in img.block_refs(&inode)? {
            let addr = block_ref.addr;
            if checked[addr as usize] {
                continue;
            }
            if !img.bitmap_bit(addr)? {
                return Err(FsckError::AddressMarkedFree { inum, addr });
            }
            checked[addr as usize] = true;
        }
    }

    Ok(checked)
}

/// Bloques de datos marcados en el bitmap que ningún inodo usa.
pub fn find_unreferenced_marked<S: BlockStore + ?Sized>(
    img: &FsImage<'_, S>,
    referenced: &[bool],
) -> Result<Vec<u32>, FsckError> {
    let layout = img.layout();
    let mut unreferenced = Vec::new();
    for block in layout.first_data_block..layout.total_blocks {
        if img.bitmap_bit(block)? && !referenced[block as usize] {
            unreferenced.push(block);
        }
    }
    Ok(unreferenced)
}

pub fn check_bitmap<S: BlockStore + ?Sized>(
    img: &FsImage<'_, S>,
    options: &CheckOptions,
    report: &mut FsckReport,
) -> Result<(), FsckError> {
    let referenced = check_marked_in_use(img)?;
    report.referenced_blocks = referenced.iter().filter(|&&used| used).count() as u32;

    let unreferenced = find_unreferenced_marked(img, &referenced)?;
    if let Some(&block) = unreferenced.first() {
        if options.strict_bitmap {
            return Err(FsckError::BitmapMarkedUnused { block });
        }
        for &block in &unreferenced {
            debug!(block, "marked in use but unreferenced");
        }
    }

    debug!(
        referenced = report.referenced_blocks,
        unreferenced_marked = unreferenced.len(),
        "bitmap cross-check done"
    );
    report.unreferenced_marked = unreferenced;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{BSIZE, ROOT_INO};
    use crate::mkfs::ImageBuilder;

    fn run(builder: ImageBuilder, options: &CheckOptions) -> Result<FsckReport, FsckError> {
        let bytes = builder.finish();
        let img = FsImage::open(&bytes)?;
        let mut report = FsckReport::new();
        check_bitmap(&img, options, &mut report)?;
        Ok(report)
    }

    #[test]
    fn consistent_bitmap_passes() {
        let mut builder = ImageBuilder::new(256, 32).unwrap();
        builder.add_file(ROOT_INO, "big", &vec![1u8; BSIZE * 14]).unwrap();
        let report = run(builder, &CheckOptions::default()).unwrap();
        // raíz (1) + 14 de datos + 1 indirecto
        assert_eq!(report.referenced_blocks, 16);
        assert!(report.is_clean());
    }

    #[test]
    fn cleared_bit_for_used_block_is_fatal() {
        let mut builder = ImageBuilder::new(128, 32).unwrap();
        let file = builder.add_file(ROOT_INO, "f", b"hello").unwrap();
        let block = builder.inode(file).unwrap().addrs[0];
        builder.set_bitmap_bit(block, false).unwrap();
        assert_eq!(
            run(builder, &CheckOptions::default()).unwrap_err(),
            FsckError::AddressMarkedFree { inum: file, addr: block }
        );
    }

    #[test]
    fn cleared_bit_for_indirect_block_is_fatal() {
        let mut builder = ImageBuilder::new(256, 32).unwrap();
        let file = builder.add_file(ROOT_INO, "big", &vec![1u8; BSIZE * 13]).unwrap();
        let indirect = builder.inode(file).unwrap().indirect();
        builder.set_bitmap_bit(indirect, false).unwrap();
        assert_eq!(
            run(builder, &CheckOptions::default()).unwrap_err(),
            FsckError::AddressMarkedFree { inum: file, addr: indirect }
        );
    }

    #[test]
    fn marked_but_unused_block_is_advisory_by_default() {
        let mut builder = ImageBuilder::new(128, 32).unwrap();
        builder.set_bitmap_bit(100, true).unwrap();
        let report = run(builder, &CheckOptions::default()).unwrap();
        assert_eq!(report.unreferenced_marked, vec![100]);
        assert!(!report.is_clean());
    }

    #[test]
    fn marked_but_unused_block_is_fatal_when_strict() {
        let mut builder = ImageBuilder::new(128, 32).unwrap();
        builder.set_bitmap_bit(100, true).unwrap();
        let options = CheckOptions { strict_bitmap: true };
        assert_eq!(
            run(builder, &options).unwrap_err(),
            FsckError::BitmapMarkedUnused { block: 100 }
        );
    }

    #[test]
    fn repeated_address_inside_one_inode_is_checked_once() {
        let mut builder = ImageBuilder::new(128, 32).unwrap();
        let file = builder.add_file(ROOT_INO, "f", b"hello").unwrap();
        let mut inode = builder.inode(file).unwrap();
        inode.addrs[1] = inode.addrs[0];
        builder.set_inode(file, &inode).unwrap();
        let report = run(builder, &CheckOptions::default()).unwrap();
        assert_eq!(report.referenced_blocks, 2);
    }
}
