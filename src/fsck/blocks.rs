/*Ningún bloque puede ser reclamado por más de un inodo vivo,
ni directamente ni a través de un bloque indirecto. El bitmap solo dice
"usado", así que esto no se puede deducir de él. */

use tracing::debug;

use super::fsck_backend::{BlockStore, FsImage};
use super::fsck_types::FsckError;

pub fn check_duplicates<S: BlockStore + ?Sized>(img: &FsImage<'_, S>) -> Result<(), FsckError> {
    let mut usage = vec![0u32; img.total_blocks() as usize];

    for item in img.inodes() {
        let (inum, inode) = item?;
        if !inode.is_allocated() {
            continue;
        }
        for block_ref in img.block_refs(&inode)? {
            let count = &mut usage[block_ref.addr as usize];
            *count += 1;
            if *count > 1 {
                return Err(FsckError::DuplicateAddress {
                    kind: block_ref.kind,
                    addr: block_ref.addr,
                    inum,
                });
            }
        }
    }

    debug!(
        claimed = usage.iter().filter(|&&c| c > 0).count(),
        "no block claimed twice"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{BSIZE, ROOT_INO};
    use crate::fsck::fsck_types::AddrKind;
    use crate::mkfs::ImageBuilder;

    fn run(builder: ImageBuilder) -> Result<(), FsckError> {
        let bytes = builder.finish();
        let img = FsImage::open(&bytes)?;
        check_duplicates(&img)
    }

    #[test]
    fn fresh_image_has_no_aliasing() {
        let mut builder = ImageBuilder::new(256, 32).unwrap();
        builder.add_file(ROOT_INO, "a", &vec![1u8; BSIZE * 20]).unwrap();
        builder.add_file(ROOT_INO, "b", b"small").unwrap();
        assert_eq!(run(builder), Ok(()));
    }

    #[test]
    fn shared_direct_address_is_reported() {
        let mut builder = ImageBuilder::new(128, 32).unwrap();
        let a = builder.add_file(ROOT_INO, "a", b"first").unwrap();
        let b = builder.add_file(ROOT_INO, "b", b"second").unwrap();
        let shared = builder.inode(a).unwrap().addrs[0];
        let mut inode = builder.inode(b).unwrap();
        inode.addrs[2] = shared;
        builder.set_inode(b, &inode).unwrap();

        assert_eq!(
            run(builder),
            Err(FsckError::DuplicateAddress { kind: AddrKind::Direct, addr: shared, inum: b })
        );
    }

    #[test]
    fn shared_address_through_indirect_block_is_reported() {
        let mut builder = ImageBuilder::new(256, 32).unwrap();
        let small = builder.add_file(ROOT_INO, "small", b"x").unwrap();
        let big = builder.add_file(ROOT_INO, "big", &vec![1u8; BSIZE * 13]).unwrap();
        let shared = builder.inode(small).unwrap().addrs[0];
        let indirect = builder.inode(big).unwrap().indirect();
        builder.block_mut(indirect).unwrap()[4..8].copy_from_slice(&shared.to_le_bytes());

        assert_eq!(
            run(builder),
            Err(FsckError::DuplicateAddress { kind: AddrKind::Indirect, addr: shared, inum: big })
        );
    }

    #[test]
    fn unallocated_inodes_are_ignored() {
        let mut builder = ImageBuilder::new(128, 32).unwrap();
        let a = builder.add_file(ROOT_INO, "a", b"first").unwrap();
        let mut ghost = builder.inode(a).unwrap();
        ghost.kind = crate::fs::T_UNUSED;
        builder.set_inode(20, &ghost).unwrap();
        assert_eq!(run(builder), Ok(()));
    }
}
