// src/mkfs.rs
//! Construcción en memoria de imágenes xv6 nuevas y consistentes.
//! Lo usa el binario `mkfs.xv6fs` y también las pruebas como imagen base.

use thiserror::Error;
use zerocopy::{FromBytes, IntoBytes};

use crate::fs::{
    set_bit, DirEntryDisk, FileKind, FsLayout, InodeDisk, SuperblockDisk, BPB, BSIZE, DIRSIZ,
    IPB, MAXFILE, NDIRECT, ROOT_INO, SUPERBLOCK_BLOCK,
};

#[derive(Debug, Error)]
pub enum MkfsError {
    #[error("geometría inválida: {0}")]
    Geometry(String),
    #[error("no quedan inodos libres")]
    OutOfInodes,
    #[error("no quedan bloques de datos libres")]
    OutOfBlocks,
    #[error("archivo demasiado grande ({0} bytes)")]
    FileTooLarge(usize),
    #[error("el inodo {0} no es un directorio")]
    NotDirectory(u32),
    #[error("nombre demasiado largo: {0}")]
    NameTooLong(String),
    #[error("inodo {0} fuera de la tabla")]
    InodeOutOfRange(u32),
    #[error("bloque {0} fuera de la imagen")]
    BlockOutOfRange(u32),
}

pub struct ImageBuilder {
    layout: FsLayout,
    image: Vec<u8>,
    next_inum: u32,
    next_block: u32,
}

impl ImageBuilder {
    /// Crea una imagen vacía de `size` bloques y `ninodes` inodos, con el
    /// directorio raíz (inodo 1) ya creado.
    pub fn new(size: u32, ninodes: u32) -> Result<Self, MkfsError> {
        let superblock = SuperblockDisk {
            size,
            nblocks: FsLayout::compute(size, ninodes).data_blocks,
            ninodes,
        };
        let layout = FsLayout::from_superblock(&superblock, u64::from(size))
            .map_err(|e| MkfsError::Geometry(e.to_string()))?;

        let mut builder = Self {
            layout,
            image: vec![0u8; size as usize * BSIZE],
            next_inum: ROOT_INO,
            next_block: layout.first_data_block,
        };

        builder.block_mut(SUPERBLOCK_BLOCK)?[..std::mem::size_of::<SuperblockDisk>()]
            .copy_from_slice(superblock.as_bytes());

        // Boot, superblock, tabla de inodos y bitmap quedan marcados como usados.
        for block in 0..layout.first_data_block {
            builder.set_bitmap_bit(block, true)?;
        }

        let root = builder.alloc_inode(FileKind::Directory, 1)?;
        builder.add_entry(root, ".", root)?;
        builder.add_entry(root, "..", root)?;

        Ok(builder)
    }

    pub fn layout(&self) -> &FsLayout {
        &self.layout
    }

    pub fn finish(self) -> Vec<u8> {
        self.image
    }

    // -------------------- Operaciones de alto nivel --------------------

    pub fn mkdir(&mut self, parent: u32, name: &str) -> Result<u32, MkfsError> {
        self.require_dir(parent)?;
        let inum = self.alloc_inode(FileKind::Directory, 1)?;
        self.add_entry(inum, ".", inum)?;
        self.add_entry(inum, "..", parent)?;
        self.add_entry(parent, name, inum)?;
        Ok(inum)
    }

    pub fn add_file(&mut self, parent: u32, name: &str, contents: &[u8]) -> Result<u32, MkfsError> {
        self.require_dir(parent)?;
        if contents.len() > MAXFILE * BSIZE {
            return Err(MkfsError::FileTooLarge(contents.len()));
        }
        let inum = self.alloc_inode(FileKind::File, 1)?;
        self.append(inum, contents)?;
        self.add_entry(parent, name, inum)?;
        Ok(inum)
    }

    pub fn add_device(&mut self, parent: u32, name: &str, major: i16, minor: i16) -> Result<u32, MkfsError> {
        self.require_dir(parent)?;
        let inum = self.alloc_inode(FileKind::Device, 1)?;
        let mut inode = self.inode(inum)?;
        inode.major = major;
        inode.minor = minor;
        self.set_inode(inum, &inode)?;
        self.add_entry(parent, name, inum)?;
        Ok(inum)
    }

    /// Enlace duro: nueva entrada hacia `inum` y `nlink + 1`.
    pub fn link(&mut self, parent: u32, name: &str, inum: u32) -> Result<(), MkfsError> {
        self.require_dir(parent)?;
        let mut inode = self.inode(inum)?;
        self.add_entry(parent, name, inum)?;
        inode.nlink += 1;
        self.set_inode(inum, &inode)
    }

    // -------------------- Acceso crudo --------------------

    pub fn inode(&self, inum: u32) -> Result<InodeDisk, MkfsError> {
        let range = self.inode_range(inum)?;
        InodeDisk::read_from_bytes(&self.image[range]).map_err(|_| MkfsError::InodeOutOfRange(inum))
    }

    pub fn set_inode(&mut self, inum: u32, inode: &InodeDisk) -> Result<(), MkfsError> {
        let range = self.inode_range(inum)?;
        self.image[range].copy_from_slice(inode.as_bytes());
        Ok(())
    }

    pub fn set_bitmap_bit(&mut self, block: u32, used: bool) -> Result<(), MkfsError> {
        if block >= self.layout.total_blocks {
            return Err(MkfsError::BlockOutOfRange(block));
        }
        let bitmap_block = self.layout.bitmap_block(block);
        let bit = block as usize % BPB;
        let bitmap = self.block_mut(bitmap_block)?;
        if used {
            set_bit(bitmap, bit);
        } else if let Some(byte) = bitmap.get_mut(bit / 8) {
            *byte &= !(1u8 << (bit % 8));
        }
        Ok(())
    }

    pub fn block_mut(&mut self, block: u32) -> Result<&mut [u8], MkfsError> {
        if block >= self.layout.total_blocks {
            return Err(MkfsError::BlockOutOfRange(block));
        }
        let start = block as usize * BSIZE;
        Ok(&mut self.image[start..start + BSIZE])
    }

    /// Agrega una entrada al final del directorio sin tocar `nlink`.
    pub fn add_entry(&mut self, dir: u32, name: &str, inum: u32) -> Result<(), MkfsError> {
        if name.len() > DIRSIZ {
            return Err(MkfsError::NameTooLong(name.to_string()));
        }
        let target = u16::try_from(inum).map_err(|_| MkfsError::OutOfInodes)?;
        let entry = DirEntryDisk::new(target, name);
        self.append(dir, entry.as_bytes())
    }

    /// Borra (pone a cero) la primera entrada con ese nombre.
    pub fn remove_entry(&mut self, dir: u32, name: &str) -> Result<bool, MkfsError> {
        let entry_size = std::mem::size_of::<DirEntryDisk>();
        for block in self.blocks_of(dir)? {
            let raw = self.block_mut(block)?;
            for slot in raw.chunks_exact_mut(entry_size) {
                let matches = DirEntryDisk::read_from_bytes(slot)
                    .map(|de| de.inum != 0 && de.name_bytes() == name.as_bytes())
                    .unwrap_or(false);
                if matches {
                    slot.fill(0);
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    // -------------------- Internos --------------------

    /// Bytes del inodo `inum` dentro de la imagen.
    fn inode_range(&self, inum: u32) -> Result<std::ops::Range<usize>, MkfsError> {
        if inum >= self.layout.ninodes {
            return Err(MkfsError::InodeOutOfRange(inum));
        }
        let size = std::mem::size_of::<InodeDisk>();
        let start = self.layout.inode_block(inum) as usize * BSIZE + (inum as usize % IPB) * size;
        Ok(start..start + size)
    }

    fn require_dir(&self, inum: u32) -> Result<(), MkfsError> {
        if inum >= self.layout.ninodes || !self.inode(inum)?.is_dir() {
            return Err(MkfsError::NotDirectory(inum));
        }
        Ok(())
    }

    fn alloc_inode(&mut self, kind: FileKind, nlink: i16) -> Result<u32, MkfsError> {
        if self.next_inum >= self.layout.ninodes {
            return Err(MkfsError::OutOfInodes);
        }
        let inum = self.next_inum;
        self.next_inum += 1;
        self.set_inode(inum, &InodeDisk::new(kind, nlink))?;
        Ok(inum)
    }

    fn alloc_block(&mut self) -> Result<u32, MkfsError> {
        if self.next_block >= self.layout.total_blocks {
            return Err(MkfsError::OutOfBlocks);
        }
        let block = self.next_block;
        self.next_block += 1;
        self.set_bitmap_bit(block, true)?;
        Ok(block)
    }

    /// Bloque de datos número `fbn` del inodo, reservándolo si hace falta.
    fn data_block(&mut self, inum: u32, fbn: usize) -> Result<u32, MkfsError> {
        let mut inode = self.inode(inum)?;

        if fbn < NDIRECT {
            if inode.addrs[fbn] == 0 {
                inode.addrs[fbn] = self.alloc_block()?;
                self.set_inode(inum, &inode)?;
            }
            return Ok(inode.addrs[fbn]);
        }

        if inode.addrs[NDIRECT] == 0 {
            inode.addrs[NDIRECT] = self.alloc_block()?;
            self.set_inode(inum, &inode)?;
        }
        let indirect = inode.addrs[NDIRECT];
        let slot = (fbn - NDIRECT) * 4;
        let raw = self.block_mut(indirect)?;
        let current = u32::from_le_bytes([raw[slot], raw[slot + 1], raw[slot + 2], raw[slot + 3]]);
        if current != 0 {
            return Ok(current);
        }
        let block = self.alloc_block()?;
        self.block_mut(indirect)?[slot..slot + 4].copy_from_slice(&block.to_le_bytes());
        Ok(block)
    }

    /// Escribe `data` al final del inodo, como `iappend` de mkfs.
    fn append(&mut self, inum: u32, mut data: &[u8]) -> Result<(), MkfsError> {
        let mut offset = self.inode(inum)?.size as usize;
        if offset + data.len() > MAXFILE * BSIZE {
            return Err(MkfsError::FileTooLarge(offset + data.len()));
        }

        while !data.is_empty() {
            let fbn = offset / BSIZE;
            let block = self.data_block(inum, fbn)?;
            let within = offset % BSIZE;
            let n = data.len().min(BSIZE - within);
            self.block_mut(block)?[within..within + n].copy_from_slice(&data[..n]);
            offset += n;
            data = &data[n..];
        }

        let mut inode = self.inode(inum)?;
        inode.size = offset as u32;
        self.set_inode(inum, &inode)
    }

    fn blocks_of(&self, inum: u32) -> Result<Vec<u32>, MkfsError> {
        let inode = self.inode(inum)?;
        let mut blocks: Vec<u32> = inode.direct().iter().copied().filter(|&a| a != 0).collect();
        let indirect = inode.indirect();
        if indirect != 0 {
            if indirect >= self.layout.total_blocks {
                return Err(MkfsError::BlockOutOfRange(indirect));
            }
            let start = indirect as usize * BSIZE;
            blocks.extend(
                self.image[start..start + BSIZE]
                    .chunks_exact(4)
                    .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
                    .filter(|&a| a != 0),
            );
        }
        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::bit_is_set;

    #[test]
    fn fresh_image_has_root_directory() {
        let builder = ImageBuilder::new(128, 32).unwrap();
        let root = builder.inode(ROOT_INO).unwrap();
        assert!(root.is_dir());
        assert_eq!(root.size, 32);
        assert_eq!(root.addrs[0], builder.layout().first_data_block);
    }

    #[test]
    fn metadata_and_allocated_blocks_are_marked() {
        let mut builder = ImageBuilder::new(128, 32).unwrap();
        builder.add_file(ROOT_INO, "a", b"hello").unwrap();
        let layout = *builder.layout();
        let bytes = builder.finish();
        let bitmap = &bytes[layout.bitmap_start as usize * BSIZE..][..BSIZE];

        for block in 0..layout.first_data_block + 2 {
            assert!(bit_is_set(bitmap, block as usize), "block {block}");
        }
        assert!(!bit_is_set(bitmap, (layout.first_data_block + 2) as usize));
    }

    #[test]
    fn large_file_uses_indirect_block() {
        let mut builder = ImageBuilder::new(512, 32).unwrap();
        let inum = builder.add_file(ROOT_INO, "big", &vec![1u8; BSIZE * 20]).unwrap();
        let inode = builder.inode(inum).unwrap();
        assert!(inode.direct().iter().all(|&a| a != 0));
        assert_ne!(inode.indirect(), 0);
        assert_eq!(builder.blocks_of(inum).unwrap().len(), 20);
    }

    #[test]
    fn link_bumps_nlink() {
        let mut builder = ImageBuilder::new(128, 32).unwrap();
        let inum = builder.add_file(ROOT_INO, "a", b"x").unwrap();
        builder.link(ROOT_INO, "b", inum).unwrap();
        assert_eq!(builder.inode(inum).unwrap().nlink, 2);
    }

    #[test]
    fn rejects_file_into_non_directory() {
        let mut builder = ImageBuilder::new(128, 32).unwrap();
        let inum = builder.add_file(ROOT_INO, "a", b"x").unwrap();
        assert!(matches!(
            builder.add_file(inum, "b", b"y"),
            Err(MkfsError::NotDirectory(_))
        ));
    }

    #[test]
    fn runs_out_of_inodes() {
        let mut builder = ImageBuilder::new(128, 4).unwrap();
        builder.add_file(ROOT_INO, "a", b"").unwrap();
        builder.add_file(ROOT_INO, "b", b"").unwrap();
        assert!(matches!(
            builder.add_file(ROOT_INO, "c", b""),
            Err(MkfsError::OutOfInodes)
        ));
    }

    #[test]
    fn raw_access_outside_image_is_an_error() {
        let mut builder = ImageBuilder::new(128, 32).unwrap();
        assert!(matches!(builder.inode(32), Err(MkfsError::InodeOutOfRange(32))));
        assert!(matches!(
            builder.set_inode(40, &InodeDisk::default()),
            Err(MkfsError::InodeOutOfRange(40))
        ));
        assert!(matches!(builder.block_mut(128), Err(MkfsError::BlockOutOfRange(128))));
        assert!(matches!(
            builder.set_bitmap_bit(u32::MAX, true),
            Err(MkfsError::BlockOutOfRange(_))
        ));
        assert!(matches!(
            builder.link(ROOT_INO, "x", 1000),
            Err(MkfsError::InodeOutOfRange(1000))
        ));
        // El enlace fallido no deja una entrada colgando en la raíz.
        assert!(!builder.remove_entry(ROOT_INO, "x").unwrap());
    }

    #[test]
    fn remove_entry_clears_slot() {
        let mut builder = ImageBuilder::new(128, 32).unwrap();
        builder.add_file(ROOT_INO, "a", b"x").unwrap();
        assert!(builder.remove_entry(ROOT_INO, "a").unwrap());
        assert!(!builder.remove_entry(ROOT_INO, "a").unwrap());
    }
}
