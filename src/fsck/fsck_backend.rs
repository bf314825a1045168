/*Interfaz entre el fsck y la imagen.
`BlockStore` es lo único que el fsck pide al exterior: bloques de solo lectura.
`FsImage` envuelve un `BlockStore` con el layout del superblock ya validado
y es el único punto por donde los checkers leen inodos, bloques indirectos,
entradas de directorio y el bitmap. */

use tracing::{debug, warn};
use zerocopy::FromBytes;

use crate::fs::{
    bit_is_set, DirEntryDisk, FsLayout, InodeDisk, SuperblockDisk, BPB, BSIZE, IPB,
    SUPERBLOCK_BLOCK,
};

use super::fsck_types::{AddrKind, FsckError};

pub trait BlockStore {
    /// Número de bloques completos disponibles.
    fn block_count(&self) -> u64;
    fn read_block(&self, block: u32) -> Option<&[u8]>;
}

impl BlockStore for [u8] {
    fn block_count(&self) -> u64 {
        (self.len() / BSIZE) as u64
    }

    fn read_block(&self, block: u32) -> Option<&[u8]> {
        let start = (block as usize).checked_mul(BSIZE)?;
        self.get(start..start.checked_add(BSIZE)?)
    }
}

impl BlockStore for Vec<u8> {
    fn block_count(&self) -> u64 {
        self.as_slice().block_count()
    }

    fn read_block(&self, block: u32) -> Option<&[u8]> {
        self.as_slice().read_block(block)
    }
}

/// Dirección de bloque usada por un inodo, con su procedencia.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRef {
    pub addr: u32,
    pub kind: AddrKind,
}

pub struct FsImage<'a, S: BlockStore + ?Sized> {
    store: &'a S,
    layout: FsLayout,
}

impl<'a, S: BlockStore + ?Sized> FsImage<'a, S> {
    pub fn open(store: &'a S) -> Result<Self, FsckError> {
        let raw = store
            .read_block(SUPERBLOCK_BLOCK)
            .ok_or(FsckError::ImageTooSmall {
                needed: u64::from(SUPERBLOCK_BLOCK) + 1,
                available: store.block_count(),
            })?;
        let size = std::mem::size_of::<SuperblockDisk>();
        let superblock = SuperblockDisk::read_from_bytes(&raw[..size])
            .map_err(|_| FsckError::BadGeometry("unreadable superblock".into()))?;

        let layout = FsLayout::from_superblock(&superblock, store.block_count())?;
        if layout.data_blocks != superblock.nblocks {
            warn!(
                declared = superblock.nblocks,
                derived = layout.data_blocks,
                "superblock data block count differs from derived layout"
            );
        }
        debug!(
            size = layout.total_blocks,
            ninodes = layout.ninodes,
            inode_blocks = layout.inode_table_blocks,
            bitmap_blocks = layout.bitmap_blocks,
            first_data_block = layout.first_data_block,
            "image opened"
        );

        Ok(Self { store, layout })
    }

    pub fn layout(&self) -> &FsLayout {
        &self.layout
    }

    pub fn ninodes(&self) -> u32 {
        self.layout.ninodes
    }

    pub fn total_blocks(&self) -> u32 {
        self.layout.total_blocks
    }

    /// Acceso con verificación de rango a un bloque de la imagen.
    pub fn block(&self, block: u32) -> Result<&'a [u8], FsckError> {
        if block >= self.layout.total_blocks {
            return Err(FsckError::BlockOutOfRange { block });
        }
        self.store
            .read_block(block)
            .ok_or(FsckError::BlockOutOfRange { block })
    }

    pub fn inode(&self, inum: u32) -> Result<InodeDisk, FsckError> {
        if inum >= self.layout.ninodes {
            return Err(FsckError::InodeOutOfRange { inum });
        }
        let raw = self.block(self.layout.inode_block(inum))?;
        let size = std::mem::size_of::<InodeDisk>();
        let offset = (inum as usize % IPB) * size;
        InodeDisk::read_from_bytes(&raw[offset..offset + size])
            .map_err(|_| FsckError::InodeOutOfRange { inum })
    }

    /// Todos los inodos de la tabla, incluido el 0.
    pub fn inodes(&self) -> Box<dyn Iterator<Item = Result<(u32, InodeDisk), FsckError>> + '_> {
        Box::new((0..self.layout.ninodes).map(move |inum| self.inode(inum).map(|inode| (inum, inode))))
    }

    /// Direcciones guardadas dentro de un bloque indirecto (incluye ceros).
    pub fn indirect_addrs(&self, block: u32) -> Result<impl Iterator<Item = u32> + 'a, FsckError> {
        let raw = self.block(block)?;
        Ok(raw
            .chunks_exact(4)
            .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]])))
    }

    /// Entradas de directorio de un bloque de datos (incluye las libres).
    pub fn dir_entries(&self, block: u32) -> Result<impl Iterator<Item = DirEntryDisk> + 'a, FsckError> {
        let raw = self.block(block)?;
        Ok(raw
            .chunks_exact(std::mem::size_of::<DirEntryDisk>())
            .filter_map(|entry| DirEntryDisk::read_from_bytes(entry).ok()))
    }

    pub fn bitmap_bit(&self, block: u32) -> Result<bool, FsckError> {
        let bitmap = self.block(self.layout.bitmap_block(block))?;
        Ok(bit_is_set(bitmap, block as usize % BPB))
    }

    /// Bloques de contenido del inodo: directos y luego los apuntados por el
    /// bloque indirecto. No incluye el bloque indirecto en sí.
    pub fn content_blocks(&self, inode: &InodeDisk) -> Result<Vec<u32>, FsckError> {
        let mut blocks: Vec<u32> = inode.direct().iter().copied().filter(|&a| a != 0).collect();
        if inode.indirect() != 0 {
            blocks.extend(self.indirect_addrs(inode.indirect())?.filter(|&a| a != 0));
        }
        Ok(blocks)
    }

    /// Todas las direcciones no nulas que el inodo reclama, incluido su
    /// bloque indirecto.
    pub fn block_refs(&self, inode: &InodeDisk) -> Result<Vec<BlockRef>, FsckError> {
        let mut refs: Vec<BlockRef> = inode
            .direct()
            .iter()
            .filter(|&&addr| addr != 0)
            .map(|&addr| BlockRef { addr, kind: AddrKind::Direct })
            .collect();

        let indirect = inode.indirect();
        if indirect != 0 {
            refs.push(BlockRef { addr: indirect, kind: AddrKind::Indirect });
            refs.extend(
                self.indirect_addrs(indirect)?
                    .filter(|&addr| addr != 0)
                    .map(|addr| BlockRef { addr, kind: AddrKind::Indirect }),
            );
        }
        Ok(refs)
    }
}
