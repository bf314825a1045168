use std::mem;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::fsck::fsck_types::FsckError;

pub const ROOT_INO: u32 = 1;

// -----------------------------------------------------------------------------
// Constantes del formato en disco (xv6)
// -----------------------------------------------------------------------------

pub const BSIZE: usize = 512;
pub const NDIRECT: usize = 12;
pub const NINDIRECT: usize = BSIZE / mem::size_of::<u32>();
pub const MAXFILE: usize = NDIRECT + NINDIRECT;
pub const DIRSIZ: usize = 14;

/// Inodos por bloque.
pub const IPB: usize = BSIZE / mem::size_of::<InodeDisk>();
/// Entradas de directorio por bloque.
pub const DPB: usize = BSIZE / mem::size_of::<DirEntryDisk>();
/// Bits del bitmap por bloque.
pub const BPB: usize = BSIZE * 8;

/// Bloque 0 = arranque, bloque 1 = superblock, luego la tabla de inodos.
pub const SUPERBLOCK_BLOCK: u32 = 1;
pub const INODE_TABLE_START: u32 = 2;

// Tipos de inodo en disco
pub const T_UNUSED: i16 = 0;
pub const T_DIR: i16 = 1;
pub const T_FILE: i16 = 2;
pub const T_DEV: i16 = 3;

// -------------------- Estructuras en disco --------------------

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct SuperblockDisk {
    /// Tamaño de la imagen en bloques.
    pub size: u32,
    /// Bloques de datos.
    pub nblocks: u32,
    pub ninodes: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct InodeDisk {
    pub kind: i16,
    pub major: i16,
    pub minor: i16,
    pub nlink: i16,
    pub size: u32,
    /// `NDIRECT` direcciones directas y, al final, la dirección indirecta.
    pub addrs: [u32; NDIRECT + 1],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct DirEntryDisk {
    pub inum: u16,
    pub name: [u8; DIRSIZ],
}

/// Tipo de un inodo ya decodificado.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Unused,
    Directory,
    File,
    Device,
}

impl FileKind {
    pub fn from_raw(raw: i16) -> Option<Self> {
        match raw {
            T_UNUSED => Some(FileKind::Unused),
            T_DIR => Some(FileKind::Directory),
            T_FILE => Some(FileKind::File),
            T_DEV => Some(FileKind::Device),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i16 {
        match self {
            FileKind::Unused => T_UNUSED,
            FileKind::Directory => T_DIR,
            FileKind::File => T_FILE,
            FileKind::Device => T_DEV,
        }
    }
}

impl InodeDisk {
    pub fn new(kind: FileKind, nlink: i16) -> Self {
        Self {
            kind: kind.as_raw(),
            nlink,
            ..Self::default()
        }
    }

    pub fn file_kind(&self) -> Option<FileKind> {
        FileKind::from_raw(self.kind)
    }

    /// Un inodo "vivo" es cualquiera cuyo tipo no sea `T_UNUSED`.
    pub fn is_allocated(&self) -> bool {
        self.kind != T_UNUSED
    }

    pub fn is_dir(&self) -> bool {
        self.kind == T_DIR
    }

    pub fn direct(&self) -> &[u32] {
        &self.addrs[..NDIRECT]
    }

    pub fn indirect(&self) -> u32 {
        self.addrs[NDIRECT]
    }
}

impl DirEntryDisk {
    pub fn new(inum: u16, name: &str) -> Self {
        let mut raw = [0u8; DIRSIZ];
        let bytes = name.as_bytes();
        let len = bytes.len().min(DIRSIZ);
        raw[..len].copy_from_slice(&bytes[..len]);
        Self { inum, name: raw }
    }

    /// Nombre sin el relleno de NULs.
    pub fn name_bytes(&self) -> &[u8] {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(DIRSIZ);
        &self.name[..end]
    }

    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(self.name_bytes()).into_owned()
    }

    pub fn is_dot(&self) -> bool {
        self.name_bytes() == b"."
    }

    pub fn is_dotdot(&self) -> bool {
        self.name_bytes() == b".."
    }
}

/// Prueba pura de un bit del bitmap (bit 0 = LSB del byte 0).
pub fn bit_is_set(bitmap: &[u8], bit: usize) -> bool {
    bitmap
        .get(bit / 8)
        .is_some_and(|byte| byte & (1u8 << (bit % 8)) != 0)
}

pub fn set_bit(bitmap: &mut [u8], bit: usize) {
    if let Some(byte) = bitmap.get_mut(bit / 8) {
        *byte |= 1u8 << (bit % 8);
    }
}

// -----------------------------------------------------------------------------
// Layout derivado del superblock
// -----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FsLayout {
    pub total_blocks: u32,
    pub data_blocks: u32,
    pub ninodes: u32,
    pub inode_table_start: u32,
    pub inode_table_blocks: u32,
    pub bitmap_start: u32,
    pub bitmap_blocks: u32,
    pub first_data_block: u32,
}

impl FsLayout {
    /// Calcula las regiones de la imagen sin validarlas.
    pub fn compute(size: u32, ninodes: u32) -> Self {
        let inode_table_blocks = ninodes / IPB as u32 + 1;
        let bitmap_blocks = size / BPB as u32 + 1;
        let bitmap_start = INODE_TABLE_START.saturating_add(inode_table_blocks);
        let first_data_block = bitmap_start.saturating_add(bitmap_blocks);

        Self {
            total_blocks: size,
            data_blocks: size.saturating_sub(first_data_block),
            ninodes,
            inode_table_start: INODE_TABLE_START,
            inode_table_blocks,
            bitmap_start,
            bitmap_blocks,
            first_data_block,
        }
    }

    /// Deriva el layout del superblock y comprueba que cabe en la imagen
    /// (`available_blocks` bloques completos).
    pub fn from_superblock(sb: &SuperblockDisk, available_blocks: u64) -> Result<Self, FsckError> {
        if sb.ninodes < 2 {
            return Err(FsckError::BadGeometry(format!(
                "superblock declares {} inodes, at least 2 are required",
                sb.ninodes
            )));
        }

        if u64::from(sb.size) > available_blocks {
            return Err(FsckError::ImageTooSmall {
                needed: u64::from(sb.size),
                available: available_blocks,
            });
        }

        let layout = Self::compute(sb.size, sb.ninodes);

        if layout.first_data_block >= layout.total_blocks {
            return Err(FsckError::BadGeometry(format!(
                "metadata ends at block {} but the image only has {} blocks",
                layout.first_data_block, layout.total_blocks
            )));
        }

        Ok(layout)
    }

    pub fn is_valid_addr(&self, addr: u32) -> bool {
        addr > 0 && addr < self.total_blocks
    }

    /// Bloque de la tabla que contiene el inodo `inum`.
    pub fn inode_block(&self, inum: u32) -> u32 {
        self.inode_table_start + inum / IPB as u32
    }

    /// Bloque del bitmap que contiene el bit del bloque `block`.
    pub fn bitmap_block(&self, block: u32) -> u32 {
        self.bitmap_start + block / BPB as u32
    }
}
