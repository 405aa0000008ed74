use crate::alloc::{BlockMap, FirstFit};
use crate::io::Disk;
use crate::node::{record_offset, Inode, InodeTable, RECORD_SIZE};

use log::debug;
use thiserror::Error;

/// Size of one physical block in bytes.
pub const BLOCK_SIZE: usize = 1024;
/// Total physical blocks addressable on the volume.
pub const N_BLOCKS: usize = 128;
/// Number of slots in the inode table.
pub const N_INODES: usize = 16;
/// Upper bound on blocks a single file can own.
pub const MAX_BLOCKS_PER_FILE: usize = 8;
/// Width of the fixed name field in bytes.
pub const NAME_LEN: usize = 8;

/// Known locations.
const MAP_OFFSET: u64 = 0;
const TABLE_BYTES: usize = N_INODES * RECORD_SIZE;
const METADATA_BYTES: usize = N_BLOCKS + TABLE_BYTES;

/// Data blocks are addressed from byte 0 of the store, so block 0 spans
/// the map and table regions. It is never handed to a file.
pub(crate) const RESERVED_BLOCKS: usize = 1;

#[derive(Error, Debug)]
pub enum VolumeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not enough free blocks on the volume")]
    InsufficientSpace,
    #[error("no free slot left in the inode table")]
    TableFull,
    #[error("found no file with that name")]
    NotFound,
    #[error("a file with that name already exists")]
    AlreadyExists,
    #[error("block index is beyond the end of the file")]
    OutOfRange,
    #[error("backing store io failed")]
    Storage(#[from] std::io::Error),
}

/// A single-volume flat filesystem over a byte-addressable backing store.
///
/// The volume caches nothing between calls: every operation re-reads the
/// free-block map and inode table from the store, works on a private
/// copy, and issues writes only once every precondition has passed. A
/// failed operation therefore leaves the on-disk state exactly as it
/// found it. Each write-back ends with a sync, so success implies the
/// update is durable.
pub struct Volume<D: Disk> {
    dev: D,
}

impl<D: Disk> Volume<D> {
    /// Adopts an already-formatted backing store. The on-disk map and
    /// table are trusted at face value; nothing is validated or repaired.
    pub fn open(dev: D) -> Self {
        Volume { dev }
    }

    /// Initializes an empty volume by zeroing the metadata region. A
    /// zeroed map and table describe a volume with no files and every
    /// data block free.
    pub fn format(mut dev: D) -> Result<Self, VolumeError> {
        dev.write_at(MAP_OFFSET, &[0u8; METADATA_BYTES])?;
        dev.sync()?;
        Ok(Volume { dev })
    }

    /// Returns ownership of the backing store to the caller.
    pub fn into_disk(self) -> D {
        self.dev
    }

    /// Creates a file occupying exactly `size` blocks. The blocks are
    /// chosen first fit from the lowest free physical index upward and
    /// the file cannot grow or shrink afterwards.
    pub fn create(&mut self, name: &str, size: usize) -> Result<(), VolumeError> {
        let name_bytes = validate_name(name)?;
        if size > MAX_BLOCKS_PER_FILE {
            return Err(VolumeError::InvalidArgument(format!(
                "files are limited to {} blocks",
                MAX_BLOCKS_PER_FILE
            )));
        }

        let mut map = self.load_map()?;
        if map.free_count() < size {
            return Err(VolumeError::InsufficientSpace);
        }

        let table = self.load_table()?;
        if table.find_named(name_bytes).is_some() {
            return Err(VolumeError::AlreadyExists);
        }
        let slot = table.first_free().ok_or(VolumeError::TableFull)?;

        let chosen: Vec<u32> = FirstFit::new(&mut map)
            .take(size)
            .map(|blocknr| blocknr as u32)
            .collect();
        if chosen.len() < size {
            return Err(VolumeError::InsufficientSpace);
        }
        debug!("creating {:?} in slot {} with blocks {:?}", name, slot, chosen);

        let node = Inode::assign(name_bytes, &chosen);
        self.store_map(&map)?;
        self.store_record(slot, &node)?;
        self.dev.sync()?;
        Ok(())
    }

    /// Deletes the first live file with this name in table order and
    /// returns its blocks to the free-block map.
    pub fn delete(&mut self, name: &str) -> Result<(), VolumeError> {
        let mut table = self.load_table()?;
        let slot = table
            .find_named(name.as_bytes())
            .ok_or(VolumeError::NotFound)?;

        let mut map = self.load_map()?;
        for &blocknr in table.record(slot).block_pointers() {
            map.set_free(blocknr as usize);
        }
        table.record_mut(slot).release();
        debug!(
            "deleting {:?} from slot {}, reclaimed {} blocks",
            name,
            slot,
            table.record(slot).block_pointers().len()
        );

        self.store_map(&map)?;
        self.store_record(slot, table.record(slot))?;
        self.dev.sync()?;
        Ok(())
    }

    /// Yields `(name, size in blocks)` for every live file in table
    /// order. Each call takes a fresh snapshot of the table; iterating
    /// the result performs no further IO.
    pub fn list(&mut self) -> Result<impl Iterator<Item = (String, usize)>, VolumeError> {
        let table = self.load_table()?;
        let entries: Vec<(String, usize)> = table
            .iter_used()
            .map(|node| (node.display_name(), node.size()))
            .collect();
        Ok(entries.into_iter())
    }

    /// Reads one whole block out of the named file. `block` is the
    /// position within the file, not a physical index.
    pub fn read_block(&mut self, name: &str, block: usize) -> Result<[u8; BLOCK_SIZE], VolumeError> {
        let physical = self.translate(name, block)?;
        let mut buf = [0u8; BLOCK_SIZE];
        self.dev
            .read_at(physical as u64 * BLOCK_SIZE as u64, &mut buf)?;
        Ok(buf)
    }

    /// Overwrites one whole block of the named file. Block ownership was
    /// fixed at creation, so no map or table metadata changes.
    pub fn write_block(
        &mut self,
        name: &str,
        block: usize,
        buf: &[u8; BLOCK_SIZE],
    ) -> Result<(), VolumeError> {
        let physical = self.translate(name, block)?;
        self.dev.write_at(physical as u64 * BLOCK_SIZE as u64, buf)?;
        self.dev.sync()?;
        Ok(())
    }

    /// Resolves a file's logical block position to its physical index.
    fn translate(&mut self, name: &str, block: usize) -> Result<u32, VolumeError> {
        let table = self.load_table()?;
        let slot = table
            .find_named(name.as_bytes())
            .ok_or(VolumeError::NotFound)?;
        let node = table.record(slot);
        if block >= node.size() {
            return Err(VolumeError::OutOfRange);
        }
        Ok(node.block_pointers()[block])
    }

    fn load_map(&mut self) -> Result<BlockMap, VolumeError> {
        let mut buf = [0u8; N_BLOCKS];
        self.dev.read_at(MAP_OFFSET, &mut buf)?;
        Ok(BlockMap::parse(&buf))
    }

    fn store_map(&mut self, map: &BlockMap) -> Result<(), VolumeError> {
        self.dev.write_at(MAP_OFFSET, map.serialize())?;
        Ok(())
    }

    fn load_table(&mut self) -> Result<InodeTable, VolumeError> {
        let mut buf = [0u8; TABLE_BYTES];
        self.dev.read_at(record_offset(0), &mut buf)?;
        Ok(InodeTable::parse(&buf))
    }

    fn store_record(&mut self, slot: usize, node: &Inode) -> Result<(), VolumeError> {
        self.dev.write_at(record_offset(slot), node.serialize())?;
        Ok(())
    }
}

/// Create-time name validation. Lookups deliberately skip this: a name
/// that cannot fit the fixed field simply never matches a record.
fn validate_name(name: &str) -> Result<&[u8], VolumeError> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > NAME_LEN {
        return Err(VolumeError::InvalidArgument(format!(
            "file names must be 1 to {} bytes",
            NAME_LEN
        )));
    }
    if bytes.contains(&0) {
        return Err(VolumeError::InvalidArgument(
            "file names must not contain NUL bytes".to_string(),
        ));
    }
    Ok(bytes)
}
