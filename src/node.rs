use crate::fs::{MAX_BLOCKS_PER_FILE, NAME_LEN, N_BLOCKS, N_INODES};
use zerocopy::{AsBytes, FromBytes};

/// On-disk size of one inode record.
pub const RECORD_SIZE: usize = 48;

/// Byte offset of the record stored in table slot `slot`. The table sits
/// immediately after the free-block map region.
pub fn record_offset(slot: usize) -> u64 {
    (N_BLOCKS + slot * RECORD_SIZE) as u64
}

/// Metadata record for one file. This structure __must stay exactly 48
/// bytes with no implicit padding__, it is persisted to the table region
/// byte for byte.
#[repr(C)]
#[derive(AsBytes, FromBytes, Clone, Copy)]
pub struct Inode {
    /// Nonzero when this record describes a live file.
    used: u8,
    /// File name, zero padded. All eight bytes are significant, so a
    /// maximum-length name carries no terminator.
    name: [u8; NAME_LEN],
    pad: [u8; 3],
    /// File length in blocks, fixed at creation.
    size: u32,
    /// Physical blocks backing the file, in the order they were
    /// allocated. Only the first `size` entries are meaningful.
    blocks: [u32; MAX_BLOCKS_PER_FILE],
}

impl Inode {
    fn empty() -> Self {
        Self {
            used: 0,
            name: [0; NAME_LEN],
            pad: [0; 3],
            size: 0,
            blocks: [0; MAX_BLOCKS_PER_FILE],
        }
    }

    /// Builds a live record for a freshly created file. `name` must fit
    /// the fixed field and `blocks` must already be marked occupied in the
    /// free-block map.
    pub fn assign(name: &[u8], blocks: &[u32]) -> Self {
        debug_assert!(!name.is_empty() && name.len() <= NAME_LEN);
        debug_assert!(blocks.len() <= MAX_BLOCKS_PER_FILE);
        let mut node = Self::empty();
        node.used = 1;
        node.name[..name.len()].copy_from_slice(name);
        node.size = blocks.len() as u32;
        node.blocks[..blocks.len()].copy_from_slice(blocks);
        node
    }

    /// Marks the record unused. The stale name, size, and pointers are
    /// left in place; an unused record is excluded from every scan, so
    /// they are inert.
    pub fn release(&mut self) {
        self.used = 0;
    }

    pub fn is_used(&self) -> bool {
        self.used != 0
    }

    pub fn size(&self) -> usize {
        self.size as usize
    }

    pub fn block_pointers(&self) -> &[u32] {
        &self.blocks[..self.size as usize]
    }

    /// The stored name up to its zero padding.
    fn name_bytes(&self) -> &[u8] {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_LEN);
        &self.name[..end]
    }

    fn name_matches(&self, name: &[u8]) -> bool {
        self.name_bytes() == name
    }

    pub fn display_name(&self) -> String {
        String::from_utf8_lossy(self.name_bytes()).into_owned()
    }

    pub fn serialize(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// The fixed table of inode records persisted after the free-block map.
/// Slot position carries no meaning beyond scan order; files are
/// identified by name.
pub struct InodeTable {
    records: [Inode; N_INODES],
}

impl InodeTable {
    /// Reads the whole table region. The buffer must hold all
    /// `N_INODES * RECORD_SIZE` bytes.
    pub fn parse(buf: &[u8]) -> Self {
        let mut records = [Inode::empty(); N_INODES];
        for (node, chunk) in records.iter_mut().zip(buf.chunks_exact(RECORD_SIZE)) {
            node.as_bytes_mut().copy_from_slice(chunk);
        }
        Self { records }
    }

    pub fn record(&self, slot: usize) -> &Inode {
        &self.records[slot]
    }

    pub fn record_mut(&mut self, slot: usize) -> &mut Inode {
        &mut self.records[slot]
    }

    /// Positional scan for the first unused slot.
    pub fn first_free(&self) -> Option<usize> {
        self.records.iter().position(|node| !node.is_used())
    }

    /// Positional scan for the first live record with this name.
    pub fn find_named(&self, name: &[u8]) -> Option<usize> {
        self.records
            .iter()
            .position(|node| node.is_used() && node.name_matches(name))
    }

    pub fn iter_used(&self) -> impl Iterator<Item = &Inode> {
        self.records.iter().filter(|node| node.is_used())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_matches_on_disk_layout_size() {
        assert_eq!(std::mem::size_of::<Inode>(), RECORD_SIZE);
    }

    #[test]
    fn record_offsets_follow_the_map_region() {
        assert_eq!(record_offset(0), N_BLOCKS as u64);
        assert_eq!(record_offset(3), (N_BLOCKS + 3 * RECORD_SIZE) as u64);
    }

    #[test]
    fn names_compare_up_to_their_zero_padding() {
        let node = Inode::assign(b"log", &[4, 5]);

        assert!(node.name_matches(b"log"));
        assert!(!node.name_matches(b"log0"));
        assert!(!node.name_matches(b"lo"));
    }

    #[test]
    fn full_width_names_match_without_a_terminator() {
        let node = Inode::assign(b"datafile", &[9]);

        assert!(node.name_matches(b"datafile"));
        assert_eq!(node.display_name(), "datafile");
    }

    #[test]
    fn released_records_keep_stale_fields_but_leave_scans() {
        let mut table = InodeTable::parse(&[0u8; N_INODES * RECORD_SIZE]);
        *table.record_mut(0) = Inode::assign(b"a", &[1, 2]);

        assert_eq!(table.find_named(b"a"), Some(0));
        assert_eq!(table.first_free(), Some(1));

        table.record_mut(0).release();

        assert_eq!(table.find_named(b"a"), None);
        assert_eq!(table.first_free(), Some(0));
        // The pointers survive in storage but are inert.
        assert_eq!(table.record(0).block_pointers(), &[1, 2]);
    }

    #[test]
    fn scans_resolve_to_the_first_slot_in_table_order() {
        let mut table = InodeTable::parse(&[0u8; N_INODES * RECORD_SIZE]);
        *table.record_mut(2) = Inode::assign(b"x", &[3]);
        *table.record_mut(5) = Inode::assign(b"x", &[4]);

        assert_eq!(table.find_named(b"x"), Some(2));
        assert_eq!(table.first_free(), Some(0));
    }

    #[test]
    fn table_round_trips_through_its_region_bytes() {
        let mut table = InodeTable::parse(&[0u8; N_INODES * RECORD_SIZE]);
        *table.record_mut(1) = Inode::assign(b"keep", &[7, 8, 9]);

        let mut region = vec![0u8; N_INODES * RECORD_SIZE];
        for (slot, chunk) in region.chunks_exact_mut(RECORD_SIZE).enumerate() {
            chunk.copy_from_slice(table.record(slot).serialize());
        }

        let reread = InodeTable::parse(&region);
        assert_eq!(reread.find_named(b"keep"), Some(1));
        assert_eq!(reread.record(1).block_pointers(), &[7, 8, 9]);
        assert_eq!(reread.record(1).size(), 3);
    }
}
