use std::fs::File;
use std::io::prelude::*;
use std::io::{BufWriter, ErrorKind, SeekFrom};

use crate::fs::BLOCK_SIZE;
use crate::io::Disk;

/// Emulates a fixed-length disk in userspace using a regular file as the
/// medium. This is only meant to be used for volume development and
/// testing.
pub struct FileDisk {
    /// The file must be a fixed-size file spanning the whole volume.
    fd: File,
    /// Total bytes addressable through this disk.
    len: u64,
}

impl FileDisk {
    /// Returns ownership of the underlying file descriptor to the caller.
    pub fn into_file(self) -> File {
        self.fd
    }

    fn check_range(&self, offset: u64, len: usize) -> std::io::Result<()> {
        if offset + len as u64 > self.len {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "range beyond end of medium",
            ));
        }
        Ok(())
    }
}

impl Disk for FileDisk {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        self.check_range(offset, buf.len())?;
        self.fd.seek(SeekFrom::Start(offset))?;
        self.fd.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> std::io::Result<()> {
        self.check_range(offset, buf.len())?;
        self.fd.seek(SeekFrom::Start(offset))?;
        self.fd.write_all(buf)?;
        Ok(())
    }

    fn sync(&mut self) -> std::io::Result<()> {
        self.fd.sync_all()?;
        Ok(())
    }
}

pub struct FileDiskBuilder {
    fd: File,
    block_count: usize,
    clear_medium: bool,
}

impl From<File> for FileDiskBuilder {
    fn from(fd: File) -> Self {
        FileDiskBuilder {
            fd,
            // A better default here might be the size of the file rounded
            // down to the nearest block.
            block_count: 0,
            clear_medium: true,
        }
    }
}

impl FileDiskBuilder {
    /// Sets the number of desired blocks on the emulated disk.
    pub fn with_block_count(mut self, blocks: usize) -> Self {
        self.block_count = blocks;
        self
    }

    /// Controls whether the medium is zeroed out during `build`. Pass
    /// `false` to adopt an already-initialized image.
    pub fn clear_medium(mut self, clear: bool) -> Self {
        self.clear_medium = clear;
        self
    }

    /// This builder assumes ownership of the file descriptor used and does
    /// destructive things to prepare the file for use unless `clear_medium`
    /// was disabled. Ownership of the file is transferred to the emulator,
    /// meaning this builder can only be used to create one disk.
    pub fn build(mut self) -> std::io::Result<FileDisk> {
        debug_assert!(self.block_count > 0);
        if self.clear_medium {
            self.zero_medium()?;
        }
        Ok(FileDisk {
            len: (self.block_count * BLOCK_SIZE) as u64,
            fd: self.fd,
        })
    }

    fn zero_medium(&mut self) -> std::io::Result<()> {
        let mut bfd = BufWriter::new(&self.fd);
        // Zero out the "disk", buffering each write to prevent excessive
        // syscalls.
        for _ in 0..self.block_count {
            bfd.write_all(&[0u8; BLOCK_SIZE])?;
        }
        bfd.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emulator_allocates_correct_num_bytes() {
        let image = tempfile::tempfile().unwrap();
        let mut disk = FileDiskBuilder::from(image)
            .with_block_count(4)
            .build()
            .expect("failed to allocate disk image");
        disk.sync().unwrap();
        assert_eq!(
            disk.into_file().metadata().unwrap().len(),
            (4 * BLOCK_SIZE) as u64
        );
    }

    #[test]
    fn can_read_and_write_at_offsets() {
        let image = tempfile::tempfile().unwrap();
        let mut disk = FileDiskBuilder::from(image)
            .with_block_count(4)
            .build()
            .expect("failed to allocate disk image");

        disk.write_at(2 * BLOCK_SIZE as u64, &[0x55; BLOCK_SIZE]).unwrap();
        disk.sync().unwrap();

        // An untouched region reads back zeroed.
        let mut buf = [0xff; BLOCK_SIZE];
        disk.read_at(3 * BLOCK_SIZE as u64, &mut buf).unwrap();
        assert_eq!(&buf[..], &[0x00; BLOCK_SIZE][..]);

        disk.read_at(2 * BLOCK_SIZE as u64, &mut buf).unwrap();
        assert_eq!(&buf[..], &[0x55; BLOCK_SIZE][..]);
    }

    #[test]
    fn rejects_ranges_beyond_the_medium() {
        let image = tempfile::tempfile().unwrap();
        let mut disk = FileDiskBuilder::from(image)
            .with_block_count(1)
            .build()
            .expect("failed to allocate disk image");

        let mut buf = [0u8; BLOCK_SIZE];
        assert!(disk.read_at(1, &mut buf).is_err());
        assert!(disk.write_at(BLOCK_SIZE as u64, &[1u8]).is_err());

        // The final in-range byte is still addressable.
        disk.write_at(BLOCK_SIZE as u64 - 1, &[1u8]).unwrap();
    }

    #[test]
    fn adopting_existing_medium_preserves_content() {
        let image = tempfile::NamedTempFile::new().unwrap();
        let mut disk = FileDiskBuilder::from(image.reopen().unwrap())
            .with_block_count(2)
            .build()
            .unwrap();
        disk.write_at(10, b"persisted").unwrap();
        disk.sync().unwrap();

        let mut reopened = FileDiskBuilder::from(image.reopen().unwrap())
            .with_block_count(2)
            .clear_medium(false)
            .build()
            .unwrap();
        let mut buf = [0u8; 9];
        reopened.read_at(10, &mut buf).unwrap();
        assert_eq!(&buf, b"persisted");
    }
}
