mod emulator;

pub use emulator::{FileDisk, FileDiskBuilder};

/// The byte-addressable backing store a volume is persisted into. The
/// volume core performs its own address translation, so the interface is
/// plain positioned I/O rather than block I/O.
pub trait Disk {
    /// Reads exactly `buf.len()` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Attempting to read a range beyond the end of the medium returns an
    /// error.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<()>;
    /// Writes the whole buffer starting at `offset`.
    ///
    /// # Errors
    ///
    /// Attempting to write a range beyond the end of the medium returns an
    /// error.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> std::io::Result<()>;
    /// Flushes any buffered disk IO from memory. Once this returns the
    /// preceding writes must be durable on the medium.
    fn sync(&mut self) -> std::io::Result<()>;
}
