/// Capabilities over a foreign process's address space
///
/// Everything that touches the target goes through these traits so the core can run
/// against a simulated address space in tests.

use super::error::Result;

const C_STRING_CHUNK: usize = 64;

/// A module loaded in the target process
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub base_address: usize,
    pub size: usize,
}

/// Finds a module by name, ignoring case
pub fn find_module<'a>(modules: &'a [ModuleInfo], name: &str) -> Option<&'a ModuleInfo> {
    modules.iter().find(|m| m.name.eq_ignore_ascii_case(name))
}

/// Byte-level read/write access keyed by absolute address
pub trait ProcessMemory {
    /// Reads exactly `buf.len()` bytes starting at `address`
    fn read(&self, address: usize, buf: &mut [u8]) -> Result<()>;

    /// Writes `data` at `address`
    fn write(&self, address: usize, data: &[u8]) -> Result<()>;

    /// Whether the process is still running
    fn is_alive(&self) -> bool;

    fn read_bytes(&self, address: usize, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read(address, &mut buf)?;
        Ok(buf)
    }

    fn read_u16(&self, address: usize) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read(address, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32(&self, address: usize) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read(address, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Reads a null-terminated single-byte string of at most `max_len` bytes
    ///
    /// Reads in chunks. A chunk that runs past the end of a mapping is retried a byte
    /// at a time, so a string ending right before unreadable memory still reads.
    fn read_c_string(&self, address: usize, max_len: usize) -> Result<String> {
        let mut out = Vec::new();
        let mut chunk = [0u8; C_STRING_CHUNK];
        while out.len() < max_len {
            let at = address + out.len();
            let len = C_STRING_CHUNK.min(max_len - out.len());
            let buf = &mut chunk[..len];
            if self.read(at, buf).is_err() {
                for (i, byte) in buf.iter_mut().enumerate() {
                    let mut one = [0u8; 1];
                    self.read(at + i, &mut one)?;
                    *byte = one[0];
                    if one[0] == 0 {
                        break;
                    }
                }
            }
            match buf.iter().position(|&b| b == 0) {
                Some(end) => {
                    out.extend_from_slice(&buf[..end]);
                    break;
                }
                None => out.extend_from_slice(buf),
            }
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

/// Code-level access needed to install and remove detours
pub trait ProcessCode: ProcessMemory {
    /// Allocates zeroed executable memory in the target
    fn allocate(&self, size: usize) -> Result<usize>;

    /// Writes into code pages, lifting their protection for the duration of the write
    /// and flushing the instruction cache afterwards
    fn write_code(&self, address: usize, data: &[u8]) -> Result<()>;

    /// Suspends every thread of the target
    fn suspend(&self) -> Result<()>;

    /// Resumes the threads suspended by [`ProcessCode::suspend`]
    fn resume(&self) -> Result<()>;
}

/// Keeps the target suspended until dropped
pub struct SuspendGuard<'a> {
    process: &'a dyn ProcessCode,
}

impl<'a> SuspendGuard<'a> {
    pub fn new(process: &'a dyn ProcessCode) -> Result<Self> {
        process.suspend()?;
        Ok(Self { process })
    }
}

impl Drop for SuspendGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.process.resume() {
            tracing::error!("Failed to resume target process: {}", e);
        }
    }
}
