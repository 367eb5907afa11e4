/// In-memory stand-in for a foreign process
///
/// Backs every test that would otherwise need a live game: watchers poll it, the
/// injector allocates and patches code in it, and `ImageBuilder` lays out a PE32
/// image with an export table so symbol resolution runs against real header bytes.

use super::access::{ModuleInfo, ProcessCode, ProcessMemory};
use super::error::{MemoryError, Result};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

const ALLOCATION_BASE: usize = 0x0100_0000;
const PAGE_SIZE: usize = 0x1000;

/// A write into code memory, as observed by the simulator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeWrite {
    pub address: usize,
    pub data: Vec<u8>,
    pub suspended: bool,
}

#[derive(Debug)]
pub struct SimulatedProcess {
    regions: RefCell<BTreeMap<usize, Vec<u8>>>,
    next_allocation: Cell<usize>,
    suspend_depth: Cell<u32>,
    alive: Cell<bool>,
    reads: Cell<usize>,
    code_writes: RefCell<Vec<CodeWrite>>,
}

impl Default for SimulatedProcess {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedProcess {
    pub fn new() -> Self {
        Self {
            regions: RefCell::new(BTreeMap::new()),
            next_allocation: Cell::new(ALLOCATION_BASE),
            suspend_depth: Cell::new(0),
            alive: Cell::new(true),
            reads: Cell::new(0),
            code_writes: RefCell::new(Vec::new()),
        }
    }

    /// Number of `read` calls made so far, failed ones included
    pub fn read_count(&self) -> usize {
        self.reads.get()
    }

    /// Maps a zeroed region at a fixed address
    pub fn map(&self, base: usize, size: usize) {
        self.regions.borrow_mut().insert(base, vec![0u8; size]);
    }

    /// Writes directly, bypassing the process-state checks
    pub fn poke(&self, address: usize, data: &[u8]) {
        let mut regions = self.regions.borrow_mut();
        let (base, bytes) = regions
            .range_mut(..=address)
            .next_back()
            .filter(|(base, bytes)| address + data.len() <= **base + bytes.len())
            .unwrap_or_else(|| panic!("poke outside mapped memory at 0x{:X}", address));
        let offset = address - *base;
        bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    pub fn poke_u32(&self, address: usize, value: u32) {
        self.poke(address, &value.to_le_bytes());
    }

    pub fn poke_utf16(&self, address: usize, text: &str) {
        let mut bytes: Vec<u8> = text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        bytes.extend_from_slice(&[0, 0]);
        self.poke(address, &bytes);
    }

    /// Simulates the process exiting; every access fails from now on
    pub fn kill(&self) {
        self.alive.set(false);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspend_depth.get() > 0
    }

    pub fn code_writes(&self) -> Vec<CodeWrite> {
        self.code_writes.borrow().clone()
    }

    fn with_range<T>(
        &self,
        address: usize,
        len: usize,
        f: impl FnOnce(&mut [u8]) -> T,
    ) -> Option<T> {
        if !self.alive.get() {
            return None;
        }
        let mut regions = self.regions.borrow_mut();
        let (base, bytes) = regions.range_mut(..=address).next_back()?;
        let offset = address - *base;
        let end = offset.checked_add(len)?;
        if end > bytes.len() {
            return None;
        }
        Some(f(&mut bytes[offset..end]))
    }
}

impl ProcessMemory for SimulatedProcess {
    fn read(&self, address: usize, buf: &mut [u8]) -> Result<()> {
        self.reads.set(self.reads.get() + 1);
        self.with_range(address, buf.len(), |src| buf.copy_from_slice(src))
            .ok_or(MemoryError::ReadFailure { address, len: buf.len() })
    }

    fn write(&self, address: usize, data: &[u8]) -> Result<()> {
        self.with_range(address, data.len(), |dst| dst.copy_from_slice(data))
            .ok_or(MemoryError::WriteFailure { address, len: data.len() })
    }

    fn is_alive(&self) -> bool {
        self.alive.get()
    }
}

impl ProcessCode for SimulatedProcess {
    fn allocate(&self, size: usize) -> Result<usize> {
        if !self.alive.get() {
            return Err(MemoryError::AllocationFailed { size });
        }
        let base = self.next_allocation.get();
        let pages = size.div_ceil(PAGE_SIZE).max(1);
        self.next_allocation.set(base + pages * PAGE_SIZE);
        self.map(base, pages * PAGE_SIZE);
        Ok(base)
    }

    fn write_code(&self, address: usize, data: &[u8]) -> Result<()> {
        self.write(address, data)?;
        self.code_writes.borrow_mut().push(CodeWrite {
            address,
            data: data.to_vec(),
            suspended: self.is_suspended(),
        });
        Ok(())
    }

    fn suspend(&self) -> Result<()> {
        if !self.alive.get() {
            return Err(MemoryError::ProcessGone);
        }
        self.suspend_depth.set(self.suspend_depth.get() + 1);
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        let depth = self.suspend_depth.get();
        if depth == 0 {
            return Err(MemoryError::SuspendFailed("process is not suspended".into()));
        }
        self.suspend_depth.set(depth - 1);
        Ok(())
    }
}

/// Builds a minimal PE32 image with named exports inside a [`SimulatedProcess`]
pub struct ImageBuilder {
    name: String,
    base: usize,
    exports: Vec<(String, Vec<u8>)>,
}

impl ImageBuilder {
    const E_LFANEW: usize = 0x40;
    const OPTIONAL_HEADER: usize = Self::E_LFANEW + 4 + 20;
    const EXPORT_DIR: usize = 0x200;
    const CODE_START: usize = 0x1000;
    const CODE_STRIDE: usize = 0x100;

    pub fn new(name: &str, base: usize) -> Self {
        Self {
            name: name.to_string(),
            base,
            exports: Vec::new(),
        }
    }

    /// Adds an exported function whose body starts with `code`
    pub fn export(mut self, symbol: &str, code: &[u8]) -> Self {
        self.exports.push((symbol.to_string(), code.to_vec()));
        self
    }

    /// Maps the image and returns its module entry plus each export's address
    pub fn load(self, process: &SimulatedProcess) -> (ModuleInfo, Vec<usize>) {
        let count = self.exports.len();
        let size = Self::CODE_START + (count + 1) * Self::CODE_STRIDE;
        process.map(self.base, size);

        let mut image = vec![0u8; size];
        image[0..2].copy_from_slice(b"MZ");
        put_u32(&mut image, 0x3C, Self::E_LFANEW as u32);
        image[Self::E_LFANEW..Self::E_LFANEW + 4].copy_from_slice(b"PE\0\0");
        image[Self::OPTIONAL_HEADER..Self::OPTIONAL_HEADER + 2]
            .copy_from_slice(&0x10Bu16.to_le_bytes());

        let functions = Self::EXPORT_DIR + 0x28;
        let names = functions + count * 4;
        let ordinals = names + count * 4;
        let mut strings = ordinals + count * 2;

        let mut addresses = Vec::with_capacity(count);
        for (i, (symbol, code)) in self.exports.iter().enumerate() {
            let code_rva = Self::CODE_START + i * Self::CODE_STRIDE;
            image[code_rva..code_rva + code.len()].copy_from_slice(code);
            put_u32(&mut image, functions + i * 4, code_rva as u32);
            put_u32(&mut image, names + i * 4, strings as u32);
            image[ordinals + i * 2..ordinals + i * 2 + 2].copy_from_slice(&(i as u16).to_le_bytes());
            image[strings..strings + symbol.len()].copy_from_slice(symbol.as_bytes());
            strings += symbol.len() + 1;
            addresses.push(self.base + code_rva);
        }
        assert!(strings <= Self::CODE_START, "export names overflow the header area");

        let export_size = strings - Self::EXPORT_DIR;
        let data_directory = Self::OPTIONAL_HEADER + 0x60;
        put_u32(&mut image, data_directory, Self::EXPORT_DIR as u32);
        put_u32(&mut image, data_directory + 4, export_size as u32);

        put_u32(&mut image, Self::EXPORT_DIR + 0x10, 1);
        put_u32(&mut image, Self::EXPORT_DIR + 0x14, count as u32);
        put_u32(&mut image, Self::EXPORT_DIR + 0x18, count as u32);
        put_u32(&mut image, Self::EXPORT_DIR + 0x1C, functions as u32);
        put_u32(&mut image, Self::EXPORT_DIR + 0x20, names as u32);
        put_u32(&mut image, Self::EXPORT_DIR + 0x24, ordinals as u32);

        process.poke(self.base, &image);

        let module = ModuleInfo {
            name: self.name,
            base_address: self.base,
            size,
        };
        (module, addresses)
    }
}

fn put_u32(image: &mut [u8], offset: usize, value: u32) {
    image[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
