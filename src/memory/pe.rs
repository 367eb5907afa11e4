/// Remote PE export resolution
///
/// Reads the headers of a module that is already mapped in the target and walks its
/// export table, so symbols are resolved against the exact build that is running.

use super::access::ProcessMemory;
use super::error::Result;

const DOS_SIGNATURE: u16 = 0x5A4D; // MZ
const NT_SIGNATURE: u32 = 0x0000_4550; // PE\0\0
const PE32_MAGIC: u16 = 0x10B;
const PE32PLUS_MAGIC: u16 = 0x20B;
const FILE_HEADER_SIZE: usize = 20;
const MAX_SYMBOL_LEN: usize = 512;

/// Location of the export directory inside a module
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExportDirectory {
    pub address: usize,
    pub size: usize,
}

/// Reads the export data directory of the module at `base`
///
/// Returns `Ok(None)` when the image is not a PE or has no exports.
pub fn export_directory<M: ProcessMemory + ?Sized>(mem: &M, base: usize) -> Result<Option<ExportDirectory>> {
    if mem.read_u16(base)? != DOS_SIGNATURE {
        return Ok(None);
    }

    let nt = base + mem.read_u32(base + 0x3C)? as usize;
    if mem.read_u32(nt)? != NT_SIGNATURE {
        return Ok(None);
    }

    let optional_header = nt + 4 + FILE_HEADER_SIZE;
    let data_directories = match mem.read_u16(optional_header)? {
        PE32_MAGIC => optional_header + 0x60,
        PE32PLUS_MAGIC => optional_header + 0x70,
        _ => return Ok(None),
    };

    let rva = mem.read_u32(data_directories)? as usize;
    let size = mem.read_u32(data_directories + 4)? as usize;
    if rva == 0 || size == 0 {
        return Ok(None);
    }

    Ok(Some(ExportDirectory {
        address: base + rva,
        size,
    }))
}

/// Resolves an exported symbol of the module at `base` to an absolute address
///
/// Forwarded exports are not followed and resolve to `None`.
pub fn find_export<M: ProcessMemory + ?Sized>(mem: &M, base: usize, symbol: &str) -> Result<Option<usize>> {
    let Some(dir) = export_directory(mem, base)? else {
        return Ok(None);
    };

    let num_functions = mem.read_u32(dir.address + 0x14)? as usize;
    let num_names = mem.read_u32(dir.address + 0x18)? as usize;
    let functions = base + mem.read_u32(dir.address + 0x1C)? as usize;
    let names = base + mem.read_u32(dir.address + 0x20)? as usize;
    let ordinals = base + mem.read_u32(dir.address + 0x24)? as usize;

    for i in 0..num_names {
        let name_rva = mem.read_u32(names + i * 4)? as usize;
        if name_rva == 0 {
            continue;
        }
        if mem.read_c_string(base + name_rva, MAX_SYMBOL_LEN)? != symbol {
            continue;
        }

        let index = mem.read_u16(ordinals + i * 2)? as usize;
        if index >= num_functions {
            return Ok(None);
        }

        let address = base + mem.read_u32(functions + index * 4)? as usize;
        if address >= dir.address && address < dir.address + dir.size {
            tracing::debug!("Export {} is forwarded, not following", symbol);
            return Ok(None);
        }
        return Ok(Some(address));
    }

    Ok(None)
}
