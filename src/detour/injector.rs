use super::error::{DetourError, Result};
use super::pattern::{to_hex, Assembled};
use super::spec::{DetourSpec, Fill, JMP_REL32_LEN};
use crate::memory::{find_module, pe, ModuleInfo, ProcessCode, SuspendGuard};
use tracing::{debug, info, warn};

const JMP_REL32: u8 = 0xE9;
const NOP: u8 = 0x90;

/// Cells allocated in the target that the injected code writes and the watchers read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cells {
    pub status: usize,
    pub level: usize,
    /// Level buffer size in UTF-16 units, terminator included
    pub level_capacity: usize,
}

/// An installed detour
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetourPatch {
    pub name: &'static str,
    pub target_address: usize,
    /// Bytes that were at the target before patching
    pub original_bytes: Vec<u8>,
    /// Bytes written over the target: a jump to the body, padded with `nop`
    pub patched_bytes: Vec<u8>,
    pub body_address: usize,
    /// Detour body followed by the gate (relocated prologue + jump back)
    pub body: Vec<u8>,
    pub status_flag_address: usize,
}

/// Installs detours into one target process and restores them on detach
#[derive(Debug, Default)]
pub struct Injector {
    cells: Option<Cells>,
    patches: Vec<DetourPatch>,
}

impl Injector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cells(&self) -> Option<Cells> {
        self.cells
    }

    pub fn patches(&self) -> &[DetourPatch] {
        &self.patches
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.patches.iter().any(|p| p.name == name)
    }

    /// Allocates the status cell and a level buffer of `level_capacity` UTF-16 units
    ///
    /// Calling it again returns the cells already allocated.
    pub fn allocate_cells(&mut self, process: &dyn ProcessCode, level_capacity: usize) -> Result<Cells> {
        if let Some(cells) = self.cells {
            return Ok(cells);
        }

        let level_capacity = level_capacity.max(2);
        let base = process.allocate(4 + level_capacity * 2)?;
        let cells = Cells {
            status: base,
            level: base + 4,
            level_capacity,
        };
        check_addressable(cells.level + level_capacity * 2)?;

        debug!(
            "Allocated cells: status=0x{:X} level=0x{:X} ({} chars)",
            cells.status, cells.level, level_capacity
        );
        self.cells = Some(cells);
        Ok(cells)
    }

    /// Resolves, links and writes the detour described by `spec`
    ///
    /// Installing the same detour twice is a no-op when the resulting bytes are
    /// identical; anything else already patched at the same name or target is a conflict.
    pub fn install(
        &mut self,
        process: &dyn ProcessCode,
        modules: &[ModuleInfo],
        spec: &DetourSpec,
    ) -> Result<&DetourPatch> {
        let cells = self.cells.ok_or(DetourError::CellsNotAllocated)?;
        let prologue = spec.prologue()?;
        spec.validate()?;

        let target = resolve_symbol(process, modules, spec)?;

        if let Some(index) = self
            .patches
            .iter()
            .position(|p| p.name == spec.name || p.target_address == target)
        {
            let existing = &self.patches[index];
            let (body, stub) = link(spec, cells, existing.body_address, target, &existing.original_bytes)?;
            let identical = existing.name == spec.name
                && existing.target_address == target
                && existing.body == body
                && existing.patched_bytes == stub;
            if !identical {
                return Err(DetourError::DetourConflict {
                    name: spec.name.to_string(),
                    address: existing.target_address,
                });
            }
            debug!("Detour {} already installed at 0x{:X}", spec.name, target);
            return Ok(&self.patches[index]);
        }

        let original = process.read_bytes(target, prologue.len())?;
        if !prologue.matches(&original) {
            return Err(DetourError::PrologueMismatch {
                name: spec.name.to_string(),
                found: to_hex(&original),
            });
        }

        let template_len = Assembled::parse(spec.template)?.len();
        let body_address = process.allocate(template_len + original.len() + JMP_REL32_LEN)?;
        let (body, stub) = link(spec, cells, body_address, target, &original)?;

        process.write_code(body_address, &body)?;
        {
            let _suspended = SuspendGuard::new(process)?;
            process.write_code(target, &stub)?;
        }

        info!(
            "Installed detour {} at 0x{:X} (body at 0x{:X})",
            spec.name, target, body_address
        );

        self.patches.push(DetourPatch {
            name: spec.name,
            target_address: target,
            original_bytes: original,
            patched_bytes: stub,
            body_address,
            body,
            status_flag_address: cells.status,
        });
        Ok(&self.patches[self.patches.len() - 1])
    }

    /// Writes the original bytes back over every patched target
    ///
    /// Skipped when the process is gone. Bodies and cells stay allocated: a thread may
    /// still be returning through a body when the entry is restored.
    pub fn restore_all(&mut self, process: &dyn ProcessCode) -> Result<()> {
        let patches = std::mem::take(&mut self.patches);
        self.cells = None;

        if patches.is_empty() {
            return Ok(());
        }
        if !process.is_alive() {
            info!("Process exited, discarding {} detour(s)", patches.len());
            return Ok(());
        }

        let _suspended = SuspendGuard::new(process)?;
        let mut first_error = None;
        for patch in patches.iter().rev() {
            match process.write_code(patch.target_address, &patch.original_bytes) {
                Ok(()) => info!("Restored {} at 0x{:X}", patch.name, patch.target_address),
                Err(e) => {
                    warn!("Failed to restore {} at 0x{:X}: {}", patch.name, patch.target_address, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Forgets all patches without touching the process
    pub fn discard(&mut self) {
        if !self.patches.is_empty() {
            debug!("Discarding {} detour(s)", self.patches.len());
        }
        self.patches.clear();
        self.cells = None;
    }
}

fn resolve_symbol(process: &dyn ProcessCode, modules: &[ModuleInfo], spec: &DetourSpec) -> Result<usize> {
    let not_found = || DetourError::SymbolNotFound {
        module: spec.module.to_string(),
        symbol: spec.symbol.to_string(),
    };

    let module = find_module(modules, spec.module).ok_or_else(not_found)?;
    let target = pe::find_export(process, module.base_address, spec.symbol)?.ok_or_else(not_found)?;
    check_addressable(target)?;
    Ok(target)
}

/// Builds the body (template + gate) for `body_address` and the entry stub for `target`
fn link(
    spec: &DetourSpec,
    cells: Cells,
    body_address: usize,
    target: usize,
    original: &[u8],
) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut code = spec.validate()?;
    let gate = body_address + code.len();
    check_addressable(gate + original.len() + JMP_REL32_LEN)?;

    let offsets: Vec<usize> = code.placeholders().iter().map(|p| p.offset).collect();
    for (index, (fill, offset)) in spec.fills.iter().zip(offsets).enumerate() {
        let value = match fill {
            Fill::StatusCell => cells.status as u32,
            Fill::LevelCell => cells.level as u32,
            Fill::LevelCapacity => (cells.level_capacity - 1) as u32,
            Fill::Status(status) => status.raw(),
            Fill::CallOriginal => rel32(body_address + offset + 4, gate),
        };
        code.fill_u32(index, value)?;
    }

    let mut body = code.into_bytes();
    body.extend_from_slice(original);
    body.extend_from_slice(&jmp(gate + original.len(), target + original.len()));

    let mut stub = jmp(target, body_address).to_vec();
    stub.resize(original.len(), NOP);

    Ok((body, stub))
}

fn jmp(from: usize, to: usize) -> [u8; JMP_REL32_LEN] {
    let rel = rel32(from + JMP_REL32_LEN, to).to_le_bytes();
    [JMP_REL32, rel[0], rel[1], rel[2], rel[3]]
}

/// Displacement for a relative branch whose next instruction starts at `next`
fn rel32(next: usize, to: usize) -> u32 {
    (to as u32).wrapping_sub(next as u32)
}

fn check_addressable(address: usize) -> Result<()> {
    if address > u32::MAX as usize {
        return Err(DetourError::AddressOutOfRange(address));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detour::templates::LOAD_MAP;
    use crate::memory::sim::{ImageBuilder, SimulatedProcess};
    use crate::memory::ProcessMemory;
    use crate::types::Status;

    const PROLOGUE: [u8; 8] = [0x55, 0x8B, 0xEC, 0x6A, 0xFF, 0x68, 0x10, 0x20];

    const SAVE: DetourSpec = DetourSpec {
        name: "save",
        module: "Game.dll",
        symbol: "?Save@@X",
        prologue: "55 8B EC 6A FF",
        template: "
            C7 05 #4 #4     // mov dword ptr [status],SAVING
            E8 #4           // call original
            C7 05 #4 #4     // mov dword ptr [status],NONE
            C3              // ret
        ",
        fills: &[
            Fill::StatusCell,
            Fill::Status(Status::Saving),
            Fill::CallOriginal,
            Fill::StatusCell,
            Fill::Status(Status::None),
        ],
    };

    fn setup() -> (SimulatedProcess, Vec<ModuleInfo>, usize) {
        let process = SimulatedProcess::new();
        let (module, addresses) = ImageBuilder::new("Game.dll", 0x1000_0000)
            .export("?Save@@X", &PROLOGUE)
            .load(&process);
        (process, vec![module], addresses[0])
    }

    fn read_u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn test_install_writes_jump_and_gate() {
        let (process, modules, target) = setup();
        let mut injector = Injector::new();
        let cells = injector.allocate_cells(&process, 64).unwrap();

        let patch = injector.install(&process, &modules, &SAVE).unwrap().clone();

        assert_eq!(patch.target_address, target);
        assert_eq!(patch.original_bytes, PROLOGUE[..5].to_vec());
        assert_eq!(patch.status_flag_address, cells.status);

        // entry: jmp body
        let entry = process.read_bytes(target, 5).unwrap();
        assert_eq!(entry[0], 0xE9);
        assert_eq!(
            (target as u32 + 5).wrapping_add(read_u32_at(&entry, 1)),
            patch.body_address as u32
        );

        // body: status cell and value filled in
        assert_eq!(read_u32_at(&patch.body, 2), cells.status as u32);
        assert_eq!(read_u32_at(&patch.body, 6), Status::Saving.raw());

        // call lands on the gate, which replays the prologue and jumps past it
        let gate = patch.body_address + 26;
        let call_next = patch.body_address + 15;
        assert_eq!(patch.body.len(), 26 + 5 + 5);
        assert_eq!(patch.body[10], 0xE8);
        assert_eq!((call_next as u32).wrapping_add(read_u32_at(&patch.body, 11)), gate as u32);
        assert_eq!(&patch.body[26..31], &PROLOGUE[..5]);
        assert_eq!(patch.body[31], 0xE9);
        assert_eq!(
            (gate as u32 + 10).wrapping_add(read_u32_at(&patch.body, 32)),
            target as u32 + 5
        );

        assert_eq!(process.read_bytes(patch.body_address, patch.body.len()).unwrap(), patch.body);
    }

    #[test]
    fn test_entry_written_while_suspended() {
        let (process, modules, target) = setup();
        let mut injector = Injector::new();
        injector.allocate_cells(&process, 64).unwrap();
        injector.install(&process, &modules, &SAVE).unwrap();

        let entry_write = process
            .code_writes()
            .into_iter()
            .find(|w| w.address == target)
            .unwrap();
        assert!(entry_write.suspended);
        assert!(!process.is_suspended());
    }

    #[test]
    fn test_restore_is_exact() {
        let (process, modules, target) = setup();
        let before = process.read_bytes(target, PROLOGUE.len()).unwrap();

        let mut injector = Injector::new();
        injector.allocate_cells(&process, 64).unwrap();
        injector.install(&process, &modules, &SAVE).unwrap();
        assert_ne!(process.read_bytes(target, PROLOGUE.len()).unwrap(), before);

        injector.restore_all(&process).unwrap();
        assert_eq!(process.read_bytes(target, PROLOGUE.len()).unwrap(), before);
        assert!(injector.patches().is_empty());
        assert!(!process.is_suspended());
    }

    #[test]
    fn test_restore_skipped_when_process_gone() {
        let (process, modules, _) = setup();
        let mut injector = Injector::new();
        injector.allocate_cells(&process, 64).unwrap();
        injector.install(&process, &modules, &SAVE).unwrap();

        process.kill();
        injector.restore_all(&process).unwrap();
        assert!(injector.patches().is_empty());
    }

    #[test]
    fn test_reinstall_identical_is_noop() {
        let (process, modules, _) = setup();
        let mut injector = Injector::new();
        injector.allocate_cells(&process, 64).unwrap();
        let first = injector.install(&process, &modules, &SAVE).unwrap().clone();
        let writes = process.code_writes().len();

        let second = injector.install(&process, &modules, &SAVE).unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(process.code_writes().len(), writes);
        assert_eq!(injector.patches().len(), 1);
    }

    #[test]
    fn test_reinstall_different_conflicts() {
        let (process, modules, _) = setup();
        let mut injector = Injector::new();
        injector.allocate_cells(&process, 64).unwrap();
        injector.install(&process, &modules, &SAVE).unwrap();

        let other = DetourSpec {
            name: "other",
            template: "E8 #4\nC3",
            fills: &[Fill::CallOriginal],
            ..SAVE
        };
        let err = injector.install(&process, &modules, &other).unwrap_err();
        assert!(matches!(err, DetourError::DetourConflict { .. }));
        assert!(err.is_definition_error());
    }

    #[test]
    fn test_missing_symbol_is_unsupported_build() {
        let (process, _, _) = setup();
        let mut injector = Injector::new();
        injector.allocate_cells(&process, 64).unwrap();

        let err = injector.install(&process, &[], &SAVE).unwrap_err();
        assert!(matches!(err, DetourError::SymbolNotFound { .. }));
        assert!(err.is_unsupported_build());

        let (process, modules, _) = setup();
        let spec = DetourSpec { symbol: "?Missing@@X", ..SAVE };
        injector.discard();
        injector.allocate_cells(&process, 64).unwrap();
        let err = injector.install(&process, &modules, &spec).unwrap_err();
        assert!(err.is_unsupported_build());
    }

    #[test]
    fn test_prologue_mismatch_leaves_code_untouched() {
        let process = SimulatedProcess::new();
        let (module, addresses) = ImageBuilder::new("Game.dll", 0x1000_0000)
            .export("?Save@@X", &[0x53, 0x56, 0x57, 0x8B, 0xF1])
            .load(&process);
        let mut injector = Injector::new();
        injector.allocate_cells(&process, 64).unwrap();

        let err = injector.install(&process, &[module], &SAVE).unwrap_err();
        assert!(matches!(err, DetourError::PrologueMismatch { .. }));
        assert!(err.is_unsupported_build());
        assert_eq!(
            process.read_bytes(addresses[0], 5).unwrap(),
            vec![0x53, 0x56, 0x57, 0x8B, 0xF1]
        );
        assert!(process.code_writes().is_empty());
    }

    #[test]
    fn test_install_requires_cells() {
        let (process, modules, _) = setup();
        let mut injector = Injector::new();
        assert!(matches!(
            injector.install(&process, &modules, &SAVE),
            Err(DetourError::CellsNotAllocated)
        ));
    }

    #[test]
    fn test_stub_padded_with_nops() {
        let process = SimulatedProcess::new();
        let code = [0x55, 0x8B, 0xEC, 0x83, 0xEC, 0x08, 0x53];
        let (module, addresses) = ImageBuilder::new("Game.dll", 0x1000_0000)
            .export("?Save@@X", &code)
            .load(&process);
        let spec = DetourSpec { prologue: "55 8B EC 83 EC ??", ..SAVE };

        let mut injector = Injector::new();
        injector.allocate_cells(&process, 64).unwrap();
        let patch = injector.install(&process, &[module], &spec).unwrap().clone();

        assert_eq!(patch.patched_bytes.len(), 6);
        assert_eq!(patch.patched_bytes[5], 0x90);
        assert_eq!(process.read_bytes(addresses[0] + 6, 1).unwrap(), vec![0x53]);
    }

    #[test]
    fn test_load_map_fills_level_buffer_fields() {
        let process = SimulatedProcess::new();
        let (module, _) = ImageBuilder::new("Engine.dll", 0x1000_0000)
            .export(LOAD_MAP.symbol, &PROLOGUE)
            .load(&process);
        let mut injector = Injector::new();
        let cells = injector.allocate_cells(&process, 256).unwrap();

        let patch = injector.install(&process, &[module], &LOAD_MAP).unwrap().clone();
        let assembled = LOAD_MAP.validate().unwrap();
        let placeholders = assembled.placeholders();

        assert_eq!(read_u32_at(&patch.body, placeholders[0].offset), cells.status as u32);
        assert_eq!(read_u32_at(&patch.body, placeholders[1].offset), Status::Loading.raw());
        assert_eq!(read_u32_at(&patch.body, placeholders[2].offset), cells.level as u32);
        assert_eq!(read_u32_at(&patch.body, placeholders[3].offset), 255);
        assert_eq!(read_u32_at(&patch.body, placeholders[6].offset), Status::None.raw());
    }
}
