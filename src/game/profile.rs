/// Per-title descriptors
///
/// A profile is plain data: which processes it applies to, where the watched
/// values live, which levels it knows about and which detours make its loads
/// observable. Behavior shared by every title lives in the transition engine.

use super::error::{ProfileError, Result};
use crate::detour::{Cells, DetourSpec};
use crate::memory::{find_module, pe, MemoryWatcher, ModuleInfo, ProcessMemory, WatcherList};
use crate::types::{TextEncoding, ValueType};

/// Watch holding the raw engine status
pub const STATUS_WATCH: &str = "status";
/// Watch holding the current level name
pub const LEVEL_WATCH: &str = "level";

/// Level buffer size used by the UE1 titles, in UTF-16 units
pub const DEFAULT_LEVEL_CAPACITY: usize = 256;

/// Cells allocated by the injector at attach time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellKind {
    Status,
    Level,
}

/// Where a watched value lives
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressExpr {
    Cell(CellKind),
    Module { module: &'static str, offset: usize },
    Export { module: &'static str, symbol: &'static str },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatchSpec {
    pub name: &'static str,
    pub value_type: ValueType,
    pub address: AddressExpr,
}

impl WatchSpec {
    /// The status cell every UE1 profile watches
    pub const fn status() -> Self {
        Self {
            name: STATUS_WATCH,
            value_type: ValueType::I32,
            address: AddressExpr::Cell(CellKind::Status),
        }
    }

    /// The level buffer every UE1 profile watches
    pub const fn level(capacity: usize) -> Self {
        Self {
            name: LEVEL_WATCH,
            value_type: ValueType::Text {
                capacity,
                encoding: TextEncoding::Utf16,
            },
            address: AddressExpr::Cell(CellKind::Level),
        }
    }
}

#[derive(Debug)]
pub struct GameProfile {
    /// Unique name, also accepted as an exact override
    pub title: &'static str,
    pub display_names: &'static [&'static str],
    /// Executable names without extension
    pub process_names: &'static [&'static str],
    pub watches: &'static [WatchSpec],
    /// Known level identifiers, lower-case
    pub levels: &'static [&'static str],
    /// Level whose load resets the run
    pub reset_level: Option<&'static str>,
    /// Level whose load starts the run
    pub start_level: Option<&'static str>,
    /// Level buffer size in UTF-16 units, terminator included
    pub level_capacity: usize,
    pub load_detour: Option<DetourSpec>,
    pub save_detour: Option<DetourSpec>,
}

impl GameProfile {
    /// Whether `process_name` (with or without `.exe`) belongs to this title
    pub fn matches_process(&self, process_name: &str) -> bool {
        let name = strip_exe(process_name.trim());
        self.process_names.iter().any(|p| p.eq_ignore_ascii_case(name))
    }

    /// Whether `name` is the title or one of the display names, ignoring case
    pub fn is_named(&self, name: &str) -> bool {
        self.title.eq_ignore_ascii_case(name)
            || self.display_names.iter().any(|d| d.eq_ignore_ascii_case(name))
    }

    /// Length of the longest display name occurring in `name`, ignoring case
    pub fn display_name_match(&self, name: &str) -> Option<usize> {
        let name = name.to_lowercase();
        self.display_names
            .iter()
            .filter(|d| name.contains(&d.to_lowercase()))
            .map(|d| d.len())
            .max()
    }

    /// Whether any display name occurs in `name`, ignoring case
    pub fn matches_display_name(&self, name: &str) -> bool {
        self.display_name_match(name).is_some()
    }

    /// Detours in install order
    pub fn detours(&self) -> impl Iterator<Item = &DetourSpec> {
        self.load_detour.iter().chain(self.save_detour.iter())
    }

    pub fn needs_cells(&self) -> bool {
        self.watches
            .iter()
            .any(|w| matches!(w.address, AddressExpr::Cell(_)))
            || self.detours().next().is_some()
    }

    /// Checks every detour template and watch declaration
    pub fn validate(&self) -> Result<()> {
        for detour in self.detours() {
            detour.validate().map_err(|source| ProfileError::InvalidDetour {
                title: self.title.to_string(),
                source,
            })?;
        }

        for (i, watch) in self.watches.iter().enumerate() {
            let invalid = |reason: String| ProfileError::InvalidWatch {
                title: self.title.to_string(),
                watch: watch.name.to_string(),
                reason,
            };

            if self.watches[..i].iter().any(|w| w.name == watch.name) {
                return Err(invalid("declared twice".into()));
            }

            match (watch.address, watch.value_type) {
                (AddressExpr::Cell(CellKind::Status), ValueType::I32 | ValueType::U32) => {}
                (AddressExpr::Cell(CellKind::Status), other) => {
                    return Err(invalid(format!("status cell is 32 bits, not {}", other)));
                }
                (AddressExpr::Cell(CellKind::Level), ValueType::Text { capacity, encoding }) => {
                    if encoding != TextEncoding::Utf16 || capacity > self.level_capacity {
                        return Err(invalid(format!(
                            "level cell holds {} UTF-16 units",
                            self.level_capacity
                        )));
                    }
                }
                (AddressExpr::Cell(CellKind::Level), other) => {
                    return Err(invalid(format!("level cell is text, not {}", other)));
                }
                _ => {}
            }
        }

        if self.levels.iter().any(|l| l.to_lowercase() != *l) {
            return Err(ProfileError::InvalidWatch {
                title: self.title.to_string(),
                watch: LEVEL_WATCH.to_string(),
                reason: "level identifiers must be lower-case".into(),
            });
        }

        Ok(())
    }

    /// Resolves every watch against the attached process
    pub fn resolve_watchers<M: ProcessMemory + ?Sized>(
        &self,
        mem: &M,
        modules: &[ModuleInfo],
        cells: Option<Cells>,
    ) -> Result<WatcherList> {
        let mut watchers = WatcherList::new();
        for watch in self.watches {
            let address = resolve_address(mem, modules, cells, watch)?;
            tracing::debug!("Watch {} at 0x{:X} ({})", watch.name, address, watch.value_type);
            watchers.push(MemoryWatcher::new(watch.name, address, watch.value_type));
        }
        Ok(watchers)
    }
}

fn resolve_address<M: ProcessMemory + ?Sized>(
    mem: &M,
    modules: &[ModuleInfo],
    cells: Option<Cells>,
    watch: &WatchSpec,
) -> Result<usize> {
    let unresolved = |reason: String| ProfileError::UnresolvedAddress {
        watch: watch.name.to_string(),
        reason,
    };

    match watch.address {
        AddressExpr::Cell(kind) => {
            let cells = cells.ok_or_else(|| unresolved("cells are not allocated".into()))?;
            Ok(match kind {
                CellKind::Status => cells.status,
                CellKind::Level => cells.level,
            })
        }
        AddressExpr::Module { module, offset } => find_module(modules, module)
            .map(|m| m.base_address + offset)
            .ok_or_else(|| unresolved(format!("module {} is not loaded", module))),
        AddressExpr::Export { module, symbol } => {
            let base = find_module(modules, module)
                .ok_or_else(|| unresolved(format!("module {} is not loaded", module)))?
                .base_address;
            pe::find_export(mem, base, symbol)?
                .ok_or_else(|| unresolved(format!("{} is not exported by {}", symbol, module)))
        }
    }
}

fn strip_exe(name: &str) -> &str {
    match name.len().checked_sub(4) {
        Some(split) if name.is_char_boundary(split) && name[split..].eq_ignore_ascii_case(".exe") => {
            &name[..split]
        }
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detour::templates::LOAD_MAP;
    use crate::memory::sim::{ImageBuilder, SimulatedProcess};

    static WATCHES: [WatchSpec; 3] = [
        WatchSpec::status(),
        WatchSpec::level(DEFAULT_LEVEL_CAPACITY),
        WatchSpec {
            name: "health",
            value_type: ValueType::I32,
            address: AddressExpr::Module { module: "Core.dll", offset: 0x40 },
        },
    ];

    static PROFILE: GameProfile = GameProfile {
        title: "Test",
        display_names: &["Test Game"],
        process_names: &["testgame"],
        watches: &WATCHES,
        levels: &["entry", "level1"],
        reset_level: Some("entry"),
        start_level: Some("level1"),
        level_capacity: DEFAULT_LEVEL_CAPACITY,
        load_detour: Some(LOAD_MAP),
        save_detour: None,
    };

    fn cells() -> Cells {
        Cells {
            status: 0x0100_0000,
            level: 0x0100_0004,
            level_capacity: DEFAULT_LEVEL_CAPACITY,
        }
    }

    #[test]
    fn test_matches_process() {
        assert!(PROFILE.matches_process("testgame"));
        assert!(PROFILE.matches_process("TestGame.EXE"));
        assert!(!PROFILE.matches_process("testgame2.exe"));
        assert!(!PROFILE.matches_process(".exe"));
    }

    #[test]
    fn test_is_named() {
        assert!(PROFILE.is_named("TEST"));
        assert!(PROFILE.is_named("test game"));
        assert!(!PROFILE.is_named("test game (GOTY)"));
    }

    #[test]
    fn test_matches_display_name() {
        assert!(PROFILE.matches_display_name("test game (GOTY)"));
        assert!(!PROFILE.matches_display_name("Test"));
    }

    #[test]
    fn test_validate() {
        PROFILE.validate().unwrap();
    }

    #[test]
    fn test_level_buffer_larger_than_cell() {
        static WIDE: [WatchSpec; 1] = [WatchSpec::level(DEFAULT_LEVEL_CAPACITY * 2)];
        let profile = GameProfile { watches: &WIDE, ..PROFILE };
        assert!(matches!(profile.validate(), Err(ProfileError::InvalidWatch { .. })));
    }

    #[test]
    fn test_upper_case_level_rejected() {
        let profile = GameProfile { levels: &["Level1"], ..PROFILE };
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_broken_detour_rejected() {
        let detour = DetourSpec { prologue: "55 8B", ..LOAD_MAP };
        let profile = GameProfile { load_detour: Some(detour), ..PROFILE };
        let err = profile.validate().unwrap_err();
        assert!(matches!(err, ProfileError::InvalidDetour { .. }));
    }

    #[test]
    fn test_resolve_watchers() {
        let process = SimulatedProcess::new();
        let modules = vec![ModuleInfo {
            name: "core.dll".into(),
            base_address: 0x1000_0000,
            size: 0x1000,
        }];

        let watchers = PROFILE.resolve_watchers(&process, &modules, Some(cells())).unwrap();
        assert_eq!(watchers.len(), 3);
        assert_eq!(watchers.get(STATUS_WATCH).unwrap().address(), 0x0100_0000);
        assert_eq!(watchers.get(LEVEL_WATCH).unwrap().address(), 0x0100_0004);
        assert_eq!(watchers.get("health").unwrap().address(), 0x1000_0040);
    }

    #[test]
    fn test_unresolved_address() {
        let process = SimulatedProcess::new();
        let err = PROFILE.resolve_watchers(&process, &[], Some(cells())).unwrap_err();
        assert!(matches!(err, ProfileError::UnresolvedAddress { ref watch, .. } if watch == "health"));

        let err = PROFILE.resolve_watchers(&process, &[], None).unwrap_err();
        assert!(matches!(err, ProfileError::UnresolvedAddress { ref watch, .. } if watch == STATUS_WATCH));
    }

    #[test]
    fn test_export_address() {
        static EXPORTED: [WatchSpec; 1] = [WatchSpec {
            name: "flags",
            value_type: ValueType::U32,
            address: AddressExpr::Export { module: "Core.dll", symbol: "GIsRunning" },
        }];
        let profile = GameProfile { watches: &EXPORTED, ..PROFILE };

        let process = SimulatedProcess::new();
        let (module, addresses) = ImageBuilder::new("Core.dll", 0x1000_0000)
            .export("GIsRunning", &[1, 0, 0, 0])
            .load(&process);

        let watchers = profile.resolve_watchers(&process, &[module], None).unwrap();
        assert_eq!(watchers.get("flags").unwrap().address(), addresses[0]);
    }
}
