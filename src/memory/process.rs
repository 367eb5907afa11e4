use super::access::{ModuleInfo, ProcessCode, ProcessMemory};
use super::error::{MemoryError, Result};
use crate::platform::{self, ProcessInfo, HANDLE};
use std::cell::RefCell;

/// An opened game process
pub struct Process {
    pub pid: u32,
    pub name: String,
    handle: HANDLE,
    /// Threads suspended by each outstanding `suspend`
    suspended: RefCell<Vec<Vec<u32>>>,
}

impl Process {
    /// Lists all running processes
    pub fn list_all() -> anyhow::Result<Vec<ProcessInfo>> {
        platform::windows::list_processes()
    }

    /// Opens a process by PID
    pub fn open(pid: u32, name: String) -> anyhow::Result<Self> {
        let handle = platform::windows::open_process(pid)?;
        Ok(Self {
            pid,
            name,
            handle,
            suspended: RefCell::new(Vec::new()),
        })
    }

    /// Opens a process from ProcessInfo
    pub fn from_info(info: &ProcessInfo) -> anyhow::Result<Self> {
        Self::open(info.pid, info.name.clone())
    }

    /// Lists the modules currently loaded in the process
    pub fn modules(&self) -> anyhow::Result<Vec<ModuleInfo>> {
        platform::list_modules(self.pid)
    }
}

impl ProcessMemory for Process {
    fn read(&self, address: usize, buf: &mut [u8]) -> Result<()> {
        platform::windows::read_process_memory(self.handle, address, buf).map_err(|e| {
            tracing::trace!("{}", e);
            MemoryError::ReadFailure { address, len: buf.len() }
        })
    }

    fn write(&self, address: usize, data: &[u8]) -> Result<()> {
        platform::windows::write_process_memory(self.handle, address, data).map_err(|e| {
            tracing::debug!("{}", e);
            MemoryError::WriteFailure { address, len: data.len() }
        })
    }

    fn is_alive(&self) -> bool {
        platform::windows::is_process_running(self.handle)
    }
}

impl ProcessCode for Process {
    fn allocate(&self, size: usize) -> Result<usize> {
        platform::windows::allocate_executable(self.handle, size).map_err(|e| {
            tracing::debug!("{}", e);
            MemoryError::AllocationFailed { size }
        })
    }

    fn write_code(&self, address: usize, data: &[u8]) -> Result<()> {
        platform::windows::write_code(self.handle, address, data).map_err(|e| {
            tracing::debug!("{}", e);
            MemoryError::WriteFailure { address, len: data.len() }
        })
    }

    fn suspend(&self) -> Result<()> {
        let tids = platform::windows::suspend_threads(self.pid)
            .map_err(|e| MemoryError::SuspendFailed(e.to_string()))?;
        self.suspended.borrow_mut().push(tids);
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        let Some(tids) = self.suspended.borrow_mut().pop() else {
            return Ok(());
        };
        platform::windows::resume_threads(&tids)
            .map_err(|e| MemoryError::SuspendFailed(e.to_string()))
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        let _ = platform::windows::close_process(self.handle);
    }
}
