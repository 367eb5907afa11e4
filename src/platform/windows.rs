use anyhow::{anyhow, Result};
use std::ffi::c_void;
use std::mem;
pub use windows::Win32::Foundation::HANDLE;
use windows::Win32::Foundation::{CloseHandle, INVALID_HANDLE_VALUE};
use windows::Win32::System::Diagnostics::Debug::{
    FlushInstructionCache, ReadProcessMemory, WriteProcessMemory,
};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, Thread32First, Thread32Next,
    PROCESSENTRY32W, TH32CS_SNAPPROCESS, TH32CS_SNAPTHREAD, THREADENTRY32,
};
use windows::Win32::System::Memory::{
    VirtualAllocEx, VirtualProtectEx, MEM_COMMIT, MEM_RESERVE, PAGE_EXECUTE_READWRITE,
    PAGE_PROTECTION_FLAGS,
};
use windows::Win32::System::Threading::{
    GetExitCodeProcess, OpenProcess, OpenThread, ResumeThread, SuspendThread,
    PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION, PROCESS_VM_READ, PROCESS_VM_WRITE,
    THREAD_SUSPEND_RESUME,
};

/// Exit code reported by `GetExitCodeProcess` while the process runs
const STILL_ACTIVE: u32 = 259;

/// Information about a running process
#[derive(Clone, Debug)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

fn wide_to_string(wide: &[u16]) -> String {
    let end = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..end])
}

/// Lists all running processes
pub fn list_processes() -> Result<Vec<ProcessInfo>> {
    unsafe {
        let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0)?;
        if snapshot == INVALID_HANDLE_VALUE {
            return Err(anyhow!("Failed to create process snapshot"));
        }

        let mut processes = Vec::new();
        let mut entry: PROCESSENTRY32W = mem::zeroed();
        entry.dwSize = mem::size_of::<PROCESSENTRY32W>() as u32;

        if Process32FirstW(snapshot, &mut entry).is_ok() {
            loop {
                processes.push(ProcessInfo {
                    pid: entry.th32ProcessID,
                    name: wide_to_string(&entry.szExeFile),
                });

                if Process32NextW(snapshot, &mut entry).is_err() {
                    break;
                }
            }
        }

        CloseHandle(snapshot)?;
        Ok(processes)
    }
}

/// Opens a process with the rights needed to watch and patch it
pub fn open_process(pid: u32) -> Result<HANDLE> {
    unsafe {
        let handle = OpenProcess(
            PROCESS_VM_READ | PROCESS_VM_WRITE | PROCESS_VM_OPERATION | PROCESS_QUERY_INFORMATION,
            false,
            pid,
        )?;

        if handle.is_invalid() {
            return Err(anyhow!("Failed to open process {}", pid));
        }

        Ok(handle)
    }
}

/// Closes a process handle
pub fn close_process(handle: HANDLE) -> Result<()> {
    unsafe {
        CloseHandle(handle)?;
        Ok(())
    }
}

/// Whether the process behind `handle` has not exited yet
pub fn is_process_running(handle: HANDLE) -> bool {
    let mut code = 0u32;
    unsafe { GetExitCodeProcess(handle, &mut code).is_ok() && code == STILL_ACTIVE }
}

/// Reads memory from a process into `buffer`
pub fn read_process_memory(handle: HANDLE, address: usize, buffer: &mut [u8]) -> Result<()> {
    unsafe {
        let mut bytes_read = 0;

        let success = ReadProcessMemory(
            handle,
            address as *const c_void,
            buffer.as_mut_ptr() as *mut c_void,
            buffer.len(),
            Some(&mut bytes_read),
        );

        if success.is_err() || bytes_read != buffer.len() {
            return Err(anyhow!(
                "Failed to read memory at 0x{:X} (size: {})",
                address,
                buffer.len()
            ));
        }

        Ok(())
    }
}

/// Writes memory to a process
pub fn write_process_memory(handle: HANDLE, address: usize, data: &[u8]) -> Result<()> {
    unsafe {
        let mut bytes_written = 0;

        let success = WriteProcessMemory(
            handle,
            address as *const c_void,
            data.as_ptr() as *const c_void,
            data.len(),
            Some(&mut bytes_written),
        );

        if success.is_err() || bytes_written != data.len() {
            return Err(anyhow!("Failed to write memory at 0x{:X}", address));
        }

        Ok(())
    }
}

/// Allocates committed read/write/execute memory in a process
pub fn allocate_executable(handle: HANDLE, size: usize) -> Result<usize> {
    unsafe {
        let address = VirtualAllocEx(
            handle,
            None,
            size,
            MEM_COMMIT | MEM_RESERVE,
            PAGE_EXECUTE_READWRITE,
        );

        if address.is_null() {
            return Err(anyhow!("VirtualAllocEx failed for {} bytes", size));
        }

        Ok(address as usize)
    }
}

/// Writes into code pages of a process
///
/// The pages are made writable for the write, their old protection is restored, and
/// the instruction cache is flushed so the new bytes are fetched.
pub fn write_code(handle: HANDLE, address: usize, data: &[u8]) -> Result<()> {
    unsafe {
        let mut old = PAGE_PROTECTION_FLAGS::default();
        VirtualProtectEx(
            handle,
            address as *const c_void,
            data.len(),
            PAGE_EXECUTE_READWRITE,
            &mut old,
        )?;

        let written = write_process_memory(handle, address, data);

        let mut ignored = PAGE_PROTECTION_FLAGS::default();
        if let Err(e) =
            VirtualProtectEx(handle, address as *const c_void, data.len(), old, &mut ignored)
        {
            tracing::warn!("Failed to restore page protection at 0x{:X}: {}", address, e);
        }

        written?;
        FlushInstructionCache(handle, Some(address as *const c_void), data.len())?;
        Ok(())
    }
}

/// Lists the thread ids of a process
pub fn list_threads(pid: u32) -> Result<Vec<u32>> {
    unsafe {
        let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPTHREAD, 0)?;

        let mut threads = Vec::new();
        let mut entry: THREADENTRY32 = mem::zeroed();
        entry.dwSize = mem::size_of::<THREADENTRY32>() as u32;

        if Thread32First(snapshot, &mut entry).is_ok() {
            loop {
                if entry.th32OwnerProcessID == pid {
                    threads.push(entry.th32ThreadID);
                }

                if Thread32Next(snapshot, &mut entry).is_err() {
                    break;
                }
            }
        }

        CloseHandle(snapshot)?;
        Ok(threads)
    }
}

/// Suspends every thread of a process and returns the ids it suspended
///
/// If any thread fails to suspend, the ones already suspended are resumed first.
pub fn suspend_threads(pid: u32) -> Result<Vec<u32>> {
    suspend_each(
        &list_threads(pid)?,
        |tid| set_thread_suspended(tid, true),
        |tid| {
            if let Err(e) = set_thread_suspended(tid, false) {
                tracing::warn!("{}", e);
            }
        },
    )
}

/// Resumes `tids`, attempting every thread before reporting the first failure
pub fn resume_threads(tids: &[u32]) -> Result<()> {
    let mut first_error = None;
    for &tid in tids {
        if let Err(e) = set_thread_suspended(tid, false) {
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Returns `Ok(false)` when the thread no longer exists
fn set_thread_suspended(tid: u32, suspended: bool) -> Result<bool> {
    unsafe {
        let thread = match OpenThread(THREAD_SUSPEND_RESUME, false, tid) {
            Ok(thread) => thread,
            // Threads can exit between the snapshot and the open
            Err(_) => return Ok(false),
        };

        let previous = if suspended {
            SuspendThread(thread)
        } else {
            ResumeThread(thread)
        };
        let _ = CloseHandle(thread);

        if previous == u32::MAX {
            return Err(anyhow!(
                "Failed to {} thread {}",
                if suspended { "suspend" } else { "resume" },
                tid
            ));
        }
        Ok(true)
    }
}

fn suspend_each<S, R>(tids: &[u32], mut suspend: S, mut resume: R) -> Result<Vec<u32>>
where
    S: FnMut(u32) -> Result<bool>,
    R: FnMut(u32),
{
    let mut suspended = Vec::with_capacity(tids.len());
    for &tid in tids {
        match suspend(tid) {
            Ok(true) => suspended.push(tid),
            Ok(false) => {}
            Err(e) => {
                for &tid in suspended.iter().rev() {
                    resume(tid);
                }
                return Err(e);
            }
        }
    }
    Ok(suspended)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_failed_suspend_resumes_earlier_threads() {
        let resumed = RefCell::new(Vec::new());
        let result = suspend_each(
            &[10, 11, 12, 13],
            |tid| match tid {
                11 => Ok(false),
                13 => Err(anyhow!("Failed to suspend thread {}", tid)),
                _ => Ok(true),
            },
            |tid| resumed.borrow_mut().push(tid),
        );

        assert!(result.is_err());
        assert_eq!(*resumed.borrow(), vec![12, 10]);
    }

    #[test]
    fn test_suspend_each_skips_exited_threads() {
        let suspended = suspend_each(&[1, 2, 3], |tid| Ok(tid != 2), |_| {}).unwrap();
        assert_eq!(suspended, vec![1, 3]);
    }

    #[test]
    fn test_list_processes() {
        let processes = list_processes().expect("Failed to list processes");
        assert!(!processes.is_empty(), "Should find at least one process");

        let current_pid = std::process::id();
        let found = processes.iter().any(|p| p.pid == current_pid);
        assert!(found, "Current process should be in the list");
    }

    #[test]
    fn test_current_process_threads() {
        let threads = list_threads(std::process::id()).expect("Failed to list threads");
        assert!(!threads.is_empty());
    }
}
