//! Windows Implementation
//!
//! Windows maps in two steps: file handle -> section (mapping object) -> view. The section
//! is always created with the widest protection the backing store allows, and the view is
//! then narrowed with `VirtualProtect`. That keeps `protect` able to widen access again,
//! the way `mprotect` can.



use std::{
    ffi::c_void,
    fs::{File, OpenOptions},
    io,
    mem::{self, MaybeUninit},
    os::windows::{
        fs::OpenOptionsExt,
        io::{AsRawHandle, IntoRawHandle},
    },
    path::Path,
    ptr::{self, NonNull},
};

use windows_sys::Win32::{
    Foundation::{
        CloseHandle, GetLastError, GENERIC_EXECUTE, GENERIC_READ, GENERIC_WRITE, HANDLE,
        INVALID_HANDLE_VALUE, TRUE,
    },
    Security::SECURITY_ATTRIBUTES,
    Storage::FileSystem::FlushFileBuffers,
    System::{
        Memory::{
            CreateFileMappingW, FlushViewOfFile, MapViewOfFile, UnmapViewOfFile, VirtualLock,
            VirtualProtect, VirtualUnlock, FILE_MAP, FILE_MAP_COPY, FILE_MAP_EXECUTE,
            FILE_MAP_READ, FILE_MAP_WRITE, MEMORY_MAPPED_VIEW_ADDRESS, PAGE_EXECUTE,
            PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE, PAGE_EXECUTE_WRITECOPY, PAGE_NOACCESS,
            PAGE_PROTECTION_FLAGS, PAGE_READONLY, PAGE_READWRITE, PAGE_WRITECOPY,
        },
        SystemInformation::{GetSystemInfo, SYSTEM_INFO},
    },
};

use crate::{AccessFlags, MappingFlags, OsError, SyncFlags};

use super::BackingFile;



/// A mapped view plus the section object that backs it.
///
/// # Safety
/// - It does NOT unmap itself when dropped; it has to be handed back to [`unmap`].
pub struct Handle {
    view: NonNull<c_void>,
    section: HANDLE,
    /// Borrowed from the owning mapping's file; `INVALID_HANDLE_VALUE` when anonymous.
    file: HANDLE,
    copy_on_write: bool,
    _security: Box<SECURITY_ATTRIBUTES>,
}

impl Handle {
    pub fn as_ptr(&self) -> NonNull<u8> {
        self.view.cast()
    }
}

pub fn page_size() -> usize {
    let info = unsafe {
        let mut info = MaybeUninit::<SYSTEM_INFO>::uninit();
        GetSystemInfo(info.as_mut_ptr());
        info.assume_init()
    };
    info.dwPageSize as usize
}

pub fn last_error() -> OsError {
    // `io::Error` formats the code through the system message table.
    let code = unsafe { GetLastError() };
    io::Error::from_raw_os_error(code as i32).into()
}

/// `PAGE_*` protection for `access`, using the write-copy variants for private file views.
pub fn page_protection(access: AccessFlags, copy_on_write: bool) -> PAGE_PROTECTION_FLAGS {
    let read = access.contains(AccessFlags::READ);
    let write = access.contains(AccessFlags::WRITE);
    let exec = access.contains(AccessFlags::EXEC);

    // Windows has no write-only pages; write implies read.
    match (exec, write, read) {
        (true, true, _) if copy_on_write => PAGE_EXECUTE_WRITECOPY,
        (true, true, _) => PAGE_EXECUTE_READWRITE,
        (true, false, true) => PAGE_EXECUTE_READ,
        (true, false, false) => PAGE_EXECUTE,
        (false, true, _) if copy_on_write => PAGE_WRITECOPY,
        (false, true, _) => PAGE_READWRITE,
        (false, false, true) => PAGE_READONLY,
        (false, false, false) => PAGE_NOACCESS,
    }
}

/// `FILE_MAP_*` access for a view that may later be protected up to `access`.
pub fn view_access(access: AccessFlags, copy_on_write: bool) -> FILE_MAP {
    let mut result = if copy_on_write {
        FILE_MAP_COPY
    } else if access.contains(AccessFlags::WRITE) {
        FILE_MAP_READ | FILE_MAP_WRITE
    } else if access.contains(AccessFlags::READ) {
        FILE_MAP_READ
    } else {
        0
    };
    if access.contains(AccessFlags::EXEC) {
        result |= FILE_MAP_EXECUTE;
    }
    result
}

/// Opens `path` for mapping, creating it when write access is requested.
///
/// Existing contents are never truncated here.
pub fn open_file(path: &Path, access: AccessFlags) -> Result<File, OsError> {
    let write = access.is_writable();
    let mut options = OpenOptions::new();
    options.read(true).write(write).create(write);

    if access.contains(AccessFlags::EXEC) {
        let mut rights = GENERIC_READ | GENERIC_EXECUTE;
        if write {
            rights |= GENERIC_WRITE;
        }
        options.access_mode(rights);
    }

    options.open(path).map_err(OsError::from)
}

pub fn close_file(file: File) -> Result<(), OsError> {
    if unsafe { CloseHandle(file.into_raw_handle() as HANDLE) } == 0 {
        return Err(last_error());
    }
    Ok(())
}

/// Growing zero-fills the new tail (NTFS reads past the valid data length as zeros);
/// shrinking discards it. Must not be called while a view of the file is mapped.
pub fn truncate_file(file: &File, len: usize) -> Result<(), OsError> {
    file.set_len(len as u64).map_err(OsError::from)
}

pub fn map(
    file: Option<&BackingFile>,
    len: usize,
    access: AccessFlags,
    mapping: MappingFlags,
) -> Result<Handle, OsError> {
    // Anonymous sections live in the page file and may take any protection later on.
    let (raw_file, ceiling) = match file {
        Some(backing) => (backing.file.as_raw_handle() as HANDLE, backing.access),
        None => (
            INVALID_HANDLE_VALUE,
            AccessFlags::READ | AccessFlags::WRITE | AccessFlags::EXEC,
        ),
    };
    let copy_on_write = file.is_some() && !mapping.contains(MappingFlags::SHARED);

    let security = Box::new(SECURITY_ATTRIBUTES {
        nLength: mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
        lpSecurityDescriptor: ptr::null_mut(),
        // Child processes inherit the section handle.
        bInheritHandle: TRUE,
    });

    let size = len as u64;
    let section = unsafe {
        CreateFileMappingW(
            raw_file,
            &*security,
            page_protection(ceiling, false),
            (size >> 32) as u32,
            (size & 0xFFFF_FFFF) as u32,
            ptr::null(),
        )
    };
    if section.is_null() {
        return Err(last_error());
    }

    let view = unsafe { MapViewOfFile(section, view_access(ceiling, copy_on_write), 0, 0, len) };
    let Some(view) = NonNull::new(view.Value) else {
        let e = last_error();
        unsafe { CloseHandle(section) };
        return Err(e);
    };

    let handle = Handle {
        view,
        section,
        file: raw_file,
        copy_on_write,
        _security: security,
    };

    if let Err(e) = protect(&handle, len, access) {
        // Best effort; the protect failure is what gets reported.
        let _ = unmap(&handle, len);
        return Err(e);
    }

    Ok(handle)
}

/// Once the view is gone the handle is spent, so a section that fails to close is only
/// logged; reporting it would get the view unmapped a second time.
pub fn unmap(handle: &Handle, _len: usize) -> Result<(), OsError> {
    let address = MEMORY_MAPPED_VIEW_ADDRESS {
        Value: handle.view.as_ptr(),
    };
    if unsafe { UnmapViewOfFile(address) } == 0 {
        return Err(last_error());
    }
    if unsafe { CloseHandle(handle.section) } == 0 {
        log::warn!("failed to close section handle after unmapping: {}", last_error());
    }
    Ok(())
}

pub fn protect(handle: &Handle, len: usize, access: AccessFlags) -> Result<(), OsError> {
    let mut previous: PAGE_PROTECTION_FLAGS = 0;
    let ok = unsafe {
        VirtualProtect(
            handle.view.as_ptr(),
            len,
            page_protection(access, handle.copy_on_write),
            &mut previous,
        )
    };
    if ok == 0 {
        return Err(last_error());
    }
    Ok(())
}

/// `FlushViewOfFile` only schedules the write-back; `SYNC` also waits on the file,
/// which is what `MS_SYNC` guarantees. `INVALIDATE` has no Windows counterpart.
pub fn sync(handle: &Handle, len: usize, flags: SyncFlags) -> Result<(), OsError> {
    if unsafe { FlushViewOfFile(handle.view.as_ptr(), len) } == 0 {
        return Err(last_error());
    }
    if flags.contains(SyncFlags::SYNC) && handle.file != INVALID_HANDLE_VALUE {
        if unsafe { FlushFileBuffers(handle.file) } == 0 {
            return Err(last_error());
        }
    }
    Ok(())
}

pub fn lock(handle: &Handle, len: usize) -> Result<(), OsError> {
    if unsafe { VirtualLock(handle.view.as_ptr(), len) } == 0 {
        return Err(last_error());
    }
    Ok(())
}

pub fn unlock(handle: &Handle, len: usize) -> Result<(), OsError> {
    if unsafe { VirtualUnlock(handle.view.as_ptr(), len) } == 0 {
        return Err(last_error());
    }
    Ok(())
}
