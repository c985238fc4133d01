//! Unix Implementation



use std::{
    ffi::c_void,
    fs::{File, OpenOptions},
    num::NonZeroUsize,
    os::{fd::IntoRawFd, unix::fs::OpenOptionsExt},
    path::Path,
    ptr::NonNull,
};

use nix::{
    errno::Errno,
    sys::mman::{self, MapFlags, MsFlags, ProtFlags},
    unistd::{self, SysconfVar},
};

use crate::{AccessFlags, MappingFlags, OsError, SyncFlags};

use super::BackingFile;



/// A raw memory mapping.
///
/// # Safety
/// - It does NOT unmap itself when dropped; it has to be handed back to [`unmap`].
pub struct Handle {
    addr: NonNull<c_void>,
}

impl Handle {
    pub fn as_ptr(&self) -> NonNull<u8> {
        self.addr.cast()
    }
}

impl From<Errno> for OsError {
    fn from(e: Errno) -> Self {
        Self {
            code: e as i32,
            message: e.desc().to_string(),
        }
    }
}

pub fn page_size() -> usize {
    match unistd::sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(size)) if size > 0 => size as usize,
        _ => 4096,
    }
}

pub fn last_error() -> OsError {
    Errno::last().into()
}

pub fn prot_flags(access: AccessFlags) -> ProtFlags {
    let mut prot = ProtFlags::PROT_NONE;
    if access.contains(AccessFlags::READ) {
        prot |= ProtFlags::PROT_READ;
    }
    if access.contains(AccessFlags::WRITE) {
        prot |= ProtFlags::PROT_WRITE;
    }
    if access.contains(AccessFlags::EXEC) {
        prot |= ProtFlags::PROT_EXEC;
    }
    prot
}

/// `SHARED` wins over `PRIVATE`, and a set naming neither maps privately.
pub fn map_flags(mapping: MappingFlags) -> MapFlags {
    let mut flags = if mapping.contains(MappingFlags::SHARED) {
        MapFlags::MAP_SHARED
    } else {
        MapFlags::MAP_PRIVATE
    };
    if mapping.contains(MappingFlags::ANON) {
        flags |= MapFlags::MAP_ANONYMOUS;
    }
    flags
}

pub fn ms_flags(sync: SyncFlags) -> MsFlags {
    let mut flags = MsFlags::empty();
    if sync.contains(SyncFlags::SYNC) {
        flags |= MsFlags::MS_SYNC;
    }
    if sync.contains(SyncFlags::ASYNC) {
        flags |= MsFlags::MS_ASYNC;
    }
    if sync.contains(SyncFlags::INVALIDATE) {
        flags |= MsFlags::MS_INVALIDATE;
    }
    flags
}

/// Opens `path` for mapping, creating it when write access is requested.
///
/// Existing contents are never truncated here.
pub fn open_file(path: &Path, access: AccessFlags) -> Result<File, OsError> {
    let write = access.is_writable();
    let mut mode = if write { 0o666 } else { 0o444 };
    if access.contains(AccessFlags::EXEC) {
        mode |= 0o111;
    }

    OpenOptions::new()
        .read(true)
        .write(write)
        .create(write)
        .mode(mode)
        .open(path)
        .map_err(OsError::from)
}

pub fn close_file(file: File) -> Result<(), OsError> {
    unistd::close(file.into_raw_fd())?;
    Ok(())
}

/// Growing zero-fills the new tail; shrinking discards it.
pub fn truncate_file(file: &File, len: usize) -> Result<(), OsError> {
    let len = libc::off_t::try_from(len).map_err(|_| OsError::from(Errno::EFBIG))?;
    unistd::ftruncate(file, len)?;
    Ok(())
}

pub fn map(
    file: Option<&BackingFile>,
    len: usize,
    access: AccessFlags,
    mapping: MappingFlags,
) -> Result<Handle, OsError> {
    let length = NonZeroUsize::new(len).ok_or(OsError::from(Errno::EINVAL))?;
    let prot = prot_flags(access);
    let flags = map_flags(mapping);

    let addr = match file {
        Some(backing) => unsafe { mman::mmap(None, length, prot, flags, &backing.file, 0) }?,
        None => unsafe { mman::mmap_anonymous(None, length, prot, flags) }?,
    };

    Ok(Handle { addr })
}

pub fn unmap(handle: &Handle, len: usize) -> Result<(), OsError> {
    unsafe { mman::munmap(handle.addr, len) }?;
    Ok(())
}

pub fn protect(handle: &Handle, len: usize, access: AccessFlags) -> Result<(), OsError> {
    unsafe { mman::mprotect(handle.addr, len, prot_flags(access)) }?;
    Ok(())
}

pub fn sync(handle: &Handle, len: usize, flags: SyncFlags) -> Result<(), OsError> {
    unsafe { mman::msync(handle.addr, len, ms_flags(flags)) }?;
    Ok(())
}

pub fn lock(handle: &Handle, len: usize) -> Result<(), OsError> {
    unsafe { mman::mlock(handle.addr, len) }?;
    Ok(())
}

pub fn unlock(handle: &Handle, len: usize) -> Result<(), OsError> {
    unsafe { mman::munlock(handle.addr, len) }?;
    Ok(())
}
