//! Mapping



#[cfg(unix)]
mod unix;

#[cfg(unix)]
use unix as os;

#[cfg(windows)]
mod windows;

#[cfg(windows)]
use windows as os;



use std::{
    fmt,
    fs::{self, File},
    path::{Path, PathBuf},
    ptr::{self, NonNull},
    sync::OnceLock,
};

use crate::{AccessFlags, Error, MappingFlags, OsError, Result, SyncFlags};



/// The largest mapping [`Mapping::read_all_bytes`] will copy into a `Vec<u8>`.
pub const ARRAY_LIMIT: usize = isize::MAX as usize;

/// The system page size, queried once per process.
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(os::page_size)
}

/// The most recent OS failure on the calling thread.
pub fn last_os_error() -> OsError {
    os::last_error()
}

/// An open backing file and the access it was opened with.
///
/// The open access is the ceiling for any later `protect` or `resize`.
struct BackingFile {
    file: File,
    access: AccessFlags,
}



/// Configuration for a new [`Mapping`].
///
/// Without a [`path`](Self::path) the mapping is anonymous and `ANON` is always added to its
/// mapping flags.
#[derive(Clone, Debug)]
pub struct MapCfg {
    path: Option<PathBuf>,
    size: Option<usize>,
    access: AccessFlags,
    mapping: Option<MappingFlags>,
    overwrite: bool,
}

impl Default for MapCfg {
    fn default() -> Self {
        Self::new()
    }
}

impl MapCfg {
    pub fn new() -> Self {
        Self {
            path: None,
            size: None,
            access: AccessFlags::READ | AccessFlags::WRITE,
            mapping: None,
            overwrite: false,
        }
    }

    /// Back the mapping with the file at `path`.
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Requested size in bytes. Required for anonymous mappings; file-backed ones default
    /// to one page.
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Defaults to `READ | WRITE`.
    pub fn access(mut self, access: AccessFlags) -> Self {
        self.access = access;
        self
    }

    /// Defaults to `SHARED` for file-backed mappings and `PRIVATE` for anonymous ones.
    pub fn mapping(mut self, mapping: MappingFlags) -> Self {
        self.mapping = Some(mapping);
        self
    }

    /// Delete an existing backing file instead of mapping its contents.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn create(self) -> Result<Mapping> {
        match self.path {
            Some(path) => Mapping::map_file(
                path,
                self.size.unwrap_or_else(page_size),
                self.access,
                self.mapping.unwrap_or(MappingFlags::SHARED),
                self.overwrite,
            ),
            None => Mapping::anonymous(
                self.size.ok_or(Error::InvalidSize(0))?,
                self.access,
                self.mapping.unwrap_or(MappingFlags::PRIVATE),
            ),
        }
    }
}



/// A mapped region of virtual memory, optionally backed by a file.
///
/// The mapping owns its view and its file. Both are released by [`close`](Self::close),
/// or on drop if `close` was never called. Every operation on a closed mapping fails with
/// [`Error::UseAfterClose`].
///
/// The base address is only stable between resizes.
pub struct Mapping {
    /// `None` once closed.
    handle: Option<os::Handle>,
    size: usize,
    access: AccessFlags,
    mapping: MappingFlags,
    file: Option<BackingFile>,
    path: Option<PathBuf>,
}

// The mapping exclusively owns its view and file, so it may move between threads. It is not
// `Sync`: writes go through `&self` without any locking.
unsafe impl Send for Mapping {}

impl Mapping {
    /// Maps `size` bytes of memory that is not backed by any file.
    pub fn anonymous(size: usize, access: AccessFlags, mapping: MappingFlags) -> Result<Self> {
        if size < 1 {
            return Err(Error::InvalidSize(size));
        }
        let mapping = mapping | MappingFlags::ANON;
        let handle = os::map(None, size, access, mapping).map_err(Error::MapFailed)?;

        log::debug!("mapped {size} anonymous bytes at {:p} ({access:?}, {mapping:?})", handle.as_ptr());

        Ok(Self {
            handle: Some(handle),
            size,
            access,
            mapping,
            file: None,
            path: None,
        })
    }

    /// Maps the file at `path`, keeping whatever it already contains.
    ///
    /// See [`MapCfg`] for the full set of options.
    pub fn open(
        path: impl AsRef<Path>,
        access: AccessFlags,
        mapping: MappingFlags,
        size: usize,
    ) -> Result<Self> {
        Self::map_file(path.as_ref().to_path_buf(), size, access, mapping, false)
    }

    fn map_file(
        path: PathBuf,
        size: usize,
        access: AccessFlags,
        mapping: MappingFlags,
        overwrite: bool,
    ) -> Result<Self> {
        if size < 1 {
            return Err(Error::InvalidSize(size));
        }
        if !access.intersects(AccessFlags::READ | AccessFlags::WRITE) {
            return Err(Error::UnsupportedAccessCombination(access));
        }
        // Without write access the file could not be recreated after deleting it.
        if overwrite && !access.is_writable() {
            return Err(Error::AccessDenied {
                required: AccessFlags::WRITE,
                granted: access,
            });
        }
        let mapping = mapping.difference(MappingFlags::ANON);
        let open_failed = |source: OsError| Error::OpenFailed {
            path: path.clone(),
            source,
        };

        let mut existing = fs::metadata(&path).ok().map(|meta| meta.len());
        if existing.is_some() && overwrite {
            fs::remove_file(&path).map_err(|e| open_failed(e.into()))?;
            existing = None;
        }
        let existing = usize::try_from(existing.unwrap_or(0)).unwrap_or(usize::MAX);

        let file = os::open_file(&path, access).map_err(open_failed)?;

        let len = if access.is_writable() {
            if size > existing {
                os::truncate_file(&file, size).map_err(Error::TruncateFailed)?;
            }
            size.max(existing)
        } else {
            // Without write access the file cannot grow, and pages past its end would fault.
            if existing == 0 {
                return Err(Error::InvalidSize(0));
            }
            existing
        };

        let backing = BackingFile { file, access };
        let handle = os::map(Some(&backing), len, access, mapping).map_err(Error::MapFailed)?;

        log::debug!(
            "mapped {len} bytes of `{}` at {:p} ({access:?}, {mapping:?})",
            path.display(),
            handle.as_ptr(),
        );

        Ok(Self {
            handle: Some(handle),
            size: len,
            access,
            mapping,
            file: Some(backing),
            path: Some(path),
        })
    }

    fn handle(&self) -> Result<&os::Handle> {
        self.handle.as_ref().ok_or(Error::UseAfterClose)
    }

    /// Base address of the current view.
    ///
    /// Invalidated by [`resize`](Self::resize) and [`close`](Self::close).
    pub fn address(&self) -> Result<NonNull<u8>> {
        Ok(self.handle()?.as_ptr())
    }

    /// Current size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Size rounded up to a whole number of pages.
    pub fn aligned_size(&self) -> usize {
        self.size.next_multiple_of(page_size())
    }

    pub fn access_flags(&self) -> AccessFlags {
        self.access
    }

    pub fn mapping_flags(&self) -> MappingFlags {
        self.mapping
    }

    /// Path of the backing file, if there is one.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_file_backed(&self) -> bool {
        self.path.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    /// Remaps the region at `new_size`, truncating or extending the backing file in between.
    ///
    /// Returns `false` if the size was already `new_size`. Contents up to the smaller of both
    /// sizes survive for file-backed mappings; anonymous mappings come back zeroed.
    ///
    /// If anything fails after the old view was unmapped, the mapping is left without a view
    /// and is closed.
    pub fn resize(&mut self, new_size: usize) -> Result<bool> {
        let handle = self.handle()?;
        if new_size < 1 {
            return Err(Error::InvalidSize(new_size));
        }
        if new_size == self.size {
            return Ok(false);
        }
        if let Some(backing) = &self.file {
            if !backing.access.is_writable() {
                return Err(Error::AccessDenied {
                    required: AccessFlags::WRITE,
                    granted: backing.access,
                });
            }
        }

        os::unmap(handle, self.size).map_err(Error::UnmapFailed)?;
        self.handle = None;

        // Truncation happens strictly between unmap and remap; Windows refuses to resize a
        // file with a live view.
        if let Some(backing) = &self.file {
            if let Err(e) = os::truncate_file(&backing.file, new_size) {
                self.file = None;
                return Err(Error::TruncateFailed(e));
            }
        }

        match os::map(self.file.as_ref(), new_size, self.access, self.mapping) {
            Ok(handle) => {
                log::debug!("resized mapping from {} to {new_size} bytes at {:p}", self.size, handle.as_ptr());
                self.handle = Some(handle);
                self.size = new_size;
                Ok(true)
            }
            Err(e) => {
                self.file = None;
                Err(Error::MapFailed(e))
            }
        }
    }

    /// Grows the region to `size` if it is currently smaller. Returns whether it changed.
    pub fn grow_if_needed(&mut self, size: usize) -> Result<bool> {
        self.handle()?;
        if size <= self.size {
            return Ok(false);
        }
        self.resize(size)
    }

    /// Shrinks the region to `size` if it is currently larger. Returns whether it changed.
    pub fn shrink_if_needed(&mut self, size: usize) -> Result<bool> {
        self.handle()?;
        if size >= self.size {
            return Ok(false);
        }
        self.resize(size)
    }

    /// Changes the protection of every page in the region.
    ///
    /// The recorded access flags only change if the OS accepted the new protection.
    pub fn protect(&mut self, access: AccessFlags) -> Result<()> {
        let handle = self.handle()?;
        if access == self.access {
            return Ok(());
        }
        os::protect(handle, self.size, access).map_err(Error::ProtectFailed)?;
        log::trace!("protection changed from {:?} to {access:?}", self.access);
        self.access = access;
        Ok(())
    }

    /// Flushes changes to the backing file, or makes them visible to other processes for
    /// shared anonymous mappings.
    pub fn sync(&self, flags: SyncFlags) -> Result<()> {
        let handle = self.handle()?;
        os::sync(handle, self.size, flags).map_err(Error::SyncFailed)?;
        log::trace!("synced {} bytes ({flags:?})", self.size);
        Ok(())
    }

    /// Pins the region into physical memory.
    pub fn lock(&self) -> Result<()> {
        let handle = self.handle()?;
        os::lock(handle, self.size).map_err(Error::LockFailed)?;
        log::trace!("locked {} bytes", self.size);
        Ok(())
    }

    pub fn unlock(&self) -> Result<()> {
        let handle = self.handle()?;
        os::unlock(handle, self.size).map_err(Error::UnlockFailed)?;
        log::trace!("unlocked {} bytes", self.size);
        Ok(())
    }

    /// Unmaps the region and closes the backing file.
    ///
    /// Closing twice is an error. If unmapping fails the mapping stays open.
    pub fn close(&mut self) -> Result<()> {
        let handle = self.handle()?;
        os::unmap(handle, self.size).map_err(Error::UnmapFailed)?;
        self.handle = None;

        if let Some(backing) = self.file.take() {
            os::close_file(backing.file).map_err(Error::CloseFailed)?;
        }

        log::debug!("closed mapping of {} bytes", self.size);
        Ok(())
    }

    fn ensure_readable(&self) -> Result<()> {
        if !self.access.is_readable() {
            return Err(Error::AccessDenied {
                required: AccessFlags::READ,
                granted: self.access,
            });
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        if !self.access.is_writable() {
            return Err(Error::AccessDenied {
                required: AccessFlags::WRITE,
                granted: self.access,
            });
        }
        Ok(())
    }

    /// Copies up to `len` bytes from `self[src_offset..]` into `other[dst_offset..]`.
    ///
    /// The count is clamped to what fits in both regions; returns the number of bytes copied.
    pub fn copy_to(
        &self,
        other: &Mapping,
        len: usize,
        src_offset: usize,
        dst_offset: usize,
    ) -> Result<usize> {
        let src = self.address()?;
        let dst = other.address()?;
        self.ensure_readable()?;
        other.ensure_writable()?;

        let count = len
            .min(self.size.saturating_sub(src_offset))
            .min(other.size.saturating_sub(dst_offset));
        if count > 0 {
            // Two mappings of the same file may alias the same pages.
            unsafe { ptr::copy(src.as_ptr().add(src_offset), dst.as_ptr().add(dst_offset), count) };
        }
        Ok(count)
    }

    /// Copies up to `len` bytes from `other[src_offset..]` into `self[dst_offset..]`.
    pub fn copy_from(
        &self,
        other: &Mapping,
        len: usize,
        src_offset: usize,
        dst_offset: usize,
    ) -> Result<usize> {
        other.copy_to(self, len, src_offset, dst_offset)
    }

    /// Fills `dst` from the region starting at `offset`, stopping at the end of the region.
    pub fn read_bytes(&self, offset: usize, dst: &mut [u8]) -> Result<usize> {
        let base = self.address()?;
        self.ensure_readable()?;

        let count = dst.len().min(self.size.saturating_sub(offset));
        if count > 0 {
            unsafe { ptr::copy(base.as_ptr().add(offset), dst.as_mut_ptr(), count) };
        }
        Ok(count)
    }

    /// Writes `src` into the region starting at `offset`, stopping at the end of the region.
    pub fn write_bytes(&self, offset: usize, src: &[u8]) -> Result<usize> {
        let base = self.address()?;
        self.ensure_writable()?;

        let count = src.len().min(self.size.saturating_sub(offset));
        if count > 0 {
            unsafe { ptr::copy(src.as_ptr(), base.as_ptr().add(offset), count) };
        }
        Ok(count)
    }

    /// Overwrites the whole region with zeros.
    pub fn zero(&self) -> Result<()> {
        let base = self.address()?;
        self.ensure_writable()?;
        unsafe { ptr::write_bytes(base.as_ptr(), 0, self.size) };
        Ok(())
    }

    /// Copies the whole region into a new vector.
    pub fn read_all_bytes(&self) -> Result<Vec<u8>> {
        self.handle()?;
        if self.size > ARRAY_LIMIT {
            return Err(Error::ArrayLimitExceeded {
                size: self.size,
                limit: ARRAY_LIMIT,
            });
        }
        let mut bytes = vec![0; self.size];
        self.read_bytes(0, &mut bytes)?;
        Ok(bytes)
    }

    /// Views the region as a byte slice.
    ///
    /// # Safety
    /// - The region must be readable, otherwise touching the slice faults.
    /// - Nothing may write to the region while the slice is alive, including
    ///   [`write_bytes`](Self::write_bytes), sinks, and other mappings of the same file.
    pub unsafe fn as_slice(&self) -> Result<&[u8]> {
        let base = self.address()?;
        Ok(unsafe { std::slice::from_raw_parts(base.as_ptr(), self.size) })
    }

    /// Views the region as a mutable byte slice.
    ///
    /// # Safety
    /// - The region must be readable and writable, otherwise touching the slice faults.
    /// - No other mapping of the same file may be accessed while the slice is alive.
    pub unsafe fn as_mut_slice(&mut self) -> Result<&mut [u8]> {
        let base = self.address()?;
        Ok(unsafe { std::slice::from_raw_parts_mut(base.as_ptr(), self.size) })
    }
}

impl fmt::Debug for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapping")
            .field("address", &self.handle.as_ref().map(|handle| handle.as_ptr()))
            .field("size", &self.size)
            .field("access", &self.access)
            .field("mapping", &self.mapping)
            .field("path", &self.path)
            .finish()
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.close() {
            log::warn!("failed to close mapping on drop: {e}");
        }
    }
}



#[cfg(test)]
mod tests {
    use super::*;

    fn rw() -> AccessFlags {
        AccessFlags::READ | AccessFlags::WRITE
    }

    #[test]
    fn anonymous_mappings_of_various_sizes() {
        for size in [1, 4096, page_size(), page_size() * 4] {
            let mut mapping = Mapping::anonymous(size, rw(), MappingFlags::PRIVATE).unwrap();
            assert_eq!(mapping.size(), size);
            assert!(!mapping.is_file_backed());
            assert!(mapping.mapping_flags().contains(MappingFlags::ANON));
            let _ = mapping.address().unwrap();
            mapping.close().unwrap();
            assert!(mapping.is_closed());
        }
    }

    #[test]
    fn zero_size_is_rejected() {
        assert!(matches!(
            Mapping::anonymous(0, rw(), MappingFlags::PRIVATE),
            Err(Error::InvalidSize(0)),
        ));
        assert!(matches!(MapCfg::new().create(), Err(Error::InvalidSize(0))));

        let mut mapping = Mapping::anonymous(16, rw(), MappingFlags::PRIVATE).unwrap();
        assert!(matches!(mapping.resize(0), Err(Error::InvalidSize(0))));
        assert_eq!(mapping.size(), 16);
    }

    #[test]
    fn aligned_size_rounds_up_to_pages() {
        let mapping = Mapping::anonymous(1, rw(), MappingFlags::PRIVATE).unwrap();
        assert_eq!(mapping.aligned_size(), page_size());

        let mapping = Mapping::anonymous(page_size() + 1, rw(), MappingFlags::PRIVATE).unwrap();
        assert_eq!(mapping.aligned_size(), page_size() * 2);
    }

    #[test]
    fn everything_fails_after_close() {
        let mut mapping = Mapping::anonymous(64, rw(), MappingFlags::PRIVATE).unwrap();
        mapping.close().unwrap();

        assert!(matches!(mapping.close(), Err(Error::UseAfterClose)));
        assert!(matches!(mapping.address(), Err(Error::UseAfterClose)));
        assert!(matches!(mapping.resize(128), Err(Error::UseAfterClose)));
        assert!(matches!(mapping.grow_if_needed(128), Err(Error::UseAfterClose)));
        assert!(matches!(mapping.protect(AccessFlags::READ), Err(Error::UseAfterClose)));
        assert!(matches!(mapping.sync(SyncFlags::SYNC), Err(Error::UseAfterClose)));
        assert!(matches!(mapping.lock(), Err(Error::UseAfterClose)));
        assert!(matches!(mapping.read_all_bytes(), Err(Error::UseAfterClose)));
        assert!(matches!(mapping.write_bytes(0, b"x"), Err(Error::UseAfterClose)));
    }

    #[test]
    fn protect_round_trip() {
        let mut mapping = Mapping::anonymous(page_size(), rw(), MappingFlags::PRIVATE).unwrap();

        mapping.protect(AccessFlags::READ).unwrap();
        assert_eq!(mapping.access_flags(), AccessFlags::READ);
        assert!(matches!(
            mapping.write_bytes(0, b"nope"),
            Err(Error::AccessDenied { .. }),
        ));

        mapping.protect(AccessFlags::NONE).unwrap();
        assert!(matches!(
            mapping.read_bytes(0, &mut [0; 4]),
            Err(Error::AccessDenied { .. }),
        ));

        mapping.protect(rw()).unwrap();
        assert_eq!(mapping.access_flags(), rw());
        assert_eq!(mapping.write_bytes(0, b"back").unwrap(), 4);
    }

    #[test]
    fn bulk_ops_saturate_at_the_end() {
        let mapping = Mapping::anonymous(8, rw(), MappingFlags::PRIVATE).unwrap();

        assert_eq!(mapping.write_bytes(4, b"abcdefgh").unwrap(), 4);
        assert_eq!(mapping.write_bytes(8, b"x").unwrap(), 0);
        assert_eq!(mapping.write_bytes(100, b"x").unwrap(), 0);

        let mut buf = [0; 16];
        assert_eq!(mapping.read_bytes(2, &mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], b"\0\0abcd");

        assert_eq!(mapping.read_all_bytes().unwrap(), b"\0\0\0\0abcd");

        mapping.zero().unwrap();
        assert_eq!(mapping.read_all_bytes().unwrap(), [0; 8]);
    }

    #[test]
    fn copy_between_mappings() {
        let a = Mapping::anonymous(16, rw(), MappingFlags::PRIVATE).unwrap();
        let b = Mapping::anonymous(10, rw(), MappingFlags::PRIVATE).unwrap();
        a.write_bytes(0, b"0123456789abcdef").unwrap();

        // min(16 - 4, 10 - 3) = 7
        assert_eq!(a.copy_to(&b, 100, 4, 3).unwrap(), 7);
        assert_eq!(b.read_all_bytes().unwrap(), b"\0\0\0456789a");

        assert_eq!(a.copy_from(&b, 2, 8, 0).unwrap(), 2);
        assert_eq!(&a.read_all_bytes().unwrap()[..4], b"9a23");

        assert_eq!(a.copy_to(&b, 5, 20, 0).unwrap(), 0);
    }

    #[test]
    fn copy_requires_access_on_both_sides() {
        let src = Mapping::anonymous(8, AccessFlags::WRITE, MappingFlags::PRIVATE).unwrap();
        let dst = Mapping::anonymous(8, AccessFlags::READ, MappingFlags::PRIVATE).unwrap();
        let ok = Mapping::anonymous(8, rw(), MappingFlags::PRIVATE).unwrap();

        assert!(matches!(src.copy_to(&ok, 8, 0, 0), Err(Error::AccessDenied { .. })));
        assert!(matches!(ok.copy_to(&dst, 8, 0, 0), Err(Error::AccessDenied { .. })));
    }

    #[test]
    fn anonymous_resize() {
        let mut mapping = Mapping::anonymous(page_size(), rw(), MappingFlags::PRIVATE).unwrap();
        assert!(!mapping.resize(page_size()).unwrap());
        assert!(mapping.resize(page_size() * 3).unwrap());
        assert_eq!(mapping.size(), page_size() * 3);
        assert_eq!(mapping.write_bytes(page_size() * 3 - 1, b"z").unwrap(), 1);
    }

    #[test]
    fn read_only_file_maps_existing_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("testfile.txt");
        let contents: Vec<u8> = (0..4096).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &contents).unwrap();

        let mapping = MapCfg::new()
            .path(&path)
            .access(AccessFlags::READ)
            .size(16)
            .create()
            .unwrap();
        assert_eq!(mapping.size(), 4096);
        assert_eq!(mapping.path(), Some(path.as_path()));
        assert_eq!(mapping.mapping_flags(), MappingFlags::SHARED);
        assert_eq!(mapping.read_all_bytes().unwrap(), contents);
        assert!(matches!(mapping.write_bytes(0, b"x"), Err(Error::AccessDenied { .. })));
    }

    #[test]
    fn read_only_mapping_needs_a_non_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(matches!(
            Mapping::open(&missing, AccessFlags::READ, MappingFlags::SHARED, 16),
            Err(Error::OpenFailed { .. }),
        ));

        let empty = dir.path().join("empty");
        fs::write(&empty, b"").unwrap();
        assert!(matches!(
            Mapping::open(&empty, AccessFlags::READ, MappingFlags::SHARED, 16),
            Err(Error::InvalidSize(0)),
        ));
    }

    #[test]
    fn file_mapping_needs_read_or_write() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Mapping::open(dir.path().join("f"), AccessFlags::EXEC, MappingFlags::SHARED, 16),
            Err(Error::UnsupportedAccessCombination(_)),
        ));
    }

    #[test]
    fn new_file_grows_and_shrinks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("newfile.txt");
        let page = page_size();

        let mut mapping = MapCfg::new().path(&path).size(page * 2).create().unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), (page * 2) as u64);

        assert!(mapping.grow_if_needed(page * 4).unwrap());
        assert_eq!(mapping.size(), page * 4);
        assert!(!mapping.shrink_if_needed(page * 4).unwrap());
        assert!(!mapping.grow_if_needed(page).unwrap());

        // The grown tail is zero-filled.
        assert!(mapping.read_all_bytes().unwrap().iter().all(|&b| b == 0));
        assert_eq!(fs::metadata(&path).unwrap().len(), (page * 4) as u64);
    }

    #[test]
    fn resize_preserves_leading_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");

        let mut mapping = Mapping::open(&path, rw(), MappingFlags::SHARED, 64).unwrap();
        mapping.write_bytes(0, b"persistent").unwrap();

        assert!(mapping.resize(page_size() * 2).unwrap());
        assert!(mapping.resize(10).unwrap());
        assert_eq!(mapping.read_all_bytes().unwrap(), b"persistent");
        assert_eq!(fs::metadata(&path).unwrap().len(), 10);
    }

    #[test]
    fn read_only_overwrite_keeps_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("important");
        fs::write(&path, b"important data").unwrap();

        let result = MapCfg::new()
            .path(&path)
            .access(AccessFlags::READ)
            .overwrite(true)
            .create();
        assert!(matches!(result, Err(Error::AccessDenied { .. })));
        assert_eq!(fs::read(&path).unwrap(), b"important data");
    }

    #[test]
    fn failed_protect_keeps_access_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readonly");
        fs::write(&path, [1; 64]).unwrap();

        // The descriptor was opened read-only, so a shared writable view is refused.
        let mut mapping = Mapping::open(&path, AccessFlags::READ, MappingFlags::SHARED, 64).unwrap();
        assert!(matches!(mapping.protect(rw()), Err(Error::ProtectFailed(_))));
        assert_eq!(mapping.access_flags(), AccessFlags::READ);
        assert!(matches!(mapping.write_bytes(0, b"x"), Err(Error::AccessDenied { .. })));
    }

    #[test]
    fn read_only_file_cannot_resize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro");
        fs::write(&path, [7; 32]).unwrap();

        let mut mapping = Mapping::open(&path, AccessFlags::READ, MappingFlags::SHARED, 32).unwrap();
        assert!(matches!(mapping.resize(64), Err(Error::AccessDenied { .. })));
        assert!(!mapping.is_closed());
        assert_eq!(mapping.size(), 32);
    }

    #[test]
    fn existing_file_keeps_contents_unless_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keep");
        fs::write(&path, b"hello").unwrap();

        let mapping = MapCfg::new().path(&path).size(2).create().unwrap();
        assert_eq!(mapping.size(), 5);
        assert_eq!(mapping.read_all_bytes().unwrap(), b"hello");
        drop(mapping);

        let mapping = MapCfg::new().path(&path).size(3).overwrite(true).create().unwrap();
        assert_eq!(mapping.size(), 3);
        assert_eq!(mapping.read_all_bytes().unwrap(), [0; 3]);
    }

    #[test]
    fn shared_writes_reach_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared");

        let mut mapping = MapCfg::new().path(&path).size(8).create().unwrap();
        mapping.write_bytes(0, b"shared!!").unwrap();
        mapping.sync(SyncFlags::SYNC).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"shared!!");
        mapping.close().unwrap();
    }

    #[test]
    fn private_writes_stay_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("private");
        fs::write(&path, b"original").unwrap();

        let mapping = MapCfg::new()
            .path(&path)
            .size(8)
            .mapping(MappingFlags::PRIVATE)
            .create()
            .unwrap();
        mapping.write_bytes(0, b"modified").unwrap();
        mapping.sync(SyncFlags::SYNC).unwrap();
        assert_eq!(mapping.read_all_bytes().unwrap(), b"modified");
        assert_eq!(fs::read(&path).unwrap(), b"original");
    }

    #[test]
    fn drop_closes_open_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dropped");
        {
            let mapping = MapCfg::new().path(&path).size(4).create().unwrap();
            mapping.write_bytes(0, b"drop").unwrap();
        }
        assert_eq!(fs::read(&path).unwrap(), b"drop");
    }

    #[test]
    fn lock_and_unlock_one_page() {
        let mapping = Mapping::anonymous(page_size(), rw(), MappingFlags::PRIVATE).unwrap();
        // Locking can be refused by RLIMIT_MEMLOCK; only the error kind is checked then.
        match mapping.lock() {
            Ok(()) => mapping.unlock().unwrap(),
            Err(e) => assert!(matches!(e, Error::LockFailed(_))),
        }
    }

    #[test]
    fn debug_shows_state() {
        let mut mapping = Mapping::anonymous(32, AccessFlags::READ, MappingFlags::PRIVATE).unwrap();
        let text = format!("{mapping:?}");
        assert!(text.contains("size: 32"));
        assert!(text.contains("AccessFlags(READ)"));
        mapping.close().unwrap();
        assert!(format!("{mapping:?}").contains("address: None"));
    }
}
