//! Mapping Flags



use bitflags::bitflags;



bitflags! {
    /// The permissions a process holds on the pages of a mapping.
    ///
    /// The empty set is valid and means "no access": touching the pages faults.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u8 {
        /// The mapped memory may be read.
        const READ = 0x01;
        /// The mapped memory may be written.
        const WRITE = 0x02;
        /// The mapped memory may be executed.
        const EXEC = 0x04;
    }
}

bitflags! {
    /// The kind of mapping to create.
    ///
    /// `SHARED` and `PRIVATE` may both be set; the backend gives `SHARED` precedence.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MappingFlags: u8 {
        /// Not backed by any file. Forced on for every mapping created without a path.
        const ANON = 0x01;
        /// Copy-on-write; writes are not visible to other mappers or the backing file.
        const PRIVATE = 0x02;
        /// Writes propagate to the backing file and to every other mapper.
        const SHARED = 0x04;
    }
}

bitflags! {
    /// How [`Mapping::sync`](crate::Mapping::sync) pushes changes to the backing store.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SyncFlags: u8 {
        /// Schedule the write-back and wait for it to complete.
        const SYNC = 0x01;
        /// Schedule the write-back and return immediately.
        const ASYNC = 0x02;
        /// Invalidate other mappings of the same file so they observe the new contents.
        const INVALIDATE = 0x04;
    }
}

macro_rules! impl_combine {
    ($($name:ident),+) => {$(
        impl $name {
            pub const NONE: Self = Self::empty();

            /// Bitwise union of both sets.
            pub const fn combine(self, other: Self) -> Self {
                self.union(other)
            }
        }
    )+};
}

impl_combine!(AccessFlags, MappingFlags, SyncFlags);

impl AccessFlags {
    /// Whether data can be copied out of pages with these permissions.
    pub const fn is_readable(self) -> bool {
        self.intersects(Self::READ.union(Self::EXEC))
    }

    pub const fn is_writable(self) -> bool {
        self.contains(Self::WRITE)
    }
}
