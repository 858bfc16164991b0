use bitflags::bitflags;

// Bit values follow the WASI `oflags` layout so callers can pass them through.
/// Create the entry if it does not exist.
const O_CREAT: u16 = 1;

/// Fail unless the entry is a directory.
const O_DIRECTORY: u16 = 2;

/// Together with `O_CREAT`, fail if the entry already exists.
const O_EXCL: u16 = 4;

/// Discard the file's content on open.
const O_TRUNC: u16 = 8;

bitflags! {
    /// Flags controlling how `open` treats the target entry.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct OpenFlags: u16 {
        const CREATE = O_CREAT;
        const DIRECTORY = O_DIRECTORY;
        const EXCLUSIVE = O_EXCL;
        const TRUNCATE = O_TRUNC;
    }
}

bitflags! {
    /// Which kinds of entry an open is willing to accept or create.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FileOrDir: u8 {
        const FILE = 1;
        const DIRECTORY = 2;
        const ANY = Self::FILE.bits() | Self::DIRECTORY.bits();
    }
}
