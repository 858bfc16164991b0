//! POSIX-like file descriptor layer over asynchronous capability handles.
//!
//! A sandboxed program speaks in fds, byte offsets and open flags; the
//! backend speaks in file and directory handles with no seek, no
//! truncate-on-open and one-shot directory enumeration. [`FdTable`] bridges
//! the two.

pub mod dir;
pub mod entry;
pub mod error;
pub mod file;
pub mod flags;
pub mod handle;
pub mod host;
pub mod memory;
pub mod preopen;
pub mod table;

/// File descriptor number.
pub type Fd = u32;

pub use dir::{DirEntries, OpenDirectory};
pub use entry::OpenEntry;
pub use error::{BackendError, Error, Result};
pub use file::OpenFile;
pub use flags::{FileOrDir, OpenFlags};
pub use handle::{DirectoryHandle, EntryKind, FileHandle, Handle, WriteMode, WriteStream};
pub use table::{FIRST_PREOPEN_FD, FdTable};
