//! Host-level errors: programming faults and impossible states surfaced to
//! the CLI driver, distinct from the guest-visible [`crate::exception::Exception`]
//! and [`crate::interrupt::Interrupt`] traps the hart itself takes.
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EmulatorError {
    #[error("failed to read kernel image {path}: {source}")]
    KernelRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read disk image {path}: {source}")]
    DiskRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("fatal emulation fault: {0}")]
    Fatal(#[from] crate::exception::Exception),
}
