//! loggerfs: a virtual filesystem whose files are write-only log sinks.
//! Any line written to one is matched against one or more regex schemas and,
//! on a match, inserted as a row into a configured PostgreSQL or MySQL
//! table. See `SPEC_FULL.md` for the full design.

pub mod bootstrap;
pub mod catalog;
pub mod config;
pub mod error;
mod fs;
pub mod matcher;
pub mod pool;
pub mod sql;

use std::path::Path;

use log::info;

pub use error::{LoggerFsError, Result};
pub use fs::LoggerFs;
/// Re-exported so callers (the `loggerfs-cli` binary, or anyone embedding
/// `mount`) don't need a direct `fuser` dependency just to build the
/// options slice `mount` forwards unchanged.
pub use fuser::MountOption;

use bootstrap::Bootstrapper;
use pool::ConnectionPool;

/// Loads configuration, provisions any missing tables, and mounts the
/// filesystem at `mountpoint`. Blocks until the filesystem is unmounted.
///
/// `options` are forwarded to `fuser` unchanged -- spec.md §6: "the
/// mount-point path and any filesystem-library options are forwarded
/// unchanged."
pub fn mount(mountpoint: &Path, options: &[MountOption]) -> Result<()> {
    let pool = ConnectionPool::new();
    let bootstrapper = Bootstrapper::new();
    let catalog = bootstrapper.bootstrap(&pool)?;
    info!(
        "loggerfs ready: {} mount(s) configured for host `{}`, mounting at {}",
        catalog.mount_count(),
        bootstrapper.hostname(),
        mountpoint.display()
    );
    let filesystem = LoggerFs::new(catalog, pool);
    fuser::mount2(filesystem, mountpoint, options)?;
    Ok(())
}
