//! Component E: translates `fuser`'s kernel filesystem callbacks into
//! catalog lookups, ingestion calls, and the `.refresh` action.
//!
//! `fuser`'s protocol is inode-based (it's the same wire protocol the
//! kernel speaks to any FUSE implementation), so an extra layer not named
//! explicitly in spec.md's path-based operation table -- a stable path <->
//! inode mapping recomputed each time the Catalog is rebuilt -- sits
//! underneath the five operations the spec does name. The operations
//! themselves keep the exact behavior spec.md §4.E describes.

use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEntry, ReplyOpen,
    ReplyWrite, Request,
};
use log::{debug, info, warn};

use crate::bootstrap;
use crate::catalog::{Catalog, LogMount};
use crate::config;
use crate::matcher;
use crate::pool::ConnectionPool;
use crate::sql;

const ROOT_INO: u64 = 1;
const REFRESH_INO: u64 = 2;
const FIRST_MOUNT_INO: u64 = 3;
const REFRESH_NAME: &str = ".refresh";
const ATTR_TTL: Duration = Duration::from_secs(1);

/// An immutable, point-in-time view of the Catalog plus the path<->inode
/// mapping derived from it. Replaced wholesale on refresh; never mutated.
struct CatalogSnapshot {
    catalog: Catalog,
    name_to_ino: HashMap<String, u64>,
    ino_to_name: HashMap<u64, String>,
}

impl CatalogSnapshot {
    fn build(catalog: Catalog) -> CatalogSnapshot {
        let mut name_to_ino = HashMap::with_capacity(catalog.mount_count());
        let mut ino_to_name = HashMap::with_capacity(catalog.mount_count());
        let mut next_ino = FIRST_MOUNT_INO;
        for mount in catalog.iter_mounts() {
            name_to_ino.insert(mount.path.clone(), next_ino);
            ino_to_name.insert(next_ino, mount.path.clone());
            next_ino += 1;
        }
        CatalogSnapshot {
            catalog,
            name_to_ino,
            ino_to_name,
        }
    }

    fn mount_by_ino(&self, ino: u64) -> Option<&LogMount> {
        self.ino_to_name
            .get(&ino)
            .and_then(|name| self.catalog.lookup_mount(name))
    }
}

/// The `fuser::Filesystem` implementation. Holds a reader-writer lock
/// around the live `CatalogSnapshot` (readers -- every op but refresh --
/// clone the `Arc` under a short-lived read lock and never hold the lock
/// across a database round-trip) and the shared `ConnectionPool`.
pub struct LoggerFs {
    state: RwLock<Arc<CatalogSnapshot>>,
    pool: ConnectionPool,
}

impl LoggerFs {
    pub fn new(catalog: Catalog, pool: ConnectionPool) -> LoggerFs {
        LoggerFs {
            state: RwLock::new(Arc::new(CatalogSnapshot::build(catalog))),
            pool,
        }
    }

    fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.state.read().expect("catalog lock poisoned").clone()
    }

    /// Reloads `schemas.xml`/`logs.xml`, provisions any new tables, and
    /// swaps in a new Catalog. Best-effort: any failure along the way
    /// leaves the live state untouched and is only logged, never
    /// propagated to the FUSE caller (spec.md §4.E, §7 -- `open(".refresh")`
    /// always succeeds from the kernel's point of view).
    fn refresh(&self) {
        let (schemas, mounts) = match config::load() {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("refresh: config reload failed, keeping live state: {e}");
                return;
            }
        };
        let new_catalog = match Catalog::new(schemas, mounts) {
            Ok(c) => c,
            Err(e) => {
                warn!("refresh: new catalog is invalid, keeping live state: {e}");
                return;
            }
        };
        if let Err(e) = bootstrap::provision_tables(&new_catalog, &self.pool) {
            warn!("refresh: couldn't provision tables, keeping live state: {e}");
            return;
        }

        let live_paths: HashSet<String> = new_catalog
            .iter_mounts()
            .map(|m| m.path.clone())
            .collect();
        self.pool.reconcile(&live_paths);

        let snapshot = Arc::new(CatalogSnapshot::build(new_catalog));
        let mount_count = live_paths.len();
        *self.state.write().expect("catalog lock poisoned") = snapshot;
        info!("refresh complete: {mount_count} mount(s) live");
    }

    /// Ingests one write's worth of bytes against `mount`, per spec.md
    /// §4.E: split on `\n`, trim, run the matcher, insert each match.
    /// Returns the number of rows successfully inserted; a per-insert
    /// database failure is logged and otherwise swallowed -- the write
    /// still reports success to the kernel (spec.md §7).
    fn ingest(&self, mount: &LogMount, catalog: &Catalog, data: &[u8]) -> usize {
        let text = String::from_utf8_lossy(data);
        let mut inserted = 0usize;
        for raw_line in text.split('\n') {
            let line = matcher::trim_line(raw_line);
            if line.is_empty() {
                continue;
            }
            for result in matcher::match_line(line, mount, catalog) {
                let insert_sql = sql::build_insert(mount, result.schema, &result.bindings);
                match self.pool.with_connection(mount, |conn| conn.execute(&insert_sql)) {
                    Ok(()) => inserted += 1,
                    Err(e) => warn!(
                        "insert into `{}` failed for mount `/{}`: {e}",
                        mount.endpoint.table, mount.path
                    ),
                }
            }
        }
        inserted
    }
}

fn dir_attr(ino: u64, now: SystemTime) -> FileAttr {
    FileAttr {
        ino,
        size: 0,
        blocks: 0,
        atime: now,
        mtime: now,
        ctime: now,
        crtime: now,
        kind: FileType::Directory,
        perm: 0o555,
        nlink: 2,
        uid: 0,
        gid: 0,
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

fn refresh_attr(ino: u64, now: SystemTime) -> FileAttr {
    FileAttr {
        ino,
        size: 0,
        blocks: 0,
        atime: now,
        mtime: now,
        ctime: now,
        crtime: now,
        kind: FileType::RegularFile,
        perm: 0o000,
        nlink: 1,
        uid: 0,
        gid: 0,
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

fn mount_attr(ino: u64, mount: &LogMount, now: SystemTime) -> FileAttr {
    FileAttr {
        ino,
        size: 0,
        blocks: 0,
        atime: now,
        mtime: now,
        ctime: now,
        crtime: now,
        kind: FileType::RegularFile,
        perm: mount.effective_mode() as u16,
        nlink: 1,
        uid: mount.owner,
        gid: mount.group,
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

impl LoggerFs {
    /// Resolves a name under the root directory to the attributes `lookup`
    /// would reply with. `None` means `ENOENT`. Kept separate from the
    /// trait method so it can be unit-tested without a `fuser::Request`,
    /// which has no public test constructor.
    fn lookup_name(&self, parent: u64, name: &str) -> Option<FileAttr> {
        if parent != ROOT_INO {
            return None;
        }
        let now = SystemTime::now();
        if name == REFRESH_NAME {
            return Some(refresh_attr(REFRESH_INO, now));
        }
        let snapshot = self.snapshot();
        let mount = snapshot.catalog.lookup_mount(name)?;
        let ino = *snapshot
            .name_to_ino
            .get(name)
            .expect("mount present in catalog implies an assigned inode");
        Some(mount_attr(ino, mount, now))
    }

    /// Resolves an inode to the attributes `getattr` would reply with.
    /// `None` means `ENOENT`.
    fn attr_for_ino(&self, ino: u64) -> Option<FileAttr> {
        let now = SystemTime::now();
        if ino == ROOT_INO {
            return Some(dir_attr(ROOT_INO, now));
        }
        if ino == REFRESH_INO {
            return Some(refresh_attr(REFRESH_INO, now));
        }
        let snapshot = self.snapshot();
        snapshot.mount_by_ino(ino).map(|mount| mount_attr(ino, mount, now))
    }

    /// The full root-directory listing `readdir` walks, in Catalog
    /// iteration order, with `.`/`..`/`.refresh` first.
    fn directory_entries(&self) -> Vec<(u64, FileType, String)> {
        let snapshot = self.snapshot();
        let mut entries: Vec<(u64, FileType, String)> = vec![
            (ROOT_INO, FileType::Directory, ".".to_string()),
            (ROOT_INO, FileType::Directory, "..".to_string()),
            (REFRESH_INO, FileType::RegularFile, REFRESH_NAME.to_string()),
        ];
        for mount in snapshot.catalog.iter_mounts() {
            let ino = *snapshot
                .name_to_ino
                .get(&mount.path)
                .expect("every catalog mount has an assigned inode");
            entries.push((ino, FileType::RegularFile, mount.path.clone()));
        }
        entries
    }

    /// `open`'s dispatch: triggers a refresh for the `.refresh` inode
    /// (always "succeeding"), otherwise succeeds iff `ino` resolves in the
    /// live Catalog. Returns whether the open should succeed.
    fn open_ino(&self, ino: u64) -> bool {
        if ino == REFRESH_INO {
            self.refresh();
            return true;
        }
        self.snapshot().mount_by_ino(ino).is_some()
    }

    /// `write`'s dispatch: ingests `data` against the mount at `ino`.
    /// `None` means `ino` is unknown (`ENOENT`); otherwise the number of
    /// bytes the kernel should be told were consumed -- always all of
    /// `data`, per spec.md §8, regardless of how many lines matched.
    fn write_ino(&self, ino: u64, data: &[u8]) -> Option<u32> {
        let snapshot = self.snapshot();
        let mount = snapshot.mount_by_ino(ino)?;
        let inserted = self.ingest(mount, &snapshot.catalog, data);
        debug!(
            "ingested {inserted} row(s) from a {}-byte write to `/{}`",
            data.len(),
            mount.path
        );
        Some(data.len() as u32)
    }
}

impl Filesystem for LoggerFs {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.lookup_name(parent, name) {
            Some(attr) => reply.entry(&ATTR_TTL, &attr, 0),
            None => reply.error(libc::ENOENT),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.attr_for_ino(ino) {
            Some(attr) => reply.attr(&ATTR_TTL, &attr),
            None => reply.error(libc::ENOENT),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        if ino != ROOT_INO {
            reply.error(libc::ENOENT);
            return;
        }
        let entries = self.directory_entries();
        for (i, (ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            // reply.add returns true when the kernel's buffer is full.
            if reply.add(ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        if self.open_ino(ino) {
            reply.opened(0, 0);
        } else {
            reply.error(libc::ENOENT);
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _offset: i64,
        _size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        // Reading any loggerfs file is refused, regardless of which file or
        // whether it even exists -- spec.md §4.E / §8.
        reply.error(libc::EACCES);
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        match self.write_ino(ino, data) {
            Some(size) => reply.written(size),
            None => reply.error(libc::ENOENT),
        }
    }
}
