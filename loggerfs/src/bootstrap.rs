//! Component F: loads config, materializes the Catalog, and provisions any
//! missing tables before the filesystem is mounted.

use std::collections::BTreeSet;

use log::{info, warn};

use crate::catalog::{Catalog, LogMount};
use crate::config;
use crate::error::Result;
use crate::pool::ConnectionPool;
use crate::sql;

/// Runs once at startup. Kept as a small struct (rather than a free
/// function) only so it can carry the hostname read once at construction,
/// the way the original constructor does (`gethostname` in
/// `examples/original_source/src/loggerfs.cpp`) -- see SPEC_FULL.md §F.
pub struct Bootstrapper {
    hostname: String,
}

impl Bootstrapper {
    pub fn new() -> Bootstrapper {
        let hostname = read_hostname();
        info!("loggerfs starting on host `{hostname}`");
        Bootstrapper { hostname }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Loads config, builds a `Catalog`, and ensures every mount's table
    /// exists. A table-creation failure after a successful config load is
    /// fatal to startup (spec.md §4.F, §7).
    pub fn bootstrap(&self, pool: &ConnectionPool) -> Result<Catalog> {
        let (schemas, mounts) = config::load()?;
        let catalog = Catalog::new(schemas, mounts)?;
        provision_tables(&catalog, pool)?;
        Ok(catalog)
    }
}

impl Default for Bootstrapper {
    fn default() -> Self {
        Bootstrapper::new()
    }
}

/// For each mount: probe its table with `SELECT * FROM <table> LIMIT 0`;
/// create it with the union of its schemas' columns if the probe fails.
pub fn provision_tables(catalog: &Catalog, pool: &ConnectionPool) -> Result<()> {
    for mount in catalog.iter_mounts() {
        let columns = column_universe(catalog, mount);
        pool.with_connection(mount, |conn| {
            if conn.probe_table(&mount.endpoint.table) {
                info!(
                    "table `{}` already exists for mount `/{}`",
                    mount.endpoint.table, mount.path
                );
                return Ok(());
            }
            let create_sql = sql::build_create_table(mount, &columns);
            conn.execute(&create_sql).map_err(|e| {
                warn!(
                    "couldn't create table `{}` for mount `/{}`: {e}",
                    mount.endpoint.table, mount.path
                );
                e
            })?;
            info!("created table `{}` for mount `/{}`", mount.endpoint.table, mount.path);
            Ok(())
        })?;
    }
    Ok(())
}

/// The union of column names across every schema a mount references,
/// skipping schema names that don't resolve in the catalog (spec.md §3).
fn column_universe(catalog: &Catalog, mount: &LogMount) -> BTreeSet<String> {
    let mut columns = BTreeSet::new();
    for schema_name in &mount.schemas {
        if let Some(schema) = catalog.lookup_schema(schema_name) {
            columns.extend(schema.columns.iter().cloned());
        } else {
            warn!(
                "mount `/{}` references undefined schema `{}`; its columns are excluded from the table",
                mount.path, schema_name
            );
        }
    }
    columns
}

/// Reads the local hostname via `gethostname(2)`, matching the original's
/// constructor. There's no safe std equivalent to this syscall, hence the
/// narrow `unsafe` block.
fn read_hostname() -> String {
    let mut buf = vec![0u8; 256];
    let ret = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if ret != 0 {
        return "unknown".to_string();
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Backend, Endpoint, Schema};
    use regex::Regex;

    #[test]
    fn column_universe_is_union_across_schemas() {
        let a = Schema::new(
            "a".into(),
            Regex::new(r"^(\w+)$").unwrap(),
            vec!["x".into()],
        )
        .unwrap();
        let b = Schema::new(
            "b".into(),
            Regex::new(r"^(\w+) (\w+)$").unwrap(),
            vec!["x".into(), "y".into()],
        )
        .unwrap();
        let mount = LogMount {
            path: "m".into(),
            schemas: vec!["a".into(), "b".into()],
            backend: Backend::Postgresql,
            endpoint: Endpoint {
                host: "h".into(),
                port: 0,
                database: "d".into(),
                table: "t".into(),
                username: "u".into(),
                password: "".into(),
            },
            owner: 0,
            group: 0,
            mode: 0,
        };
        let catalog = Catalog::new(vec![a, b], vec![mount]).unwrap();
        let mount = catalog.lookup_mount("m").unwrap();
        let columns = column_universe(&catalog, mount);
        assert_eq!(columns, BTreeSet::from(["x".to_string(), "y".to_string()]));
    }

    #[test]
    fn read_hostname_is_non_empty() {
        assert!(!read_hostname().is_empty());
    }
}
