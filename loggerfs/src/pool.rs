//! Component D: a per-virtual-path cache of open database connections.
//!
//! The map itself is guarded by a mutex that is released before any query
//! runs; each entry additionally carries its own mutex so that a lease on
//! one path's connection never blocks a write to a different path, while
//! two writers on the *same* path serialize (spec.md §5).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use log::info;

use crate::catalog::{Backend, Endpoint, LogMount};
use crate::error::{LoggerFsError, Result};

/// An open handle to one of the two supported backends.
pub enum ConnHandle {
    Postgresql(postgres::Client),
    Mysql(mysql::Conn),
}

impl ConnHandle {
    fn open(path: &str, endpoint: &Endpoint, backend: Backend) -> Result<ConnHandle> {
        match backend {
            Backend::Postgresql => {
                let conn_info = pg_connection_string(endpoint);
                let client = postgres::Client::connect(&conn_info, postgres::NoTls)
                    .map_err(|e| pool_error(path, e))?;
                Ok(ConnHandle::Postgresql(client))
            }
            Backend::Mysql => {
                let opts = mysql_opts(endpoint);
                let conn = mysql::Conn::new(opts).map_err(|e| pool_error(path, e))?;
                Ok(ConnHandle::Mysql(conn))
            }
        }
    }

    /// Executes a statement that returns no rows (`CREATE TABLE`, `INSERT`).
    pub fn execute(&mut self, sql: &str) -> Result<()> {
        match self {
            ConnHandle::Postgresql(client) => client
                .batch_execute(sql)
                .map_err(|e| LoggerFsError::Sql(e.to_string())),
            ConnHandle::Mysql(conn) => {
                use mysql::prelude::Queryable;
                conn.query_drop(sql)
                    .map_err(|e| LoggerFsError::Sql(e.to_string()))
            }
        }
    }

    /// Probes whether `table` exists by attempting a zero-row select,
    /// per spec.md §4.F. Any failure (missing table, permission denied,
    /// connection trouble) is treated uniformly as "doesn't exist yet".
    pub fn probe_table(&mut self, table: &str) -> bool {
        self.execute(&format!("SELECT * FROM {table} LIMIT 0")).is_ok()
    }
}

fn pool_error(path: &str, source: impl std::error::Error + Send + Sync + 'static) -> LoggerFsError {
    LoggerFsError::Pool {
        path: path.to_string(),
        source: Box::new(source),
    }
}

/// Builds a libpq-style space-separated `key=value` connection string.
/// Values that are empty or contain whitespace/quotes/backslashes are
/// single-quoted and escaped, per spec.md §9 ("a rewrite must quote values
/// containing whitespace or special characters").
fn pg_connection_string(endpoint: &Endpoint) -> String {
    let mut s = format!(
        "dbname={} user={} password={} host={}",
        quote_conninfo_value(&endpoint.database),
        quote_conninfo_value(&endpoint.username),
        quote_conninfo_value(&endpoint.password),
        quote_conninfo_value(&endpoint.host),
    );
    if endpoint.port > 0 {
        s.push_str(&format!(" port={}", endpoint.port));
    }
    s
}

fn quote_conninfo_value(value: &str) -> String {
    let needs_quoting =
        value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quoting {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Builds MySQL connect options. Per spec.md §9's "port handling asymmetry"
/// note, the configured port is always passed -- the original only supplied
/// it on the table-creation path and silently used 0 (server default) when
/// ingesting, which this design treats as a bug to fix rather than
/// preserve.
fn mysql_opts(endpoint: &Endpoint) -> mysql::Opts {
    let port = if endpoint.port > 0 { endpoint.port } else { 3306 };
    mysql::OptsBuilder::new()
        .ip_or_hostname(Some(endpoint.host.clone()))
        .user(Some(endpoint.username.clone()))
        .pass(Some(endpoint.password.clone()))
        .db_name(Some(endpoint.database.clone()))
        .tcp_port(port)
        .into()
}

/// Per-virtual-path cache of open database connections for both backends.
pub struct ConnectionPool {
    entries: Mutex<HashMap<String, Arc<Mutex<Option<ConnHandle>>>>>,
}

impl ConnectionPool {
    pub fn new() -> ConnectionPool {
        ConnectionPool {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, path: &str) -> Arc<Mutex<Option<ConnHandle>>> {
        let mut entries = self.entries.lock().unwrap();
        entries
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Runs `f` against the pooled connection for `mount`'s path, opening
    /// one lazily on first use. Holds an exclusive per-path lease for the
    /// duration of `f` -- the outer map lock is released well before `f`
    /// runs, so this never blocks a write to a different path.
    pub fn with_connection<T>(
        &self,
        mount: &LogMount,
        f: impl FnOnce(&mut ConnHandle) -> Result<T>,
    ) -> Result<T> {
        let slot = self.slot(&mount.path);
        let mut guard = slot.lock().unwrap();
        if guard.is_none() {
            let handle = ConnHandle::open(&mount.path, &mount.endpoint, mount.backend)?;
            info!("opened pooled connection for `{}`", mount.path);
            *guard = Some(handle);
        }
        let handle = guard.as_mut().expect("just inserted above");
        f(handle)
    }

    /// Drops every open handle: pool teardown, or the first half of a
    /// refresh's reconciliation.
    pub fn close_all(&self) {
        let mut entries = self.entries.lock().unwrap();
        entries.clear();
    }

    /// Closes handles for paths no longer present in `live_paths`. Paths
    /// that are new are not opened eagerly; they open lazily on first use.
    pub fn reconcile(&self, live_paths: &HashSet<String>) {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|path, _| live_paths.contains(path));
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        ConnectionPool::new()
    }
}
