//! Component A: the in-memory registry of schemas and log mounts.
//!
//! A `Catalog` is immutable once built. Refresh (see `fs.rs`) builds a whole
//! new `Catalog` and swaps it in atomically rather than mutating an existing
//! one, so readers never observe a partially-updated registry.

use std::collections::HashMap;

use regex::Regex;

use crate::error::{LoggerFsError, Result};

/// One database backend family a mount can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgresql,
    Mysql,
}

impl Backend {
    pub fn from_config_str(s: &str) -> Option<Backend> {
        match s {
            "postgresql" | "pgsql" => Some(Backend::Postgresql),
            "mysql" => Some(Backend::Mysql),
            _ => None,
        }
    }
}

/// Database connection coordinates for a mount, taken from its `<log>` entry.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub host: String,
    /// 0 means "use the backend's default port".
    pub port: u16,
    pub database: String,
    pub table: String,
    pub username: String,
    pub password: String,
}

/// A named parsing rule: a compiled regex paired with the columns its
/// capture groups feed.
#[derive(Debug, Clone)]
pub struct Schema {
    pub name: String,
    pub regex: Regex,
    pub columns: Vec<String>,
}

impl Schema {
    /// Builds a `Schema`, enforcing the capture-count/column-count invariant
    /// from spec.md §3. Schemas that violate it are rejected here, at load
    /// time, not deferred to match time.
    pub fn new(name: String, regex: Regex, columns: Vec<String>) -> Result<Schema> {
        if name.is_empty() {
            return Err(LoggerFsError::Schema("schema name must not be empty".into()));
        }
        for col in &columns {
            if !is_valid_identifier(col) {
                return Err(LoggerFsError::Schema(format!(
                    "invalid column identifier `{col}` in schema `{name}`"
                )));
            }
        }
        let capture_count = regex.captures_len().saturating_sub(1);
        if capture_count != columns.len() {
            return Err(LoggerFsError::Schema(format!(
                "schema `{name}` has {capture_count} capture groups but {} columns",
                columns.len()
            )));
        }
        Ok(Schema { name, regex, columns })
    }
}

/// A single virtual file exposed by the filesystem, and everything needed to
/// turn a matched line written to it into a row.
#[derive(Debug, Clone)]
pub struct LogMount {
    pub path: String,
    pub schemas: Vec<String>,
    pub backend: Backend,
    pub endpoint: Endpoint,
    pub owner: u32,
    pub group: u32,
    /// 0 means "default write-only 0222".
    pub mode: u32,
}

impl LogMount {
    pub fn effective_mode(&self) -> u32 {
        if self.mode != 0 {
            self.mode
        } else {
            0o222
        }
    }
}

/// Returns true for identifiers that are safe to splice verbatim into
/// generated SQL: ASCII alphanumeric plus underscore, not starting with a
/// digit. This is the validation spec.md §4.C pushes onto the loader.
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The in-memory union of all schemas and mounts currently in force.
///
/// Mount iteration order is the order mounts were declared in `logs.xml`
/// (stable, so `readdir` returns a consistent listing).
#[derive(Debug, Default)]
pub struct Catalog {
    schemas: HashMap<String, Schema>,
    mounts: Vec<LogMount>,
    mount_index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(schemas: Vec<Schema>, mounts: Vec<LogMount>) -> Result<Catalog> {
        let mut schema_map = HashMap::with_capacity(schemas.len());
        for schema in schemas {
            if schema_map.insert(schema.name.clone(), schema).is_some() {
                return Err(LoggerFsError::Config(
                    "duplicate schema name in catalog".into(),
                ));
            }
        }

        let mut mount_index = HashMap::with_capacity(mounts.len());
        for (i, mount) in mounts.iter().enumerate() {
            if mount.path.contains('/') || mount.path.is_empty() {
                return Err(LoggerFsError::Config(format!(
                    "mount path `{}` must be a single non-empty path segment",
                    mount.path
                )));
            }
            if mount.path == ".refresh" {
                return Err(LoggerFsError::Config(
                    "mount path `.refresh` is reserved".into(),
                ));
            }
            if mount.schemas.is_empty() {
                return Err(LoggerFsError::Config(format!(
                    "mount `{}` has no schemas",
                    mount.path
                )));
            }
            if mount_index.insert(mount.path.clone(), i).is_some() {
                return Err(LoggerFsError::Config(format!(
                    "duplicate mount path `{}`",
                    mount.path
                )));
            }
        }

        Ok(Catalog {
            schemas: schema_map,
            mounts,
            mount_index,
        })
    }

    pub fn lookup_mount(&self, path: &str) -> Option<&LogMount> {
        self.mount_index.get(path).map(|&i| &self.mounts[i])
    }

    pub fn lookup_schema(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    pub fn iter_mounts(&self) -> impl Iterator<Item = &LogMount> {
        self.mounts.iter()
    }

    pub fn mount_count(&self) -> usize {
        self.mounts.len()
    }
}
