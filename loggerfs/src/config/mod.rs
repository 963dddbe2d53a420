//! Loads `schemas.xml` and `logs.xml` and turns them into the `Schema` and
//! `LogMount` values a `Catalog` is built from. This is the "external
//! collaborator" boundary spec.md §1 calls out as out of scope for the core
//! design -- it's still implemented here (the core has to get its
//! configuration from somewhere) but kept intentionally dumb: a record
//! walk plus field validation, no schema/DTD machinery.

mod xml;

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use log::warn;
use regex::Regex;

use crate::catalog::{is_valid_identifier, Backend, Endpoint, LogMount, Schema};
use crate::error::{LoggerFsError, Result};

const SCHEMAS_FILE: &str = "schemas.xml";
const LOGS_FILE: &str = "logs.xml";
const DEFAULT_PREFIX: &str = "/usr/local";

/// Directories searched, in order, for a config file basename: `/etc/loggerfs`,
/// `<PREFIX>/etc/loggerfs`, then the current directory (spec.md §4.F/§6).
/// `PREFIX` is read from `LOGGERFS_PREFIX` since it was a `./configure`-time
/// compiled-in constant in the original, not something a library crate can
/// bake in.
fn search_paths(basename: &str) -> Vec<PathBuf> {
    let prefix = std::env::var("LOGGERFS_PREFIX").unwrap_or_else(|_| DEFAULT_PREFIX.to_string());
    vec![
        PathBuf::from("/etc/loggerfs").join(basename),
        PathBuf::from(prefix).join("etc/loggerfs").join(basename),
        PathBuf::from(basename),
    ]
}

fn read_first_existing(basename: &str) -> Result<String> {
    for candidate in search_paths(basename) {
        if let Ok(contents) = fs::read_to_string(&candidate) {
            return Ok(contents);
        }
    }
    Err(LoggerFsError::Config(format!(
        "couldn't find {basename} in /etc/loggerfs, $LOGGERFS_PREFIX/etc/loggerfs, or the current directory"
    )))
}

/// Loads both configuration files from the standard search paths.
pub fn load() -> Result<(Vec<Schema>, Vec<LogMount>)> {
    let schemas_xml = read_first_existing(SCHEMAS_FILE)?;
    let logs_xml = read_first_existing(LOGS_FILE)?;
    load_from_str(&schemas_xml, &logs_xml)
}

/// Parses already-read config documents. Split out from [`load`] so tests
/// can exercise parsing without touching the filesystem search path.
pub fn load_from_str(schemas_xml: &str, logs_xml: &str) -> Result<(Vec<Schema>, Vec<LogMount>)> {
    let schemas = parse_schemas(schemas_xml)?;
    let mounts = parse_logs(logs_xml)?;
    Ok((schemas, mounts))
}

fn required_field(record: &HashMap<String, String>, name: &str) -> Result<String> {
    record
        .get(name)
        .map(|s| s.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| LoggerFsError::Config(format!("missing required field `{name}`")))
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parses one `<schema>` record. Kept separate from [`parse_schemas`] so a
/// single bad record (missing field, invalid regex, capture/column count
/// mismatch) can be caught and skipped without losing the rest of the file.
fn parse_schema_record(record: &HashMap<String, String>) -> Result<Schema> {
    let name = required_field(record, "name")?;
    let pattern = required_field(record, "regex")?;
    let columns = split_csv(&required_field(record, "columns")?);
    let regex = Regex::new(&pattern)
        .map_err(|e| LoggerFsError::Schema(format!("invalid regex in schema `{name}`: {e}")))?;
    Schema::new(name, regex, columns)
}

/// A malformed `<schema>` record is skipped, not fatal to the whole file --
/// mirrors `examples/original_source/src/schema.cpp`'s `parseNodeset`, which
/// catches a bad `regex_error` with `continue` rather than aborting the load.
fn parse_schemas(xml: &str) -> Result<Vec<Schema>> {
    let records = xml::parse_records(xml, "schema")?;
    let mut schemas = Vec::with_capacity(records.len());
    for record in records {
        match parse_schema_record(&record) {
            Ok(schema) => schemas.push(schema),
            Err(e) => warn!(
                "skipping schema record `{}`: {e}",
                record.get("name").map(String::as_str).unwrap_or("<unnamed>")
            ),
        }
    }
    Ok(schemas)
}

fn parse_logs(xml: &str) -> Result<Vec<LogMount>> {
    let records = xml::parse_records(xml, "log")?;
    let mut mounts = Vec::with_capacity(records.len());
    for record in records {
        let location = required_field(&record, "location")?;
        let schemas = split_csv(&required_field(&record, "schemas")?);
        let software = required_field(&record, "database-software")?;
        let backend = Backend::from_config_str(&software).ok_or_else(|| {
            LoggerFsError::Config(format!(
                "log `{location}` has unknown database-software `{software}`"
            ))
        })?;
        let database = required_field(&record, "database")?;
        let table = required_field(&record, "table")?;
        if !is_valid_identifier(&table) {
            return Err(LoggerFsError::Config(format!(
                "log `{location}` has an invalid table identifier `{table}`"
            )));
        }
        let server = required_field(&record, "server")?;
        let username = required_field(&record, "username")?;
        // password may legitimately be empty, unlike the other fields.
        let password = record.get("password").cloned().unwrap_or_default();
        let port = parse_port(record.get("port"))?;
        let owner = resolve_uid(record.get("uid").map(String::as_str).unwrap_or("0"))?;
        let group = resolve_gid(record.get("gid").map(String::as_str).unwrap_or("0"))?;
        let mode = parse_permissions(record.get("permissions"))?;

        mounts.push(LogMount {
            path: location,
            schemas,
            backend,
            endpoint: Endpoint {
                host: server,
                port,
                database,
                table,
                username,
                password,
            },
            owner,
            group,
            mode,
        });
    }
    Ok(mounts)
}

fn parse_port(raw: Option<&String>) -> Result<u16> {
    match raw.map(|s| s.trim()).filter(|s| !s.is_empty()) {
        None => Ok(0),
        Some(s) => s
            .parse()
            .map_err(|_| LoggerFsError::Config(format!("invalid port `{s}`"))),
    }
}

fn parse_permissions(raw: Option<&String>) -> Result<u32> {
    match raw.map(|s| s.trim()).filter(|s| !s.is_empty()) {
        None => Ok(0),
        Some(s) => u32::from_str_radix(s, 8)
            .map_err(|_| LoggerFsError::Config(format!("invalid octal permissions `{s}`"))),
    }
}

/// Resolves a config `uid`: a decimal number, or a username looked up
/// against the host's user database -- mirrors the original's `getpwnam`
/// call in `general.cpp`.
fn resolve_uid(value: &str) -> Result<u32> {
    if let Ok(n) = value.parse() {
        return Ok(n);
    }
    users::get_user_by_name(value)
        .map(|u| u.uid())
        .ok_or_else(|| LoggerFsError::Config(format!("unknown user `{value}`")))
}

/// Resolves a config `gid`: a decimal number, or a group name looked up
/// against the host's group database (`getgrnam` in the original).
fn resolve_gid(value: &str) -> Result<u32> {
    if let Ok(n) = value.parse() {
        return Ok(n);
    }
    users::get_group_by_name(value)
        .map(|g| g.gid())
        .ok_or_else(|| LoggerFsError::Config(format!("unknown group `{value}`")))
}
