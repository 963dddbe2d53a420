//! Component C: generates `CREATE TABLE` and `INSERT` statements.
//!
//! Both functions here are pure: given the same inputs they produce the
//! same bytes (spec.md §8), so they take no connection and do no I/O. Value
//! escaping is implemented locally per backend rather than delegated to a
//! live connection's escape routine, which is what lets `build_insert` stay
//! pure and unit-testable without a database.

use std::collections::BTreeSet;

use crate::catalog::{Backend, LogMount, Schema};
use crate::matcher::CaptureBinding;

/// Escapes a string literal for inclusion inside single quotes in a
/// PostgreSQL statement, assuming `standard_conforming_strings = on` (the
/// default since PostgreSQL 9.1): only the quote character itself needs
/// doubling.
pub fn escape_postgresql(value: &str) -> String {
    value.replace('\'', "''")
}

/// Escapes a string literal for inclusion inside single quotes in a MySQL
/// statement, mirroring what `mysql_real_escape_string` escapes under the
/// default (non-`NO_BACKSLASH_ESCAPES`) SQL mode.
pub fn escape_mysql(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x1a' => out.push_str("\\Z"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out
}

fn escape(backend: Backend, value: &str) -> String {
    match backend {
        Backend::Postgresql => escape_postgresql(value),
        Backend::Mysql => escape_mysql(value),
    }
}

/// `CREATE TABLE` statement for `mount`'s table, covering the union of
/// columns across every schema the mount references. Column ordering is
/// alphabetical (`columns` is a `BTreeSet`), which is stable across calls
/// and therefore across test runs.
pub fn build_create_table(mount: &LogMount, columns: &BTreeSet<String>) -> String {
    let id_column = match mount.backend {
        Backend::Postgresql => "id serial not null primary key,",
        Backend::Mysql => "id bigint not null primary key unique auto_increment,",
    };

    let mut sql = String::new();
    sql.push_str("CREATE TABLE ");
    sql.push_str(&mount.endpoint.table);
    sql.push('(');
    sql.push_str(id_column);
    sql.push_str("timestamp timestamp default now(),");
    for column in columns {
        sql.push_str(column);
        sql.push_str(" text DEFAULT '' NOT NULL,");
    }
    sql.pop(); // drop the trailing comma
    sql.push_str(");");
    sql
}

/// `INSERT` statement for one schema's match against `mount`'s table. The
/// column list is exactly `schema.columns` in declared order; every value
/// is escaped for `mount.backend` and wrapped in single quotes. No
/// unescaped captured text ever reaches the returned string.
pub fn build_insert(mount: &LogMount, schema: &Schema, bindings: &[CaptureBinding]) -> String {
    let mut columns = String::new();
    let mut values = String::new();
    for (i, (column, captured)) in bindings.iter().enumerate() {
        debug_assert_eq!(column, &schema.columns[i]);
        if i > 0 {
            columns.push(',');
            values.push(',');
        }
        columns.push_str(column);
        values.push('\'');
        values.push_str(&escape(mount.backend, captured));
        values.push('\'');
    }

    format!(
        "INSERT INTO {}({}) VALUES ({});",
        mount.endpoint.table, columns, values
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Endpoint;
    use regex::Regex;

    fn mount(backend: Backend, table: &str) -> LogMount {
        LogMount {
            path: "access".into(),
            schemas: vec!["apache-common".into()],
            backend,
            endpoint: Endpoint {
                host: "localhost".into(),
                port: 0,
                database: "logs".into(),
                table: table.into(),
                username: "root".into(),
                password: "".into(),
            },
            owner: 0,
            group: 0,
            mode: 0,
        }
    }

    #[test]
    fn create_table_postgresql_matches_spec_example() {
        let m = mount(Backend::Postgresql, "t");
        let columns: BTreeSet<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            build_create_table(&m, &columns),
            "CREATE TABLE t(id serial not null primary key,timestamp timestamp default now(),\
             a text DEFAULT '' NOT NULL,b text DEFAULT '' NOT NULL,c text DEFAULT '' NOT NULL);"
        );
    }

    #[test]
    fn create_table_mysql_uses_auto_increment_id() {
        let m = mount(Backend::Mysql, "t");
        let columns: BTreeSet<String> = ["a"].iter().map(|s| s.to_string()).collect();
        let sql = build_create_table(&m, &columns);
        assert!(sql.starts_with("CREATE TABLE t(id bigint not null primary key unique auto_increment,"));
    }

    #[test]
    fn create_table_is_deterministic() {
        let m = mount(Backend::Postgresql, "t");
        let columns: BTreeSet<String> = ["z", "a", "m"].iter().map(|s| s.to_string()).collect();
        assert_eq!(build_create_table(&m, &columns), build_create_table(&m, &columns));
    }

    #[test]
    fn insert_matches_apache_common_example() {
        let schema = Schema::new(
            "apache-common".into(),
            Regex::new(r#"^(\S+) \S+ \S+ \[([^\]]+)\] "([^"]+)" (\d+) (\d+|-)$"#).unwrap(),
            vec!["host", "ts", "request", "status", "size"]
                .into_iter()
                .map(String::from)
                .collect(),
        )
        .unwrap();
        let m = mount(Backend::Mysql, "access_log");
        let bindings: Vec<CaptureBinding> = vec![
            ("host".into(), "10.0.0.1".into()),
            ("ts".into(), "10/Oct/2000:13:55:36 -0700".into()),
            ("request".into(), "GET /x HTTP/1.0".into()),
            ("status".into(), "200".into()),
            ("size".into(), "2326".into()),
        ];
        assert_eq!(
            build_insert(&m, &schema, &bindings),
            "INSERT INTO access_log(host,ts,request,status,size) VALUES \
             ('10.0.0.1','10/Oct/2000:13:55:36 -0700','GET /x HTTP/1.0','200','2326');"
        );
    }

    #[test]
    fn insert_escapes_single_quotes_postgresql() {
        let schema = Schema::new(
            "s".into(),
            Regex::new(r"^(.*)$").unwrap(),
            vec!["msg".into()],
        )
        .unwrap();
        let m = mount(Backend::Postgresql, "t");
        let bindings: Vec<CaptureBinding> = vec![("msg".into(), "it's a test".into())];
        let sql = build_insert(&m, &schema, &bindings);
        assert_eq!(sql, "INSERT INTO t(msg) VALUES ('it''s a test');");
    }

    #[test]
    fn insert_escapes_backslash_and_quotes_mysql() {
        let schema = Schema::new(
            "s".into(),
            Regex::new(r"^(.*)$").unwrap(),
            vec!["msg".into()],
        )
        .unwrap();
        let m = mount(Backend::Mysql, "t");
        let bindings: Vec<CaptureBinding> = vec![("msg".into(), r#"a\b'c"d"#.into())];
        let sql = build_insert(&m, &schema, &bindings);
        assert_eq!(sql, r#"INSERT INTO t(msg) VALUES ('a\\b\'c\"d');"#);
    }
}
