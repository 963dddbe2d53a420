//! Exercises `loggerfs::config::load` against real files on disk, through
//! the `LOGGERFS_PREFIX`-relative search path rather than `load_from_str`.

use std::fs;
use std::sync::Mutex;

use loggerfs::config;

const SCHEMAS_XML: &str = r#"
    <schemas>
      <schema>
        <name>apache-common</name>
        <regex>^(\S+) \S+ \S+ \[([^\]]+)\] "([^"]+)" (\d+) (\d+|-)$</regex>
        <columns>host, ts, request, status, size</columns>
      </schema>
    </schemas>
"#;

const LOGS_XML: &str = r#"
    <logs>
      <log>
        <location>access</location>
        <schemas>apache-common</schemas>
        <database-software>mysql</database-software>
        <database>logs</database>
        <table>access_log</table>
        <server>localhost</server>
        <username>root</username>
        <password></password>
        <port>0</port>
        <uid>0</uid>
        <gid>0</gid>
        <permissions>0</permissions>
      </log>
    </logs>
"#;

// `LOGGERFS_PREFIX` is process-wide environment, so these two tests must not
// run concurrently with each other.
static ENV_GUARD: Mutex<()> = Mutex::new(());

#[test]
fn loads_from_prefix_relative_etc_dir() {
    let _guard = ENV_GUARD.lock().unwrap();
    let prefix_dir = tempfile::tempdir().unwrap();
    let etc_dir = prefix_dir.path().join("etc/loggerfs");
    fs::create_dir_all(&etc_dir).unwrap();
    fs::write(etc_dir.join("schemas.xml"), SCHEMAS_XML).unwrap();
    fs::write(etc_dir.join("logs.xml"), LOGS_XML).unwrap();

    std::env::set_var("LOGGERFS_PREFIX", prefix_dir.path());
    let result = config::load();
    std::env::remove_var("LOGGERFS_PREFIX");

    let (schemas, mounts) = result.expect("config should load from the prefix-relative path");
    assert_eq!(schemas.len(), 1);
    assert_eq!(mounts.len(), 1);
    assert_eq!(mounts[0].path, "access");
}

#[test]
fn missing_config_is_a_fatal_error() {
    let _guard = ENV_GUARD.lock().unwrap();
    let empty_prefix = tempfile::tempdir().unwrap();
    std::env::set_var("LOGGERFS_PREFIX", empty_prefix.path());
    let result = config::load();
    std::env::remove_var("LOGGERFS_PREFIX");

    assert!(result.is_err(), "no schemas.xml/logs.xml exist anywhere loggerfs looks");
}
