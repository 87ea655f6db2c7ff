use std::io::Write;

use super::*;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(&dir.path().join("missing.yml"));
    assert_eq!(config, Config::default());
}

#[test]
fn partial_file_keeps_remaining_defaults() {
    let file = write_config("ports:\n  - \"8080\"\nping_count: 10\n");

    let config = Config::load(file.path());

    assert_eq!(config.ports, vec!["8080".to_string()]);
    assert_eq!(config.ping_count, 10);
    assert_eq!(config.ttl, DEFAULT_TTL);
    assert_eq!(config.port_timeout_ms, None);
    assert_eq!(config.subnet_concurrency, DEFAULT_SUBNET_CONCURRENCY);
}

#[test]
fn reads_optional_port_settings() {
    let file = write_config("port_timeout_ms: 250\nport_concurrency: 12\n");

    let config = Config::load(file.path());

    assert_eq!(config.port_timeout_ms, Some(250));
    assert_eq!(config.port_concurrency, Some(12));
}

#[test]
fn unparsable_file_yields_defaults() {
    let file = write_config("ping_count: [not, a, number]\n");
    assert_eq!(Config::load(file.path()), Config::default());
}

#[test]
fn default_ports() {
    assert_eq!(get_default_ports().len(), DEFAULT_PORTS.len());
    assert_eq!(Config::default().ports[0], "22");
}

#[test]
fn project_config_path_ends_with_file_name() {
    if let Some(path) = get_project_config_path() {
        assert!(path.ends_with(CONFIG_FILE_NAME));
    }
}
