#![allow(clippy::unwrap_used)]
// Config loading through figment: file, environment overrides, and
// translation into runtime types.

use std::path::Path;
use std::time::Duration;

use figment::Jail;
use pretty_assertions::assert_eq;
use secrecy::ExposeSecret;

use cuplink_api::Qos;
use cuplink_config::{ConfigError, DeviceEntry, load_config};

const SAMPLE: &str = r#"
profile = "lab"

[broker]
url = "mqtt://broker.lab:2883"
client_id = "cup01"
username = "gateway"
password_env = "CUPLINK_TEST_BROKER_PASSWORD"
keep_alive_secs = 30

[connector]
server_name = "labserver"
retry_interval_secs = 2
qos = 1

[persistence]
max_connections = 3

[[devices]]
id = "cup-1"
owner = "alice"
address = "10.0.0.5"
"#;

#[test]
fn file_values_reach_runtime_types() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", SAMPLE)?;
        jail.set_env("CUPLINK_TEST_BROKER_PASSWORD", "s3cret");

        let config = load_config(Some(Path::new("config.toml"))).map_err(|e| e.to_string())?;
        assert_eq!(config.profile, "lab");
        assert_eq!(config.persistence.max_connections, 3);
        assert_eq!(
            config.devices,
            vec![DeviceEntry {
                id: "cup-1".into(),
                owner: "alice".into(),
                address: "10.0.0.5".into(),
            }]
        );

        let connector = config.connector_config().map_err(|e| e.to_string())?;
        assert_eq!(connector.server_name, "labserver");
        assert_eq!(connector.device_type, "connectedcup");
        assert_eq!(connector.retry_interval, Duration::from_secs(2));
        assert_eq!(connector.qos, Qos::AtLeastOnce);

        let broker = config.broker_config().map_err(|e| e.to_string())?;
        assert_eq!(broker.host_and_port().unwrap(), ("broker.lab".to_owned(), 2883));
        assert_eq!(broker.client_id, "cup01");
        assert_eq!(broker.username.as_deref(), Some("gateway"));
        assert_eq!(broker.password.unwrap().expose_secret(), "s3cret");
        assert_eq!(broker.keep_alive, Duration::from_secs(30));
        Ok(())
    });
}

#[test]
fn environment_overrides_file() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", SAMPLE)?;
        jail.set_env("CUPLINK_BROKER__URL", "tcp://override.lab");
        jail.set_env("CUPLINK_CONNECTOR__QOS", "2");

        let config = load_config(Some(Path::new("config.toml"))).map_err(|e| e.to_string())?;
        assert_eq!(config.broker.url, "tcp://override.lab");
        assert_eq!(config.connector.qos, 2);
        assert_eq!(config.connector.server_name, "labserver");
        Ok(())
    });
}

#[test]
fn invalid_values_fail_validation() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
            [connector]
            retry_interval_secs = 0
            "#,
        )?;

        let err = load_config(Some(Path::new("config.toml"))).unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation { ref field, .. } if field == "connector.retry_interval_secs"),
            "got {err:?}"
        );
        Ok(())
    });
}

#[test]
fn missing_explicit_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    let err = load_config(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { path: ref p } if *p == path));
}

#[test]
fn plaintext_password_is_last_resort() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
            profile = "cuplink-test-no-keyring-entry"

            [broker]
            username = "gateway"
            password = "plain"
            "#,
        )?;

        let config = load_config(Some(Path::new("config.toml"))).map_err(|e| e.to_string())?;
        let broker = config.broker_config().map_err(|e| e.to_string())?;
        assert_eq!(broker.password.unwrap().expose_secret(), "plain");
        Ok(())
    });
}
