//! Integration tests for the load pipeline's failure ordering.
//!
//! None of these need an SSH server or a database: each run stops at the
//! first resource that cannot be acquired.

use csv_tunnel_load::config::{DatabaseConfig, Settings, SshConfig};
use csv_tunnel_load::{LoadError, LoadRequest, stream_csv_to_postgres};
use std::io::Write;
use std::net::TcpListener;
use tempfile::NamedTempFile;

/// A local port with nothing listening on it.
fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn settings(ssh_port: u16, default_table: Option<&str>) -> Settings {
    Settings {
        ssh: SshConfig {
            host: "127.0.0.1".to_string(),
            port: ssh_port,
            user: "deploy".to_string(),
            password: "s3cret".to_string(),
            remote_bind_host: "127.0.0.1".to_string(),
            local_bind_host: "127.0.0.1".to_string(),
            host_key_fingerprint: None,
        },
        database: DatabaseConfig {
            host: "localhost".to_string(),
            port: 5432,
            name: "warehouse".to_string(),
            user: "loader".to_string(),
            password: "hunter2".to_string(),
        },
        default_table: default_table.map(str::to_string),
    }
}

fn data_csv() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"id,name\n1,Alice\n2,Bob\n").unwrap();
    file.flush().unwrap();
    file
}

#[tokio::test]
async fn test_unreachable_ssh_host_fails_before_database() {
    let file = data_csv();
    let request = LoadRequest {
        filepath: file.path().to_path_buf(),
        table: None,
    };

    let err = stream_csv_to_postgres(&settings(closed_port(), Some("people")), &request)
        .await
        .unwrap_err();

    assert!(matches!(err, LoadError::Tunnel { .. }), "got {:?}", err);
}

#[tokio::test]
async fn test_missing_file_fails_before_tunnel() {
    let dir = tempfile::tempdir().unwrap();
    let request = LoadRequest {
        filepath: dir.path().join("missing.csv"),
        table: Some("people".to_string()),
    };

    // Even with an unreachable SSH host the file error comes first.
    let err = stream_csv_to_postgres(&settings(closed_port(), None), &request)
        .await
        .unwrap_err();

    assert!(matches!(err, LoadError::File { .. }), "got {:?}", err);
}

#[tokio::test]
async fn test_missing_table_fails_before_any_io() {
    let dir = tempfile::tempdir().unwrap();
    let request = LoadRequest {
        filepath: dir.path().join("missing.csv"),
        table: None,
    };

    let err = stream_csv_to_postgres(&settings(closed_port(), None), &request)
        .await
        .unwrap_err();

    assert!(matches!(err, LoadError::Config { .. }), "got {:?}", err);
}

#[tokio::test]
async fn test_invalid_table_fails_before_any_io() {
    let file = data_csv();
    let request = LoadRequest {
        filepath: file.path().to_path_buf(),
        table: Some("people; DROP TABLE people".to_string()),
    };

    let err = stream_csv_to_postgres(&settings(closed_port(), None), &request)
        .await
        .unwrap_err();

    assert!(matches!(err, LoadError::Config { .. }), "got {:?}", err);
}
