use bulkwrite::{SurrealArgs, WriterArgs};
use surreal_store::SurrealOpts;

#[test]
fn test_surreal_args_to_opts() {
    let args = SurrealArgs {
        surreal_endpoint: "ws://localhost:8000".to_string(),
        surreal_username: "root".to_string(),
        surreal_password: "secret".to_string(),
        to_namespace: "ns".to_string(),
        to_database: "db".to_string(),
        dry_run: false,
    };

    let opts = SurrealOpts::from(&args);
    assert_eq!(opts.endpoint, "ws://localhost:8000");
    assert_eq!(opts.username, "root");
    assert_eq!(opts.password, "secret");
    assert_eq!(opts.namespace, "ns");
    assert_eq!(opts.database, "db");
}

#[test]
fn test_writer_flags_build_config() {
    let args = WriterArgs {
        index: Some("tweets".to_string()),
        collections: vec!["archive".to_string()],
        max_batch_bytes: Some(1024),
        drain_wait: Some("30s".to_string()),
        very_large_bulk: true,
        restore_refresh_interval: Some("1s".to_string()),
        ..Default::default()
    };

    let config = bulkwrite::config::writer_config(&args).unwrap();
    assert_eq!(config.index, "tweets");
    assert_eq!(config.collections, vec!["archive"]);
    assert_eq!(config.max_batch_bytes, 1024);
    assert_eq!(config.drain_wait_ms, 30_000);
    assert!(config.very_large_bulk);
    assert_eq!(config.restore_refresh_interval, "1s");
    assert_eq!(config.max_batch_items, 100);
}

#[test]
fn test_missing_config_file_is_an_error() {
    let args = WriterArgs {
        config: Some("/nonexistent/writer.yaml".into()),
        ..Default::default()
    };
    assert!(bulkwrite::config::writer_config(&args).is_err());
}

#[tokio::test]
async fn test_dry_run_loads_into_memory() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, r#"{{"text":"one"}}"#).unwrap();
    writeln!(file, r#"{{"document":{{"text":"two"}},"metadata":{{"id":"2"}}}}"#).unwrap();

    let args = bulkwrite::JsonlArgs {
        paths: vec![file.path().to_path_buf()],
        surreal: SurrealArgs {
            surreal_endpoint: "ws://unused:8000".to_string(),
            surreal_username: "root".to_string(),
            surreal_password: "root".to_string(),
            to_namespace: "test".to_string(),
            to_database: "test".to_string(),
            dry_run: true,
        },
        writer: WriterArgs::default(),
    };

    let report = bulkwrite::load::run(args).await.unwrap();
    assert_eq!(report.written, 2);
    assert_eq!(report.totals.total_ok, 2);
    assert_eq!(report.totals.total_outstanding, 0);
}
