//! Unit tests for common-config crate

use std::io::Write;

use common_config::{ClusterConfig, LocationStrategy, PartitionConfig, TesseraConfig};

#[test]
fn test_tessera_config_default() {
    let config = TesseraConfig::default();

    assert_eq!(config.cluster.num_nodes, 4);
    assert_eq!(config.cluster.worker_threads, None);
    assert_eq!(config.cluster.max_blocking_threads, 64);
    assert_eq!(config.cluster.node_prefix, "node");
    assert_eq!(config.partition.location_strategy, LocationStrategy::Locate);
}

#[test]
fn test_cluster_config_builders() {
    let config = ClusterConfig::default()
        .with_nodes(2)
        .with_worker_threads(3)
        .with_max_blocking_threads(8);

    assert_eq!(config.num_nodes, 2);
    assert_eq!(config.worker_threads, Some(3));
    assert_eq!(config.max_blocking_threads, 8);
}

#[test]
fn test_location_strategy_default() {
    assert_eq!(LocationStrategy::default(), LocationStrategy::Locate);
    assert_ne!(LocationStrategy::Locate, LocationStrategy::IdentityApply);
}

#[test]
fn test_tessera_config_serialization() {
    let config = TesseraConfig::default()
        .with_cluster(ClusterConfig::default().with_nodes(8))
        .with_partition(PartitionConfig {
            location_strategy: LocationStrategy::IdentityApply,
        });

    let json = serde_json::to_string(&config).unwrap();
    let deserialized: TesseraConfig = serde_json::from_str(&json).unwrap();

    assert_eq!(deserialized, config);
}

#[test]
fn test_partial_json_takes_defaults() {
    let config = TesseraConfig::from_json_str(r#"{"cluster": {"num_nodes": 2}}"#).unwrap();

    assert_eq!(config.cluster.num_nodes, 2);
    assert_eq!(config.cluster.max_blocking_threads, 64);
    assert_eq!(config.partition, PartitionConfig::default());
}

#[test]
fn test_invalid_json_is_an_error() {
    assert!(TesseraConfig::from_json_str("{not json").is_err());
}

#[test]
fn test_from_json_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"partition": {{"location_strategy": "IdentityApply"}}}}"#
    )
    .unwrap();

    let config = TesseraConfig::from_json_file(file.path()).unwrap();
    assert_eq!(config.partition.location_strategy, LocationStrategy::IdentityApply);
    assert_eq!(config.cluster, ClusterConfig::default());
}

#[test]
fn test_missing_file_is_io_error() {
    let err = TesseraConfig::from_json_file("/nonexistent/tessera.json").unwrap_err();
    assert!(matches!(err, common_error::TesseraError::IoError(_)));
}
