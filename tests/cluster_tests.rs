mod common;

use common::test_cluster_config;
use tally::cluster::{pick_weighted, DbCluster, NodeHandle};

fn handles(weights: &[u32]) -> Vec<std::sync::Arc<NodeHandle>> {
    let cluster = DbCluster::connect_lazy(test_cluster_config(&[], weights));
    cluster.read_replica_handles()
}

#[tokio::test]
async fn weighted_pick_follows_cumulative_slices() {
    let nodes = handles(&[3, 1, 2]);
    let total: u64 = nodes.iter().map(|n| n.weight as u64).sum();
    assert_eq!(total, 6);

    // indices 0..3 -> read-0, 3 -> read-1, 4..6 -> read-2
    for index in 0..3 {
        assert_eq!(pick_weighted(&nodes, index).unwrap().name, "read-0");
    }
    assert_eq!(pick_weighted(&nodes, 3).unwrap().name, "read-1");
    assert_eq!(pick_weighted(&nodes, 4).unwrap().name, "read-2");
    assert_eq!(pick_weighted(&nodes, 5).unwrap().name, "read-2");
    assert!(pick_weighted(&nodes, 6).is_none());
}

#[tokio::test]
async fn zero_weight_nodes_are_never_picked() {
    let nodes = handles(&[0, 2]);
    for index in 0..2 {
        assert_eq!(pick_weighted(&nodes, index).unwrap().name, "read-1");
    }
}

#[tokio::test]
async fn failover_promotes_heaviest_active_replica() {
    let cluster = DbCluster::connect_lazy(test_cluster_config(&[1, 5, 3], &[]));

    cluster.master_handle().set_active(false);
    cluster.trigger_failover();

    let stats = cluster.stats();
    assert_eq!(cluster.master_handle().name, "replica-1");
    assert_eq!(stats.replica_count, 3); // old master demoted in
    assert!(cluster
        .replica_handles()
        .iter()
        .any(|n| n.name == "master"));
}

#[tokio::test]
async fn failover_skips_inactive_candidates() {
    let cluster = DbCluster::connect_lazy(test_cluster_config(&[2, 7], &[]));

    // heaviest replica is down too; the lighter one must win
    cluster.master_handle().set_active(false);
    for replica in cluster.replica_handles() {
        if replica.name == "replica-1" {
            replica.set_active(false);
        }
    }
    cluster.trigger_failover();

    assert_eq!(cluster.master_handle().name, "replica-0");
}

#[tokio::test]
async fn failover_without_candidates_keeps_master() {
    let cluster = DbCluster::connect_lazy(test_cluster_config(&[], &[]));

    cluster.master_handle().set_active(false);
    cluster.trigger_failover();

    assert_eq!(cluster.master_handle().name, "master");
    assert!(!cluster.stats().master_active);
}

#[tokio::test]
async fn failover_is_a_noop_while_master_is_healthy() {
    let cluster = DbCluster::connect_lazy(test_cluster_config(&[4], &[]));

    cluster.trigger_failover();
    assert_eq!(cluster.master_handle().name, "master");
    assert_eq!(cluster.stats().active_replicas, 1);
}

#[tokio::test]
async fn stats_count_active_nodes() {
    let cluster = DbCluster::connect_lazy(test_cluster_config(&[1, 1], &[2]));

    let stats = cluster.stats();
    assert!(stats.master_active);
    assert_eq!(stats.replica_count, 2);
    assert_eq!(stats.active_replicas, 2);
    assert_eq!(stats.read_replica_count, 1);
    assert_eq!(stats.active_read_replicas, 1);
    assert_eq!(stats.nodes.len(), 4);

    cluster.replica_handles()[0].set_active(false);
    assert_eq!(cluster.stats().active_replicas, 1);
}
