// src/ssconf.rs

//! The derived snapshot builder: flattens the graph into a string-keyed
//! map of newline-joined value lists for consumers that cannot afford to
//! parse the full config (spec §4.9 "GetSsconfValues").

use crate::constants::ssconf_keys::*;
use crate::constants::{RELEASE_VERSION, SS_HVPARAMS_PREF};
use crate::entities::ConfigData;
use crate::nicesort::nice_sorted;
use std::collections::HashMap;

/// Builds the full `ssconf` value map for `graph`. Every value is a
/// string; list-shaped values are newline-joined in `NiceSort` order.
pub fn ssconf_values(graph: &ConfigData) -> HashMap<String, String> {
    let mut out = HashMap::new();

    out.insert(SS_CLUSTER_NAME.to_string(), graph.cluster.cluster_name.clone());
    out.insert(
        SS_CLUSTER_TAGS.to_string(),
        nice_sorted(graph.cluster.tags.iter().cloned()).join("\n"),
    );
    out.insert(SS_MASTER_IP.to_string(), graph.cluster.master_ip.clone());
    out.insert(SS_MASTER_NETDEV.to_string(), graph.cluster.master_netdev.clone());
    out.insert(
        SS_MASTER_NETMASK.to_string(),
        graph.cluster.master_netmask.to_string(),
    );

    let master_name = graph
        .nodes
        .get(&graph.cluster.master_node)
        .map(|n| n.name.clone())
        .unwrap_or_default();
    out.insert(SS_MASTER_NODE.to_string(), master_name);

    let mut candidates: Vec<&crate::entities::Node> = graph
        .nodes
        .values()
        .filter(|n| n.master_candidate)
        .collect();
    candidates.sort_by(|a, b| crate::nicesort::nice_cmp(&a.name, &b.name));

    out.insert(
        SS_MASTER_CANDIDATES.to_string(),
        candidates.iter().map(|n| n.name.as_str()).collect::<Vec<_>>().join("\n"),
    );
    out.insert(
        SS_MASTER_CANDIDATES_IPS.to_string(),
        candidates
            .iter()
            .map(|n| n.primary_ip.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
    );

    let mut cert_lines: Vec<String> = graph
        .cluster
        .candidate_certs
        .iter()
        .map(|(uuid, digest)| format!("{uuid}={digest}"))
        .collect();
    cert_lines.sort();
    out.insert(SS_MASTER_CANDIDATES_CERTS.to_string(), cert_lines.join("\n"));

    let mut all_nodes: Vec<&crate::entities::Node> = graph.nodes.values().collect();
    all_nodes.sort_by(|a, b| crate::nicesort::nice_cmp(&a.name, &b.name));

    out.insert(
        SS_NODE_LIST.to_string(),
        all_nodes.iter().map(|n| n.name.as_str()).collect::<Vec<_>>().join("\n"),
    );
    out.insert(
        SS_NODE_PRIMARY_IPS.to_string(),
        all_nodes
            .iter()
            .map(|n| format!("{} {}", n.name, n.primary_ip))
            .collect::<Vec<_>>()
            .join("\n"),
    );
    out.insert(
        SS_NODE_SECONDARY_IPS.to_string(),
        all_nodes
            .iter()
            .map(|n| format!("{} {}", n.name, n.secondary_ip))
            .collect::<Vec<_>>()
            .join("\n"),
    );
    out.insert(
        SS_NODE_VM_CAPABLE.to_string(),
        all_nodes
            .iter()
            .map(|n| format!("{}={}", n.name, n.vm_capable))
            .collect::<Vec<_>>()
            .join("\n"),
    );
    out.insert(
        SS_OFFLINE_NODES.to_string(),
        nice_sorted(all_nodes.iter().filter(|n| n.offline).map(|n| n.name.clone())).join("\n"),
    );
    out.insert(
        SS_ONLINE_NODES.to_string(),
        nice_sorted(all_nodes.iter().filter(|n| !n.offline).map(|n| n.name.clone())).join("\n"),
    );

    out.insert(
        SS_PRIMARY_IP_FAMILY.to_string(),
        match graph.cluster.primary_ip_family {
            crate::entities::cluster::IpFamily::Ipv4 => "4".to_string(),
            crate::entities::cluster::IpFamily::Ipv6 => "6".to_string(),
        },
    );

    out.insert(
        SS_INSTANCE_LIST.to_string(),
        nice_sorted(graph.instances.values().map(|i| i.name.clone())).join("\n"),
    );

    out.insert(SS_RELEASE_VERSION.to_string(), RELEASE_VERSION.to_string());

    out.insert(
        SS_HYPERVISOR_LIST.to_string(),
        graph.cluster.enabled_hypervisors.join("\n"),
    );

    for hv in &graph.cluster.enabled_hypervisors {
        if let Some(params) = graph.cluster.hvparams.get(hv) {
            let mut lines: Vec<String> = params
                .iter()
                .map(|(k, v)| format!("{k}={}", value_to_ssconf_string(v)))
                .collect();
            lines.sort();
            out.insert(format!("{SS_HVPARAMS_PREF}{hv}"), lines.join("\n"));
        }
    }

    out.insert(
        SS_MAINTAIN_NODE_HEALTH.to_string(),
        graph.cluster.maintain_node_health.to_string(),
    );
    out.insert(
        SS_UID_POOL.to_string(),
        graph
            .cluster
            .uid_pool
            .iter()
            .map(|(lo, hi)| format!("{lo}-{hi}"))
            .collect::<Vec<_>>()
            .join("\n"),
    );

    let mut groups: Vec<&crate::entities::NodeGroup> = graph.nodegroups.values().collect();
    groups.sort_by(|a, b| crate::nicesort::nice_cmp(&a.name, &b.name));
    out.insert(
        SS_NODEGROUPS.to_string(),
        groups
            .iter()
            .map(|g| format!("{} {}", g.uuid, g.name))
            .collect::<Vec<_>>()
            .join("\n"),
    );

    let mut networks: Vec<&crate::entities::Network> = graph.networks.values().collect();
    networks.sort_by(|a, b| crate::nicesort::nice_cmp(&a.name, &b.name));
    out.insert(
        SS_NETWORKS.to_string(),
        networks
            .iter()
            .map(|n| format!("{} {}", n.uuid, n.name))
            .collect::<Vec<_>>()
            .join("\n"),
    );

    out.insert(
        SS_FILE_STORAGE_DIR.to_string(),
        graph.cluster.file_storage_dir.clone(),
    );
    out.insert(
        SS_SHARED_FILE_STORAGE_DIR.to_string(),
        graph.cluster.shared_file_storage_dir.clone(),
    );
    out.insert(
        SS_ENABLED_USER_SHUTDOWN.to_string(),
        graph.cluster.enabled_user_shutdown.to_string(),
    );

    out
}

/// Every ssconf value must be a string; a non-string hvparam value is a
/// fatal configuration error in the original design, but since this
/// builder has no way to abort mid-map without losing everything else
/// it's built, scalar values are rendered losslessly and anything else
/// is flagged via its JSON form (still a string, just a visibly wrong
/// one -- callers that need strict validation should run [`crate::verify::verify`]
/// first).
fn value_to_ssconf_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
