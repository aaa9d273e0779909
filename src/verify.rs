// src/verify.rs

//! The verifier: a pure function over the graph that returns a list of
//! human-readable consistency errors. Never mutates, never aborts a save
//! -- the session runs it after every successful commit and only logs
//! what it finds (spec §4.7).

use crate::entities::{ConfigData, Entity};
use std::collections::{HashMap, HashSet};

/// Runs every check in spec §4.7 over `graph` and returns one string per
/// problem found. An empty vec means the graph satisfies every invariant
/// in spec §3.
pub fn verify(graph: &ConfigData) -> Vec<String> {
    let mut errs = Vec::new();

    errs.extend(graph.cluster.verify_local());
    verify_disks(graph, &mut errs);
    verify_instances(graph, &mut errs);
    verify_nodes(graph, &mut errs);
    verify_nodegroups(graph, &mut errs);
    verify_ports(graph, &mut errs);
    verify_master(graph, &mut errs);
    verify_candidate_pool(graph, &mut errs);
    verify_ip_uniqueness(graph, &mut errs);

    errs
}

fn verify_disks(graph: &ConfigData, errs: &mut Vec<String>) {
    let mut attached: HashMap<uuid::Uuid, uuid::Uuid> = HashMap::new();
    for inst in graph.instances.values() {
        for disk_uuid in &inst.disks {
            attached.insert(*disk_uuid, inst.uuid);
        }
    }

    for (key, disk) in &graph.disks {
        errs.extend(disk.verify_local());
        if disk.uuid != *key {
            errs.push(format!(
                "disk stored under key {key} but has uuid {}",
                disk.uuid
            ));
        }
        if !attached.contains_key(key) {
            errs.push(format!("disk {key}: orphaned, not attached to any instance"));
        }
    }
}

fn verify_instances(graph: &ConfigData, errs: &mut Vec<String>) {
    let mut seen_macs: HashMap<&str, &str> = HashMap::new();

    for (key, inst) in &graph.instances {
        errs.extend(inst.verify_local());
        if inst.uuid != *key {
            errs.push(format!(
                "instance stored under key {key} but has uuid {}",
                inst.uuid
            ));
        }
        if !graph.nodes.contains_key(&inst.primary_node) {
            errs.push(format!(
                "instance {}: primary_node {} is not a known node",
                inst.name, inst.primary_node
            ));
        }
        for secondary in graph.instance_secondary_nodes(inst) {
            if !graph.nodes.contains_key(&secondary) {
                errs.push(format!(
                    "instance {}: secondary node {} is not a known node",
                    inst.name, secondary
                ));
            }
        }

        for nic in &inst.nics {
            if let Some(owner) = seen_macs.get(nic.mac.as_str()) {
                errs.push(format!(
                    "duplicate NIC MAC {} used by both '{}' and '{}'",
                    nic.mac, owner, inst.name
                ));
            } else {
                seen_macs.insert(&nic.mac, &inst.name);
            }
        }

        if !graph
            .cluster
            .enabled_disk_templates
            .contains(&inst.disk_template)
        {
            errs.push(format!(
                "instance {}: disk_template '{}' is not enabled on the cluster",
                inst.name, inst.disk_template
            ));
        }

        for (idx, disk_uuid) in inst.disks.iter().enumerate() {
            match graph.disks.get(disk_uuid) {
                None => errs.push(format!(
                    "instance {}: disk index {idx} references unknown disk {disk_uuid}",
                    inst.name
                )),
                Some(disk) => {
                    let expected = format!("disk/{idx}");
                    if disk.iv_name != expected {
                        errs.push(format!(
                            "instance {}: disk at index {idx} has iv_name '{}', expected '{expected}'",
                            inst.name, disk.iv_name
                        ));
                    }
                }
            }
        }
    }
}

fn verify_ports(graph: &ConfigData, errs: &mut Vec<String>) {
    let mut owners: HashMap<u16, Vec<String>> = HashMap::new();
    let mut max_port = 0u16;

    for inst in graph.instances.values() {
        for disk_uuid in &inst.disks {
            if let Some(disk) = graph.disks.get(disk_uuid) {
                for port in disk.ports() {
                    owners
                        .entry(port)
                        .or_default()
                        .push(format!("instance {} (drbd disk)", inst.name));
                    max_port = max_port.max(port);
                }
            }
        }
        if let Some(port) = inst.network_port {
            owners
                .entry(port)
                .or_default()
                .push(format!("instance {} (network_port)", inst.name));
            max_port = max_port.max(port);
        }
    }
    for port in &graph.cluster.tcpudp_port_pool {
        owners
            .entry(*port)
            .or_default()
            .push("cluster.tcpudp_port_pool".to_string());
        max_port = max_port.max(*port);
    }

    for (port, reasons) in &owners {
        if reasons.len() > 1 {
            errs.push(format!(
                "port {port} used by more than one owner: {}",
                reasons.join(", ")
            ));
        }
    }

    if max_port > graph.cluster.highest_used_port {
        errs.push(format!(
            "highest_used_port ({}) is lower than the observed maximum in-use port ({max_port})",
            graph.cluster.highest_used_port
        ));
    }
}

fn verify_master(graph: &ConfigData, errs: &mut Vec<String>) {
    match graph.nodes.get(&graph.cluster.master_node) {
        None => errs.push(format!(
            "cluster.master_node {} is not a known node",
            graph.cluster.master_node
        )),
        Some(master) => {
            if !master.master_candidate {
                errs.push(format!(
                    "master node '{}' is not a master candidate",
                    master.name
                ));
            }
        }
    }
}

fn verify_candidate_pool(graph: &ConfigData, errs: &mut Vec<String>) {
    let (now, should, _max) = crate::store::master_candidate_stats(graph, &HashSet::new());
    if now < should {
        errs.push(format!(
            "master candidate deficit: {now} candidates, should have {should}"
        ));
    }
}

fn verify_nodes(graph: &ConfigData, errs: &mut Vec<String>) {
    for (key, node) in &graph.nodes {
        errs.extend(node.verify_local());
        if node.uuid != *key {
            errs.push(format!(
                "node stored under key {key} but has uuid {}",
                node.uuid
            ));
        }
        if !graph.nodegroups.contains_key(&node.group) {
            errs.push(format!(
                "node {}: group {} is not a known node group",
                node.name, node.group
            ));
        }
        for global_key in ["mac_prefix", "cluster_name", "volume_group_name"] {
            if node.ndparams.contains_key(global_key) {
                errs.push(format!(
                    "node {}: ndparams contains cluster-global parameter '{global_key}'",
                    node.name
                ));
            }
        }
    }
}

fn verify_nodegroups(graph: &ConfigData, errs: &mut Vec<String>) {
    let mut seen_names: HashMap<&str, &uuid::Uuid> = HashMap::new();
    for (key, ng) in &graph.nodegroups {
        errs.extend(ng.verify_local());
        if ng.uuid != *key {
            errs.push(format!(
                "nodegroup stored under key {key} but has uuid {}",
                ng.uuid
            ));
        }
        if let Some(other) = seen_names.get(ng.name.as_str()) {
            errs.push(format!(
                "duplicate node group name '{}' used by {} and {}",
                ng.name, other, ng.uuid
            ));
        } else {
            seen_names.insert(&ng.name, &ng.uuid);
        }
    }
}

fn verify_ip_uniqueness(graph: &ConfigData, errs: &mut Vec<String>) {
    let mut seen: HashSet<String> = HashSet::new();

    let mut check = |ip: &str, desc: &str, errs: &mut Vec<String>| {
        if ip.is_empty() {
            return;
        }
        if !seen.insert(ip.to_string()) {
            errs.push(format!("duplicate IP address '{ip}' ({desc})"));
        }
    };

    check(&graph.cluster.master_ip, "cluster.master_ip", errs);
    for node in graph.nodes.values() {
        check(
            &node.primary_ip,
            &format!("node {} primary_ip", node.name),
            errs,
        );
        check(
            &node.secondary_ip,
            &format!("node {} secondary_ip", node.name),
            errs,
        );
    }

    let mut nic_tuples: HashSet<(String, String, String)> = HashSet::new();
    for inst in graph.instances.values() {
        for nic in &inst.nics {
            let Some(ip) = &nic.ip else { continue };
            let link = nic
                .nicparams
                .get("link")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let network = nic.network.map(|n| n.to_string()).unwrap_or_default();
            let tuple = (link, ip.clone(), network);
            if !nic_tuples.insert(tuple) {
                errs.push(format!(
                    "duplicate (link, ip, network) tuple for NIC ip '{ip}' on instance {}",
                    inst.name
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::bootstrap_graph;
    use uuid::Uuid;

    #[test]
    fn clean_bootstrap_graph_verifies_empty() {
        let graph = bootstrap_graph();
        assert_eq!(verify(&graph), Vec::<String>::new());
    }

    #[test]
    fn master_not_candidate_is_flagged() {
        let mut graph = bootstrap_graph();
        let master_uuid = graph.cluster.master_node;
        graph.nodes.get_mut(&master_uuid).unwrap().master_candidate = false;
        let errs = verify(&graph);
        assert!(errs.iter().any(|e| e.contains("not a master candidate")));
    }

    #[test]
    fn duplicate_mac_is_flagged() {
        let mut graph = bootstrap_graph();
        let node_uuid = graph.cluster.master_node;
        let mk_inst = |name: &str, mac: &str| crate::entities::Instance {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            primary_node: node_uuid,
            disks: vec![],
            nics: vec![crate::entities::Nic {
                mac: mac.to_string(),
                ip: None,
                network: None,
                nicparams: Default::default(),
            }],
            disk_template: "plain".to_string(),
            beparams: Default::default(),
            hvparams: Default::default(),
            hypervisor: "fake".to_string(),
            admin_state: Default::default(),
            admin_state_source: Default::default(),
            disks_active: true,
            network_port: None,
            os: String::new(),
            osparams: Default::default(),
            serial_no: 1,
            ctime: 0.0,
            mtime: 0.0,
        };
        let i1 = mk_inst("alpha", "aa:00:00:00:00:01");
        let i2 = mk_inst("beta", "aa:00:00:00:00:01");
        graph.instances.insert(i1.uuid, i1);
        graph.instances.insert(i2.uuid, i2);

        let errs = verify(&graph);
        assert!(errs.iter().any(|e| e.contains("duplicate NIC MAC")));
    }
}
