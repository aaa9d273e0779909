// src/bin/clusterconf-tool.rs

//! A small demo binary exercising [`clusterconf::ConfigStore`] against a
//! local on-disk config: a smoke-test harness and a template for
//! downstream integrators, the way `spineldb`'s server binary doubles as
//! both a production entry point and a reference for embedders.

use anyhow::{Context, Result};
use clusterconf::entities::{Cluster, IpFamily, Node, NodeGroup};
use clusterconf::{ConfigData, ConfigStore, RuntimeConfig};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::env;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .compact()
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("help");
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .cloned()
        .unwrap_or_else(|| "clusterconf.data".to_string());

    match command {
        "bootstrap" => bootstrap(&config_path).await,
        "verify" => run_verify(&config_path).await,
        "ssconf" => run_ssconf(&config_path).await,
        _ => {
            println!(
                "usage: clusterconf-tool <bootstrap|verify|ssconf> [--config PATH]\n\
                 \n\
                 bootstrap  write a fresh single-node cluster config to PATH\n\
                 verify     load PATH and print every consistency finding\n\
                 ssconf     load PATH and print the derived ssconf key/value map"
            );
            Ok(())
        }
    }
}

/// Writes a minimal single-node, single-group cluster to `path`, the
/// offline equivalent of spec §8 scenario 1 ("Bootstrap").
async fn bootstrap(path: &str) -> Result<()> {
    let group_uuid = Uuid::new_v4();
    let node_uuid = Uuid::new_v4();

    let mut nodes = HashMap::new();
    nodes.insert(
        node_uuid,
        Node {
            uuid: node_uuid,
            name: hostname(),
            primary_ip: "10.0.0.1".into(),
            secondary_ip: "10.0.0.1".into(),
            group: group_uuid,
            master_candidate: true,
            drained: false,
            offline: false,
            master_capable: true,
            vm_capable: true,
            ndparams: BTreeMap::new(),
            serial_no: 1,
            ctime: 0.0,
            mtime: 0.0,
        },
    );

    let mut nodegroups = HashMap::new();
    let mut default_group = NodeGroup::new(group_uuid, "default".into());
    default_group.members = vec![node_uuid];
    nodegroups.insert(group_uuid, default_group);

    let mut enabled_disk_templates = BTreeSet::new();
    enabled_disk_templates.insert("plain".to_string());

    let graph = ConfigData {
        version: clusterconf::constants::CONFIG_VERSION,
        cluster: Cluster {
            uuid: Uuid::new_v4(),
            cluster_name: "cluster.local".into(),
            master_node: node_uuid,
            master_ip: "10.0.0.254".into(),
            master_netdev: "eth0".into(),
            master_netmask: 24,
            primary_ip_family: IpFamily::Ipv4,
            mac_prefix: "aa:00:00".into(),
            highest_used_port: 0,
            tcpudp_port_pool: BTreeSet::new(),
            volume_group_name: Some("xenvg".into()),
            file_storage_dir: String::new(),
            shared_file_storage_dir: String::new(),
            gluster_storage_dir: String::new(),
            enabled_hypervisors: vec!["fake".into()],
            hvparams: BTreeMap::new(),
            beparams: BTreeMap::new(),
            nicparams: BTreeMap::new(),
            ndparams: BTreeMap::new(),
            diskparams: BTreeMap::new(),
            ipolicy: BTreeMap::new(),
            enabled_disk_templates,
            candidate_pool_size: 1,
            candidate_certs: BTreeMap::new(),
            compression_tools: vec![],
            install_image: String::new(),
            zeroing_image: String::new(),
            instance_communication_network: None,
            default_iallocator: None,
            default_iallocator_params: BTreeMap::new(),
            drbd_usermode_helper: None,
            uid_pool: vec![],
            maintain_node_health: false,
            enabled_user_shutdown: false,
            use_external_mip_script: false,
            rsahostkeypub: Some("ssh-rsa AAAA...".into()),
            dsahostkeypub: None,
            os_hvp: BTreeMap::new(),
            osparams: BTreeMap::new(),
            osparams_private_cluster: BTreeMap::new(),
            reserved_lvs: BTreeSet::new(),
            prealloc_wipe_disks: false,
            serial_no: 1,
            ctime: now(),
            mtime: now(),
            tags: BTreeSet::new(),
        },
        nodes,
        instances: HashMap::new(),
        disks: HashMap::new(),
        nodegroups,
        networks: HashMap::new(),
        serial_no: 1,
        mtime: now(),
    };

    let value = graph.to_value().context("serializing bootstrap graph")?;
    tokio::fs::write(path, serde_json::to_vec_pretty(&value)?)
        .await
        .with_context(|| format!("writing bootstrap config to {path}"))?;
    println!("wrote bootstrapped cluster config to {path}");
    Ok(())
}

fn store(config_path: &str) -> ConfigStore {
    let runtime = RuntimeConfig {
        config_path: config_path.to_string(),
        offline: true,
        my_hostname: hostname(),
        accept_foreign: true,
        poll_jitter_ms: 500,
    };
    ConfigStore::new(&runtime, "clusterconf-tool")
}

async fn run_verify(path: &str) -> Result<()> {
    let mut store = store(path);
    let findings = store
        .run_shared(|g| Ok(clusterconf::verify::verify(g)))
        .await?;
    if findings.is_empty() {
        println!("no consistency findings");
    } else {
        for f in findings {
            println!("- {f}");
        }
    }
    Ok(())
}

async fn run_ssconf(path: &str) -> Result<()> {
    let mut store = store(path);
    let values = store.get_ssconf_values().await?;
    let mut keys: Vec<&String> = values.keys().collect();
    keys.sort();
    for key in keys {
        println!("{key}:");
        for line in values[key].lines() {
            println!("    {line}");
        }
    }
    Ok(())
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "node1.example.com".to_string())
}

fn now() -> f64 {
    use chrono::Utc;
    Utc::now().timestamp() as f64
}
