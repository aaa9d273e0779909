// src/entities/network.rs

use super::{Entity, cluster::ParamMap};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use uuid::Uuid;

/// A contiguous IPv4 pool tracked as a bitmap of reserved offsets, the way
/// the original `AddressPool` does (one bit per address in the subnet).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressPool {
    pub network: Ipv4Addr,
    pub prefix_len: u8,
    #[serde(default)]
    pub reserved: Vec<bool>,
    #[serde(default)]
    pub gateway: Option<Ipv4Addr>,
}

impl AddressPool {
    pub fn new(network: Ipv4Addr, prefix_len: u8, gateway: Option<Ipv4Addr>) -> Self {
        let size = 1u32.checked_shl(32 - prefix_len as u32).unwrap_or(0) as usize;
        let mut reserved = vec![false; size];
        if let Some(gw) = gateway {
            if let Some(idx) = Self::offset_of(network, prefix_len, gw) {
                reserved[idx] = true;
            }
        }
        Self {
            network,
            prefix_len,
            reserved,
            gateway,
        }
    }

    fn offset_of(network: Ipv4Addr, prefix_len: u8, ip: Ipv4Addr) -> Option<usize> {
        let base = u32::from(network);
        let addr = u32::from(ip);
        let size = 1u32.checked_shl(32 - prefix_len as u32)?;
        if addr < base || addr >= base + size {
            return None;
        }
        Some((addr - base) as usize)
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        Self::offset_of(self.network, self.prefix_len, ip).is_some()
    }

    pub fn is_reserved(&self, ip: Ipv4Addr) -> bool {
        match Self::offset_of(self.network, self.prefix_len, ip) {
            Some(idx) => self.reserved.get(idx).copied().unwrap_or(false),
            None => false,
        }
    }

    pub fn reserve(&mut self, ip: Ipv4Addr) -> bool {
        match Self::offset_of(self.network, self.prefix_len, ip) {
            Some(idx) if !self.reserved[idx] => {
                self.reserved[idx] = true;
                true
            }
            _ => false,
        }
    }

    pub fn release(&mut self, ip: Ipv4Addr) -> bool {
        match Self::offset_of(self.network, self.prefix_len, ip) {
            Some(idx) if self.reserved[idx] => {
                self.reserved[idx] = false;
                true
            }
            _ => false,
        }
    }

    /// Returns the first free address, without reserving it.
    pub fn first_free(&self) -> Option<Ipv4Addr> {
        let base = u32::from(self.network);
        self.reserved
            .iter()
            .position(|r| !r)
            .map(|idx| Ipv4Addr::from(base + idx as u32))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    #[serde(default)]
    pub uuid: Uuid,
    pub name: String,
    pub pool: AddressPool,
    #[serde(default)]
    pub netparams: ParamMap,
    #[serde(default)]
    pub serial_no: u64,
    #[serde(default)]
    pub ctime: f64,
    #[serde(default)]
    pub mtime: f64,
}

impl Network {
    pub fn bump_serial(&mut self, now: f64) {
        self.serial_no += 1;
        self.mtime = now;
    }
}

impl Entity for Network {
    fn verify_local(&self) -> Vec<String> {
        let mut errs = Vec::new();
        if self.name.trim().is_empty() {
            errs.push(format!("network {}: name must not be empty", self.uuid));
        }
        errs
    }
}
