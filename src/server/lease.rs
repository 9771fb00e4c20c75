//! Client discovery
//!
//! Destinations are found by reading the DHCP server's lease file and the
//! kernel ARP table, plus any statically configured client IPs.

use std::collections::BTreeSet;
use std::io;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::server::config::NetworkConfig;

/// ARP entry flag: hardware address resolved
const ATF_COM: u32 = 0x2;

/// Something that can list the IPs of currently connected clients
pub trait LeaseSource: Send + Sync + 'static {
    fn client_ips(&self) -> Result<Vec<IpAddr>>;
}

/// One DHCP lease
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub ip: IpAddr,
    pub hostname: Option<String>,
}

/// Parse a dnsmasq lease file
///
/// Each line is `<expiry> <mac> <ip> <hostname> <client-id>`; a hostname
/// of `*` means none. Malformed lines are skipped.
pub fn parse_dnsmasq_leases(text: &str) -> Vec<Lease> {
    text.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let ip = fields.get(2)?.parse().ok()?;
            let hostname = fields
                .get(3)
                .filter(|h| **h != "*")
                .map(|h| h.to_string());
            Some(Lease { ip, hostname })
        })
        .collect()
}

/// Parse `/proc/net/arp`, returning IPs with a resolved hardware address
pub fn parse_arp_table(text: &str) -> Vec<IpAddr> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let ip: IpAddr = fields.first()?.parse().ok()?;
            let flags = u32::from_str_radix(fields.get(2)?.trim_start_matches("0x"), 16).ok()?;
            let mac = fields.get(3)?;
            (flags & ATF_COM != 0 && *mac != "00:00:00:00:00:00").then_some(ip)
        })
        .collect()
}

/// Read a file that may legitimately not exist
fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(Error::LeaseFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Leases from the host: dnsmasq file, ARP table, static list
#[derive(Debug, Clone)]
pub struct SystemLeases {
    dhcp_lease_file: Option<PathBuf>,
    arp_table: Option<PathBuf>,
    static_ips: Vec<IpAddr>,
}

impl SystemLeases {
    pub fn from_config(config: &NetworkConfig) -> Self {
        Self {
            dhcp_lease_file: config.dhcp_lease_file.clone(),
            arp_table: config.arp_table.clone(),
            static_ips: config.static_ips.clone(),
        }
    }
}

impl LeaseSource for SystemLeases {
    fn client_ips(&self) -> Result<Vec<IpAddr>> {
        let mut ips: BTreeSet<IpAddr> = self.static_ips.iter().copied().collect();

        if let Some(path) = &self.dhcp_lease_file {
            if let Some(text) = read_optional(path)? {
                ips.extend(parse_dnsmasq_leases(&text).into_iter().map(|l| l.ip));
            }
        }
        if let Some(path) = &self.arp_table {
            if let Some(text) = read_optional(path)? {
                ips.extend(parse_arp_table(&text));
            }
        }

        Ok(ips.into_iter().collect())
    }
}

/// Fixed, replaceable list of client IPs
#[derive(Debug, Default)]
pub struct StaticLeases {
    ips: Mutex<Vec<IpAddr>>,
}

impl StaticLeases {
    pub fn new(ips: Vec<IpAddr>) -> Self {
        Self { ips: Mutex::new(ips) }
    }

    pub fn set(&self, ips: Vec<IpAddr>) {
        *self.ips.lock() = ips;
    }
}

impl LeaseSource for StaticLeases {
    fn client_ips(&self) -> Result<Vec<IpAddr>> {
        Ok(self.ips.lock().clone())
    }
}
