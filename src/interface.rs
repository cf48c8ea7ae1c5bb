//! Interface registry
//!
//! Interfaces are materialized lazily: the first record decoded for a
//! (link layer, channel, hardware channel) triple creates a descriptor and
//! assigns the next id. APP_TEXT channel descriptions may reach the registry
//! before any data record and attach a display name to the interface they
//! describe.

use std::collections::HashMap;

use crate::format::MAX_SNAP_LEN;
use crate::types::{FileEncap, InterfaceDescriptor, LinkLayer, HW_CHANNEL_NONE};

#[derive(Debug)]
pub(crate) struct InterfaceRegistry {
    by_key: HashMap<u64, u32>,
    descriptors: Vec<InterfaceDescriptor>,
    file_encap: FileEncap,
}

fn key(link_layer: LinkLayer, channel: u16, hw_channel: u16) -> u64 {
    ((link_layer.code() as u64) << 32) | ((hw_channel as u64) << 16) | channel as u64
}

fn synthesize_name(link_layer: LinkLayer, channel: u16, hw_channel: u16) -> String {
    match link_layer {
        LinkLayer::Ethernet => {
            if hw_channel == HW_CHANNEL_NONE {
                format!("ETH-{channel}")
            } else {
                format!("ETH-{channel}-{hw_channel}")
            }
        }
        LinkLayer::Ieee80211 => format!("WLAN-{channel}"),
        LinkLayer::FlexRay => format!("FR-{channel}"),
        LinkLayer::Lin => format!("LIN-{channel}"),
        LinkLayer::SocketCan => format!("CAN-{channel}"),
        other => format!("ENCAP_{}-{channel}", other.code()),
    }
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        Self {
            by_key: HashMap::new(),
            descriptors: Vec::new(),
            file_encap: FileEncap::Unset,
        }
    }

    /// Return the id for a triple, creating the interface on first use
    ///
    /// `name` only matters at creation time; later lookups with a name do
    /// not rename an existing interface.
    pub fn lookup(
        &mut self,
        link_layer: LinkLayer,
        channel: u16,
        hw_channel: u16,
        name: Option<&str>,
    ) -> u32 {
        let key = key(link_layer, channel, hw_channel);
        if let Some(&id) = self.by_key.get(&key) {
            return id;
        }
        self.add(key, link_layer, channel, hw_channel, name)
    }

    fn add(
        &mut self,
        key: u64,
        link_layer: LinkLayer,
        channel: u16,
        hw_channel: u16,
        name: Option<&str>,
    ) -> u32 {
        let interface_id = self.descriptors.len() as u32;
        let name = match name {
            Some(name) => name.to_owned(),
            None => synthesize_name(link_layer, channel, hw_channel),
        };
        log::debug!("new interface {interface_id}: {name} ({link_layer})");

        // The time stamp resolution in these files can be per-record; the
        // maximum resolution is nanoseconds, so the interface advertises
        // that and each record carries its own precision.
        self.descriptors.push(InterfaceDescriptor {
            interface_id,
            link_layer,
            channel,
            hw_channel,
            name,
            ts_resolution_exponent: 9,
            snap_len: MAX_SNAP_LEN,
        });
        self.by_key.insert(key, interface_id);

        self.file_encap = match self.file_encap {
            FileEncap::Unset => FileEncap::Single(link_layer),
            FileEncap::Single(existing) if existing == link_layer => FileEncap::Single(existing),
            _ => FileEncap::PerPacket,
        };

        interface_id
    }

    pub fn descriptors(&self) -> &[InterfaceDescriptor] {
        &self.descriptors
    }

    pub fn file_encap(&self) -> FileEncap {
        self.file_encap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_triple_same_id() {
        let mut registry = InterfaceRegistry::new();
        let a = registry.lookup(LinkLayer::SocketCan, 1, HW_CHANNEL_NONE, None);
        let b = registry.lookup(LinkLayer::SocketCan, 1, HW_CHANNEL_NONE, None);
        assert_eq!(a, b);
        assert_eq!(registry.descriptors().len(), 1);
    }

    #[test]
    fn test_distinct_triples_distinct_ids() {
        let mut registry = InterfaceRegistry::new();
        let a = registry.lookup(LinkLayer::SocketCan, 1, HW_CHANNEL_NONE, None);
        let b = registry.lookup(LinkLayer::SocketCan, 2, HW_CHANNEL_NONE, None);
        let c = registry.lookup(LinkLayer::Ethernet, 1, HW_CHANNEL_NONE, None);
        let d = registry.lookup(LinkLayer::Ethernet, 1, 3, None);
        assert_eq!(vec![a, b, c, d], vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_synthesized_names() {
        let mut registry = InterfaceRegistry::new();
        registry.lookup(LinkLayer::Ethernet, 1, HW_CHANNEL_NONE, None);
        registry.lookup(LinkLayer::Ethernet, 1, 2, None);
        registry.lookup(LinkLayer::Ieee80211, 3, HW_CHANNEL_NONE, None);
        registry.lookup(LinkLayer::FlexRay, 4, HW_CHANNEL_NONE, None);
        registry.lookup(LinkLayer::Lin, 5, HW_CHANNEL_NONE, None);
        registry.lookup(LinkLayer::SocketCan, 6, HW_CHANNEL_NONE, None);
        registry.lookup(LinkLayer::Unknown, 7, HW_CHANNEL_NONE, None);

        let names: Vec<&str> = registry
            .descriptors()
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "ETH-1",
                "ETH-1-2",
                "WLAN-3",
                "FR-4",
                "LIN-5",
                "CAN-6",
                "ENCAP_4294967295-7"
            ]
        );
    }

    #[test]
    fn test_supplied_name_wins_at_creation() {
        let mut registry = InterfaceRegistry::new();
        registry.lookup(LinkLayer::SocketCan, 1, HW_CHANNEL_NONE, Some("Powertrain"));
        let id = registry.lookup(LinkLayer::SocketCan, 1, HW_CHANNEL_NONE, None);
        assert_eq!(registry.descriptors()[id as usize].name, "Powertrain");
    }

    #[test]
    fn test_file_encap_transitions() {
        let mut registry = InterfaceRegistry::new();
        assert_eq!(registry.file_encap(), FileEncap::Unset);
        registry.lookup(LinkLayer::SocketCan, 1, HW_CHANNEL_NONE, None);
        assert_eq!(registry.file_encap(), FileEncap::Single(LinkLayer::SocketCan));
        registry.lookup(LinkLayer::SocketCan, 2, HW_CHANNEL_NONE, None);
        assert_eq!(registry.file_encap(), FileEncap::Single(LinkLayer::SocketCan));
        registry.lookup(LinkLayer::Ethernet, 1, HW_CHANNEL_NONE, None);
        assert_eq!(registry.file_encap(), FileEncap::PerPacket);
    }

    #[test]
    fn test_descriptor_resolution_and_snap() {
        let mut registry = InterfaceRegistry::new();
        registry.lookup(LinkLayer::Lin, 1, HW_CHANNEL_NONE, None);
        let descriptor = &registry.descriptors()[0];
        assert_eq!(descriptor.ts_resolution_exponent, 9);
        assert_eq!(descriptor.snap_len, MAX_SNAP_LEN);
    }
}
