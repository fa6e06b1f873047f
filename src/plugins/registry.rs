use crate::plugins::types::JobBuilder;
use crate::plugins::{cms, dns, nmap, web};
use std::sync::Arc;

/// The fixed tool catalog, in run order.
pub struct PluginRegistry {
    builders: Vec<Arc<dyn JobBuilder>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            builders: vec![
                Arc::new(nmap::NmapQuick),
                Arc::new(nmap::NmapFull),
                Arc::new(nmap::NmapUdp),
                Arc::new(dns::DigAxfr),
                Arc::new(dns::DnsRecon),
                Arc::new(dns::TheHarvester),
                Arc::new(web::WhatWeb),
                Arc::new(cms::WpScan),
                Arc::new(cms::Droopescan),
                Arc::new(cms::JoomScan),
                Arc::new(web::Feroxbuster),
                Arc::new(web::FfufVhost),
                Arc::new(web::Nikto),
                Arc::new(web::Arjun),
            ],
        }
    }

    pub fn builders(&self) -> &[Arc<dyn JobBuilder>] {
        &self.builders
    }

    /// Every binary any builder may run, deduplicated, in catalog order.
    pub fn binaries(&self) -> Vec<&'static str> {
        let mut all: Vec<&'static str> = Vec::new();
        for builder in &self.builders {
            for bin in builder.binaries() {
                if !all.contains(bin) {
                    all.push(*bin);
                }
            }
        }
        all
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Phase;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_catalog_order_and_phases() {
        let registry = PluginRegistry::new();
        let names: Vec<&str> = registry.builders().iter().map(|b| b.name()).collect();
        assert_eq!(
            names,
            vec![
                "nmap_quick", "nmap_full", "nmap_udp", "dig_axfr", "dnsrecon", "theharvester",
                "whatweb", "wpscan", "droopescan", "joomscan", "feroxbuster", "ffuf_vhost", "nikto", "arjun",
            ]
        );
        // phases never interleave
        let phases: Vec<Phase> = registry.builders().iter().map(|b| b.phase()).collect();
        let mut sorted = phases.clone();
        sorted.sort();
        assert_eq!(phases, sorted);
        let web = phases.iter().filter(|p| **p == Phase::WebAnalysis).count();
        assert_eq!(web, 8);
    }

    #[test]
    fn test_binaries_are_unique() {
        let bins = PluginRegistry::new().binaries();
        assert_eq!(bins.iter().filter(|b| **b == "nmap").count(), 1);
        assert!(bins.contains(&"theHarvester"));
    }
}
