use super::models::{Proto, WebEndpoint};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Facts discovered about the target during one run.
///
/// Every field only grows: sets by union, `technologies` by keeping the
/// highest confidence seen for a tag. Builders only ever see snapshots.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetContext {
    pub target: String,
    pub open_ports: BTreeSet<(u16, Proto)>,
    pub web_endpoints: BTreeSet<WebEndpoint>,
    pub hostnames: BTreeSet<String>,
    pub technologies: BTreeMap<String, f64>,
}

/// A partial set of facts produced by one job (or one probe).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextUpdate {
    pub open_ports: BTreeSet<(u16, Proto)>,
    pub web_endpoints: BTreeSet<WebEndpoint>,
    pub hostnames: BTreeSet<String>,
    pub technologies: BTreeMap<String, f64>,
}

impl ContextUpdate {
    pub fn is_empty(&self) -> bool {
        self.open_ports.is_empty()
            && self.web_endpoints.is_empty()
            && self.hostnames.is_empty()
            && self.technologies.is_empty()
    }

    pub fn port(mut self, port: u16, proto: Proto) -> Self {
        self.open_ports.insert((port, proto));
        self
    }

    pub fn endpoint(mut self, endpoint: WebEndpoint) -> Self {
        self.web_endpoints.insert(endpoint);
        self
    }

    pub fn hostname(mut self, name: &str) -> Self {
        self.add_hostname(name);
        self
    }

    pub fn technology(mut self, tag: &str, confidence: f64) -> Self {
        self.add_technology(tag, confidence);
        self
    }

    pub fn add_hostname(&mut self, name: &str) {
        let name = name.trim().trim_end_matches('.').to_ascii_lowercase();
        if !name.is_empty() {
            self.hostnames.insert(name);
        }
    }

    pub fn add_technology(&mut self, tag: &str, confidence: f64) {
        let tag = normalize_tag(tag);
        if tag.is_empty() {
            return;
        }
        let confidence = confidence.clamp(0.0, 1.0);
        let slot = self.technologies.entry(tag).or_insert(confidence);
        if confidence > *slot {
            *slot = confidence;
        }
    }

    /// Folds another update into this one with the same rules as
    /// [`TargetContext::merge`].
    pub fn absorb(&mut self, other: ContextUpdate) {
        self.open_ports.extend(other.open_ports);
        self.web_endpoints.extend(other.web_endpoints);
        self.hostnames.extend(other.hostnames);
        for (tag, confidence) in other.technologies {
            self.add_technology(&tag, confidence);
        }
    }
}

impl TargetContext {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    /// Applies `update`; returns true when at least one new fact was learned.
    pub fn merge(&mut self, update: ContextUpdate) -> bool {
        let mut changed = false;
        for port in update.open_ports {
            changed |= self.open_ports.insert(port);
        }
        for endpoint in update.web_endpoints {
            changed |= self.web_endpoints.insert(endpoint);
        }
        for name in update.hostnames {
            changed |= self.hostnames.insert(name);
        }
        for (tag, confidence) in update.technologies {
            match self.technologies.get_mut(&tag) {
                Some(current) if *current >= confidence => {}
                Some(current) => {
                    *current = confidence;
                    changed = true;
                }
                None => {
                    self.technologies.insert(tag, confidence);
                    changed = true;
                }
            }
        }
        changed
    }

    pub fn tcp_ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.open_ports
            .iter()
            .filter(|(_, proto)| *proto == Proto::Tcp)
            .map(|(port, _)| *port)
    }

    /// Technologies at or above `floor`, strongest first.
    pub fn confident_technologies(&self, floor: f64) -> Vec<(&str, f64)> {
        let mut techs: Vec<(&str, f64)> = self
            .technologies
            .iter()
            .filter(|(_, c)| **c >= floor)
            .map(|(t, c)| (t.as_str(), *c))
            .collect();
        techs.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        techs
    }

    /// Most specific known domain, used by DNS and vhost tools.
    pub fn primary_domain(&self) -> Option<&str> {
        self.hostnames
            .iter()
            .min_by(|a, b| {
                let depth = |s: &str| s.matches('.').count();
                depth(a).cmp(&depth(b)).then_with(|| a.len().cmp(&b.len())).then_with(|| a.cmp(b))
            })
            .map(String::as_str)
    }
}

/// Lower-cases a technology label and keeps only its product name
/// ("Apache/2.4.41 (Ubuntu)" becomes "apache").
pub fn normalize_tag(tag: &str) -> String {
    tag.trim()
        .split(|c: char| c == '/' || c == ' ' || c == '[' || c == '(')
        .next()
        .unwrap_or("")
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Scheme;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn arb_update() -> impl Strategy<Value = ContextUpdate> {
        (
            prop::collection::btree_set((1u16..1024, prop_oneof![Just(Proto::Tcp), Just(Proto::Udp)]), 0..6),
            prop::collection::btree_set((1u16..1024, prop_oneof![Just(Scheme::Http), Just(Scheme::Https)]), 0..4),
            prop::collection::btree_set("[a-z]{1,6}\\.htb", 0..4),
            prop::collection::btree_map("[a-z]{1,8}", 0.0f64..=1.0, 0..4),
        )
            .prop_map(|(ports, endpoints, hosts, techs)| ContextUpdate {
                open_ports: ports,
                web_endpoints: endpoints
                    .into_iter()
                    .map(|(port, scheme)| WebEndpoint::new("10.10.10.10", port, scheme))
                    .collect(),
                hostnames: hosts,
                technologies: techs,
            })
    }

    proptest! {
        #[test]
        fn merge_is_commutative(a in arb_update(), b in arb_update()) {
            let mut left = TargetContext::new("10.10.10.10");
            left.merge(a.clone());
            left.merge(b.clone());

            let mut right = TargetContext::new("10.10.10.10");
            right.merge(b);
            right.merge(a);

            prop_assert_eq!(left, right);
        }

        #[test]
        fn merge_is_idempotent(a in arb_update(), b in arb_update()) {
            let mut once = TargetContext::new("10.10.10.10");
            once.merge(a.clone());
            once.merge(b.clone());

            let mut twice = once.clone();
            prop_assert!(!twice.merge(a));
            prop_assert!(!twice.merge(b));
            prop_assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_conflicting_technology_keeps_max() {
        let mut ctx = TargetContext::new("t");
        ctx.merge(ContextUpdate::default().technology("WordPress", 0.9));
        assert!(!ctx.merge(ContextUpdate::default().technology("wordpress", 0.4)));
        assert_eq!(ctx.technologies.get("wordpress"), Some(&0.9));
        assert!(ctx.merge(ContextUpdate::default().technology("wordpress", 1.0)));
        assert_eq!(ctx.technologies.get("wordpress"), Some(&1.0));
    }

    #[test]
    fn test_normalize_tag() {
        assert_eq!(normalize_tag("Apache/2.4.41 (Ubuntu)"), "apache");
        assert_eq!(normalize_tag("WordPress[5.8]"), "wordpress");
        assert_eq!(normalize_tag("  nginx "), "nginx");
    }

    #[test]
    fn test_primary_domain_prefers_shallowest() {
        let mut ctx = TargetContext::new("10.10.10.10");
        ctx.merge(
            ContextUpdate::default()
                .hostname("dev.box.htb")
                .hostname("BOX.htb.")
                .hostname("admin.dev.box.htb"),
        );
        assert_eq!(ctx.primary_domain(), Some("box.htb"));
    }
}
