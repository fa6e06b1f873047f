use crate::core::context::{ContextUpdate, TargetContext};
use crate::core::errors::IpsnipeError;
use crate::core::job::JobOutput;
use crate::core::models::{Phase, Proto, Scheme, WebEndpoint};
use crate::plugins::probe::is_hostname;
use crate::plugins::types::{BuildDecision, BuildInput, JobBuilder};
use regex::Regex;
use std::sync::OnceLock;

const VERSION_CONFIDENCE: f64 = 0.7;

struct Patterns {
    port: Regex,
    redirect: Regex,
    common_name: Regex,
    alt_name: Regex,
    domain: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        port: Regex::new(r"(?m)^(\d+)/(tcp|udp)\s+open\s+(\S+)(?:[ \t]+(.*))?$").expect("static regex"),
        redirect: Regex::new(r"redirect to https?://([A-Za-z0-9.-]+)").expect("static regex"),
        common_name: Regex::new(r"commonName=([A-Za-z0-9.*-]+)").expect("static regex"),
        alt_name: Regex::new(r"DNS:([A-Za-z0-9.*-]+)").expect("static regex"),
        domain: Regex::new(r"Domain: ([A-Za-z0-9.-]+?)0?\.?[,)\s]").expect("static regex"),
    })
}

/// Scheme for an nmap service name that speaks HTTP.
pub fn web_scheme(service: &str) -> Option<Scheme> {
    let service = service.trim_end_matches('?').to_ascii_lowercase();
    let tls = service.starts_with("ssl/") || service.starts_with("https") || service.contains("tls");
    let http = service.contains("http");
    match (http, tls) {
        (true, true) => Some(Scheme::Https),
        (true, false) => Some(Scheme::Http),
        _ => None,
    }
}

/// Open ports, web services, product names and certificate/redirect hostnames.
pub fn parse_nmap(tool: &str, text: &str, target: &str) -> Result<ContextUpdate, IpsnipeError> {
    if !text.contains("Nmap scan report") && !text.contains("Nmap done") {
        return Err(IpsnipeError::parse(tool, "no scan report in output"));
    }

    let p = patterns();
    let mut update = ContextUpdate::default();

    for caps in p.port.captures_iter(text) {
        let Ok(port) = caps[1].parse::<u16>() else {
            continue;
        };
        let proto = if &caps[2] == "udp" { Proto::Udp } else { Proto::Tcp };
        update.open_ports.insert((port, proto));

        let service = &caps[3];
        if proto == Proto::Tcp {
            if let Some(scheme) = web_scheme(service) {
                update.web_endpoints.insert(WebEndpoint::new(target, port, scheme));
            }
        }
        if let Some(version) = caps.get(4).map(|m| m.as_str().trim()) {
            if let Some(product) = version.split_whitespace().next() {
                update.add_technology(product, VERSION_CONFIDENCE);
            }
        }
    }

    for re in [&p.redirect, &p.common_name, &p.alt_name, &p.domain] {
        for caps in re.captures_iter(text) {
            let name = caps[1].trim_start_matches("*.");
            if is_hostname(name) {
                update.add_hostname(name);
            }
        }
    }

    Ok(update)
}

pub struct NmapQuick;
pub struct NmapFull;
pub struct NmapUdp;

impl JobBuilder for NmapQuick {
    fn name(&self) -> &'static str {
        "nmap_quick"
    }

    fn phase(&self) -> Phase {
        Phase::NetworkDiscovery
    }

    fn binaries(&self) -> &'static [&'static str] {
        &["nmap"]
    }

    fn build(&self, input: &BuildInput) -> BuildDecision {
        let cmd = input
            .command(self.name(), "nmap")
            .args(["-sC", "-sV", "-T4", "-Pn", "--open", "--top-ports", "1000"])
            .arg(&input.context.target);
        BuildDecision::run(input.finish(self.name(), cmd))
    }

    fn parse(&self, output: &JobOutput, ctx: &TargetContext) -> Result<ContextUpdate, IpsnipeError> {
        parse_nmap(self.name(), &output.stdout_text(), &ctx.target)
    }
}

impl JobBuilder for NmapFull {
    fn name(&self) -> &'static str {
        "nmap_full"
    }

    fn phase(&self) -> Phase {
        Phase::NetworkDiscovery
    }

    fn binaries(&self) -> &'static [&'static str] {
        &["nmap"]
    }

    fn build(&self, input: &BuildInput) -> BuildDecision {
        let cmd = input
            .command(self.name(), "nmap")
            .args(["-p-", "-sV", "-T4", "-Pn", "--open", "--min-rate", "1000"])
            .arg(&input.context.target);
        BuildDecision::run(input.finish(self.name(), cmd))
    }

    fn parse(&self, output: &JobOutput, ctx: &TargetContext) -> Result<ContextUpdate, IpsnipeError> {
        parse_nmap(self.name(), &output.stdout_text(), &ctx.target)
    }
}

impl JobBuilder for NmapUdp {
    fn name(&self) -> &'static str {
        "nmap_udp"
    }

    fn phase(&self) -> Phase {
        Phase::NetworkDiscovery
    }

    fn binaries(&self) -> &'static [&'static str] {
        &["nmap", "sudo"]
    }

    fn build(&self, input: &BuildInput) -> BuildDecision {
        if !input.enhanced() {
            return BuildDecision::Skip("UDP scan needs enhanced mode".to_string());
        }
        let cmd = input
            .command(self.name(), "nmap")
            .args(["-sU", "-T4", "-Pn", "--open", "--top-ports", "100"])
            .arg(&input.context.target)
            .elevated();
        BuildDecision::run(input.finish(self.name(), cmd))
    }

    fn parse(&self, output: &JobOutput, ctx: &TargetContext) -> Result<ContextUpdate, IpsnipeError> {
        parse_nmap(self.name(), &output.stdout_text(), &ctx.target)
    }
}
