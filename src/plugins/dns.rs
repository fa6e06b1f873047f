use crate::core::context::{ContextUpdate, TargetContext};
use crate::core::errors::IpsnipeError;
use crate::core::job::JobOutput;
use crate::core::models::Phase;
use crate::plugins::probe::is_hostname;
use crate::plugins::types::{BuildDecision, BuildInput, JobBuilder};

/// Domain-like tokens in `text` that sit at or below `domain`.
pub fn hostnames_under(text: &str, domain: &str) -> ContextUpdate {
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    let suffix = format!(".{domain}");
    let mut update = ContextUpdate::default();
    for token in text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '.' || c == '-')) {
        let name = token.trim_matches('.').to_ascii_lowercase();
        if (name == domain || name.ends_with(&suffix)) && is_hostname(&name) {
            update.add_hostname(&name);
        }
    }
    update
}

/// Domain the DNS tools should query: the discovered primary domain, else
/// the operator's target.
fn query_domain(ctx: &TargetContext) -> String {
    ctx.primary_domain()
        .map(str::to_string)
        .unwrap_or_else(|| ctx.target.clone())
}

pub struct DigAxfr;
pub struct DnsRecon;
pub struct TheHarvester;

impl JobBuilder for DigAxfr {
    fn name(&self) -> &'static str {
        "dig_axfr"
    }

    fn phase(&self) -> Phase {
        Phase::DomainIntel
    }

    fn binaries(&self) -> &'static [&'static str] {
        &["dig"]
    }

    fn build(&self, input: &BuildInput) -> BuildDecision {
        let Some(domain) = input.context.primary_domain() else {
            return BuildDecision::Skip("no domain discovered for zone transfer".to_string());
        };
        let cmd = input
            .command(self.name(), "dig")
            .args(["axfr", domain])
            .arg(format!("@{}", input.context.target))
            .args(["+noall", "+answer"]);
        BuildDecision::run(input.finish(self.name(), cmd))
    }

    fn parse(&self, output: &JobOutput, ctx: &TargetContext) -> Result<ContextUpdate, IpsnipeError> {
        let mut update = ContextUpdate::default();
        let Some(domain) = ctx.primary_domain() else {
            return Ok(update);
        };
        for line in output.stdout_text().lines() {
            if line.starts_with(';') || line.trim().is_empty() {
                continue;
            }
            // owner TTL class type rdata
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 5 {
                return Err(IpsnipeError::parse(self.name(), format!("unexpected record: {line}")));
            }
            update.absorb(hostnames_under(fields[0], domain));
            if matches!(fields[3], "CNAME" | "NS" | "MX" | "PTR" | "SRV") {
                update.absorb(hostnames_under(fields[fields.len() - 1], domain));
            }
        }
        Ok(update)
    }
}

impl JobBuilder for DnsRecon {
    fn name(&self) -> &'static str {
        "dnsrecon"
    }

    fn phase(&self) -> Phase {
        Phase::DomainIntel
    }

    fn binaries(&self) -> &'static [&'static str] {
        &["dnsrecon"]
    }

    fn build(&self, input: &BuildInput) -> BuildDecision {
        let domain = query_domain(&input.context);
        let cmd = input
            .command(self.name(), "dnsrecon")
            .args(["-d", domain.as_str(), "-n", input.context.target.as_str(), "-t", "std"]);
        BuildDecision::run(input.finish(self.name(), cmd))
    }

    fn parse(&self, output: &JobOutput, ctx: &TargetContext) -> Result<ContextUpdate, IpsnipeError> {
        Ok(hostnames_under(&output.combined_text(), &query_domain(ctx)))
    }
}

impl JobBuilder for TheHarvester {
    fn name(&self) -> &'static str {
        "theharvester"
    }

    fn phase(&self) -> Phase {
        Phase::DomainIntel
    }

    fn binaries(&self) -> &'static [&'static str] {
        &["theHarvester"]
    }

    fn build(&self, input: &BuildInput) -> BuildDecision {
        let domain = query_domain(&input.context);
        let cmd = input
            .command(self.name(), "theHarvester")
            .args(["-d", domain.as_str(), "-b", "crtsh,duckduckgo", "-l", "200"]);
        BuildDecision::run(input.finish(self.name(), cmd))
    }

    fn parse(&self, output: &JobOutput, ctx: &TargetContext) -> Result<ContextUpdate, IpsnipeError> {
        Ok(hostnames_under(&output.stdout_text(), &query_domain(ctx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testing::input_for;
    use pretty_assertions::assert_eq;

    fn output(stdout: &str) -> JobOutput {
        JobOutput {
            stdout: stdout.as_bytes().to_vec(),
            exit_code: Some(0),
            ..JobOutput::default()
        }
    }

    fn ctx_with_domain() -> TargetContext {
        let mut ctx = TargetContext::new("10.10.11.20");
        ctx.merge(ContextUpdate::default().hostname("box.htb"));
        ctx
    }

    #[test]
    fn test_axfr_records() {
        let text = "\
box.htb.\t604800\tIN\tSOA\tbox.htb. root.box.htb. 2 604800 86400 2419200 604800
box.htb.\t604800\tIN\tNS\tns1.box.htb.
admin.box.htb.\t604800\tIN\tA\t10.10.11.20
files.box.htb.\t604800\tIN\tCNAME\tstorage.box.htb.
";
        let update = DigAxfr.parse(&output(text), &ctx_with_domain()).unwrap();
        let hosts: Vec<&str> = update.hostnames.iter().map(String::as_str).collect();
        assert_eq!(
            hosts,
            vec!["admin.box.htb", "box.htb", "files.box.htb", "ns1.box.htb", "storage.box.htb"]
        );
    }

    #[test]
    fn test_failed_transfer_yields_nothing() {
        let update = DigAxfr
            .parse(&output("; Transfer failed.\n"), &ctx_with_domain())
            .unwrap();
        assert!(update.is_empty());
    }

    #[test]
    fn test_axfr_skips_without_domain() {
        let input = input_for(TargetContext::new("10.10.11.20"));
        assert!(matches!(DigAxfr.build(&input), BuildDecision::Skip(_)));
        let input = input_for(ctx_with_domain());
        match DigAxfr.build(&input) {
            BuildDecision::Run { command, .. } => {
                assert_eq!(command.args[..3], ["axfr", "box.htb", "@10.10.11.20"]);
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_hostnames_under_ignores_other_domains() {
        let update = hostnames_under(
            "[*] A www.box.htb 10.10.11.20\n[*] A cdn.example.com 1.2.3.4\n[*] MX mail.BOX.htb",
            "box.htb",
        );
        let hosts: Vec<&str> = update.hostnames.iter().map(String::as_str).collect();
        assert_eq!(hosts, vec!["mail.box.htb", "www.box.htb"]);
    }
}
