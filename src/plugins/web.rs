use crate::core::context::{ContextUpdate, TargetContext};
use crate::core::errors::IpsnipeError;
use crate::core::job::{CommandSpec, JobOutput};
use crate::core::models::{Phase, Scheme, WebEndpoint};
use crate::plugins::probe::url_host;
use crate::plugins::types::{BuildDecision, BuildInput, JobBuilder};
use crate::utils::fs::strip_ansi;
use crate::wordlists::Category;
use regex::Regex;
use std::sync::OnceLock;

const PLUGIN_CONFIDENCE: f64 = 0.9;
const BANNER_CONFIDENCE: f64 = 0.7;

/// whatweb plugins that describe the response rather than a technology.
const WHATWEB_NOISE: &[&str] = &[
    "country", "ip", "title", "httpserver", "redirectlocation", "uncommonheaders", "cookies",
    "httponly", "script", "email", "html5", "frame", "passwordfield", "meta-author",
    "x-frame-options", "x-xss-protection", "x-ua-compatible", "strict-transport-security",
    "content-language", "via-proxy", "allow", "x-powered-by", "open-graph-protocol",
];

/// Shared first steps of every web builder: pick the endpoint (possibly by
/// probing) and hand back a decision around the built command.
pub(crate) fn web_job<F>(input: &BuildInput, make: F) -> BuildDecision
where
    F: FnOnce(&WebEndpoint) -> Result<CommandSpec, String>,
{
    let (endpoint, discovered) = match input.web_endpoint() {
        Ok(found) => found,
        Err(reason) => return BuildDecision::Skip(reason),
    };
    match make(&endpoint) {
        Ok(command) => BuildDecision::Run {
            command,
            discovered,
            annotations: Vec::new(),
        },
        Err(reason) => BuildDecision::Skip(reason),
    }
}

fn with_wordlist(decision: BuildDecision, input: &BuildInput, tool: &str, category: Category) -> BuildDecision {
    let (mut command, discovered, mut annotations) = match decision {
        BuildDecision::Run {
            command,
            discovered,
            annotations,
        } => (command, discovered, annotations),
        skip => return skip,
    };
    let choice = input.wordlist(tool, category);
    for arg in command.args.iter_mut() {
        if arg == WORDLIST_SLOT {
            *arg = choice.path.clone();
        }
    }
    command.artifacts.extend(choice.artifact);
    annotations.extend(choice.annotation);
    BuildDecision::Run {
        command,
        discovered,
        annotations,
    }
}

/// Replaced by the selected wordlist path once the job will run.
const WORDLIST_SLOT: &str = "{wordlist}";

pub struct WhatWeb;
pub struct Feroxbuster;
pub struct FfufVhost;
pub struct Nikto;
pub struct Arjun;

impl JobBuilder for WhatWeb {
    fn name(&self) -> &'static str {
        "whatweb"
    }

    fn phase(&self) -> Phase {
        Phase::WebAnalysis
    }

    fn binaries(&self) -> &'static [&'static str] {
        &["whatweb"]
    }

    fn build(&self, input: &BuildInput) -> BuildDecision {
        web_job(input, |endpoint| {
            let cmd = input
                .command(self.name(), "whatweb")
                .args(["--color=never", "--no-errors", "-a", "3"])
                .arg(endpoint.url());
            Ok(input.finish(self.name(), cmd))
        })
    }

    fn parse(&self, output: &JobOutput, _ctx: &TargetContext) -> Result<ContextUpdate, IpsnipeError> {
        parse_whatweb(self.name(), &strip_ansi(&output.stdout_text()))
    }
}

/// `Name[value][value]` groups of a whatweb result line, split at top-level commas.
fn whatweb_plugins(line: &str) -> Vec<(String, Vec<String>)> {
    let mut plugins = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    let mut parts = Vec::new();
    for c in line.chars() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    parts.push(current);

    for part in parts {
        let part = part.trim();
        let (name, rest) = part.split_once('[').unwrap_or((part, ""));
        let values = if rest.is_empty() {
            Vec::new()
        } else {
            format!("[{rest}")
                .split(']')
                .map(|v| v.trim_start_matches('[').trim().to_string())
                .filter(|v| !v.is_empty())
                .collect()
        };
        if !name.trim().is_empty() {
            plugins.push((name.trim().to_string(), values));
        }
    }
    plugins
}

pub fn parse_whatweb(tool: &str, text: &str) -> Result<ContextUpdate, IpsnipeError> {
    let mut update = ContextUpdate::default();
    let mut seen_result = false;

    for line in text.lines().filter(|l| l.starts_with("http")) {
        // "<url> [200 OK] Plugin[..], Plugin[..]"
        let Some((_, rest)) = line.split_once("] ") else {
            continue;
        };
        seen_result = true;
        for (name, values) in whatweb_plugins(rest) {
            let key = name.to_ascii_lowercase();
            match key.as_str() {
                "redirectlocation" => {
                    for host in values.iter().filter_map(|v| url_host(v)) {
                        update.add_hostname(&host);
                    }
                }
                "metagenerator" => {
                    if let Some(generator) = values.first() {
                        update.add_technology(generator, PLUGIN_CONFIDENCE);
                    }
                }
                "httpserver" | "x-powered-by" => {
                    if let Some(banner) = values.last() {
                        update.add_technology(banner, BANNER_CONFIDENCE);
                    }
                }
                _ if WHATWEB_NOISE.contains(&key.as_str()) => {}
                _ => update.add_technology(&name, PLUGIN_CONFIDENCE),
            }
        }
    }

    if !seen_result {
        return Err(IpsnipeError::parse(tool, "no result line"));
    }
    Ok(update)
}

impl JobBuilder for Feroxbuster {
    fn name(&self) -> &'static str {
        "feroxbuster"
    }

    fn phase(&self) -> Phase {
        Phase::WebAnalysis
    }

    fn binaries(&self) -> &'static [&'static str] {
        &["feroxbuster"]
    }

    fn build(&self, input: &BuildInput) -> BuildDecision {
        let decision = web_job(input, |endpoint| {
            let mut cmd = input
                .command(self.name(), "feroxbuster")
                .args(["-u", endpoint.url().as_str(), "-w", WORDLIST_SLOT])
                .args(["-t", input.threads(self.name(), 50).as_str()])
                .args(["--depth", "2", "--timeout", "10", "-x", "php,html,txt", "-q", "--no-state"]);
            if endpoint.scheme == Scheme::Https {
                cmd = cmd.arg("-k");
            }
            Ok(input.finish(self.name(), cmd))
        });
        with_wordlist(decision, input, self.name(), Category::Directory)
    }
}

impl JobBuilder for FfufVhost {
    fn name(&self) -> &'static str {
        "ffuf_vhost"
    }

    fn phase(&self) -> Phase {
        Phase::WebAnalysis
    }

    fn binaries(&self) -> &'static [&'static str] {
        &["ffuf"]
    }

    fn build(&self, input: &BuildInput) -> BuildDecision {
        let Some(domain) = input.context.primary_domain().map(str::to_string) else {
            return BuildDecision::Skip("no hostname discovered for vhost fuzzing".to_string());
        };
        let decision = web_job(input, |endpoint| {
            let cmd = input
                .command(self.name(), "ffuf")
                .args(["-u", endpoint.url().as_str(), "-w", WORDLIST_SLOT])
                .args(["-H", format!("Host: FUZZ.{domain}").as_str()])
                .args(["-t", input.threads(self.name(), 40).as_str()])
                .args(["-ac", "-noninteractive"]);
            Ok(input.finish(self.name(), cmd))
        });
        with_wordlist(decision, input, self.name(), Category::Subdomain)
    }

    fn parse(&self, output: &JobOutput, ctx: &TargetContext) -> Result<ContextUpdate, IpsnipeError> {
        let mut update = ContextUpdate::default();
        let Some(domain) = ctx.primary_domain() else {
            return Ok(update);
        };
        for caps in ffuf_hit().captures_iter(&strip_ansi(&output.stdout_text())) {
            update.add_hostname(&format!("{}.{}", &caps[1], domain));
        }
        Ok(update)
    }
}

fn ffuf_hit() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^([A-Za-z0-9][A-Za-z0-9-]*)\s+\[Status: \d+").expect("static regex")
    })
}

impl JobBuilder for Nikto {
    fn name(&self) -> &'static str {
        "nikto"
    }

    fn phase(&self) -> Phase {
        Phase::WebAnalysis
    }

    fn binaries(&self) -> &'static [&'static str] {
        &["nikto"]
    }

    fn build(&self, input: &BuildInput) -> BuildDecision {
        web_job(input, |endpoint| {
            let mut cmd = input
                .command(self.name(), "nikto")
                .args(["-h", endpoint.url().as_str(), "-ask", "no", "-nointeractive"]);
            if endpoint.scheme == Scheme::Https {
                cmd = cmd.arg("-ssl");
            }
            Ok(input.finish(self.name(), cmd))
        })
    }

    fn parse(&self, output: &JobOutput, _ctx: &TargetContext) -> Result<ContextUpdate, IpsnipeError> {
        let mut update = ContextUpdate::default();
        for line in output.stdout_text().lines() {
            let line = line.trim_start_matches('+').trim();
            if let Some(banner) = line.strip_prefix("Server:") {
                update.add_technology(banner.trim(), BANNER_CONFIDENCE);
            } else if let Some((_, value)) = line.split_once("x-powered-by header:") {
                update.add_technology(value.trim(), BANNER_CONFIDENCE);
            }
        }
        Ok(update)
    }
}

impl JobBuilder for Arjun {
    fn name(&self) -> &'static str {
        "arjun"
    }

    fn phase(&self) -> Phase {
        Phase::WebAnalysis
    }

    fn binaries(&self) -> &'static [&'static str] {
        &["arjun"]
    }

    fn build(&self, input: &BuildInput) -> BuildDecision {
        let decision = web_job(input, |endpoint| {
            let cmd = input
                .command(self.name(), "arjun")
                .args(["-u", endpoint.url().as_str(), "-w", WORDLIST_SLOT])
                .args(["-t", input.threads(self.name(), 10).as_str()]);
            Ok(input.finish(self.name(), cmd))
        });
        with_wordlist(decision, input, self.name(), Category::Parameter)
    }
}
