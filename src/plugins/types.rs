use crate::config::Config;
use crate::core::context::{ContextUpdate, TargetContext};
use crate::core::errors::IpsnipeError;
use crate::core::job::{Annotation, Artifact, CommandSpec, JobOutput};
use crate::core::models::{Phase, RunDirs, WebEndpoint};
use crate::plugins::probe::{self, WebProber};
use crate::wordlists::{Catalog, Category, Selection, SelectionRequest};
use std::sync::Arc;

/// Everything a builder may look at. Owned so it can cross into a
/// blocking task.
#[derive(Clone)]
pub struct BuildInput {
    pub config: Arc<Config>,
    pub context: TargetContext,
    pub catalog: Arc<Catalog>,
    pub prober: Arc<dyn WebProber>,
    pub dirs: RunDirs,
    pub first_in_phase: bool,
}

#[derive(Debug)]
pub enum BuildDecision {
    Run {
        command: CommandSpec,
        /// Facts the builder learned while deciding (fallback probe).
        discovered: Option<ContextUpdate>,
        annotations: Vec<Annotation>,
    },
    Skip(String),
}

impl BuildDecision {
    pub fn run(command: CommandSpec) -> Self {
        BuildDecision::Run {
            command,
            discovered: None,
            annotations: Vec::new(),
        }
    }
}

pub trait JobBuilder: Send + Sync {
    fn name(&self) -> &'static str;
    fn phase(&self) -> Phase;
    /// Binaries looked up by the startup check.
    fn binaries(&self) -> &'static [&'static str];
    fn build(&self, input: &BuildInput) -> BuildDecision;

    #[allow(unused_variables)]
    fn parse(&self, output: &JobOutput, ctx: &TargetContext) -> Result<ContextUpdate, IpsnipeError> {
        Ok(ContextUpdate::default())
    }
}

pub struct WordlistChoice {
    pub path: String,
    pub artifact: Option<Artifact>,
    pub annotation: Option<Annotation>,
}

impl BuildInput {
    /// Base command for `tool` with its configured timeout and exit codes.
    pub fn command(&self, tool: &str, program: &str) -> CommandSpec {
        let mut cmd = CommandSpec::new(program, self.config.timeout_for(tool));
        if let Some(codes) = self.config.tool(tool).success_codes {
            cmd.success_codes = codes;
        }
        cmd.cwd = Some(self.dirs.scans.clone());
        cmd
    }

    /// Appends the operator's `extra_args` for `tool`.
    pub fn finish(&self, tool: &str, mut cmd: CommandSpec) -> CommandSpec {
        if let Some(extra) = self.config.tool(tool).extra_args {
            match shell_words::split(&extra) {
                Ok(words) => cmd.args.extend(words),
                Err(e) => tracing::warn!("Ignoring extra_args for {}: {}", tool, e),
            }
        }
        cmd
    }

    pub fn threads(&self, tool: &str, default: u32) -> String {
        self.config.tool(tool).threads.unwrap_or(default).to_string()
    }

    pub fn enhanced(&self) -> bool {
        self.config.general.enhanced_mode
    }

    /// Picks a wordlist for `tool`; a synthesized list comes back as an
    /// artifact plus a degraded annotation.
    pub fn wordlist(&self, tool: &str, category: Category) -> WordlistChoice {
        let request = SelectionRequest::new(category).prefer(self.config.tool(tool).wordlist_size);
        match self.catalog.select(&request, &self.context) {
            Selection::File { candidate, from_unknown, .. } => {
                if from_unknown {
                    tracing::info!("{}: no {} wordlist, using {:?}", tool, category, candidate.path);
                }
                WordlistChoice {
                    path: candidate.path.display().to_string(),
                    artifact: None,
                    annotation: None,
                }
            }
            Selection::Builtin { category, words } => {
                let path = self.dirs.wordlists.join(format!("{}-builtin.txt", category));
                let mut contents = words.join("\n");
                contents.push('\n');
                WordlistChoice {
                    path: path.display().to_string(),
                    artifact: Some(Artifact { path, contents }),
                    annotation: Some(Annotation::DegradedWordlistFallback { category }),
                }
            }
        }
    }

    /// Endpoint for a web tool, addressed by the primary domain once one is
    /// known. With none known, the first web job probes the configured ports
    /// itself and reports what it found.
    pub fn web_endpoint(&self) -> Result<(WebEndpoint, Option<ContextUpdate>), String> {
        let (endpoint, discovered) = self.find_endpoint()?;
        match self.context.primary_domain() {
            Some(domain) if domain != endpoint.host => {
                tracing::info!("Using domain {} for {}", domain, endpoint.url());
                Ok((WebEndpoint::new(domain, endpoint.port, endpoint.scheme), discovered))
            }
            _ => Ok((endpoint, discovered)),
        }
    }

    fn find_endpoint(&self) -> Result<(WebEndpoint, Option<ContextUpdate>), String> {
        if let Some(endpoint) = probe::best_endpoint(&self.context.web_endpoints) {
            return Ok((endpoint.clone(), None));
        }
        if !self.first_in_phase {
            return Err("no web endpoints discovered".to_string());
        }

        tracing::info!("No web endpoints known, probing common web ports");
        let found = probe::probe_ports(
            &self.context.target,
            &self.config.probe.ports,
            self.prober.as_ref(),
        );
        match probe::best_endpoint(&found.web_endpoints) {
            Some(endpoint) => Ok((endpoint.clone(), Some(found))),
            None => Err("no web endpoints discovered by fallback probe".to_string()),
        }
    }
}
