use crate::core::context::{ContextUpdate, TargetContext};
use crate::core::errors::IpsnipeError;
use crate::core::job::{CommandSpec, JobOutput};
use crate::core::models::{Phase, Scheme, WebEndpoint};
use crate::plugins::types::{BuildDecision, BuildInput, JobBuilder};
use crate::plugins::web::web_job;
use crate::utils::fs::strip_ansi;

/// Runs only once `tag` is a confident technology of the target.
fn cms_job<F>(input: &BuildInput, tag: &str, make: F) -> BuildDecision
where
    F: FnOnce(&WebEndpoint) -> CommandSpec,
{
    let floor = input.config.wordlists.weights.confidence_floor;
    let detected = input
        .context
        .confident_technologies(floor)
        .iter()
        .any(|(t, _)| *t == tag);
    if !detected {
        return BuildDecision::Skip(format!("{tag} not detected"));
    }
    web_job(input, |endpoint| Ok(make(endpoint)))
}

pub struct WpScan;
pub struct Droopescan;
pub struct JoomScan;

impl JobBuilder for WpScan {
    fn name(&self) -> &'static str {
        "wpscan"
    }

    fn phase(&self) -> Phase {
        Phase::WebAnalysis
    }

    fn binaries(&self) -> &'static [&'static str] {
        &["wpscan"]
    }

    fn build(&self, input: &BuildInput) -> BuildDecision {
        cms_job(input, "wordpress", |endpoint| {
            let mut cmd = input
                .command(self.name(), "wpscan")
                .args(["--url", endpoint.url().as_str()])
                .args(["--enumerate", "p,t,u", "--random-user-agent", "--no-banner"]);
            if endpoint.scheme == Scheme::Https {
                cmd = cmd.arg("--disable-tls-checks");
            }
            input.finish(self.name(), cmd)
        })
    }

    /// Confirms the version line; plugin and user findings stay in the raw output.
    fn parse(&self, output: &JobOutput, _ctx: &TargetContext) -> Result<ContextUpdate, IpsnipeError> {
        let mut update = ContextUpdate::default();
        let text = strip_ansi(&output.stdout_text());
        if text.lines().any(|l| l.contains("WordPress version") && l.contains("identified")) {
            update.add_technology("wordpress", 1.0);
        }
        Ok(update)
    }
}

impl JobBuilder for Droopescan {
    fn name(&self) -> &'static str {
        "droopescan"
    }

    fn phase(&self) -> Phase {
        Phase::WebAnalysis
    }

    fn binaries(&self) -> &'static [&'static str] {
        &["droopescan"]
    }

    fn build(&self, input: &BuildInput) -> BuildDecision {
        cms_job(input, "drupal", |endpoint| {
            let cmd = input
                .command(self.name(), "droopescan")
                .args(["scan", "drupal", "-u", endpoint.url().as_str()])
                .args(["-t", input.threads(self.name(), 10).as_str()]);
            input.finish(self.name(), cmd)
        })
    }
}

impl JobBuilder for JoomScan {
    fn name(&self) -> &'static str {
        "joomscan"
    }

    fn phase(&self) -> Phase {
        Phase::WebAnalysis
    }

    fn binaries(&self) -> &'static [&'static str] {
        &["joomscan"]
    }

    fn build(&self, input: &BuildInput) -> BuildDecision {
        cms_job(input, "joomla", |endpoint| {
            let cmd = input
                .command(self.name(), "joomscan")
                .args(["-u", endpoint.url().as_str(), "--enumerate-components"]);
            input.finish(self.name(), cmd)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testing::input_for;
    use rstest::rstest;

    fn cms_context(tag: &str, confidence: f64) -> TargetContext {
        let mut ctx = TargetContext::new("10.10.11.20");
        ctx.merge(
            ContextUpdate::default()
                .endpoint(WebEndpoint::new("10.10.11.20", 80, Scheme::Http))
                .technology(tag, confidence),
        );
        ctx
    }

    fn builder(name: &str) -> Box<dyn JobBuilder> {
        match name {
            "wpscan" => Box::new(WpScan),
            "droopescan" => Box::new(Droopescan),
            _ => Box::new(JoomScan),
        }
    }

    #[rstest]
    #[case("wpscan", "wordpress")]
    #[case("droopescan", "drupal")]
    #[case("joomscan", "joomla")]
    fn test_runs_when_cms_detected(#[case] tool: &str, #[case] tag: &str) {
        let input = input_for(cms_context(tag, 0.9));
        match builder(tool).build(&input) {
            BuildDecision::Run { command, .. } => {
                assert_eq!(command.program, tool);
                assert!(command.args.contains(&"http://10.10.11.20".to_string()));
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[rstest]
    #[case("wpscan", "drupal")]
    #[case("droopescan", "joomla")]
    #[case("joomscan", "wordpress")]
    fn test_skips_for_other_cms(#[case] tool: &str, #[case] tag: &str) {
        let input = input_for(cms_context(tag, 0.9));
        assert!(matches!(builder(tool).build(&input), BuildDecision::Skip(_)));
    }

    #[test]
    fn test_weak_detection_does_not_trigger() {
        let input = input_for(cms_context("wordpress", 0.3));
        assert!(matches!(WpScan.build(&input), BuildDecision::Skip(_)));
    }

    #[test]
    fn test_wpscan_confirms_version() {
        let output = JobOutput {
            stdout: b"[+] WordPress version 6.1.1 identified (Latest, released on 2022-11-15).\n".to_vec(),
            exit_code: Some(0),
            ..JobOutput::default()
        };
        let update = WpScan.parse(&output, &TargetContext::new("t")).unwrap();
        assert_eq!(update.technologies.get("wordpress"), Some(&1.0));
    }
}
