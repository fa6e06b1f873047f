use crate::core::models::Phase;
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "ipsnipe", version, about = "Multi-phase recon scan orchestrator")]
pub struct Cli {
    /// Target host/IP to scan (required)
    #[arg(short = 't', long = "target")]
    pub target: String,

    /// Configuration file (defaults: ./ipsnipe.toml, ./config.toml, user config dir)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Enhanced mode: privileged scans through sudo (UDP)
    #[arg(short = 'e', long = "enhanced", action = ArgAction::SetTrue)]
    pub enhanced: bool,

    /// Phases to run, comma separated (default: all)
    #[arg(long = "phases", value_enum, value_delimiter = ',')]
    pub phases: Vec<PhaseArg>,

    /// Do not listen for skip/quit commands on stdin
    #[arg(long = "no-interactive", action = ArgAction::SetTrue)]
    pub no_interactive: bool,

    /// Output root directory (overrides general.output_root)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Verbose human output
    #[arg(short = 'v', long = "verbose", action = ArgAction::SetTrue)]
    pub verbose: bool,

    /// Debug logs (implies verbose)
    #[arg(short = 'd', long = "debug", action = ArgAction::SetTrue)]
    pub debug: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseArg {
    Network,
    Dns,
    Web,
}

impl From<PhaseArg> for Phase {
    fn from(arg: PhaseArg) -> Self {
        match arg {
            PhaseArg::Network => Phase::NetworkDiscovery,
            PhaseArg::Dns => Phase::DomainIntel,
            PhaseArg::Web => Phase::WebAnalysis,
        }
    }
}

impl Cli {
    /// Selected phases in run order; empty selection means all.
    pub fn selected_phases(&self) -> Vec<Phase> {
        if self.phases.is_empty() {
            return Phase::ALL.to_vec();
        }
        Phase::ALL
            .into_iter()
            .filter(|p| self.phases.iter().any(|a| Phase::from(*a) == *p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_selection_keeps_run_order() {
        let cli = Cli::parse_from(["ipsnipe", "-t", "10.10.10.10", "--phases", "web,network"]);
        assert_eq!(
            cli.selected_phases(),
            vec![Phase::NetworkDiscovery, Phase::WebAnalysis]
        );
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["ipsnipe", "--target", "10.10.10.10"]);
        assert_eq!(cli.selected_phases(), Phase::ALL.to_vec());
        assert!(!cli.no_interactive);
        assert!(cli.config.is_none());
    }
}
