use crate::{
    cli::args::Cli,
    config::{Config, ConfigLoader},
    core::{
        context::TargetContext,
        control,
        orchestrator::{self, Orchestrator},
        phase::RunEnv,
    },
    executors::toolchain,
    organizers::layout,
    plugins::{
        probe::{CurlProber, WebProber},
        registry::PluginRegistry,
    },
    reporters::writer,
    ui::printer,
    utils::{logging, time},
    wordlists::Catalog,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, watch};

/// Exit status after Ctrl-C.
pub const EXIT_INTERRUPTED: i32 = 130;

fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if cli.enhanced {
        config.general.enhanced_mode = true;
    }
    if let Some(output) = &cli.output {
        config.general.output_root = output.clone();
    }
}

/// Runs one scan and returns the process exit status.
pub async fn run(cli: Cli) -> Result<i32> {
    let level = logging::level_from_cli(&cli);
    logging::init(level)?;

    tracing::info!("Starting ipsnipe for target: {}", cli.target);

    let mut config = ConfigLoader::load_with_custom_path(cli.config.as_deref())?;
    apply_cli_overrides(&mut config, &cli);
    let config = Arc::new(config);

    let run_id = time::new_run_id(&cli.target);
    tracing::info!("Run ID: {}", run_id);
    let dirs = layout::prepare_run_dirs(&config.general.output_root, &run_id)
        .context("Failed to prepare run directories")?;

    let registry = PluginRegistry::new();
    toolchain::report_missing(registry.binaries());

    let catalog = Arc::new(Catalog::new(config.wordlists.clone()));
    let prober: Arc<dyn WebProber> = Arc::new(CurlProber::new(&config.probe));

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (signals_tx, signals_rx) = mpsc::unbounded_channel();
    let (current_tx, current_rx) = watch::channel(None);

    let env = RunEnv {
        config: Arc::clone(&config),
        catalog,
        prober,
        dirs: dirs.clone(),
        context: Arc::new(Mutex::new(TargetContext::new(cli.target.clone()))),
        events: events_tx,
        current: current_tx,
    };
    let phases = orchestrator::plan(registry.builders(), &config, &cli.selected_phases());

    let interactive = !cli.no_interactive;
    printer::print_banner(&cli.target, &run_id, interactive);

    let controller = interactive.then(|| control::spawn_stdin_controller(current_rx, signals_tx.clone()));
    let watcher = control::spawn_interrupt_watcher(signals_tx);
    let printer_task = printer::spawn_event_printer(events_rx);

    let report = Orchestrator::new(env, phases, signals_rx).run(&run_id).await;

    // env dropped with the orchestrator, so the printer drains and exits
    if let Err(e) = printer_task.await {
        tracing::warn!("Event printer stopped: {}", e);
    }
    watcher.abort();
    if let Some(controller) = controller {
        controller.abort();
    }

    writer::write_all(&report, &dirs).context("Failed to write reports")?;
    printer::print_summary(&report, &dirs);

    if report.interrupted {
        Ok(EXIT_INTERRUPTED)
    } else {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from(["ipsnipe", "-t", "10.0.0.1", "-e", "-o", "/tmp/out"]);
        let mut config = Config::default();
        apply_cli_overrides(&mut config, &cli);
        assert!(config.general.enhanced_mode);
        assert_eq!(config.general.output_root, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_no_flags_keep_config() {
        let cli = Cli::parse_from(["ipsnipe", "-t", "10.0.0.1"]);
        let mut config = Config::default();
        config.general.enhanced_mode = true;
        apply_cli_overrides(&mut config, &cli);
        assert!(config.general.enhanced_mode);
        assert_eq!(config.general.output_root, PathBuf::from("ipsnipe_results"));
    }
}
