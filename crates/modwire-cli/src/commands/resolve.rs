use super::load;
use miette::{IntoDiagnostic, Result};
use modwire_core::{
    Config, ModuleId, ModuleRegistry, ResolveReport, WiringSummary, RESOLVE_REPORT_SCHEMA_VERSION,
};
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

/// JSON output of `modwire resolve`.
#[derive(Debug, Serialize)]
struct ResolveOutput<'a> {
    schema_version: u32,
    ok: bool,
    strategy: &'static str,
    report: &'a ResolveReport,
    wirings: Vec<WiringSummary>,
}

/// Run the resolve command.
///
/// Exits 1 when any requested module is left unresolved.
pub fn run(config: &Config, manifest: &Path, json: bool) -> Result<()> {
    let (registry, batch) = load(config, manifest, json)?;
    info!(modules = registry.snapshot().len(), requested = batch.len(), "resolving");

    let report = registry.resolve(&batch);
    let wirings = summaries(&registry);

    if json {
        let out = ResolveOutput {
            schema_version: RESOLVE_REPORT_SCHEMA_VERSION,
            ok: report.is_success(),
            strategy: registry.strategy().name(),
            report: &report,
            wirings,
        };
        println!("{}", serde_json::to_string_pretty(&out).into_diagnostic()?);
    } else {
        print_human(&registry, &report, batch.len(), &wirings)?;
    }

    if report.is_success() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

/// Summaries of every resolved module in registration order.
pub fn summaries(registry: &ModuleRegistry) -> Vec<WiringSummary> {
    let snapshot = registry.snapshot();
    snapshot
        .resolved()
        .map(|(_, module, wiring)| WiringSummary::new(module, wiring))
        .collect()
}

fn label(registry: &ModuleRegistry, id: ModuleId) -> String {
    registry
        .module(id)
        .map_or_else(|| id.to_string(), |m| format!("{m} ({id})"))
}

fn print_human(
    registry: &ModuleRegistry,
    report: &ResolveReport,
    requested: usize,
    wirings: &[WiringSummary],
) -> Result<()> {
    let mut out = io::stdout().lock();

    writeln!(
        out,
        "resolved {} of {} requested module(s) in {} round(s)",
        report.resolved.len(),
        requested,
        report.rounds
    )
    .into_diagnostic()?;

    for summary in wirings {
        writeln!(
            out,
            "  \x1b[32m✓\x1b[0m {}@{} ({})",
            summary.symbolic_name, summary.version, summary.module
        )
        .into_diagnostic()?;
        if let Some(host) = summary.host {
            writeln!(out, "      attached to {}", label(registry, host)).into_diagnostic()?;
        }
        for wire in &summary.wires {
            writeln!(
                out,
                "      {} {} {} -> {}",
                wire.namespace,
                wire.name,
                wire.version,
                label(registry, wire.provider)
            )
            .into_diagnostic()?;
        }
    }

    for (id, failure) in &report.failed {
        writeln!(out, "  \x1b[31m✗\x1b[0m {}: {failure}", label(registry, *id))
            .into_diagnostic()?;
    }

    out.flush().into_diagnostic()?;
    Ok(())
}
