use super::{fail, load};
use miette::{IntoDiagnostic, Result};
use modwire_core::error::codes;
use modwire_core::registry::WireSummary;
use modwire_core::{Config, DynamicContext, ModuleId, RESOLVE_REPORT_SCHEMA_VERSION};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// JSON output of `modwire dynamic`.
#[derive(Debug, Serialize)]
struct DynamicOutput {
    schema_version: u32,
    ok: bool,
    module: ModuleId,
    package: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    wire: Option<WireSummary>,
}

/// Resolve the manifest batch, then look up `package` dynamically for the
/// first module named `module`.
///
/// Exits 1 when no provider is found.
pub fn run(config: &Config, manifest: &Path, module: &str, package: &str, json: bool) -> Result<()> {
    let (registry, batch) = load(config, manifest, json)?;
    registry.resolve(&batch);

    let Some(&id) = registry.find_by_name(module).first() else {
        fail(
            codes::MANIFEST_UNKNOWN_MODULE,
            &format!("Unknown module '{module}'"),
            json,
        );
    };
    if !registry.is_resolved(id) {
        info!(module, "module is not resolved");
    }

    let context = DynamicContext::new();
    let wire = registry.resolve_dynamic(&context, id, package);
    let ok = wire.is_some();

    if json {
        let out = DynamicOutput {
            schema_version: RESOLVE_REPORT_SCHEMA_VERSION,
            ok,
            module: id,
            package: package.to_string(),
            wire: wire.as_ref().map(WireSummary::from),
        };
        println!("{}", serde_json::to_string_pretty(&out).into_diagnostic()?);
    } else {
        match &wire {
            Some(wire) => {
                let provider = registry
                    .module(wire.provider())
                    .map_or_else(|| wire.provider().to_string(), |m| m.to_string());
                println!(
                    "{package} {} -> {provider} ({})",
                    wire.capability().version(),
                    wire.provider()
                );
            }
            None => println!("{package}: not found"),
        }
    }

    if ok {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
