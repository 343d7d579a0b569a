pub mod dynamic;
pub mod resolve;
pub mod version;

use miette::Result;
use modwire_core::{Config, Manifest, ModuleId, ModuleRegistry};
use serde::Serialize;
use std::path::Path;

/// Schema version for command error output.
pub const ERROR_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
struct ErrorOutput {
    schema_version: u32,
    ok: bool,
    error: ErrorJson,
}

#[derive(Debug, Serialize)]
struct ErrorJson {
    code: String,
    message: String,
}

/// Report a failure with a stable code and exit 1.
pub fn fail(code: &str, message: &str, json: bool) -> ! {
    if json {
        let out = ErrorOutput {
            schema_version: ERROR_SCHEMA_VERSION,
            ok: false,
            error: ErrorJson {
                code: code.to_string(),
                message: message.to_string(),
            },
        };
        match serde_json::to_string(&out) {
            Ok(text) => println!("{text}"),
            Err(_) => eprintln!("error: {code}: {message}"),
        }
    } else {
        eprintln!("error: {code}: {message}");
    }
    std::process::exit(1);
}

/// Load a manifest and declare its modules, exiting on failure.
pub fn load(config: &Config, manifest: &Path, json: bool) -> Result<(ModuleRegistry, Vec<ModuleId>)> {
    let path = config.path(manifest);
    let loaded = Manifest::from_path(&path).and_then(Manifest::into_registry);
    match loaded {
        Ok(loaded) => Ok(loaded),
        Err(e) => fail(e.code(), &e.to_string(), json),
    }
}
