//! Dynamic package lookups: lazy wiring, on-demand resolution, re-entrancy
//! and concurrent callers.

use modwire_core::{
    CapabilityDecl, DynamicContext, ModuleDecl, ModuleId, ModuleRegistry, RequirementDecl,
    ResolveEvent, ResolveListener, ResolverConfig, Version, VersionRange, Wire,
};
use rayon::prelude::*;
use std::sync::{Arc, Mutex, OnceLock, Weak};

fn v(text: &str) -> Version {
    Version::parse(text).unwrap()
}

fn exporter(name: &str, version: &str, package: &str) -> ModuleDecl {
    ModuleDecl::new(name, v(version))
        .provides(CapabilityDecl::package(package).with_version(v(version)))
}

fn dynamic_app(pattern: &str) -> ModuleDecl {
    ModuleDecl::new("app", v("1.0")).requires(RequirementDecl::dynamic(pattern))
}

#[test]
fn test_wires_to_resolved_exporter_once() {
    let registry = ModuleRegistry::new();
    let metrics = registry.declare_module(exporter("metrics", "1.0", "plugin.metrics")).unwrap();
    let app = registry.declare_module(dynamic_app("plugin.*")).unwrap();
    registry.resolve(&[metrics, app]);

    let context = DynamicContext::new();
    let wire = registry.resolve_dynamic(&context, app, "plugin.metrics").unwrap();
    assert_eq!(wire.provider(), metrics);
    assert_eq!(wire.requirer(), app);
    assert!(wire.requirement().is_dynamic());

    let again = registry.resolve_dynamic(&context, app, "plugin.metrics").unwrap();
    assert_eq!(again.provider(), metrics);
    let wiring = registry.get_wiring(app).unwrap();
    assert_eq!(wiring.dynamic_wires().len(), 1);
    assert_eq!(wiring.provider_for("plugin.metrics"), Some(metrics));
    assert_eq!(context.depth("plugin.metrics"), 0);
}

#[test]
fn test_static_wire_returned_as_is() {
    let registry = ModuleRegistry::new();
    let core = registry.declare_module(exporter("core", "1.0", "util")).unwrap();
    let app = registry
        .declare_module(
            ModuleDecl::new("app", v("1.0"))
                .requires(RequirementDecl::package("util"))
                .requires(RequirementDecl::dynamic("*")),
        )
        .unwrap();
    registry.resolve(&[app]);

    let wire = registry
        .resolve_dynamic(&DynamicContext::new(), app, "util")
        .unwrap();
    assert_eq!(wire.provider(), core);
    assert!(!wire.requirement().is_dynamic());
    assert!(registry.get_wiring(app).unwrap().dynamic_wires().is_empty());
}

#[test]
fn test_pattern_must_cover_package() {
    let registry = ModuleRegistry::new();
    let other = registry.declare_module(exporter("other", "1.0", "other.api")).unwrap();
    let exact = registry.declare_module(exporter("exact", "1.0", "plugin")).unwrap();
    let app = registry.declare_module(dynamic_app("plugin.*")).unwrap();
    registry.resolve(&[other, exact, app]);

    let context = DynamicContext::new();
    assert!(registry.resolve_dynamic(&context, app, "other.api").is_none());
    // `plugin.*` covers sub-packages only.
    assert!(registry.resolve_dynamic(&context, app, "plugin").is_none());
}

#[test]
fn test_range_and_attributes_carried_from_pattern() {
    let registry = ModuleRegistry::new();
    let old = registry.declare_module(exporter("old", "1.0", "plugin.x")).unwrap();
    let new = registry.declare_module(exporter("new", "3.0", "plugin.x")).unwrap();
    let app = registry
        .declare_module(
            ModuleDecl::new("app", v("1.0")).requires(
                RequirementDecl::dynamic("plugin.*")
                    .with_range(VersionRange::parse("[1.0,2.0)").unwrap()),
            ),
        )
        .unwrap();
    registry.resolve(&[old, new, app]);

    let wire = registry
        .resolve_dynamic(&DynamicContext::new(), app, "plugin.x")
        .unwrap();
    assert_eq!(wire.provider(), old);
}

#[test]
fn test_unresolved_owner_gets_nothing() {
    let registry = ModuleRegistry::new();
    registry.declare_module(exporter("metrics", "1.0", "plugin.metrics")).unwrap();
    let app = registry
        .declare_module(dynamic_app("plugin.*").requires(RequirementDecl::package("missing")))
        .unwrap();
    registry.resolve(&[app]);

    assert!(registry
        .resolve_dynamic(&DynamicContext::new(), app, "plugin.metrics")
        .is_none());
    assert!(registry
        .resolve_dynamic(&DynamicContext::new(), ModuleId(99), "plugin.metrics")
        .is_none());
}

#[test]
fn test_owner_never_wires_to_itself() {
    let registry = ModuleRegistry::new();
    let app = registry
        .declare_module(dynamic_app("plugin.*").provides(CapabilityDecl::package("plugin.own")))
        .unwrap();
    registry.resolve(&[app]);
    assert!(registry
        .resolve_dynamic(&DynamicContext::new(), app, "plugin.own")
        .is_none());
}

#[test]
fn test_on_demand_resolution() {
    let registry = ModuleRegistry::new();
    let app = registry.declare_module(dynamic_app("plugin.*")).unwrap();
    registry.resolve(&[app]);

    let broken = registry
        .declare_module(
            exporter("broken", "9.0", "plugin.metrics").requires(RequirementDecl::package("nope")),
        )
        .unwrap();
    let metrics = registry.declare_module(exporter("metrics", "1.0", "plugin.metrics")).unwrap();

    let wire = registry
        .resolve_dynamic(&DynamicContext::new(), app, "plugin.metrics")
        .unwrap();
    // The higher version is tried first but cannot resolve.
    assert_eq!(wire.provider(), metrics);
    assert!(registry.is_resolved(metrics));
    assert!(!registry.is_resolved(broken));
}

#[test]
fn test_on_demand_can_be_disabled() {
    let registry =
        ModuleRegistry::with_config(ResolverConfig::default().with_on_demand_dynamic(false));
    let app = registry.declare_module(dynamic_app("plugin.*")).unwrap();
    let metrics = registry.declare_module(exporter("metrics", "1.0", "plugin.metrics")).unwrap();
    registry.resolve(&[app]);

    assert!(registry
        .resolve_dynamic(&DynamicContext::new(), app, "plugin.metrics")
        .is_none());
    assert!(!registry.is_resolved(metrics));

    // A later resolve makes the lookup succeed; misses are never cached.
    registry.resolve(&[metrics]);
    assert!(registry
        .resolve_dynamic(&DynamicContext::new(), app, "plugin.metrics")
        .is_some());
}

#[test]
fn test_fragment_dynamic_requirement_serves_host() {
    let registry = ModuleRegistry::new();
    let metrics = registry.declare_module(exporter("metrics", "1.0", "plugin.metrics")).unwrap();
    let host = registry.declare_module(ModuleDecl::new("H", v("1.0"))).unwrap();
    let frag = registry
        .declare_module(
            ModuleDecl::new("frag", v("1.0"))
                .requires(RequirementDecl::host("H"))
                .requires(RequirementDecl::dynamic("plugin.*")),
        )
        .unwrap();
    registry.resolve(&[metrics, host, frag]);

    let wire = registry
        .resolve_dynamic(&DynamicContext::new(), frag, "plugin.metrics")
        .unwrap();
    assert_eq!(wire.requirer(), host);
    assert_eq!(registry.get_wiring(host).unwrap().dynamic_wires().len(), 1);
}

/// Simulates a class load triggered by a newly resolved provider that asks
/// for the same package again on the same caller.
struct ReentrantLoader {
    registry: OnceLock<Weak<ModuleRegistry>>,
    context: Arc<DynamicContext>,
    app: OnceLock<ModuleId>,
    inner: Mutex<Vec<Option<Wire>>>,
}

impl ResolveListener for ReentrantLoader {
    fn on_event(&self, event: &ResolveEvent) {
        let (Some(registry), Some(app)) = (
            self.registry.get().and_then(Weak::upgrade),
            self.app.get(),
        ) else {
            return;
        };
        if matches!(event, ResolveEvent::Resolved(id) if id != app) {
            let found = registry.resolve_dynamic(&self.context, *app, "a.b.c");
            self.inner.lock().unwrap().push(found);
        }
    }
}

#[test]
fn test_reentrant_lookup_hits_depth_guard() {
    let registry = Arc::new(ModuleRegistry::new());
    let context = Arc::new(DynamicContext::new());
    let loader = Arc::new(ReentrantLoader {
        registry: OnceLock::new(),
        context: context.clone(),
        app: OnceLock::new(),
        inner: Mutex::new(Vec::new()),
    });
    registry.add_listener(loader.clone());
    loader.registry.set(Arc::downgrade(&registry)).unwrap();

    let app = registry.declare_module(dynamic_app("a.b.*")).unwrap();
    registry.resolve(&[app]);
    loader.app.set(app).unwrap();
    let provider = registry.declare_module(exporter("abc", "1.0", "a.b.c")).unwrap();

    let outer = registry.resolve_dynamic(&context, app, "a.b.c").unwrap();
    assert_eq!(outer.provider(), provider);

    let inner = loader.inner.lock().unwrap().clone();
    assert_eq!(inner.len(), 1);
    assert!(inner[0].is_none(), "nested lookup must be refused");
    assert_eq!(context.depth("a.b.c"), 0);

    // A fresh lookup on the same context works again.
    assert!(registry.resolve_dynamic(&context, app, "a.b.c").is_some());
}

#[test]
fn test_depth_limit_is_per_context() {
    let registry = ModuleRegistry::new();
    let metrics = registry.declare_module(exporter("metrics", "1.0", "plugin.metrics")).unwrap();
    let app = registry.declare_module(dynamic_app("plugin.*")).unwrap();
    registry.resolve(&[metrics, app]);

    let busy = DynamicContext::new();
    let _held = busy.enter("plugin.metrics");
    assert!(registry.resolve_dynamic(&busy, app, "plugin.metrics").is_none());
    assert!(registry
        .resolve_dynamic(&DynamicContext::new(), app, "plugin.metrics")
        .is_some());
}

#[test]
fn test_concurrent_lookups_agree() {
    let registry = ModuleRegistry::new();
    registry.declare_module(exporter("m1", "1.0", "plugin.metrics")).unwrap();
    let best = registry.declare_module(exporter("m2", "2.0", "plugin.metrics")).unwrap();
    registry.declare_module(exporter("t1", "1.0", "plugin.trace")).unwrap();
    let app = registry.declare_module(dynamic_app("plugin.*")).unwrap();
    registry.resolve_all();

    let providers: Vec<ModuleId> = (0..64)
        .into_par_iter()
        .map(|i| {
            let context = DynamicContext::new();
            let package = if i % 2 == 0 { "plugin.metrics" } else { "plugin.trace" };
            registry.resolve_dynamic(&context, app, package).unwrap();
            registry
                .resolve_dynamic(&context, app, "plugin.metrics")
                .unwrap()
                .provider()
        })
        .collect();

    assert!(providers.iter().all(|p| *p == best));
    assert_eq!(registry.get_wiring(app).unwrap().dynamic_wires().len(), 2);
}

#[test]
fn test_concurrent_on_demand_never_deadlocks() {
    let registry = ModuleRegistry::new();
    let app = registry.declare_module(dynamic_app("plugin.*")).unwrap();
    registry.resolve(&[app]);
    let metrics = registry.declare_module(exporter("metrics", "1.0", "plugin.metrics")).unwrap();

    let found: Vec<Option<ModuleId>> = (0..32)
        .into_par_iter()
        .map(|_| {
            registry
                .resolve_dynamic(&DynamicContext::new(), app, "plugin.metrics")
                .map(|w| w.provider())
        })
        .collect();

    // Callers that lost the race for the resolution lock may miss, but
    // every hit agrees and a later lookup succeeds.
    assert!(found.iter().flatten().all(|p| *p == metrics));
    assert_eq!(
        registry
            .resolve_dynamic(&DynamicContext::new(), app, "plugin.metrics")
            .map(|w| w.provider()),
        Some(metrics)
    );
}
