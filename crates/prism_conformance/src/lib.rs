//! Conformance helpers for the prism kernel.
//!
//! Provides a synthetic services/routes configuration, a route-index pass and
//! the views built on it, and a naive linear-scan lookup to compare kernel
//! answers against.

#![warn(missing_docs)]

use prism_common::{Key, Map, Params, Value};
use prism_config::KernelConfig;
use prism_kernel::{BoxError, FnPass, FnView, Kernel, KernelError, Pass, View};

/// Regions assigned round-robin to synthetic services.
pub const REGIONS: [&str; 4] = ["tokyo", "osaka", "paris", "lima"];

/// Key under which the route-index pass stores its index.
pub const ROUTE_INDEX: &str = "route_index";

/// Builds a configuration with `services` services of `routes` routes each.
///
/// Every service carries the same `defaults` block and tag list so that the
/// intern pass has duplicates to collapse.
pub fn synthetic_config(services: usize, routes: usize) -> Value {
    let defaults = || {
        Value::map([
            ("timeout_ms", Value::Int(3000)),
            ("retries", Value::Int(3)),
            ("tls", Value::Bool(true)),
        ])
    };
    let items = (0..services).map(|i| {
        let name = format!("svc-{i}");
        let route_list = (0..routes).map(|j| {
            Value::map([
                ("path", Value::from(format!("/{name}/r{j}"))),
                ("method", Value::from(if j % 2 == 0 { "GET" } else { "POST" })),
                ("weight", Value::Float(1.0 / (j + 1) as f64)),
            ])
        });
        Value::map([
            ("name", Value::from(name.clone())),
            ("region", Value::from(REGIONS[i % REGIONS.len()])),
            ("replicas", Value::Int((i % 3 + 1) as i64)),
            ("tags", Value::set(["managed", "http"])),
            ("defaults", defaults()),
            ("routes", Value::seq(route_list)),
        ])
    });
    Value::map([("services", Value::seq(items))])
}

/// Finds a route by path by scanning every service in the raw configuration.
pub fn linear_scan_route(raw: &Value, path: &str) -> Option<Value> {
    raw.get("services")?
        .as_seq()?
        .iter()
        .find_map(|service| {
            let route = service
                .get("routes")?
                .as_seq()?
                .iter()
                .find(|r| r.get("path").and_then(Value::as_str) == Some(path))?;
            Some(route_entry(service, route))
        })
}

fn route_entry(service: &Value, route: &Value) -> Value {
    Value::map([
        ("service", service.get("name").cloned().unwrap_or_default()),
        ("method", route.get("method").cloned().unwrap_or_default()),
        ("weight", route.get("weight").cloned().unwrap_or_default()),
    ])
}

/// A pass that adds a path-keyed route index to the model.
pub fn route_index_pass() -> impl Pass {
    FnPass::new("route-index", |model: Value| {
        let mut index = Map::new();
        let services = model
            .get("services")
            .and_then(Value::as_seq)
            .ok_or("configuration has no services list")?;
        for service in services {
            let routes = service.get("routes").and_then(Value::as_seq).unwrap_or(&[]);
            for route in routes {
                let path = route
                    .get("path")
                    .and_then(Value::as_str)
                    .ok_or("route without a path")?;
                index.insert(Key::from(path), route_entry(service, route));
            }
        }
        let mut model = model;
        model
            .map_mut()
            .ok_or("configuration must be a mapping")?
            .insert(Key::from(ROUTE_INDEX), Value::from(index));
        Ok(model)
    })
}

fn require_str<'a>(params: &'a Params, name: &str) -> Result<&'a str, BoxError> {
    params
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing string parameter '{name}'").into())
}

/// View `route`: looks up `params.path` in the route index.
pub fn route_view() -> impl View {
    FnView::new("route", |model: &Value, params: &Params| {
        let path = require_str(params, "path")?;
        model
            .pointer([ROUTE_INDEX, path])
            .cloned()
            .ok_or_else(|| format!("no route for '{path}'").into())
    })
}

/// View `services_in_region`: sorted names of services in `params.region`.
pub fn services_in_region_view() -> impl View {
    FnView::new("services_in_region", |model: &Value, params: &Params| {
        let region = require_str(params, "region")?;
        let names = model
            .get("services")
            .and_then(Value::as_seq)
            .unwrap_or(&[])
            .iter()
            .filter(|s| s.get("region").and_then(Value::as_str) == Some(region))
            .filter_map(|s| s.get("name").cloned());
        Ok(Value::set(names))
    })
}

/// A kernel built from `config` with the route-index pass and both views.
pub fn standard_kernel(config: &KernelConfig) -> Result<Kernel, KernelError> {
    let mut kernel = Kernel::from_config(config)?;
    kernel.register_pass(route_index_pass());
    kernel.register_view(route_view())?;
    kernel.register_view(services_in_region_view())?;
    Ok(kernel)
}

/// Params for the `route` view.
pub fn route_params(path: &str) -> Params {
    Value::params([("path", path)])
}
