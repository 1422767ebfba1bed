//! Raw versus precompiled equivalence, determinism, and hit-rate recovery.

use prism_common::{address, HashAlgorithm, Value};
use prism_config::{load_config_from_str, KernelConfig};
use prism_conformance::{linear_scan_route, route_params, standard_kernel, synthetic_config, REGIONS};

#[test]
fn compiling_twice_yields_equal_models() {
    let kernel = standard_kernel(&KernelConfig::default()).unwrap();
    let raw = synthetic_config(20, 5);
    let a = kernel.precompile(&raw).unwrap();
    let b = kernel.precompile(&raw).unwrap();
    assert_eq!(a.model(), b.model());
    assert_eq!(
        address(a.model(), HashAlgorithm::Xxh3_128),
        address(b.model(), HashAlgorithm::Xxh3_128)
    );
    assert_eq!(a, b);
}

#[test]
fn raw_and_precompiled_queries_agree() {
    let raw = synthetic_config(12, 4);
    let mut raw_kernel = standard_kernel(&KernelConfig::default()).unwrap();
    let mut compiled_kernel = standard_kernel(&KernelConfig::default()).unwrap();
    let compiled = compiled_kernel.precompile(&raw).unwrap();

    for i in 0..12 {
        for j in 0..4 {
            let params = route_params(&format!("/svc-{i}/r{j}"));
            let from_raw = raw_kernel.query("route", &params, &raw).unwrap();
            let from_compiled = compiled_kernel.query("route", &params, &compiled).unwrap();
            assert_eq!(from_raw, from_compiled);
        }
    }
    for region in REGIONS {
        let params = Value::params([("region", region)]);
        let from_raw = raw_kernel.query("services_in_region", &params, &raw).unwrap();
        let from_compiled = compiled_kernel
            .query("services_in_region", &params, &compiled)
            .unwrap();
        assert_eq!(from_raw, from_compiled);
    }
}

#[test]
fn same_kernel_equivalence() {
    let raw = synthetic_config(8, 3);
    let mut kernel = standard_kernel(&KernelConfig::default()).unwrap();
    let compiled = kernel.precompile(&raw).unwrap();
    let params = route_params("/svc-3/r2");
    let from_raw = kernel.query("route", &params, &raw).unwrap();
    let from_compiled = kernel.query("route", &params, &compiled).unwrap();
    assert_eq!(from_raw, from_compiled);
}

#[test]
fn kernel_agrees_with_linear_scan() {
    let raw = synthetic_config(30, 6);
    let mut kernel = standard_kernel(&KernelConfig::default()).unwrap();
    let compiled = kernel.precompile(&raw).unwrap();
    for path in ["/svc-0/r0", "/svc-17/r3", "/svc-29/r5"] {
        let expected = linear_scan_route(&raw, path).unwrap();
        let actual = kernel.query("route", &route_params(path), &compiled).unwrap();
        assert_eq!(actual, expected);
    }
}

#[test]
fn precompiled_hit_rate_recovers_after_warm_up() {
    let raw = synthetic_config(50, 4);
    let mut kernel = standard_kernel(&KernelConfig::default()).unwrap();
    let compiled = kernel.precompile(&raw).unwrap();
    let params = route_params("/svc-42/r1");

    for _ in 0..1000 {
        kernel.query("route", &params, &compiled).unwrap();
    }
    for _ in 0..1000 {
        kernel.query("route", &params, &compiled).unwrap();
    }

    let stats = kernel.stats();
    assert_eq!(stats.total_queries, 2000);
    assert!(stats.hit_rate >= 0.8, "hit rate {} below 0.8", stats.hit_rate);
    assert_eq!(stats.cache_misses, 1);
}

#[test]
fn rotating_queries_stay_cached_within_capacity() {
    let raw = synthetic_config(10, 10);
    let config = load_config_from_str("[cache]\nmax_size = 128\n").unwrap();
    let mut kernel = standard_kernel(&config).unwrap();
    let compiled = kernel.precompile(&raw).unwrap();
    let paths: Vec<String> = (0..100)
        .map(|n| format!("/svc-{}/r{}", n / 10, n % 10))
        .collect();
    for _ in 0..10 {
        for path in &paths {
            kernel.query("route", &route_params(path), &compiled).unwrap();
        }
    }
    let stats = kernel.stats();
    assert_eq!(stats.cache_misses, 100);
    assert!(stats.hit_rate >= 0.8);
}

#[test]
fn wide_digest_gives_same_answers() {
    let raw = synthetic_config(6, 2);
    let fast = KernelConfig::default();
    let wide = load_config_from_str("[hashing]\nalgorithm = \"blake3-256\"\n").unwrap();
    let mut a = standard_kernel(&fast).unwrap();
    let mut b = standard_kernel(&wide).unwrap();
    let params = route_params("/svc-5/r1");
    assert_eq!(
        a.query("route", &params, &raw).unwrap(),
        b.query("route", &params, &raw).unwrap()
    );
    assert_eq!(b.pipeline_fingerprint().algorithm(), HashAlgorithm::Blake3_256);
}
