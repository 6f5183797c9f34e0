//! End-to-end discovery runs against local listeners

use phalanx::compliance::ComplianceEvaluator;
use phalanx::config::DiscoveryConfig;
use phalanx::credentials::{CredentialCandidate, CredentialResolver};
use phalanx::discovery::DiscoveryCoordinator;
use phalanx::error::{DiscoveryError, SkipReason};
use phalanx::protocols::ManagementProtocol;
use phalanx::utils::AddressSpaceSpec;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

fn ssh_only_config(port: u16, timeout_ms: u64) -> DiscoveryConfig {
    let mut config = DiscoveryConfig::default()
        .with_probe_timeout(timeout_ms)
        .with_protocols(vec![ManagementProtocol::Ssh]);
    config.ssh_port = port;
    config.concurrency = 4;
    config
}

fn fallback_resolver() -> Arc<CredentialResolver> {
    Arc::new(
        CredentialResolver::new(vec![], vec![])
            .with_fallback(CredentialCandidate::new("root", "calvin")),
    )
}

fn coordinator(config: DiscoveryConfig) -> DiscoveryCoordinator {
    DiscoveryCoordinator::new(config, fallback_resolver(), Arc::new(ComplianceEvaluator::builtin()))
        .unwrap()
}

/// Keeps answering connections with an SSH banner
async fn banner_listener(addr: Ipv4Addr) -> u16 {
    let listener = TcpListener::bind((addr, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else { break };
            tokio::spawn(async move {
                let _ = socket.write_all(b"SSH-2.0-dropbear_2019.78\r\n").await;
            });
        }
    });
    port
}

/// Accepts handshakes but never says anything
fn silent_listener(addr: Ipv4Addr, port: u16) -> std::net::TcpListener {
    std::net::TcpListener::bind((addr, port)).unwrap()
}

#[tokio::test]
async fn three_host_scenario_yields_mixed_summary() {
    // 127.0.0.1 answers SSH, 127.0.0.2 refuses, 127.0.0.3 accepts silently
    let port = banner_listener(Ipv4Addr::new(127, 0, 0, 1)).await;
    let _silent = silent_listener(Ipv4Addr::new(127, 0, 0, 3), port);

    let coordinator = coordinator(ssh_only_config(port, 500));
    let spec = AddressSpaceSpec::parse_range("127.0.0.1-3").unwrap();
    let run = coordinator.run(&spec).await.unwrap();

    let summary = run.summary();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.healthy, 1);
    assert_eq!(summary.unreachable, 1);
    assert_eq!(summary.auth_failed, 1);

    assert_eq!(run.results.len(), 1);
    let discovered = &run.results[0];
    assert_eq!(discovered.address, Ipv4Addr::new(127, 0, 0, 1));
    assert_eq!(
        discovered.healthiest_protocol.as_ref().unwrap().protocol,
        ManagementProtocol::Ssh
    );
    // Every probed protocol is enumerated exactly once
    assert_eq!(discovered.protocols.len(), 1);

    let refused = run
        .skipped
        .iter()
        .find(|s| s.address == Ipv4Addr::new(127, 0, 0, 2))
        .unwrap();
    assert_eq!(refused.reason, SkipReason::Unreachable);

    let silent = run
        .skipped
        .iter()
        .find(|s| s.address == Ipv4Addr::new(127, 0, 0, 3))
        .unwrap();
    assert_eq!(silent.reason, SkipReason::AuthFailed);
}

#[tokio::test]
async fn run_without_credentials_is_a_config_error() {
    let config = ssh_only_config(2222, 200);
    let resolver = Arc::new(CredentialResolver::new(vec![], vec![]));
    let coordinator =
        DiscoveryCoordinator::new(config, resolver, Arc::new(ComplianceEvaluator::builtin()))
            .unwrap();

    let spec = AddressSpaceSpec::parse_range("127.0.0.1-3").unwrap();
    let result = coordinator.run(&spec).await;
    assert!(matches!(result, Err(DiscoveryError::NoCredentialSource)));
}

#[tokio::test]
async fn invalid_spec_fails_the_run_not_the_process() {
    let port = banner_listener(Ipv4Addr::new(127, 0, 0, 1)).await;
    let coordinator = coordinator(ssh_only_config(port, 200));

    let spec = AddressSpaceSpec::Range {
        start: Ipv4Addr::new(10, 0, 0, 9),
        end: Ipv4Addr::new(10, 0, 0, 1),
    };
    assert!(matches!(
        coordinator.run(&spec).await,
        Err(DiscoveryError::InvalidAddressSpace(_))
    ));
}

#[tokio::test]
async fn cancellation_returns_partial_results_promptly() {
    // .1-.5 refuse instantly; .6-.20 accept silently and would pin a worker
    // for the full 10s probe timeout each.
    let probe_port = {
        let probe = std::net::TcpListener::bind((Ipv4Addr::new(127, 0, 0, 6), 0)).unwrap();
        probe.local_addr().unwrap().port()
    };
    let mut listeners = Vec::new();
    for host in 6u8..=20 {
        listeners.push(silent_listener(Ipv4Addr::new(127, 0, 0, host), probe_port));
    }

    let coordinator = coordinator(ssh_only_config(probe_port, 10_000));
    let cancel = coordinator.cancellation_token();
    let spec = AddressSpaceSpec::parse_range("127.0.0.1-20").unwrap();

    let started = Instant::now();
    let run_handle = {
        let spec = spec.clone();
        tokio::spawn(async move { coordinator.run(&spec).await })
    };

    tokio::time::sleep(Duration::from_millis(700)).await;
    cancel.cancel();

    let run = tokio::time::timeout(Duration::from_secs(5), run_handle)
        .await
        .expect("cancelled run must not block")
        .unwrap()
        .unwrap();

    assert!(run.cancelled);
    // The refused hosts completed before cancellation; the silent ones were
    // abandoned in flight and never appear.
    let summary = run.summary();
    assert_eq!(summary.total, 5);
    assert_eq!(summary.unreachable, 5);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn progress_reaches_total_on_uncancelled_run() {
    let port = banner_listener(Ipv4Addr::new(127, 0, 0, 1)).await;
    let coordinator = coordinator(ssh_only_config(port, 300));
    let progress = coordinator.progress();

    let spec = AddressSpaceSpec::parse_range("127.0.0.1-4").unwrap();
    let run = coordinator.run(&spec).await.unwrap();

    assert_eq!(run.results.len() + run.skipped.len(), 4);
    let final_progress = progress.borrow().clone();
    assert_eq!(final_progress.total, 4);
    assert_eq!(final_progress.completed, 4);
    assert!((final_progress.percentage() - 100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn failure_events_are_published_per_host() {
    let port = {
        let probe = std::net::TcpListener::bind((Ipv4Addr::new(127, 0, 0, 1), 0)).unwrap();
        probe.local_addr().unwrap().port()
        // dropped: the port refuses connections
    };

    let coordinator = coordinator(ssh_only_config(port, 300));
    let mut events = coordinator.events();

    let spec = AddressSpaceSpec::parse_range("127.0.0.1-2").unwrap();
    let run = coordinator.run(&spec).await.unwrap();
    assert_eq!(run.skipped.len(), 2);

    let event = events.try_recv().unwrap();
    assert_eq!(event.reason, "unreachable");
}
