use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::view::jittered_delay;
use super::view::View;
use super::view::ViewEvent;
use crate::clients::ApiError;
use crate::clients::ClientSet;
use crate::config::BackoffPolicy;
use crate::dep::Dependency;
use crate::dep::NomadServiceQuery;
use crate::test_utils;
use crate::test_utils::ScriptStep;
use crate::test_utils::ScriptedNomad;
use crate::test_utils::ScriptedVault;

fn fast_policy() -> BackoffPolicy {
    BackoffPolicy {
        base_delay_ms: 10,
        multiplier: 2.0,
        max_delay_ms: 40,
        jitter_fraction: 0.0,
    }
}

fn spawn_view(
    clients: ClientSet,
    policy: BackoffPolicy,
) -> (
    Arc<NomadServiceQuery>,
    mpsc::Receiver<ViewEvent>,
    CancellationToken,
    tokio::task::JoinHandle<()>,
) {
    let dep = Arc::new(NomadServiceQuery::new("web").unwrap());
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let view = View::new(
        1,
        dep.clone() as Arc<dyn Dependency>,
        clients,
        policy,
        Duration::from_secs(1),
        None,
        tx,
        cancel.clone(),
    );
    let handle = tokio::spawn(view.run());
    (dep, rx, cancel, handle)
}

/// An unchanged cursor produces no notification and the loop refetches
/// on its own.
#[tokio::test]
async fn test_unchanged_index_emits_nothing() {
    let nomad = ScriptedNomad::with_service_script(vec![
        ScriptStep::ok(0, vec![test_utils::registration("web", "a", &[])], 5),
        ScriptStep::ok(0, vec![test_utils::registration("web", "a", &[])], 5),
    ]);
    let clients = test_utils::client_set(nomad.clone(), Arc::new(ScriptedVault::default()));
    let (_dep, mut rx, cancel, handle) = spawn_view(clients, fast_policy());

    let event = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("first change must be delivered")
        .unwrap();
    assert_eq!(event.metadata.last_index, 5);

    // The second response carried the same index: no further event.
    assert!(timeout(Duration::from_millis(200), rx.recv()).await.is_err());

    // Both scripted responses were consumed without manual intervention.
    assert!(nomad.service_calls.load(std::sync::atomic::Ordering::SeqCst) >= 2);

    cancel.cancel();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
}

/// A cursor regression resyncs from scratch instead of crashing or
/// ignoring the newer state.
#[tokio::test]
async fn test_index_regression_resyncs() {
    let nomad = ScriptedNomad::with_service_script(vec![
        ScriptStep::ok(0, vec![], 10),
        ScriptStep::ok(0, vec![], 3),
        ScriptStep::ok(0, vec![], 3),
    ]);
    let clients = test_utils::client_set(nomad.clone(), Arc::new(ScriptedVault::default()));
    let (_dep, mut rx, cancel, handle) = spawn_view(clients, fast_policy());

    let first = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.metadata.last_index, 10);

    // Index 3 < 10: no event for the regression itself, but the resynced
    // refetch delivers it.
    let second = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(second.metadata.last_index, 3);

    let seen: Vec<u64> = nomad.seen_opts.lock().iter().map(|o| o.wait_index).collect();
    // Initial fetch, long poll at 10, unconditional resync at 0, then 3.
    assert_eq!(&seen[..3], &[0, 10, 0]);

    cancel.cancel();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
}

/// Failures back off and a later success still delivers.
#[tokio::test]
async fn test_recovers_after_transient_failures() {
    let nomad = ScriptedNomad::with_service_script(vec![
        ScriptStep::err(0, ApiError::Connection("refused".into())),
        ScriptStep::err(0, ApiError::Server { status: 500, message: "boom".into() }),
        ScriptStep::ok(0, vec![], 2),
    ]);
    let clients = test_utils::client_set(nomad, Arc::new(ScriptedVault::default()));
    let (_dep, mut rx, cancel, handle) = spawn_view(clients, fast_policy());

    let event = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.metadata.last_index, 2);

    cancel.cancel();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
}

/// Cancellation interrupts an in-flight blocking fetch well inside the
/// configured wait budget.
#[tokio::test]
async fn test_cancel_interrupts_in_flight_fetch() {
    let nomad = ScriptedNomad::with_service_script(vec![ScriptStep::ok(60_000, vec![], 1)]);
    let clients = test_utils::client_set(nomad, Arc::new(ScriptedVault::default()));
    let (dep, _rx, cancel, handle) = spawn_view(clients, fast_policy());

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    timeout(Duration::from_secs(1), handle)
        .await
        .expect("view must exit promptly on cancel")
        .unwrap();
    // The loop propagated the stop to the dependency itself.
    assert!(dep.fetch(&test_utils::client_set(
        Arc::new(ScriptedNomad::default()),
        Arc::new(ScriptedVault::default())
    ), &Default::default())
    .await
    .unwrap_err()
    .is_stopped());
}

/// Cancellation interrupts the backoff sleep too.
#[tokio::test]
async fn test_cancel_interrupts_backoff_sleep() {
    let nomad = ScriptedNomad::with_service_script(vec![ScriptStep::err(
        0,
        ApiError::Connection("refused".into()),
    )]);
    let clients = test_utils::client_set(nomad, Arc::new(ScriptedVault::default()));
    let policy = BackoffPolicy {
        base_delay_ms: 60_000,
        multiplier: 2.0,
        max_delay_ms: 60_000,
        jitter_fraction: 0.0,
    };
    let (_dep, _rx, cancel, handle) = spawn_view(clients, policy);

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    timeout(Duration::from_secs(1), handle)
        .await
        .expect("view must exit promptly from backoff sleep")
        .unwrap();
}

#[test]
fn test_delay_without_jitter_is_deterministic_and_capped() {
    let policy = fast_policy();
    let mut previous = Duration::ZERO;
    for attempts in 1..10 {
        let delay = jittered_delay(&policy, attempts);
        assert!(delay >= previous, "backoff must be non-decreasing");
        assert!(delay <= Duration::from_millis(policy.max_delay_ms));
        previous = delay;
    }
    assert_eq!(jittered_delay(&policy, 9), Duration::from_millis(40));
}

#[test]
fn test_jitter_stays_within_bounds() {
    let policy = BackoffPolicy {
        base_delay_ms: 1000,
        multiplier: 2.0,
        max_delay_ms: 1000,
        jitter_fraction: 0.5,
    };
    for _ in 0..200 {
        let delay = jittered_delay(&policy, 1);
        assert!(delay >= Duration::from_millis(500));
        assert!(delay <= Duration::from_millis(1500));
    }
}
