//! Architectural Contract Test: Driver and Handle
//!
//! This test verifies the tokio backend against real loopback sockets.
//!
//! Constraints verified:
//! - Connected streams reach the socket channel
//! - A stream the channel has no room for is closed and retried
//! - Refused connects are retried with growing failure counts
//! - Pause, resume and disconnect work through the handle
//! - The driver stops on shutdown and when every handle is dropped
//!
//! If this test fails, someone has added:
//! - Blocking calls on the driver task
//! - Commands that bypass the queue
//! - Detached tasks that outlive the driver

use std::time::Duration;
use tether_core::{
    BackoffConfig, ConnectionState, ConstantBackoff, Endpoint, Error, resolve_targets,
};
use tether_tokio::{Driver, EstablishedConnection, ManagerHandle, socket_channel};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_test::{assert_err, assert_ok};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

fn start() -> (
    ManagerHandle,
    mpsc::Receiver<EstablishedConnection>,
    JoinHandle<()>,
) {
    let (factory, sockets) = socket_channel(8);
    let (driver, handle) = Driver::new(Box::new(factory), CONNECT_TIMEOUT);
    let task = tokio::spawn(driver.run());
    (handle, sockets, task)
}

fn fast_retry() -> Box<ConstantBackoff> {
    Box::new(ConstantBackoff::new(Duration::from_millis(20)))
}

async fn next_connection(
    sockets: &mut mpsc::Receiver<EstablishedConnection>,
) -> EstablishedConnection {
    tokio::time::timeout(Duration::from_secs(5), sockets.recv())
        .await
        .expect("connection within timeout")
        .expect("socket channel open")
}

/// An endpoint nothing is listening on
async fn refused_endpoint() -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    Endpoint::from(listener.local_addr().unwrap())
}

#[tokio::test]
async fn connected_stream_is_delivered() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = Endpoint::from(listener.local_addr().unwrap());
    let (handle, mut sockets, _task) = start();

    assert!(assert_ok!(handle.add_endpoint(endpoint, fast_retry(), false).await));

    let connection = next_connection(&mut sockets).await;
    assert_eq!(connection.endpoint, endpoint);
    assert_eq!(
        connection.stream.peer_addr().unwrap(),
        endpoint.socket_addr()
    );

    let state = handle.endpoint_state(endpoint).await.unwrap().unwrap();
    assert_eq!(state.state, ConnectionState::Connected);
    assert_eq!(state.failed_attempts, 0);
}

#[tokio::test]
async fn full_socket_channel_retries_undelivered_endpoint() {
    let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let second = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoints = [
        Endpoint::from(first.local_addr().unwrap()),
        Endpoint::from(second.local_addr().unwrap()),
    ];

    let (factory, mut sockets) = socket_channel(1);
    let (driver, handle) = Driver::new(Box::new(factory), CONNECT_TIMEOUT);
    let _task = tokio::spawn(driver.run());
    for endpoint in endpoints {
        assert_ok!(handle.add_endpoint(endpoint, fast_retry(), false).await);
    }

    // Room for one stream only; the other endpoint must not sit at Connected
    let mut waiting = None;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        for endpoint in endpoints {
            let state = handle.endpoint_state(endpoint).await.unwrap().unwrap();
            if state.failed_attempts > 0 {
                assert_eq!(state.state, ConnectionState::Disconnected);
                waiting = Some(endpoint);
            }
        }
        if waiting.is_some() {
            break;
        }
    }
    let waiting = waiting.expect("undelivered endpoint counted a failure");

    let delivered = next_connection(&mut sockets).await;
    assert_ne!(delivered.endpoint, waiting);

    // Once there is room, the retry gets through
    let retried = next_connection(&mut sockets).await;
    assert_eq!(retried.endpoint, waiting);
    let state = handle.endpoint_state(waiting).await.unwrap().unwrap();
    assert_eq!(state.state, ConnectionState::Connected);
    assert_eq!(state.failed_attempts, 0);
}

#[tokio::test]
async fn refused_endpoint_keeps_retrying() {
    let endpoint = refused_endpoint().await;
    let (handle, _sockets, _task) = start();

    handle
        .add_endpoint(endpoint, fast_retry(), false)
        .await
        .unwrap();

    let mut failed = 0;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        failed = handle
            .endpoint_state(endpoint)
            .await
            .unwrap()
            .unwrap()
            .failed_attempts;
        if failed >= 3 {
            break;
        }
    }
    assert!(failed >= 3, "only {} failures recorded", failed);

    let state = handle.endpoint_state(endpoint).await.unwrap().unwrap();
    assert_eq!(state.state, ConnectionState::Disconnected);
}

#[tokio::test]
async fn disconnect_reconnects_and_pause_stops() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = Endpoint::from(listener.local_addr().unwrap());
    let (handle, mut sockets, _task) = start();

    handle
        .add_endpoint(endpoint, fast_retry(), false)
        .await
        .unwrap();
    drop(next_connection(&mut sockets).await);

    // Lost connection: reconnect straight away
    assert_ok!(handle.disconnect(endpoint, false).await);
    let again = next_connection(&mut sockets).await;
    assert_eq!(again.endpoint, endpoint);
    drop(again);

    assert_ok!(handle.disconnect(endpoint, true).await);
    let state = handle.endpoint_state(endpoint).await.unwrap().unwrap();
    assert_eq!(state.state, ConnectionState::Paused);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(sockets.try_recv().is_err(), "no connects while paused");

    assert_ok!(handle.resume(endpoint).await);
    assert_eq!(next_connection(&mut sockets).await.endpoint, endpoint);
}

#[tokio::test]
async fn operation_errors_cross_the_queue() {
    let endpoint = refused_endpoint().await;
    let (handle, _sockets, _task) = start();

    assert!(matches!(
        handle.disconnect(endpoint, false).await,
        Err(Error::UnknownEndpoint(_))
    ));
    assert!(!handle.remove_endpoint(endpoint).await.unwrap());
    assert_eq!(handle.endpoint_state(endpoint).await.unwrap(), None);

    handle
        .add_endpoint(endpoint, fast_retry(), false)
        .await
        .unwrap();
    assert!(matches!(
        handle.resume(endpoint).await,
        Err(Error::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn add_targets_registers_tcp_endpoints_once() {
    let (handle, _sockets, _task) = start();
    let targets = resolve_targets([
        "127.0.0.1:1",
        "tcp://127.0.0.1:1",
        "127.0.0.1:2",
        "/dev/ttyUSB0",
    ])
    .unwrap();
    let backoff = BackoffConfig::Constant { interval_ms: 1_000 };

    assert_eq!(handle.add_targets(&targets, &backoff).await.unwrap(), 2);
    assert_eq!(handle.add_targets(&targets, &backoff).await.unwrap(), 0);
    assert_eq!(handle.endpoint_count().await.unwrap(), 2);

    let mut endpoints = handle.endpoints().await.unwrap();
    endpoints.sort_by_key(|endpoint| endpoint.port());
    assert_eq!(endpoints, targets.endpoints);

    assert!(handle.remove_endpoint(targets.endpoints[0]).await.unwrap());
    assert_eq!(handle.endpoint_count().await.unwrap(), 1);
}

#[tokio::test]
async fn shutdown_stops_driver() {
    let endpoint = refused_endpoint().await;
    let (handle, _sockets, task) = start();
    handle
        .add_endpoint(endpoint, fast_retry(), false)
        .await
        .unwrap();

    assert_ok!(handle.shutdown().await);

    assert_ok!(tokio::time::timeout(Duration::from_secs(5), task).await)
        .expect("driver task did not panic");
    assert!(handle.is_closed());
    assert!(matches!(
        handle.endpoint_count().await,
        Err(Error::Stopped)
    ));
    assert_err!(handle.add_endpoint(endpoint, fast_retry(), false).await);
}

#[tokio::test]
async fn dropping_every_handle_stops_driver() {
    let (handle, _sockets, task) = start();
    let clone = handle.clone();
    drop(handle);
    assert_eq!(clone.endpoint_count().await.unwrap(), 0);
    drop(clone);

    assert_ok!(tokio::time::timeout(Duration::from_secs(5), task).await)
        .expect("driver task did not panic");
}
