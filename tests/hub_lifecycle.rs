mod common;

use std::sync::{Arc, Mutex};

use bromic_link_lib::device::connection_observer;
use bromic_link_lib::{ConnectionState, DeviceHub, SerialError};
use common::{fast_settings, FakeOpener, Recorder};

fn recording_observer() -> (bromic_link_lib::device::ConnectionObserver, Arc<Mutex<Vec<bool>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let observer = connection_observer(move |connected| {
        sink.lock().unwrap().push(connected);
        Ok(())
    });
    (observer, seen)
}

#[tokio::test]
async fn test_connect_notifies_once() {
    let opener = FakeOpener::new(Recorder::default());
    let hub = DeviceHub::with_opener("/dev/ttyUSB0", fast_settings(), opener.clone());
    let (observer, seen) = recording_observer();
    hub.add_connection_observer(observer).await;

    hub.connect().await.expect("connect");
    hub.connect().await.expect("second connect is a no-op");

    assert_eq!(hub.connection_state().await, ConnectionState::Connected);
    assert_eq!(*seen.lock().unwrap(), vec![true]);
    assert_eq!(*opener.opens.lock().unwrap(), 1);
    assert!(hub.statistics().await.last_success.is_some());
}

#[tokio::test]
async fn test_connect_failure_is_surfaced() {
    let hub = DeviceHub::with_opener("/dev/ttyACM9", fast_settings(), FakeOpener::failing());
    let (observer, seen) = recording_observer();
    hub.add_connection_observer(observer).await;

    let err = hub.connect().await.unwrap_err();
    match &err {
        SerialError::ConnectionFailed { port, .. } => assert_eq!(port, "/dev/ttyACM9"),
        other => panic!("expected connection failure, got {:?}", other),
    }
    assert!(err.is_connection_error());
    assert!(!hub.is_connected().await);
    assert_eq!(*seen.lock().unwrap(), vec![false]);

    let stats = hub.statistics().await;
    assert_eq!(stats.connection_errors, 1);
    assert!(stats.last_error.unwrap().contains("/dev/ttyACM9"));
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let hub = DeviceHub::with_opener("/dev/ttyUSB0", fast_settings(), FakeOpener::new(Recorder::default()));
    let (observer, seen) = recording_observer();
    hub.add_connection_observer(observer).await;

    hub.disconnect().await;
    assert!(seen.lock().unwrap().is_empty(), "no transition, no notification");

    hub.connect().await.unwrap();
    hub.disconnect().await;
    hub.disconnect().await;

    assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    assert!(matches!(hub.send(1, 1).await, Err(SerialError::NotConnected)));
}

#[tokio::test]
async fn test_reconnect_opens_again() {
    let opener = FakeOpener::new(Recorder::default());
    let hub = DeviceHub::with_opener("/dev/ttyUSB0", fast_settings(), opener.clone());
    let (observer, seen) = recording_observer();
    hub.add_connection_observer(observer).await;

    hub.connect().await.unwrap();
    hub.reconnect().await.unwrap();

    assert!(hub.is_connected().await);
    assert_eq!(*opener.opens.lock().unwrap(), 2);
    assert_eq!(*seen.lock().unwrap(), vec![true, false, true]);
}

#[tokio::test]
async fn test_failing_observer_does_not_block_others() {
    let hub = DeviceHub::with_opener("/dev/ttyUSB0", fast_settings(), FakeOpener::new(Recorder::default()));

    hub.add_connection_observer(connection_observer(|_| anyhow::bail!("entity gone")))
        .await;
    hub.add_connection_observer(connection_observer(|_| panic!("observer bug")))
        .await;
    let (observer, seen) = recording_observer();
    hub.add_connection_observer(observer).await;

    hub.connect().await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![true]);
}

#[tokio::test]
async fn test_removed_observer_is_not_called() {
    let hub = DeviceHub::with_opener("/dev/ttyUSB0", fast_settings(), FakeOpener::new(Recorder::default()));
    let (observer, seen) = recording_observer();
    let (other, other_seen) = recording_observer();
    hub.add_connection_observer(observer.clone()).await;
    hub.add_connection_observer(other).await;

    assert!(hub.remove_connection_observer(&observer).await);
    assert!(!hub.remove_connection_observer(&observer).await);

    hub.connect().await.unwrap();
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(*other_seen.lock().unwrap(), vec![true]);
}
