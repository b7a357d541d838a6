/*!
 * Signal Proxy Tests
 * Parent-to-child forwarding through the listener registration table
 */

use foreground::signals::delivery;
use foreground::{ChildHandle, Signal, SignalProxy, SpawnConfig};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::time::Duration;
use tokio::time::timeout;

fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[tokio::test]
#[serial]
async fn test_signal_delivered_to_parent_reaches_child() {
    init_test_logging();

    let config = SpawnConfig::new("sleep").with_args(vec!["30".into()]);
    let mut child = ChildHandle::spawn(&config).expect("spawn sleep");

    let proxy = SignalProxy::start(child.pid());
    assert!(proxy.is_registered(Signal::SIGUSR1));

    // A signal delivered to the parent (this process)...
    delivery::send(std::process::id(), Signal::SIGUSR1).expect("raise SIGUSR1");

    // ...reaches the child while proxying is live. SIGUSR1's default action
    // terminates the child, which is how we observe the delivery.
    let disposition = timeout(Duration::from_secs(10), child.wait())
        .await
        .expect("child terminated in time")
        .expect("wait");
    assert_eq!(disposition.signal, Some(Signal::SIGUSR1));
    assert_eq!(disposition.code, None);

    proxy.stop();
    assert_eq!(proxy.registered(), 0);
}

#[tokio::test]
#[serial]
async fn test_early_stop_leaves_child_untouched() {
    init_test_logging();

    let config = SpawnConfig::new("sleep").with_args(vec!["30".into()]);
    let mut child = ChildHandle::spawn(&config).expect("spawn sleep");

    let proxy = SignalProxy::start(child.pid());
    proxy.stop();
    assert_eq!(proxy.registered(), 0);

    // With the table cleared this no longer reaches the child (and no longer
    // kills the parent either: the runtime holds the handler slot).
    delivery::send(std::process::id(), Signal::SIGUSR2).expect("raise SIGUSR2");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(delivery::alive(child.pid()));

    child.signal(Signal::SIGTERM).expect("send SIGTERM");
    let disposition = child.wait().await.expect("wait");
    assert_eq!(disposition.signal, Some(Signal::SIGTERM));
}

#[tokio::test]
#[serial]
async fn test_registration_table_covers_catchable_catalog() {
    init_test_logging();

    let proxy = SignalProxy::start(std::process::id());

    for &sig in Signal::catalog() {
        if !sig.can_catch() {
            assert!(!proxy.is_registered(sig), "{} must not be registered", sig);
        }
    }
    // Everything the platform accepted is in the table; at minimum the
    // common termination signals.
    for sig in [Signal::SIGHUP, Signal::SIGINT, Signal::SIGTERM, Signal::SIGQUIT] {
        assert!(proxy.is_registered(sig), "{} should be registered", sig);
    }

    proxy.stop();
}
