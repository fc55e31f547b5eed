//! Tests for the multicast channel.
//!
//! End-to-end tests join 239.1.1.1 on the loopback adapter and rely on
//! multicast loopback to receive their own datagrams. Each test uses its own
//! port so they can run in parallel.

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cotcast_core::{ObserverResult, named};
use cotcast_net::multicast::{
    ChannelConfig, ChannelState, GroupAddress, ListenerConfig, MulticastChannel, StopOutcome,
    UDP_MAX_PAYLOAD,
};
use cotcast_net::NetworkError;
use parking_lot::Mutex;

const GROUP: &str = "239.1.1.1";
const ADAPTER: &str = "127.0.0.1";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn group(port: u16) -> GroupAddress {
    GroupAddress::parse(GROUP, port, ADAPTER).unwrap()
}

fn config() -> ChannelConfig {
    ChannelConfig::new()
        .stop_timeout(Duration::from_secs(2))
        .multicast_loop(true)
}

/// Poll `cond` every 10ms for up to a second.
fn wait_for(cond: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}

#[test]
fn test_initial_state() {
    let channel = MulticastChannel::new(group(6960));

    assert_eq!(channel.state(), ChannelState::Idle);
    assert!(!channel.is_running());
    assert!(channel.local_addr().is_none());
    assert_eq!(channel.observer_count(), 0);
    assert_eq!(channel.group().port(), 6960);
}

#[test]
fn test_send_before_start_fails() {
    let channel = MulticastChannel::new(group(6961));
    let err = channel.send(b"early").unwrap_err();
    assert!(matches!(err, NetworkError::NotStarted));
}

#[test]
fn test_oversized_payload_rejected() {
    let channel = MulticastChannel::new(group(6962));
    let payload = vec![0u8; UDP_MAX_PAYLOAD + 1];
    let err = channel.send(&payload).unwrap_err();
    assert!(matches!(
        err,
        NetworkError::PayloadTooLarge { len, max } if len == UDP_MAX_PAYLOAD + 1 && max == UDP_MAX_PAYLOAD
    ));
}

#[test]
fn test_stop_idle_channel_closes_it() {
    let channel = MulticastChannel::new(group(6963));

    assert_eq!(channel.stop(), StopOutcome::NotRunning);
    assert_eq!(channel.state(), ChannelState::Closed);
    assert_eq!(channel.stop(), StopOutcome::NotRunning);

    let err = channel.start().unwrap_err();
    assert!(matches!(
        err,
        NetworkError::InvalidState { operation: "start", state: ChannelState::Closed }
    ));
}

#[test]
fn test_receive_own_datagram() {
    init_tracing();
    let channel = MulticastChannel::with_config(group(6969), config());

    let received: Arc<Mutex<Vec<(Vec<u8>, SocketAddr)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    channel.add_observer_fn(move |payload, sender| {
        sink.lock().push((payload.to_vec(), sender));
        Ok(())
    });

    channel.start().unwrap();
    assert_eq!(channel.state(), ChannelState::Running);
    assert!(channel.local_addr().is_some());

    let sent = channel.send(b"<event uid=\"test\"/>").unwrap();
    assert_eq!(sent, 19);

    assert!(wait_for(|| !received.lock().is_empty()));
    let (payload, _sender) = received.lock()[0].clone();
    assert_eq!(payload, b"<event uid=\"test\"/>");

    assert_eq!(channel.stop(), StopOutcome::Stopped);
    assert_eq!(channel.state(), ChannelState::Closed);
}

#[test]
fn test_observers_receive_in_order() {
    init_tracing();
    let channel = MulticastChannel::with_config(group(6970), config());

    let order = Arc::new(Mutex::new(Vec::new()));
    for tag in ["first", "second", "third"] {
        let order = order.clone();
        channel.add_observer(named(tag, move |_: &[u8], _: SocketAddr| -> ObserverResult {
            order.lock().push(tag);
            Ok(())
        }));
    }

    channel.start().unwrap();
    channel.send(b"ping").unwrap();

    assert!(wait_for(|| order.lock().len() >= 3));
    assert_eq!(&order.lock()[..3], &["first", "second", "third"]);
    channel.stop();
}

#[test]
fn test_failing_observer_is_evicted() {
    init_tracing();
    let channel = MulticastChannel::with_config(group(6971), config());

    let failing_calls = Arc::new(AtomicUsize::new(0));
    let healthy_calls = Arc::new(AtomicUsize::new(0));

    let calls = failing_calls.clone();
    let failing = channel.add_observer_fn(move |_, _| {
        calls.fetch_add(1, Ordering::SeqCst);
        Err("malformed event".into())
    });
    let calls = healthy_calls.clone();
    let healthy = channel.add_observer_fn(move |_, _| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    channel.start().unwrap();

    channel.send(b"one").unwrap();
    assert!(wait_for(|| healthy_calls.load(Ordering::SeqCst) >= 1));
    assert!(!channel.contains_observer(failing));
    assert!(channel.contains_observer(healthy));

    channel.send(b"two").unwrap();
    assert!(wait_for(|| healthy_calls.load(Ordering::SeqCst) >= 2));
    assert_eq!(failing_calls.load(Ordering::SeqCst), 1);
    assert_eq!(channel.observer_count(), 1);

    channel.stop();
}

#[test]
fn test_panicking_observer_is_evicted() {
    init_tracing();
    let channel = MulticastChannel::with_config(group(6972), config());

    let healthy_calls = Arc::new(AtomicUsize::new(0));
    let panicking = channel.add_observer_fn(|_, _| panic!("observer bug"));
    let calls = healthy_calls.clone();
    channel.add_observer_fn(move |_, _| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    channel.start().unwrap();
    channel.send(b"boom").unwrap();

    assert!(wait_for(|| healthy_calls.load(Ordering::SeqCst) >= 1));
    assert!(!channel.contains_observer(panicking));
    assert!(channel.is_running());

    assert_eq!(channel.stop(), StopOutcome::Stopped);
}

#[test]
fn test_removed_observer_stops_receiving() {
    init_tracing();
    let channel = MulticastChannel::with_config(group(6973), config());

    let removed_calls = Arc::new(AtomicUsize::new(0));
    let kept_calls = Arc::new(AtomicUsize::new(0));

    let calls = removed_calls.clone();
    let id = channel.add_observer_fn(move |_, _| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let calls = kept_calls.clone();
    channel.add_observer_fn(move |_, _| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    channel.start().unwrap();
    assert!(channel.remove_observer(id));
    assert!(!channel.remove_observer(id));

    channel.send(b"after removal").unwrap();
    assert!(wait_for(|| kept_calls.load(Ordering::SeqCst) >= 1));
    assert_eq!(removed_calls.load(Ordering::SeqCst), 0);

    channel.stop();
}

#[test]
fn test_scoped_observer() {
    init_tracing();
    let channel = MulticastChannel::with_config(group(6974), config());
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    let guard = channel.observe_scoped(move |_: &[u8], _: SocketAddr| -> ObserverResult {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    assert_eq!(channel.observer_count(), 1);

    channel.start().unwrap();
    channel.send(b"scoped").unwrap();
    assert!(wait_for(|| calls.load(Ordering::SeqCst) >= 1));

    drop(guard);
    assert_eq!(channel.observer_count(), 0);
    channel.stop();
}

#[test]
fn test_two_listeners_share_group() {
    init_tracing();
    let first = MulticastChannel::with_config(group(6975), config());
    let second = MulticastChannel::with_config(group(6975), config());

    let first_calls = Arc::new(AtomicUsize::new(0));
    let second_calls = Arc::new(AtomicUsize::new(0));

    let calls = first_calls.clone();
    first.add_observer_fn(move |_, _| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let calls = second_calls.clone();
    second.add_observer_fn(move |_, _| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    first.start().unwrap();
    second.start().unwrap();

    first.send(b"to everyone").unwrap();
    assert!(wait_for(|| first_calls.load(Ordering::SeqCst) >= 1));
    assert!(wait_for(|| second_calls.load(Ordering::SeqCst) >= 1));

    first.stop();
    second.stop();
}

#[test]
fn test_start_twice_fails() {
    init_tracing();
    let channel = MulticastChannel::with_config(group(6976), config());
    channel.start().unwrap();

    let err = channel.start().unwrap_err();
    assert!(matches!(
        err,
        NetworkError::InvalidState { operation: "start", state: ChannelState::Running }
    ));

    channel.stop();
}

#[test]
fn test_stop_is_prompt_and_idempotent() {
    init_tracing();
    let channel = MulticastChannel::with_config(group(6977), config());
    channel.start().unwrap();

    let begin = Instant::now();
    assert_eq!(channel.stop(), StopOutcome::Stopped);
    assert!(begin.elapsed() < Duration::from_secs(2));
    assert_eq!(channel.state(), ChannelState::Closed);
    assert!(channel.local_addr().is_none());

    assert_eq!(channel.stop(), StopOutcome::NotRunning);
    assert_eq!(channel.state(), ChannelState::Closed);
}

#[test]
fn test_send_after_stop_fails() {
    init_tracing();
    let channel = MulticastChannel::with_config(group(6978), config());
    channel.start().unwrap();
    channel.stop();

    let err = channel.send(b"late").unwrap_err();
    assert!(matches!(err, NetworkError::Closed));
}

#[test]
fn test_restart_after_stop_fails() {
    init_tracing();
    let channel = MulticastChannel::with_config(group(6979), config());
    channel.start().unwrap();
    channel.stop();

    let err = channel.start().unwrap_err();
    assert!(matches!(err, NetworkError::InvalidState { .. }));
}

#[test]
fn test_concurrent_stop() {
    init_tracing();
    let channel = Arc::new(MulticastChannel::with_config(group(6980), config()));
    channel.start().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let channel = channel.clone();
            std::thread::spawn(move || channel.stop())
        })
        .collect();
    let outcomes: Vec<StopOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(
        outcomes.iter().filter(|o| **o == StopOutcome::Stopped).count(),
        1
    );
    assert!(outcomes.iter().all(|o| o.is_clean()));
    assert_eq!(channel.state(), ChannelState::Closed);
}

#[test]
fn test_second_stop_waits_for_teardown() {
    init_tracing();
    let config = config().stop_timeout(Duration::from_secs(3));
    let channel = Arc::new(MulticastChannel::with_config(group(6985), config));

    let entered = Arc::new(AtomicBool::new(false));
    let flag = entered.clone();
    channel.add_observer_fn(move |_, _| {
        flag.store(true, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(800));
        Ok(())
    });

    channel.start().unwrap();
    channel.send(b"slow").unwrap();
    assert!(wait_for(|| entered.load(Ordering::SeqCst)));

    let first = {
        let channel = channel.clone();
        std::thread::spawn(move || channel.stop())
    };
    std::thread::sleep(Duration::from_millis(100));

    let second = channel.stop();
    assert_eq!(channel.state(), ChannelState::Closed);
    assert_eq!(second, StopOutcome::NotRunning);
    assert_eq!(first.join().unwrap(), StopOutcome::Stopped);
}

#[test]
fn test_blocked_observer_times_out_stop() {
    init_tracing();
    let config = config().stop_timeout(Duration::from_millis(100));
    let channel = MulticastChannel::with_config(group(6981), config);

    let entered = Arc::new(AtomicBool::new(false));
    let flag = entered.clone();
    channel.add_observer_fn(move |_, _| {
        flag.store(true, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(800));
        Ok(())
    });

    channel.start().unwrap();
    channel.send(b"slow").unwrap();
    assert!(wait_for(|| entered.load(Ordering::SeqCst)));

    let begin = Instant::now();
    let outcome = channel.stop();
    assert_eq!(outcome, StopOutcome::TimedOut);
    assert!(!outcome.is_clean());
    assert!(begin.elapsed() < Duration::from_millis(700));
    assert_eq!(channel.state(), ChannelState::Closed);
}

#[test]
fn test_custom_thread_name() {
    init_tracing();
    let config = config().thread_name("cot-rx-test");
    let channel = MulticastChannel::with_config(group(6982), config);

    let thread_name = Arc::new(Mutex::new(None));
    let slot = thread_name.clone();
    channel.add_observer_fn(move |_, _| {
        *slot.lock() = std::thread::current().name().map(str::to_string);
        Ok(())
    });

    channel.start().unwrap();
    channel.send(b"who").unwrap();
    assert!(wait_for(|| thread_name.lock().is_some()));
    assert_eq!(thread_name.lock().as_deref(), Some("cot-rx-test"));

    channel.stop();
}

#[test]
fn test_open_and_drop_releases_port() {
    init_tracing();
    {
        let channel = MulticastChannel::open(group(6983), config()).unwrap();
        assert!(channel.is_running());
    }

    let channel = MulticastChannel::open(group(6983), config()).unwrap();
    assert!(channel.is_running());
    assert_eq!(channel.stop(), StopOutcome::Stopped);
}

#[test]
fn test_listener_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
group = "{GROUP}"
port = 6984
adapter = "{ADAPTER}"

[channel]
stop_timeout_ms = 300
multicast_ttl = 1
"#
    )
    .unwrap();

    let listener = ListenerConfig::from_file(file.path()).unwrap();
    assert_eq!(listener.group_address().unwrap(), group(6984));
    assert_eq!(listener.channel.stop_timeout, Duration::from_millis(300));
    assert_eq!(listener.channel.multicast_ttl, Some(1));
}

#[test]
fn test_listener_config_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = ListenerConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, NetworkError::Io(_)));
}

#[test]
fn test_state_display() {
    assert_eq!(ChannelState::Idle.to_string(), "Idle");
    assert_eq!(ChannelState::Running.to_string(), "Running");
    assert_eq!(ChannelState::Stopping.to_string(), "Stopping");
    assert_eq!(ChannelState::Closed.to_string(), "Closed");
    assert_eq!(StopOutcome::TimedOut.to_string(), "timed out");
}
