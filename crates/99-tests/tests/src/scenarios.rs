#![cfg(all(test, not(target_arch = "wasm32")))]
//! End-to-end client/service sessions over the simulated transport.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver};
use xpc_connection::{Connection, ConnectionOptions, ReplyError, XpcError, IDENTITY_KEY};
use xpc_transport::{Event, Fault, Message};
use xpc_transport_sim::{Listener, ListenerConfig, SimTransport};

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(100);

fn watch(conn: &Connection, kind: XpcError) -> Receiver<()> {
    let (tx, rx) = unbounded();
    conn.handle(kind, move || {
        let _ = tx.send(());
    });
    rx
}

fn accept(listener: &Listener) -> Connection {
    let peer = listener.accept_timeout(WAIT).expect("client connected");
    let server = Connection::from_handle(peer, ConnectionOptions::default()).unwrap();
    server.route("add", |msg| {
        let (Some(a), Some(b)) = (msg.get_i64("a"), msg.get_i64("b")) else {
            return Err(XpcError::CodingError);
        };
        Ok(Some(Message::new().with("sum", a + b)))
    });
    server.bootstrap().unwrap();
    server
}

#[test]
fn local_service_invalid_fault_reaches_single_handler() {
    let sim = SimTransport::new();
    let _listener = sim.listen("com.example.test", ListenerConfig::local()).unwrap();
    let conn =
        Connection::local_service(&sim, "com.example.test", ConnectionOptions::inactive()).unwrap();
    let invalid = watch(&conn, XpcError::ConnectionInvalid);
    let interrupted = watch(&conn, XpcError::ConnectionInterrupted);

    conn.set_active(true);
    sim.inject(conn.raw_handle().unwrap(), Event::Fault(Fault::CONNECTION_INVALID));

    invalid.recv_timeout(WAIT).unwrap();
    assert!(invalid.recv_timeout(QUIET).is_err());
    assert!(interrupted.try_recv().is_err());
}

#[test]
fn decode_failure_is_reported_through_handlers_not_send() {
    let sim = SimTransport::new();
    let listener = sim.listen("com.example.calc", ListenerConfig::mach()).unwrap();
    let client =
        Connection::mach_service(&sim, "com.example.calc", ConnectionOptions::default()).unwrap();
    let _server = accept(&listener);
    let coding = watch(&client, XpcError::CodingError);

    // `send_with_reply` has no error channel of its own.
    let request = Message::new()
        .with(IDENTITY_KEY, "add")
        .with("a", 2i64)
        .with("b", 3i64);
    let () = client.send_with_reply(request, |reply| reply.get_str("sum").map(|_| ()));

    coding.recv_timeout(WAIT).unwrap();
    assert!(coding.recv_timeout(QUIET).is_err());
}

#[test]
fn routed_request_round_trip() {
    let sim = SimTransport::new();
    let listener = sim.listen("com.example.calc", ListenerConfig::local()).unwrap();
    let client =
        Connection::local_service(&sim, "com.example.calc", ConnectionOptions::default()).unwrap();
    let _server = accept(&listener);

    let (tx, rx) = unbounded();
    let ok = tx.clone();
    client.send_with_reply(
        Message::new()
            .with(IDENTITY_KEY, "add")
            .with("a", 40i64)
            .with("b", 2i64),
        move |reply| {
            ok.send(reply.get_i64("sum")).unwrap();
            Ok(())
        },
    );
    client.send_with_reply(Message::new().with(IDENTITY_KEY, "add"), move |reply| {
        tx.send(reply.get_i64("sum")).unwrap();
        Ok(())
    });

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), Ok(42));
    assert_eq!(
        rx.recv_timeout(WAIT).unwrap(),
        Err(ReplyError::Remote(XpcError::CodingError))
    );
}

#[test]
fn wrappers_of_identical_handle_collapse_in_sets() {
    let sim = SimTransport::new();
    let (a, b) = sim.anonymous_pair().unwrap();
    let first = Connection::from_handle(a.clone(), ConnectionOptions::default()).unwrap();
    let second = Connection::from_handle(a, ConnectionOptions::default()).unwrap();
    let third = Connection::from_handle(b, ConnectionOptions::default()).unwrap();

    let mut set = HashSet::new();
    assert!(set.insert(&first));
    assert!(!set.insert(&second));
    assert!(set.insert(&third));
    assert_eq!(set.len(), 2);
}

#[test]
fn barrier_then_reply_never_overlap() {
    let sim = SimTransport::new();
    let listener = sim.listen("com.example.calc", ListenerConfig::local()).unwrap();
    let client =
        Connection::local_service(&sim, "com.example.calc", ConnectionOptions::default()).unwrap();
    let _server = accept(&listener);

    let running = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let (done_tx, done_rx) = unbounded();
    for round in 0..10i64 {
        let (r, o) = (Arc::clone(&running), Arc::clone(&overlaps));
        client.perform_with_barrier(move || {
            if r.fetch_add(1, Ordering::SeqCst) != 0 {
                o.fetch_add(1, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_millis(2));
            r.fetch_sub(1, Ordering::SeqCst);
        });
        let (r, o, done) = (Arc::clone(&running), Arc::clone(&overlaps), done_tx.clone());
        client.send_with_reply(
            Message::new()
                .with(IDENTITY_KEY, "add")
                .with("a", round)
                .with("b", 0i64),
            move |_| {
                if r.fetch_add(1, Ordering::SeqCst) != 0 {
                    o.fetch_add(1, Ordering::SeqCst);
                }
                r.fetch_sub(1, Ordering::SeqCst);
                let _ = done.send(());
                Ok(())
            },
        );
    }
    for _ in 0..10 {
        done_rx.recv_timeout(WAIT).unwrap();
    }
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

#[test]
fn handlers_registered_while_faults_flow() {
    let sim = SimTransport::new();
    let listener = sim.listen("com.example.busy", ListenerConfig::local()).unwrap();
    let client = Arc::new(
        Connection::local_service(&sim, "com.example.busy", ConnectionOptions::inactive()).unwrap(),
    );
    let first = watch(&client, XpcError::ConnectionInterrupted);
    client.set_active(true);
    let _server = accept(&listener);

    let registrar = {
        let client = Arc::clone(&client);
        thread::spawn(move || {
            for _ in 0..100 {
                client.handle(XpcError::ConnectionInterrupted, || {});
            }
        })
    };
    for _ in 0..50 {
        listener.interrupt_clients();
    }
    registrar.join().unwrap();
    for _ in 0..50 {
        first.recv_timeout(WAIT).unwrap();
    }

    let (tx, rx) = bounded(1);
    client.perform_with_barrier(move || {
        let _ = tx.send(());
    });
    rx.recv_timeout(WAIT).unwrap();
    assert!(first.try_recv().is_err());
}
