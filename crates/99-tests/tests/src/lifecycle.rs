#![cfg(all(test, not(target_arch = "wasm32")))]
//! Which transport primitives each connection operation reaches.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::unbounded;
use parking_lot::Mutex;
use xpc_connection::{Connection, ConnectionOptions, ConnectionProperties, XpcError};
use xpc_transport::{Event, Fault, Message};

use crate::recording::{Calls, RecordingConnection, RecordingTransport};

const WAIT: Duration = Duration::from_secs(2);

fn transport() -> RecordingTransport {
    RecordingTransport::new(Event::Message(Message::new().with("ok", true)))
}

fn deliver(conn: &Connection, event: Event) -> bool {
    conn.raw_handle()
        .and_then(|h| h.downcast_ref::<RecordingConnection>())
        .is_some_and(|raw| raw.deliver(event))
}

#[test]
fn named_constructors_bind_and_activate() {
    let t = transport();
    let local = Connection::local_service(&t, "com.example.a", ConnectionOptions::default()).unwrap();
    let mach = Connection::mach_service(&t, "com.example.b", ConnectionOptions::inactive()).unwrap();
    let privileged =
        Connection::privileged_mach_service(&t, "com.example.c", ConnectionOptions::default())
            .unwrap();

    let calls = t.calls();
    assert_eq!(
        calls.created,
        ["local:com.example.a", "mach:com.example.b", "privileged:com.example.c"]
    );
    assert_eq!(calls.handlers_set, 3);
    assert_eq!(calls.resume, 2);
    assert!(local.is_active());
    assert!(!mach.is_active());
    assert!(privileged.is_active());
    assert_eq!(mach.name(), "com.example.b");
}

#[test]
fn wrapped_handle_is_inert_until_bootstrap() {
    let t = transport();
    let conn = Connection::from_handle(t.peer(), ConnectionOptions::default()).unwrap();
    assert_eq!(t.calls(), Calls::default());
    assert!(!conn.is_active());
    assert_eq!(conn.name(), "");

    conn.bootstrap().unwrap();
    let calls = t.calls();
    assert_eq!((calls.handlers_set, calls.resume), (1, 1));
    assert!(conn.is_active());
}

#[test]
fn bootstrap_resumes_even_when_options_say_inactive() {
    let t = transport();
    let conn = Connection::from_handle(t.peer(), ConnectionOptions::inactive()).unwrap();
    conn.bootstrap().unwrap();
    assert!(conn.is_active());
    assert_eq!(t.calls().resume, 1);
}

#[test]
fn active_setter_resumes_and_suspends() {
    let t = transport();
    let conn = Connection::local_service(&t, "svc", ConnectionOptions::inactive()).unwrap();
    conn.set_active(true);
    conn.set_active(true);
    conn.set_active(false);
    let calls = t.calls();
    assert_eq!((calls.resume, calls.suspend), (2, 1));
    assert!(!conn.is_active());
}

#[test]
fn active_without_handle_touches_nothing() {
    let conn = Connection::unbound(ConnectionOptions::default());
    conn.set_active(true);
    assert!(conn.is_active());
    conn.perform_with_barrier(|| unreachable!());
}

#[test]
fn drop_cancels_exactly_once() {
    let t = transport();
    let conn = Connection::local_service(&t, "svc", ConnectionOptions::default()).unwrap();
    drop(conn);
    assert_eq!(t.calls().cancel, 1);

    let conn = Connection::local_service(&t, "svc", ConnectionOptions::default()).unwrap();
    conn.cancel();
    conn.cancel();
    conn.set_active(false);
    drop(conn);
    let calls = t.calls();
    assert_eq!(calls.cancel, 2);
    assert_eq!(calls.suspend, 0);
}

#[test]
fn properties_are_read_fresh() {
    let t = transport();
    let conn = Connection::from_handle(t.peer(), ConnectionOptions::default()).unwrap();
    let props = conn.properties().unwrap();
    assert_eq!(
        props,
        ConnectionProperties {
            effective_uid: 501,
            effective_gid: 20,
            pid: 4321,
            audit_session_id: 100_003,
        }
    );
    assert_eq!(conn.properties(), Some(props));
}

#[test]
fn n_handlers_run_once_each_in_order() {
    let t = transport();
    let conn = Connection::local_service(&t, "svc", ConnectionOptions::default()).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    for id in 0..4 {
        let log = Arc::clone(&log);
        conn.handle(XpcError::ConnectionInterrupted, move || log.lock().push(id));
    }
    assert!(deliver(&conn, Event::Fault(Fault::CONNECTION_INTERRUPTED)));
    assert_eq!(*log.lock(), vec![0, 1, 2, 3]);
}

#[test]
fn fault_without_handlers_is_noop() {
    let t = transport();
    let conn = Connection::local_service(&t, "svc", ConnectionOptions::default()).unwrap();
    assert!(deliver(&conn, Event::Fault(Fault::TERMINATION_IMMINENT)));
    assert!(deliver(&conn, Event::Fault(Fault::other("unmapped"))));
    assert!(deliver(&conn, Event::Message(Message::new().with("identity", "x"))));
}

#[test]
fn decode_failure_in_reply_triggers_coding_error() {
    let t = transport();
    let conn = Connection::local_service(&t, "svc", ConnectionOptions::default()).unwrap();
    let (tx, rx) = unbounded();
    conn.handle(XpcError::CodingError, move || {
        let _ = tx.send(());
    });
    conn.send_with_reply(Message::new(), |reply| reply.get_str("missing").map(|_| ()));
    rx.recv_timeout(WAIT).unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(t.calls().requests, 1);
}

#[test]
fn barrier_then_reply_run_in_submission_order() {
    let t = transport();
    let conn = Connection::local_service(&t, "svc", ConnectionOptions::default()).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = unbounded();

    let a = Arc::clone(&log);
    conn.perform_with_barrier(move || {
        a.lock().push("A-start");
        std::thread::sleep(Duration::from_millis(30));
        a.lock().push("A-end");
    });
    let b = Arc::clone(&log);
    conn.send_with_reply(Message::new(), move |_| {
        b.lock().push("B-start");
        let _ = tx.send(());
        Ok(())
    });

    rx.recv_timeout(WAIT).unwrap();
    assert_eq!(*log.lock(), vec!["A-start", "A-end", "B-start"]);
    assert_eq!(t.calls().barriers, 1);
}

#[test]
fn unbound_send_reaches_no_transport() {
    let t = transport();
    let conn = Connection::unbound(ConnectionOptions::default());
    conn.send(Message::new());
    assert_eq!(t.calls().sent, 0);
    let bound = Connection::from_handle(t.peer(), ConnectionOptions::default()).unwrap();
    bound.send(Message::new());
    assert_eq!(t.calls().sent, 1);
}
