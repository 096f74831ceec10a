//! Fd handoff preparation for the successor process.

use std::net::TcpListener;
use std::os::fd::AsRawFd;

use neon_instance::spawn::prepare_handoff;
use neon_server::InheritedListeners;

fn bind() -> TcpListener {
    TcpListener::bind("127.0.0.1:0").unwrap()
}

#[test]
fn handoff_orders_listeners_by_name() {
    let mut listeners = InheritedListeners::new();
    listeners.insert("zeta".to_string(), vec![bind()]);
    listeners.insert("alpha".to_string(), vec![bind(), bind()]);

    let handoff = prepare_handoff(&listeners).unwrap();

    assert_eq!(handoff.payload.len(), 2);
    assert_eq!(handoff.payload[0].name, "alpha");
    assert_eq!(
        handoff.payload[0].files,
        ["listener:alpha:0", "listener:alpha:1"]
    );
    assert_eq!(handoff.payload[1].name, "zeta");
    assert_eq!(handoff.payload[1].files, ["listener:zeta:0"]);
    assert_eq!(handoff.fds.len(), 3);
}

#[test]
fn duplicated_fds_sit_above_the_child_target_window() {
    let mut listeners = InheritedListeners::new();
    listeners.insert("default".to_string(), vec![bind(), bind()]);

    let handoff = prepare_handoff(&listeners).unwrap();

    // Targets occupy fds 3 and 4 in the child; sources must not collide.
    for fd in &handoff.fds {
        assert!(fd.as_raw_fd() >= 5);
    }
}
