//! Event-stream observations across lifecycle operations.

mod common;

use common::{test_supervisor, ScriptedHost, StartBehavior};
use siteherd::ServerEvent;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::broadcast::Receiver;

fn site_root() -> TempDir {
    tempfile::tempdir().unwrap()
}

/// Drain every event currently buffered in the receiver.
fn drain(rx: &mut Receiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn kinds(events: &[ServerEvent]) -> Vec<&'static str> {
    events
        .iter()
        .map(|e| match e {
            ServerEvent::Starting { .. } => "starting",
            ServerEvent::Started { .. } => "started",
            ServerEvent::Stopping { .. } => "stopping",
            ServerEvent::Stopped { .. } => "stopped",
            ServerEvent::Error { .. } => "error",
            ServerEvent::PortAllocated { .. } => "port-allocated",
            ServerEvent::PortReleased { .. } => "port-released",
            ServerEvent::Log { .. } => "log",
        })
        .collect()
}

#[tokio::test]
async fn successful_start_emits_lifecycle_events_in_order() {
    let supervisor = test_supervisor(Arc::new(ScriptedHost::new()), 46600);
    let mut rx = supervisor.events().subscribe();
    let root = site_root();

    supervisor.start_server("blog", root.path()).await.unwrap();
    let events = drain(&mut rx);
    assert_eq!(kinds(&events), vec!["starting", "port-allocated", "started"]);

    match &events[2] {
        ServerEvent::Started { name, info } => {
            assert_eq!(name, "blog");
            assert_eq!(info.port, Some(46600));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn restart_emits_full_stop_then_start_sequence() {
    let supervisor = test_supervisor(Arc::new(ScriptedHost::new()), 46650);
    let root = site_root();
    supervisor.start_server("blog", root.path()).await.unwrap();

    let mut rx = supervisor.events().subscribe();
    supervisor.restart_server("blog").await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(
        kinds(&events),
        vec![
            "stopping",
            "port-released",
            "stopped",
            "starting",
            "port-allocated",
            "started"
        ]
    );
}

#[tokio::test]
async fn failed_start_emits_error_and_releases_port() {
    let host = Arc::new(ScriptedHost::new());
    host.set_behavior("blog", StartBehavior::AlwaysFail);
    let supervisor = test_supervisor(host, 46700);
    let mut rx = supervisor.events().subscribe();
    let root = site_root();

    supervisor.start_server("blog", root.path()).await.unwrap_err();
    let events = drain(&mut rx);
    assert_eq!(
        kinds(&events),
        vec!["starting", "port-allocated", "port-released", "error"]
    );

    match events.last().unwrap() {
        ServerEvent::Error { name, message } => {
            assert_eq!(name, "blog");
            assert!(message.contains("failed to start"), "{}", message);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn events_name_the_server_they_concern() {
    let supervisor = test_supervisor(Arc::new(ScriptedHost::new()), 46750);
    let mut rx = supervisor.events().subscribe();
    let root = site_root();

    supervisor.start_server("blog", root.path()).await.unwrap();
    supervisor.start_server("docs", root.path()).await.unwrap();
    supervisor.stop_server("blog").await.unwrap();

    let events = drain(&mut rx);
    let blog_events = events.iter().filter(|e| e.server_name() == "blog").count();
    let docs_events = events.iter().filter(|e| e.server_name() == "docs").count();
    assert_eq!(blog_events, 6); // start triple + stop triple
    assert_eq!(docs_events, 3);
}
