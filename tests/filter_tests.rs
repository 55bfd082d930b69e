#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Built-in filters installed on a live component

mod common;

use std::sync::Arc;

use brrtmesh::context::Context;
use brrtmesh::dispatcher::Component;
use brrtmesh::filter::{MetricsFilter, RouteMetrics, TracingFilter};
use brrtmesh::handler::Handler;
use brrtmesh::message::Message;
use brrtmesh::session::Session;
use common::{app, init_runtime, Recorder, RecordingSession};

#[test]
fn test_metrics_filters_count_received_and_handled() {
    init_runtime();
    let metrics = Arc::new(RouteMetrics::new());
    let (_handle, app) = app("game");
    let mut component = Component::builder(app)
        .before_filter(TracingFilter)
        .before_filter(MetricsFilter::received(Arc::clone(&metrics)))
        .after_filter(MetricsFilter::handled(Arc::clone(&metrics)))
        .build();

    let mut room = Handler::new("Room");
    room.add_local("join", |_c, _s, _m| {})
        .unwrap()
        .add_local("leave", |_c, _s, _m| -> anyhow::Result<()> {
            anyhow::bail!("not in a room")
        })
        .unwrap();
    component.register_to_group([room]).unwrap();
    component.init().unwrap();
    component.on_after_init().unwrap();

    let session = RecordingSession::shared("sid");
    for (id, route) in [
        (1, "game.Room.join"),
        (2, "game.Room.join"),
        (3, "game.Room.leave"),
    ] {
        let message = Arc::new(Message::new(id, route, Vec::new()));
        assert!(component
            .process_local(Some(Arc::clone(&session)), Some(message))
            .is_enqueued());
    }
    component.on_stop().unwrap();

    let join = metrics.route("game.Room.join").unwrap();
    assert_eq!(join.received, 2);
    assert_eq!(join.handled, 2);

    // After-filters also run when the handler returned an error.
    let leave = metrics.route("game.Room.leave").unwrap();
    assert_eq!(leave.received, 1);
    assert_eq!(leave.handled, 1);

    assert_eq!(metrics.total_received(), 3);
    assert_eq!(metrics.snapshot().len(), 2);
}

#[test]
fn test_filters_added_after_build_apply_to_later_messages() {
    init_runtime();
    let order: Recorder<u64> = Recorder::new();
    let (_handle, app) = app("game");
    let mut component = Component::new(app);

    let record = order.clone();
    let mut room = Handler::new("Room");
    room.add_local("join", move |_c, _s, m| record.push(m.id))
        .unwrap();
    component.register_to_group([room]).unwrap();

    // Queued before the filter exists: keeps the empty snapshot.
    let session = RecordingSession::shared("sid");
    let first = Arc::new(Message::new(1, "game.room.join", Vec::new()));
    assert!(component
        .process_local(Some(Arc::clone(&session)), Some(first))
        .is_enqueued());

    component.add_before_filter(|_: &Context, _: &Arc<dyn Session>, m: &Message| m.id != 2);
    assert_eq!(component.before_filters().len(), 1);

    for id in [2, 3] {
        let message = Arc::new(Message::new(id, "game.room.join", Vec::new()));
        component.process_local(Some(Arc::clone(&session)), Some(message));
    }

    component.init().unwrap();
    component.on_after_init().unwrap();
    component.on_stop().unwrap();

    assert_eq!(order.items(), vec![1, 3]);
}
