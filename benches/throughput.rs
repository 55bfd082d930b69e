use std::hint::black_box;
use std::sync::Arc;

use brrtmesh::dispatcher::Component;
use brrtmesh::group::HandlerGroup;
use brrtmesh::handler::Handler;
use brrtmesh::message::Message;
use brrtmesh::route::Route;
use brrtmesh::session::{AppHandle, Application, RpcStatus, Session};
use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::Value;

struct BenchSession(String);

impl Session for BenchSession {
    fn sid(&self) -> &str {
        &self.0
    }
    fn send_raw(&self, _bytes: &[u8]) {}
    fn rpc(&self, _node_id: &str, _route: &str, _request: &Value) -> Result<Value, RpcStatus> {
        Err(RpcStatus(-1))
    }
    fn response(&self, _mid: u64, _value: Value, _is_error: bool) {}
    fn push(&self, _route: &str, _value: Value) {}
    fn kick(&self, _reason: Value) {}
    fn remote_addr(&self) -> String {
        String::new()
    }
    fn close(&self) {}
}

fn bench_route_decode(c: &mut Criterion) {
    let routes = [
        "game.Room.join",
        "chat.ChatRoom.send",
        "connector.EntryHandler.enter",
        "game.Room.",
    ];
    c.bench_function("route_decode", |b| {
        b.iter(|| {
            for route in routes {
                let res = Route::decode(black_box(route));
                black_box(&res);
            }
        })
    });
}

fn bench_local_dispatch(c: &mut Criterion) {
    may::config().set_workers(2);
    let app: Arc<dyn Application> = Arc::new(AppHandle::new("game-1", "game"));
    let mut component = Component::new(app);

    let mut room = Handler::new("Room");
    room.add_local("move", |_ctx, _session, message| {
        black_box(message.data.len());
    })
    .expect("register move");
    component
        .register(HandlerGroup::new(8).with_handlers([room]))
        .expect("register group");
    component.init().expect("init");
    component.on_after_init().expect("activate");

    let sessions: Vec<Arc<dyn Session>> = (0..64)
        .map(|i| Arc::new(BenchSession(format!("sid-{i}"))) as Arc<dyn Session>)
        .collect();

    c.bench_function("process_local", |b| {
        let mut i = 0usize;
        b.iter(|| {
            let session = &sessions[i % sessions.len()];
            i = i.wrapping_add(1);
            let message = Arc::new(Message::new(i as u64, "game.Room.move", b"{}".to_vec()));
            black_box(component.process_local(Some(Arc::clone(session)), Some(message)));
        })
    });

    let _ = component.on_stop();
}

criterion_group!(benches, bench_route_decode, bench_local_dispatch);
criterion_main!(benches);
