#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rpcbus_core::{BusContext, BusServer, Method, Object, Status};
use rpcbus_socket::SocketKind;
use rpcbus_value::Value;

pub const WAIT: Duration = Duration::from_secs(3);

pub fn unique_sock_path(tag: &str) -> String {
    let dir = PathBuf::from(format!(
        "/tmp/rpcbus-it-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir.join("bus.sock").to_string_lossy().into_owned()
}

/// A context running its event loop on its own thread until dropped.
pub struct Running {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for Running {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Build a context on a new thread, run `setup` on it, then keep ticking.
/// Returns once `setup` has finished.
pub fn spawn_context<F>(name: &str, kind: SocketKind, setup: F) -> Running
where
    F: FnOnce(&mut BusContext) + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let (ready_tx, ready_rx) = mpsc::channel();
    let name = name.to_string();
    let flag = Arc::clone(&stop);
    let handle = thread::spawn(move || {
        let mut ctx = BusContext::open(name, kind);
        setup(&mut ctx);
        let _ = ready_tx.send(());
        while !flag.load(Ordering::SeqCst) {
            ctx.handle_events_timeout(Duration::from_millis(10))
                .expect("event loop should keep running");
        }
    });
    ready_rx
        .recv_timeout(WAIT)
        .expect("context setup should finish");
    Running {
        stop,
        handle: Some(handle),
    }
}

/// `/path/to/object` with one method that doubles its `name_int` argument.
pub fn sample_object() -> Object {
    Object::new("/path/to/object")
        .with_method(
            Method::new("my.object.test", |ctx, inv| {
                let Some(n) = inv.argument.get("name_int").and_then(Value::as_int) else {
                    return Status::InvalidArgument;
                };
                let mut reply = Value::table();
                reply
                    .insert("some_return", n * 2)
                    .expect("table insert should succeed");
                ctx.resolve(inv.responder, reply);
                Status::Ok
            })
            .param("name_int", "i")
            .returns("some_return", "i"),
        )
        .expect("method should be unique")
}

/// `/echo` answering `echo` with its argument and never answering `hang`.
pub fn echo_object() -> Object {
    Object::new("/echo")
        .with_method(Method::new("echo", |ctx, inv| {
            ctx.resolve(inv.responder, inv.argument.clone());
            Status::Ok
        }))
        .expect("method should be unique")
        .with_method(Method::new("hang", |_, _| Status::Ok))
        .expect("method should be unique")
}

/// A bus server named `ubus` with the system object and the sample objects.
pub fn spawn_server(path: &str, kind: SocketKind) -> Running {
    let path = path.to_string();
    spawn_context("ubus", kind, move |ctx| {
        ctx.listen(&path).expect("server should listen");
        BusServer::install(ctx).expect("system object should register");
        ctx.add_object(sample_object()).expect("sample object should register");
        ctx.add_object(echo_object()).expect("echo object should register");
    })
}

pub fn int_arg(n: i64) -> Value {
    let mut arg = Value::table();
    arg.insert("name_int", n).expect("table insert should succeed");
    arg
}
