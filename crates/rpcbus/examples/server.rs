//! Bus server exporting one object next to the system object.
//!
//! Run with:
//!   cargo run --example server -- /tmp/rpcbus-example.sock
//!
//! In another terminal:
//!   cargo run --example client -- /tmp/rpcbus-example.sock
//! or
//!   cargo run --features cli -- list /tmp/rpcbus-example.sock

use std::time::Duration;

use rpcbus::{BusContext, BusServer, Method, Object, SocketKind, Status, Value};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/tmp/rpcbus-example.sock".to_string());

    let mut ctx = BusContext::open("ubus", SocketKind::Raw);
    ctx.listen(&address)?;
    BusServer::install(&mut ctx)?;

    let object = Object::new("/path/to/object").with_method(
        Method::new("my.object.test", |ctx, inv| {
            let Some(n) = inv.argument.get("name_int").and_then(Value::as_int) else {
                return Status::InvalidArgument;
            };
            let reply: Value = [("some_return", Value::Int(n * 2))].into_iter().collect();
            ctx.resolve(inv.responder, reply);
            Status::Ok
        })
        .param("name_int", "i")
        .returns("some_return", "i"),
    )?;
    ctx.add_object(object)?;

    eprintln!("Listening on {address} as ubus");
    loop {
        ctx.handle_events_timeout(Duration::from_millis(100))?;
    }
}
