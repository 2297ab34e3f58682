//! Lists a server's objects, then calls `my.object.test` on it.
//!
//! Start the `server` example first, then:
//!   cargo run --example client -- /tmp/rpcbus-example.sock

use std::time::Duration;

use rpcbus::bus::{METHOD_LIST, SERVER_OBJECT};
use rpcbus::{BusContext, Request, SocketKind, Value};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/tmp/rpcbus-example.sock".to_string());
    let timeout = Duration::from_secs(3);

    let mut ctx = BusContext::open(format!("client-{}", std::process::id()), SocketKind::Raw);
    ctx.connect(&address)?;

    let listing = ctx.call_blocking(
        Request::new("ubus", SERVER_OBJECT, METHOD_LIST, Value::Null),
        timeout,
    )?;
    for pair in listing.children().chunks_exact(2) {
        let methods: Vec<&str> = pair[1].entries().map(|(name, _)| name).collect();
        println!("{}: {}", pair[0], methods.join(", "));
    }

    let argument: Value = [("name_int", Value::Int(21))].into_iter().collect();
    let reply = ctx.call_blocking(
        Request::new("ubus", "/path/to/object", "my.object.test", argument),
        timeout,
    )?;
    println!("my.object.test -> {reply}");
    Ok(())
}
