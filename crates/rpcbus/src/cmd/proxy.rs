use std::sync::atomic::Ordering;

use rpcbus_core::Proxy;
use rpcbus_socket::open_socket;
use tracing::info;

use crate::cmd::{install_ctrlc_handler, CliOptions, ProxyArgs, TICK};
use crate::exit::{bus_error, CliResult, SUCCESS};

pub fn run(args: ProxyArgs, options: &CliOptions) -> CliResult<i32> {
    let upstream = args.upstream_transport.unwrap_or(options.transport);
    let mut proxy = Proxy::new(
        open_socket(options.transport),
        open_socket(upstream),
        args.connect.as_str(),
    );
    proxy
        .listen(&args.listen)
        .map_err(|err| bus_error("listen failed", err))?;

    let running = install_ctrlc_handler()?;
    info!(
        listen = %args.listen,
        upstream = %args.connect,
        inbound = %options.transport,
        outbound = %upstream,
        "proxy running"
    );

    while running.load(Ordering::SeqCst) {
        proxy
            .handle_events(TICK)
            .map_err(|err| bus_error("relay failed", err))?;
    }

    info!(pairings = proxy.pairings(), "proxy stopping");
    Ok(SUCCESS)
}
