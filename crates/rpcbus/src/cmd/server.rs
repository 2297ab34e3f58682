use std::sync::atomic::Ordering;

use rpcbus_core::{BusConfig, BusContext, BusServer};
use rpcbus_socket::open_socket;
use tracing::info;

use crate::cmd::{install_ctrlc_handler, CliOptions, ServerArgs, TICK};
use crate::exit::{bus_error, CliResult, SUCCESS};

pub fn run(args: ServerArgs, options: &CliOptions) -> CliResult<i32> {
    let config = BusConfig {
        request_timeout: options.timeout,
        ..BusConfig::default()
    };
    let mut ctx = BusContext::with_config(args.name, open_socket(options.transport), config);
    ctx.listen(&args.address)
        .map_err(|err| bus_error("listen failed", err))?;
    BusServer::install(&mut ctx).map_err(|err| bus_error("server setup failed", err))?;

    let running = install_ctrlc_handler()?;
    info!(
        address = %args.address,
        name = ctx.name(),
        transport = %options.transport,
        "bus server running"
    );

    while running.load(Ordering::SeqCst) {
        ctx.handle_events_timeout(TICK)
            .map_err(|err| bus_error("event loop failed", err))?;
    }

    info!(peers = ctx.peers().len(), "bus server stopping");
    ctx.close();
    Ok(SUCCESS)
}
