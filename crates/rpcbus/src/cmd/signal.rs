use rpcbus_socket::Target;
use rpcbus_value::Value;

use crate::cmd::{connect_client, parse_json_argument, CliOptions, SignalArgs, TICK};
use crate::exit::{bus_error, CliResult, SUCCESS};

pub fn run(args: SignalArgs, options: &CliOptions) -> CliResult<i32> {
    let arguments = match parse_json_argument(args.arguments.as_deref(), Value::Null)? {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        single => vec![single],
    };
    let (mut ctx, _) = connect_client(&args.address, options)?;

    ctx.send_signal(Target::Broadcast, &args.name, arguments)
        .map_err(|err| bus_error("signal failed", err))?;
    // One more tick flushes anything the socket could not write at once.
    ctx.handle_events_timeout(TICK)
        .map_err(|err| bus_error("signal failed", err))?;

    tracing::debug!(name = %args.name, "signal sent");
    Ok(SUCCESS)
}
