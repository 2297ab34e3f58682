use rpcbus_core::{Request, METHOD_LIST, SERVER_OBJECT};
use rpcbus_value::Value;

use crate::cmd::{connect_client, CliOptions, ListArgs};
use crate::exit::{bus_error, CliResult, SUCCESS};
use crate::output::{parse_listing, print_listing};

pub fn run(args: ListArgs, options: &CliOptions) -> CliResult<i32> {
    let (mut ctx, _) = connect_client(&args.address, options)?;

    let request = Request::new(args.peer.as_str(), SERVER_OBJECT, METHOD_LIST, Value::Null);
    let listing = ctx
        .call_blocking(request, options.timeout)
        .map_err(|err| bus_error("list failed", err))?;

    print_listing(&parse_listing(&listing), options.format);
    Ok(SUCCESS)
}
