use rpcbus_core::{BusError, Request};
use rpcbus_value::Value;

use crate::cmd::{connect_client, parse_json_argument, CallArgs, CliOptions};
use crate::exit::{bus_error, rejection_error, CliResult, SUCCESS};
use crate::output::print_value;

pub fn run(args: CallArgs, options: &CliOptions) -> CliResult<i32> {
    let argument = parse_json_argument(args.argument.as_deref(), Value::table())?;
    let (mut ctx, _) = connect_client(&args.address, options)?;

    let request = Request::new(args.peer, args.object, args.method, argument);
    match ctx.call_blocking(request, options.timeout) {
        Ok(result) => {
            print_value(&result, options.format);
            Ok(SUCCESS)
        }
        Err(BusError::Rejected(rejection)) => {
            print_value(&rejection.payload, options.format);
            Err(rejection_error("call rejected", &rejection))
        }
        Err(err) => Err(bus_error("call failed", err)),
    }
}
