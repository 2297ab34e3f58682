use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::Ordering;

use crate::cmd::{connect_client, install_ctrlc_handler, CliOptions, ListenArgs, TICK};
use crate::exit::{bus_error, CliResult, SUCCESS, TRANSPORT_ERROR};
use crate::output::print_signal;

pub fn run(args: ListenArgs, options: &CliOptions) -> CliResult<i32> {
    let (mut ctx, peer) = connect_client(&args.address, options)?;
    let running = install_ctrlc_handler()?;

    let printed = Rc::new(RefCell::new(0usize));
    let counter = Rc::clone(&printed);
    let format = options.format;
    ctx.subscribe(move |_, event| {
        print_signal(event, format);
        *counter.borrow_mut() += 1;
    });

    while running.load(Ordering::SeqCst) {
        ctx.handle_events_timeout(TICK)
            .map_err(|err| bus_error("receive failed", err))?;

        if let Some(count) = args.count {
            if *printed.borrow() >= count {
                return Ok(SUCCESS);
            }
        }
        if ctx.peers().find_by_id(peer).is_none() {
            tracing::info!(address = %args.address, "bus closed the connection");
            return Ok(if args.count.is_some() { TRANSPORT_ERROR } else { SUCCESS });
        }
    }

    Ok(SUCCESS)
}
