use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lanewire_frame::FrameConfig;
use lanewire_link::{LinkError, LinkListener};

use crate::cmd::{install_ctrlc_handler, ListenArgs};
use crate::exit::{link_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat, config: FrameConfig) -> CliResult<i32> {
    let listener = LinkListener::bind(&args.path)
        .map_err(|err| link_error("bind failed", err))?
        .with_config(config);

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;
    let mut peers = 0u64;

    while running.load(Ordering::SeqCst) {
        let link = listener
            .accept()
            .map_err(|err| link_error("accept failed", err))?;
        peers += 1;
        let peer = format!("peer-{peers}");

        while running.load(Ordering::SeqCst) {
            let msg = match link.recv_blocking() {
                Ok(msg) => msg,
                Err(LinkError::Disconnected) => break,
                Err(LinkError::Desynchronized(err)) => {
                    tracing::warn!(%peer, error = %err, "dropping desynchronized peer");
                    break;
                }
                Err(err) => return Err(link_error("receive failed", err)),
            };

            print_message(&msg, &peer, format);
            printed = printed.saturating_add(1);

            if let Some(count) = args.count {
                if printed >= count {
                    return Ok(SUCCESS);
                }
            }
        }
    }

    Ok(SUCCESS)
}
