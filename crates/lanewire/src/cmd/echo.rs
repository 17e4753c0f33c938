use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lanewire_frame::FrameConfig;
use lanewire_link::{LinkError, LinkListener};

use crate::cmd::{install_ctrlc_handler, EchoArgs};
use crate::exit::{link_error, CliError, CliResult, SUCCESS};

enum RecvErrorDisposition {
    Break,
    Fatal(CliError),
}

pub fn run(args: EchoArgs, config: FrameConfig) -> CliResult<i32> {
    let listener = LinkListener::bind(&args.path)
        .map_err(|err| link_error("bind failed", err))?
        .with_config(config);

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    while running.load(Ordering::SeqCst) {
        let link = listener
            .accept()
            .map_err(|err| link_error("accept failed", err))?;

        while running.load(Ordering::SeqCst) {
            let msg = match link.recv_blocking() {
                Ok(msg) => msg,
                Err(err) => match classify_recv_error(err) {
                    RecvErrorDisposition::Break => break,
                    RecvErrorDisposition::Fatal(cli_err) => return Err(cli_err),
                },
            };

            tracing::info!(
                nodes = msg.node_count(),
                size = msg.payload_len(),
                "echoing message"
            );

            match link.send_blocking(msg) {
                Ok(()) => {}
                Err(LinkError::Disconnected) => break,
                Err(err) => return Err(link_error("echo send failed", err)),
            }
        }
    }

    Ok(SUCCESS)
}

/// Peer-local failures end the session; everything else stops the server.
fn classify_recv_error(err: LinkError) -> RecvErrorDisposition {
    match err {
        LinkError::Disconnected => RecvErrorDisposition::Break,
        LinkError::Desynchronized(err) => {
            tracing::warn!(error = %err, "closing desynchronized session");
            RecvErrorDisposition::Break
        }
        LinkError::Io(ref io) if io.kind() == std::io::ErrorKind::ConnectionReset => {
            RecvErrorDisposition::Break
        }
        other => RecvErrorDisposition::Fatal(link_error("receive failed", other)),
    }
}
