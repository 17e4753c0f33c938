//! Minimal echo server: accepts one link and echoes messages back.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --features cli -- send /tmp/lanewire-echo-<pid>/echo.sock \
//!     --json '{"data":"hello","children":[{"hex":"00ff"}]}' --wait

use std::fs;

use lanewire::link::{LinkError, LinkListener};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("lanewire-echo-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let sock_path = sock_dir.join("echo.sock");

    let listener = LinkListener::bind(&sock_path)?;
    eprintln!("Listening on {}", sock_path.display());

    // Accept one link and echo messages until disconnect.
    let link = listener.accept()?;
    eprintln!("Peer connected");

    loop {
        match link.recv_blocking() {
            Ok(msg) => {
                eprintln!(
                    "Received {} nodes, {} payload bytes",
                    msg.node_count(),
                    msg.payload_len()
                );
                link.send_blocking(msg)?;
            }
            Err(LinkError::Disconnected) => {
                eprintln!("Peer disconnected");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    drop(listener);
    let _ = fs::remove_dir_all(&sock_dir);
    Ok(())
}
