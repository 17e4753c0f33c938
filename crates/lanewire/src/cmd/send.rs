use std::fs;

use lanewire_frame::FrameConfig;
use lanewire_link::connect_with_config;
use lanewire_msg::Message;

use crate::cmd::SendArgs;
use crate::exit::{io_error, link_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_message, OutputFormat};
use crate::tree::parse_tree;

pub fn run(args: SendArgs, format: OutputFormat, config: FrameConfig) -> CliResult<i32> {
    let msg = resolve_message(&args)?;
    let link = connect_with_config(&args.path, config)
        .map_err(|err| link_error("connect failed", err))?;

    tracing::debug!(
        nodes = msg.node_count(),
        size = msg.payload_len(),
        "sending message"
    );
    link.send_blocking(msg)
        .map_err(|err| link_error("send failed", err))?;

    if args.wait {
        let reply = link
            .recv_blocking()
            .map_err(|err| link_error("receive failed", err))?;
        print_message(&reply, &args.path.display().to_string(), format);
    }

    Ok(SUCCESS)
}

fn resolve_message(args: &SendArgs) -> CliResult<Message> {
    if let Some(json) = &args.json {
        return parse_tree(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not a valid tree: {err}")));
    }
    if let Some(data) = &args.data {
        return Ok(Message::new(data.clone().into_bytes()));
    }
    if let Some(path) = &args.file {
        let bytes = fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        return Ok(Message::new(bytes));
    }
    Ok(Message::default())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn args() -> SendArgs {
        SendArgs {
            path: PathBuf::from("/tmp/unused.sock"),
            json: None,
            data: None,
            file: None,
            wait: false,
        }
    }

    #[test]
    fn data_becomes_single_leaf() {
        let msg = resolve_message(&SendArgs {
            data: Some("hi".to_string()),
            ..args()
        })
        .unwrap();
        assert_eq!(msg, Message::new("hi"));
    }

    #[test]
    fn json_tree_is_parsed() {
        let msg = resolve_message(&SendArgs {
            json: Some(r#"{"children":[{"data":"a"},{}]}"#.to_string()),
            ..args()
        })
        .unwrap();
        assert_eq!(msg.node_count(), 3);
        assert_eq!(msg.children()[0].data().as_ref(), b"a");
    }

    #[test]
    fn invalid_json_is_usage_error() {
        let err = resolve_message(&SendArgs {
            json: Some("{".to_string()),
            ..args()
        })
        .unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn no_payload_sends_empty_message() {
        assert_eq!(resolve_message(&args()).unwrap(), Message::default());
    }
}
