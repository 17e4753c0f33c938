use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use lanewire_msg::Message;
use serde::Serialize;

use crate::tree::{from_message, TreeNode};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    nodes: usize,
    payload_size: usize,
    tree: TreeNode,
    peer: &'a str,
    timestamp: String,
}

/// One row per node, in pre-order.
struct NodeRow {
    path: String,
    depth: usize,
    size: usize,
    children: usize,
    preview: String,
}

pub fn print_message(msg: &Message, peer: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                nodes: msg.node_count(),
                payload_size: msg.payload_len(),
                tree: from_message(msg),
                peer,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["NODE", "SIZE", "CHILDREN", "DATA"]);
            for row in node_rows(msg) {
                table.add_row(vec![
                    row.path,
                    row.size.to_string(),
                    row.children.to_string(),
                    row.preview,
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "message nodes={} size={} peer={}",
                msg.node_count(),
                msg.payload_len(),
                peer
            );
            for row in node_rows(msg) {
                println!(
                    "{:indent$}- [{}] {}",
                    "",
                    row.size,
                    row.preview,
                    indent = row.depth * 2
                );
            }
        }
        OutputFormat::Raw => {
            let mut out = std::io::stdout();
            for (node, _) in msg.preorder() {
                let _ = out.write_all(node.data());
            }
            let _ = out.flush();
        }
    }
}

fn node_rows(msg: &Message) -> Vec<NodeRow> {
    let mut rows = Vec::new();
    let mut stack = vec![(msg, String::from("0"), 0usize)];
    while let Some((node, path, depth)) = stack.pop() {
        for (i, child) in node.children().iter().enumerate().rev() {
            stack.push((child, format!("{path}.{i}"), depth + 1));
        }
        rows.push(NodeRow {
            path,
            depth,
            size: node.data().len(),
            children: node.children().len(),
            preview: data_preview(node.data()),
        });
    }
    rows
}

fn data_preview(data: &[u8]) -> String {
    match std::str::from_utf8(data) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", data.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
