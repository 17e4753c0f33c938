use lanewire_msg::Message;
use serde::{Deserialize, Serialize};

/// JSON form of a message node.
///
/// `data` carries UTF-8 text, `hex` carries arbitrary bytes. At most one of
/// the two may be set; a node with neither has empty data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TreeNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("invalid tree JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("node sets both \"data\" and \"hex\"")]
    DataAndHex,

    #[error("invalid hex data: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Parse a JSON tree such as `{"data":"a","children":[{"hex":"00ff"}]}`.
pub fn parse_tree(json: &str) -> Result<Message, TreeError> {
    let node: TreeNode = serde_json::from_str(json)?;
    to_message(&node)
}

/// Convert a parsed JSON node into a message.
pub fn to_message(node: &TreeNode) -> Result<Message, TreeError> {
    let data = match (&node.data, &node.hex) {
        (Some(_), Some(_)) => return Err(TreeError::DataAndHex),
        (Some(text), None) => text.clone().into_bytes(),
        (None, Some(encoded)) => hex::decode(encoded)?,
        (None, None) => Vec::new(),
    };
    let mut msg = Message::new(data);
    for child in &node.children {
        msg.push(to_message(child)?);
    }
    Ok(msg)
}

/// Convert a message into its JSON form, choosing `data` for valid UTF-8
/// and `hex` otherwise.
pub fn from_message(msg: &Message) -> TreeNode {
    let bytes = msg.data().as_ref();
    let (data, hex) = if bytes.is_empty() {
        (None, None)
    } else {
        match std::str::from_utf8(bytes) {
            Ok(text) => (Some(text.to_string()), None),
            Err(_) => (None, Some(hex::encode(bytes))),
        }
    };
    TreeNode {
        data,
        hex,
        children: msg.children().iter().map(from_message).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_tree() {
        let msg = parse_tree(r#"{"data":"root","children":[{},{"hex":"00ff"}]}"#).unwrap();
        assert_eq!(
            msg,
            Message::with_children(
                "root",
                vec![Message::new(""), Message::new(vec![0x00, 0xff])]
            )
        );
    }

    #[test]
    fn rejects_data_and_hex_together() {
        let err = parse_tree(r#"{"data":"a","hex":"61"}"#).unwrap_err();
        assert!(matches!(err, TreeError::DataAndHex));
    }

    #[test]
    fn rejects_unknown_fields_and_bad_hex() {
        assert!(matches!(
            parse_tree(r#"{"bytes":"a"}"#),
            Err(TreeError::Json(_))
        ));
        assert!(matches!(parse_tree(r#"{"hex":"zz"}"#), Err(TreeError::Hex(_))));
    }

    #[test]
    fn binary_data_serializes_as_hex() {
        let msg = Message::with_children("text", vec![Message::new(vec![0xc3, 0x28])]);
        let json = serde_json::to_string(&from_message(&msg)).unwrap();
        assert_eq!(json, r#"{"data":"text","children":[{"hex":"c328"}]}"#);
        assert_eq!(parse_tree(&json).unwrap(), msg);
    }
}
