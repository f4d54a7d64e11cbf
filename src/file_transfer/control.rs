use serde::{Deserialize, Serialize};

use crate::file_transfer::errors::TransferError;

/// Text records on the data channel. Anything binary is file payload.
///
/// ```text
/// {"type":"file-start","name":"report.pdf","size":102400}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlRecord {
    FileStart { name: String, size: u64 },
}

impl ControlRecord {
    pub fn to_text(&self) -> Result<String, TransferError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn parse(text: &str) -> Result<Self, TransferError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn file_start_uses_browser_compatible_shape() {
        let rec = ControlRecord::FileStart {
            name: "a.bin".into(),
            size: 100,
        };
        let text = rec.to_text().unwrap();
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["type"], "file-start");
        assert_eq!(v["name"], "a.bin");
        assert_eq!(v["size"], 100);
    }

    #[test]
    fn unknown_or_broken_records_are_errors() {
        assert!(matches!(
            ControlRecord::parse(r#"{"type":"file-end"}"#),
            Err(TransferError::BadControl(_))
        ));
        assert!(matches!(
            ControlRecord::parse("not json"),
            Err(TransferError::BadControl(_))
        ));
        assert_eq!(
            ControlRecord::parse(r#"{"type":"file-start","name":"x","size":3}"#).unwrap(),
            ControlRecord::FileStart {
                name: "x".into(),
                size: 3
            }
        );
    }
}
