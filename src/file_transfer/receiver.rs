use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};

use crate::signaling::protocol::SessionId;

/// Reassembly state for one announced file from one sender.
#[derive(Debug)]
pub struct IncomingTransfer {
    name: String,
    declared_size: u64,
    received: u64,
    chunks: Vec<Bytes>,
}

impl IncomingTransfer {
    pub fn new(name: String, declared_size: u64) -> Self {
        Self {
            name,
            declared_size,
            received: 0,
            chunks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    /// Appends one chunk. Returns `true` once the declared size is reached.
    pub fn push(&mut self, chunk: Bytes) -> bool {
        self.received += chunk.len() as u64;
        self.chunks.push(chunk);
        self.is_complete()
    }

    pub fn is_complete(&self) -> bool {
        self.received >= self.declared_size
    }

    /// Joins all chunks in arrival order. Excess bytes past the declared
    /// size are kept.
    pub fn finish(self, from: SessionId) -> ReceivedFile {
        let data = match self.chunks.len() {
            0 => Bytes::new(),
            1 => self.chunks.into_iter().next().unwrap_or_default(),
            _ => {
                let mut buf = BytesMut::with_capacity(self.received as usize);
                for c in &self.chunks {
                    buf.extend_from_slice(c);
                }
                buf.freeze()
            }
        };
        ReceivedFile {
            from,
            name: self.name,
            data,
        }
    }
}

/// A completed transfer, ready for the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub from: SessionId,
    pub name: String,
    pub data: Bytes,
}

impl ReceivedFile {
    /// Writes the file under `dir` (created if missing) and returns its path.
    pub fn save_into(&self, dir: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(sanitize_file_name(&self.name));
        fs::write(&path, &self.data)?;
        Ok(path)
    }
}

/// Keeps only the final path component of a peer-supplied name.
pub fn sanitize_file_name(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .find(|s| !s.is_empty())
        .unwrap_or("");
    let cleaned: String = last
        .chars()
        .filter(|c| !c.is_control() && *c != ':')
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "received.bin".to_string(),
        s => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn completes_when_declared_size_reached() {
        let mut t = IncomingTransfer::new("a".into(), 10);
        assert!(!t.push(Bytes::from_static(b"hello")));
        assert!(t.push(Bytes::from_static(b"world")));
        let f = t.finish("peer".into());
        assert_eq!(&f.data[..], b"helloworld");
        assert_eq!(f.from, "peer");
    }

    #[test]
    fn oversized_delivery_keeps_excess() {
        let mut t = IncomingTransfer::new("a".into(), 3);
        assert!(t.push(Bytes::from_static(b"abcdef")));
        assert_eq!(t.finish("p".into()).data.len(), 6);
    }

    #[test]
    fn sanitizes_peer_supplied_names() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\x\\notes.txt"), "notes.txt");
        assert_eq!(sanitize_file_name("dir/"), "dir");
        assert_eq!(sanitize_file_name(".."), "received.bin");
        assert_eq!(sanitize_file_name(""), "received.bin");
    }

    #[test]
    fn save_into_writes_under_dir() {
        let dir = std::env::temp_dir().join(format!("meshrtc-recv-{}", std::process::id()));
        let f = ReceivedFile {
            from: "p".into(),
            name: "../x.txt".into(),
            data: Bytes::from_static(b"hi"),
        };
        let path = f.save_into(&dir).unwrap();
        assert_eq!(path, dir.join("x.txt"));
        assert_eq!(fs::read(&path).unwrap(), b"hi");
        let _ = fs::remove_dir_all(&dir);
    }
}
