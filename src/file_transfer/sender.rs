use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;

use crate::file_transfer::control::ControlRecord;
use crate::file_transfer::errors::TransferError;
use crate::log::log_sink::LogSink;
use crate::mesh::transport::DataChannel;
use crate::sink_debug;

/// One file queued toward one peer.
#[derive(Debug)]
pub struct OutgoingFile {
    name: String,
    data: Bytes,
    offset: usize,
    announced: bool,
}

impl OutgoingFile {
    pub fn new(name: String, data: Bytes) -> Self {
        Self {
            name,
            data,
            offset: 0,
            announced: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// Queue empty; `completed` files finished during this pump.
    Drained { completed: usize },
    /// Channel buffer is above the high-water mark (or not open yet);
    /// resume on the next low-water / open event.
    Blocked { completed: usize },
}

/// Per-peer FIFO of outgoing files. Files go out one after the other:
/// `file-start` record, then `chunk_size` binary slices.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    files: VecDeque<OutgoingFile>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, file: OutgoingFile) {
        self.files.push_back(file);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    /// Sends as much as the channel accepts without passing `high_water`
    /// buffered bytes.
    pub fn pump(
        &mut self,
        channel: &mut dyn DataChannel,
        chunk_size: usize,
        high_water: usize,
        log: &Arc<dyn LogSink>,
    ) -> Result<PumpOutcome, TransferError> {
        let chunk_size = chunk_size.max(1);
        let mut completed = 0;

        while let Some(file) = self.files.front_mut() {
            if !channel.is_open() || channel.buffered_amount() >= high_water {
                return Ok(PumpOutcome::Blocked { completed });
            }

            if !file.announced {
                let record = ControlRecord::FileStart {
                    name: file.name.clone(),
                    size: file.data.len() as u64,
                };
                channel.send_text(&record.to_text()?)?;
                file.announced = true;
                sink_debug!(
                    log,
                    "file-start {:?} ({} bytes) on {}",
                    file.name,
                    file.data.len(),
                    channel.label()
                );
            }

            while file.offset < file.data.len() {
                if channel.buffered_amount() >= high_water {
                    return Ok(PumpOutcome::Blocked { completed });
                }
                let end = (file.offset + chunk_size).min(file.data.len());
                channel.send_binary(file.data.slice(file.offset..end))?;
                #[cfg(feature = "transfer-debug")]
                crate::sink_trace!(
                    log,
                    "chunk {}..{} of {:?}",
                    file.offset,
                    end,
                    file.name
                );
                file.offset = end;
            }

            self.files.pop_front();
            completed += 1;
        }

        Ok(PumpOutcome::Drained { completed })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;
    use crate::mesh::mock::MockDataChannel;
    use crate::mesh::transport::DataMessage;

    fn log() -> Arc<dyn LogSink> {
        Arc::new(NoopLogSink)
    }

    #[test]
    fn announces_then_slices_into_chunks() {
        let mut ch = MockDataChannel::open("file-transfer");
        let probe = ch.probe();
        let mut q = OutboundQueue::new();
        q.push(OutgoingFile::new("f".into(), Bytes::from(vec![7u8; 40])));

        let out = q.pump(&mut ch, 16, usize::MAX, &log()).unwrap();
        assert_eq!(out, PumpOutcome::Drained { completed: 1 });

        let sent = probe.sent();
        assert_eq!(sent.len(), 4);
        assert!(matches!(&sent[0], DataMessage::Text(t) if t.contains("file-start")));
        let sizes: Vec<usize> = sent[1..]
            .iter()
            .map(|m| match m {
                DataMessage::Binary(b) => b.len(),
                DataMessage::Text(_) => 0,
            })
            .collect();
        assert_eq!(sizes, vec![16, 16, 8]);
    }

    #[test]
    fn stops_at_high_water_and_resumes() {
        let mut ch = MockDataChannel::open("file-transfer");
        let probe = ch.probe();
        let mut q = OutboundQueue::new();
        q.push(OutgoingFile::new("f".into(), Bytes::from(vec![1u8; 64])));

        // every send stays buffered until drained
        let out = q.pump(&mut ch, 16, 32, &log()).unwrap();
        assert_eq!(out, PumpOutcome::Blocked { completed: 0 });
        assert_eq!(probe.binary_bytes(), 32);

        probe.drain_buffer();
        let out = q.pump(&mut ch, 16, 32, &log()).unwrap();
        assert_eq!(out, PumpOutcome::Drained { completed: 1 });
        assert_eq!(probe.binary_bytes(), 64);
        assert!(q.is_empty());
    }

    #[test]
    fn closed_channel_holds_the_queue() {
        let mut ch = MockDataChannel::connecting("file-transfer");
        let mut q = OutboundQueue::new();
        q.push(OutgoingFile::new("f".into(), Bytes::from_static(b"abc")));
        let out = q.pump(&mut ch, 16, usize::MAX, &log()).unwrap();
        assert_eq!(out, PumpOutcome::Blocked { completed: 0 });
        assert_eq!(q.len(), 1);
    }
}
