use std::sync::Arc;

use bytes::Bytes;

use crate::config::TransferSettings;
use crate::file_transfer::control::ControlRecord;
use crate::file_transfer::errors::TransferError;
use crate::file_transfer::receiver::{IncomingTransfer, ReceivedFile};
use crate::file_transfer::sender::{OutgoingFile, PumpOutcome};
use crate::log::log_sink::LogSink;
use crate::mesh::registry::{PeerEntry, PeerRegistry};
use crate::mesh::transport::DataMessage;
use crate::signaling::protocol::SessionId;
use crate::{sink_debug, sink_info, sink_warn};

/// Queues `data` toward every peer whose channel is open and starts
/// pumping. Returns the number of peers the file was queued for.
pub fn broadcast_file(
    registry: &mut PeerRegistry,
    name: &str,
    data: Bytes,
    settings: &TransferSettings,
    log: &Arc<dyn LogSink>,
) -> usize {
    let mut queued = 0;
    for (id, entry) in registry.iter_mut() {
        if !entry.channel.as_ref().is_some_and(|ch| ch.is_open()) {
            sink_debug!(log, "skipping {}: no open data channel", id);
            continue;
        }
        entry
            .outbound
            .push(OutgoingFile::new(name.to_string(), data.clone()));
        queued += 1;
        pump(id, entry, settings, log);
    }
    sink_info!(
        log,
        "file {:?} ({} bytes) queued for {} peer(s)",
        name,
        data.len(),
        queued
    );
    queued
}

/// Continues sending to `remote_id` after its channel opened or drained
/// below the low-water mark. Returns files completed by this call.
pub fn resume_sending(
    registry: &mut PeerRegistry,
    remote_id: &str,
    settings: &TransferSettings,
    log: &Arc<dyn LogSink>,
) -> usize {
    match registry.get_mut(remote_id) {
        Some(entry) => pump(remote_id, entry, settings, log),
        None => 0,
    }
}

fn pump(
    remote_id: &str,
    entry: &mut PeerEntry,
    settings: &TransferSettings,
    log: &Arc<dyn LogSink>,
) -> usize {
    let Some(channel) = entry.channel.as_deref_mut() else {
        return 0;
    };
    match entry.outbound.pump(
        channel,
        settings.chunk_size,
        settings.buffered_high_water,
        log,
    ) {
        Ok(PumpOutcome::Drained { completed }) => completed,
        Ok(PumpOutcome::Blocked { completed }) => {
            sink_debug!(
                log,
                "send to {} paused at high water ({} file(s) queued)",
                remote_id,
                entry.outbound.len()
            );
            completed
        }
        Err(e) => {
            sink_warn!(
                log,
                "send to {} failed: {}; dropping {} queued file(s)",
                remote_id,
                e,
                entry.outbound.len()
            );
            entry.outbound.clear();
            0
        }
    }
}

/// Feeds one data-channel message from `from` into its reassembly state.
///
/// Returns the assembled file once the declared size is reached. Errors are
/// protocol violations; the caller logs them and keeps the channel open.
pub fn on_channel_message(
    registry: &mut PeerRegistry,
    from: &SessionId,
    msg: DataMessage,
    log: &Arc<dyn LogSink>,
) -> Result<Option<ReceivedFile>, TransferError> {
    let Some(entry) = registry.get_mut(from) else {
        sink_debug!(log, "data from unlinked {}; dropped", from);
        return Ok(None);
    };

    match msg {
        DataMessage::Text(text) => match ControlRecord::parse(&text)? {
            ControlRecord::FileStart { name, size } => {
                if let Some(old) = entry.incoming.take() {
                    sink_warn!(
                        log,
                        "{} restarted before finishing {:?} ({}/{} bytes)",
                        from,
                        old.name(),
                        old.received(),
                        old.declared_size()
                    );
                }
                sink_info!(log, "receiving {:?} ({} bytes) from {}", name, size, from);
                let transfer = IncomingTransfer::new(name, size);
                if transfer.is_complete() {
                    return Ok(Some(transfer.finish(from.clone())));
                }
                entry.incoming = Some(transfer);
                Ok(None)
            }
        },
        DataMessage::Binary(chunk) => {
            let transfer = entry
                .incoming
                .as_mut()
                .ok_or(TransferError::NoActiveTransfer)?;
            #[cfg(feature = "transfer-debug")]
            crate::sink_trace!(
                log,
                "chunk of {} bytes from {} ({} so far)",
                chunk.len(),
                from,
                transfer.received()
            );
            if !transfer.push(chunk) {
                return Ok(None);
            }
            Ok(entry.incoming.take().map(|t| t.finish(from.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;
    use crate::mesh::link_state::Role;
    use crate::mesh::mock::{MockChannelProbe, MockDataChannel, MockPeerConnection};
    use crate::mesh::peer_link::PeerLink;

    fn log() -> Arc<dyn LogSink> {
        Arc::new(NoopLogSink)
    }

    fn add_peer(reg: &mut PeerRegistry, id: &str, open: bool) -> MockChannelProbe {
        let mut entry = PeerEntry::new(
            PeerLink::new(id.into(), Role::Initiator),
            Box::new(MockPeerConnection::new(id)),
        );
        let ch = if open {
            MockDataChannel::open("file-transfer")
        } else {
            MockDataChannel::connecting("file-transfer")
        };
        let probe = ch.probe();
        entry.channel = Some(Box::new(ch));
        reg.insert(entry).ok();
        probe
    }

    fn start(name: &str, size: u64) -> DataMessage {
        DataMessage::Text(
            ControlRecord::FileStart {
                name: name.into(),
                size,
            }
            .to_text()
            .unwrap(),
        )
    }

    #[test]
    fn broadcast_reaches_only_open_channels() {
        let mut reg = PeerRegistry::new();
        let b = add_peer(&mut reg, "b", true);
        let c = add_peer(&mut reg, "c", false);
        let settings = TransferSettings::default();

        let n = broadcast_file(
            &mut reg,
            "notes.txt",
            Bytes::from_static(b"hello"),
            &settings,
            &log(),
        );
        assert_eq!(n, 1);
        assert_eq!(b.sent().len(), 2);
        assert!(c.sent().is_empty());
    }

    #[test]
    fn resume_continues_after_low_water() {
        let mut reg = PeerRegistry::new();
        let b = add_peer(&mut reg, "b", true);
        let settings = TransferSettings {
            chunk_size: 4,
            buffered_high_water: 8,
            ..TransferSettings::default()
        };
        broadcast_file(&mut reg, "f", Bytes::from(vec![0u8; 20]), &settings, &log());
        assert_eq!(b.binary_bytes(), 8);

        b.drain_buffer();
        assert_eq!(resume_sending(&mut reg, "b", &settings, &log()), 0);
        b.drain_buffer();
        assert_eq!(resume_sending(&mut reg, "b", &settings, &log()), 1);
        assert_eq!(b.binary_bytes(), 20);
    }

    #[test]
    fn reassembles_and_stops_appending_after_completion() {
        let mut reg = PeerRegistry::new();
        add_peer(&mut reg, "b", true);
        let from: SessionId = "b".into();

        assert!(
            on_channel_message(&mut reg, &from, start("a.bin", 6), &log())
                .unwrap()
                .is_none()
        );
        assert!(
            on_channel_message(
                &mut reg,
                &from,
                DataMessage::Binary(Bytes::from_static(b"abc")),
                &log()
            )
            .unwrap()
            .is_none()
        );
        let done = on_channel_message(
            &mut reg,
            &from,
            DataMessage::Binary(Bytes::from_static(b"def")),
            &log(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(done.name, "a.bin");
        assert_eq!(&done.data[..], b"abcdef");

        let late = on_channel_message(
            &mut reg,
            &from,
            DataMessage::Binary(Bytes::from_static(b"x")),
            &log(),
        );
        assert!(matches!(late, Err(TransferError::NoActiveTransfer)));
    }

    #[test]
    fn protocol_violations_are_errors_not_panics() {
        let mut reg = PeerRegistry::new();
        add_peer(&mut reg, "b", true);
        let from: SessionId = "b".into();
        assert!(matches!(
            on_channel_message(&mut reg, &from, DataMessage::Text("{".into()), &log()),
            Err(TransferError::BadControl(_))
        ));
        assert!(matches!(
            on_channel_message(
                &mut reg,
                &from,
                DataMessage::Binary(Bytes::from_static(b"?")),
                &log()
            ),
            Err(TransferError::NoActiveTransfer)
        ));
        assert!(reg.get("b").unwrap().channel.is_some());
    }

    #[test]
    fn empty_file_completes_on_announcement() {
        let mut reg = PeerRegistry::new();
        add_peer(&mut reg, "b", true);
        let done = on_channel_message(&mut reg, &"b".into(), start("empty", 0), &log())
            .unwrap()
            .unwrap();
        assert!(done.data.is_empty());
    }
}
