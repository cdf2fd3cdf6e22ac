//! The transport boundary: newline-delimited JSON envelopes over a file
//! (replay mode) or a TCP stream, bridged onto the in-process channels.
//! Everything past this seam belongs to the message-bus collaborator.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use qcoord_protocol::{
    observer_channel, target_channel, GcsCommand, ObserverEvent, TargetTelemetry, GCS_CHANNEL,
};

use crate::channel::{Receiver, Sender};

/// One line on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub channel: String,
    pub payload: Value,
}

pub enum IoSource {
    File(File),
    TcpStream(TcpStream),
}

impl io::Read for IoSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            IoSource::File(f) => io::Read::read(f, buf),
            IoSource::TcpStream(s) => io::Read::read(s, buf),
        }
    }
}

impl io::Write for IoSource {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            IoSource::File(f) => io::Write::write(f, buf),
            IoSource::TcpStream(s) => io::Write::write(s, buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            IoSource::File(f) => io::Write::flush(f),
            IoSource::TcpStream(s) => io::Write::flush(s),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PumpStatus {
    Open,
    /// The source is exhausted (file replay finished, or the peer hung up).
    SourceClosed,
}

/// Pumps envelopes between the io source and the step channels the control
/// loop reads and writes.
pub struct BusAdapter {
    reader: BufReader<IoSource>,
    line_buf: String,

    observer_channel: String,
    observer_tx: Sender<ObserverEvent>,
    target_txs: Vec<(String, Sender<TargetTelemetry>)>,
    cmd_rx: Receiver<GcsCommand>,
}

impl BusAdapter {
    pub fn new(
        source: IoSource,
        observer_name: &str,
        observer_tx: Sender<ObserverEvent>,
        target_txs: Vec<(String, Sender<TargetTelemetry>)>,
        cmd_rx: Receiver<GcsCommand>,
    ) -> Self {
        BusAdapter {
            reader: BufReader::new(source),
            line_buf: String::with_capacity(1024),
            observer_channel: observer_channel(observer_name),
            observer_tx,
            target_txs: target_txs
                .into_iter()
                .map(|(name, tx)| (target_channel(&name), tx))
                .collect(),
            cmd_rx,
        }
    }

    /// Drains every complete line currently available. Never blocks past
    /// what the source already has buffered (TCP sources must be in
    /// non-blocking mode).
    pub fn pump_in(&mut self) -> io::Result<PumpStatus> {
        loop {
            match self.reader.read_line(&mut self.line_buf) {
                Ok(0) => {
                    if !self.line_buf.trim().is_empty() {
                        self.route_line();
                    }
                    self.line_buf.clear();
                    return Ok(PumpStatus::SourceClosed);
                }
                Ok(_) => {
                    if self.line_buf.ends_with('\n') {
                        self.route_line();
                        self.line_buf.clear();
                    }
                    // A partial line stays buffered for the next pump
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(PumpStatus::Open),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Writes every pending command out as an envelope on the GCS channel.
    /// In file-replay mode there is no peer; commands are logged instead.
    pub fn pump_out(&mut self) -> io::Result<()> {
        while let Some(cmd) = self.cmd_rx.recv() {
            let envelope = Envelope {
                channel: GCS_CHANNEL.to_owned(),
                payload: cmd.to_value(),
            };
            match self.reader.get_mut() {
                IoSource::TcpStream(s) => {
                    let mut line = serde_json::to_string(&envelope)
                        .expect("Envelope serialization cannot fail");
                    line.push('\n');
                    s.write_all(line.as_bytes())?;
                }
                IoSource::File(_) => {
                    info!(channel = GCS_CHANNEL, command = ?cmd, "replay command");
                }
            }
        }
        if let IoSource::TcpStream(s) = self.reader.get_mut() {
            s.flush()?;
        }
        Ok(())
    }

    fn route_line(&mut self) {
        let envelope: Envelope = match serde_json::from_str(self.line_buf.trim_end()) {
            Ok(envelope) => envelope,
            Err(e) => {
                // Drop the whole message; prior state is unaffected
                warn!(error = %e, "dropping malformed envelope");
                return;
            }
        };

        if envelope.channel == self.observer_channel {
            match ObserverEvent::from_value(envelope.payload) {
                Ok(event) => {
                    if let Err(e) = self.observer_tx.try_send(event) {
                        warn!(error = %e, "dropping observer event");
                    }
                }
                Err(e) => warn!(error = %e, "dropping undecodable observer payload"),
            }
            return;
        }

        if let Some((_, tx)) = self
            .target_txs
            .iter_mut()
            .find(|(ch, _)| *ch == envelope.channel)
        {
            match TargetTelemetry::from_value(envelope.payload) {
                Ok(telemetry) => {
                    if let Err(e) = tx.try_send(telemetry) {
                        warn!(error = %e, "dropping target telemetry");
                    }
                }
                Err(e) => warn!(error = %e, "dropping undecodable target payload"),
            }
            return;
        }

        debug!(channel = %envelope.channel, "ignoring envelope for unknown channel");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Step, StepChannel};
    use std::io::Write as _;
    use std::path::PathBuf;

    fn replay_file(name: &str, lines: &[&str]) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("qcs-transport-{name}-{}.jsonl", std::process::id()));
        let mut f = File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        path
    }

    #[test]
    fn replay_routes_by_channel_and_drops_garbage() {
        let path = replay_file("routing", &[
            r#"{"channel":"Morse-QCOORD-GODOT","payload":{"tag":1}}"#,
            r#"{"channel":"Morse-Marisa-DJANGO","payload":{"pos_x":1.0,"pos_y":2.0,"dest_x":3.0,"dest_y":4.0}}"#,
            r#"not json at all"#,
            r#"{"channel":"Morse-Marisa-DJANGO","payload":{"pos_x":9.0}}"#,
            r#"{"channel":"Morse-Marisa-UNKNOWN","payload":{"pos_x":1.0,"pos_y":2.0,"dest_x":3.0,"dest_y":4.0}}"#,
        ]);

        let mut observer_ch = StepChannel::new();
        let observer_tx = observer_ch.sender(None);
        let mut observer_rx = observer_ch.receiver(None);

        let mut target_ch = StepChannel::new();
        let target_tx = target_ch.sender(None);
        let mut target_rx = target_ch.receiver(None);

        let mut cmd_ch: StepChannel<GcsCommand> = StepChannel::new();
        let cmd_rx = cmd_ch.receiver(None);

        let mut adapter = BusAdapter::new(
            IoSource::File(File::open(&path).unwrap()),
            "GODOT",
            observer_tx,
            vec![("DJANGO".to_owned(), target_tx)],
            cmd_rx,
        );

        assert_eq!(adapter.pump_in().unwrap(), PumpStatus::SourceClosed);
        observer_ch.step().unwrap();
        target_ch.step().unwrap();

        assert_eq!(observer_rx.recv(), Some(ObserverEvent::Pong));
        assert_eq!(observer_rx.recv(), None);

        // Only the well-formed telemetry made it through; the payload with
        // missing fields and the unknown channel were dropped
        let telemetry = target_rx.recv().unwrap();
        assert_eq!(telemetry.pos_x, 1.0);
        assert_eq!(target_rx.recv(), None);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn file_replay_logs_outgoing_commands() {
        let path = replay_file("outgoing", &[]);

        let mut observer_ch: StepChannel<ObserverEvent> = StepChannel::new();
        let observer_tx = observer_ch.sender(None);

        let mut cmd_ch: StepChannel<GcsCommand> = StepChannel::new();
        let mut cmd_tx = cmd_ch.sender(None);
        let cmd_rx = cmd_ch.receiver(None);

        let mut adapter = BusAdapter::new(
            IoSource::File(File::open(&path).unwrap()),
            "GODOT",
            observer_tx,
            vec![],
            cmd_rx,
        );

        cmd_tx.try_send(GcsCommand::Ping).unwrap();
        cmd_ch.step().unwrap();
        // No peer to write to; this must not error
        adapter.pump_out().unwrap();

        std::fs::remove_file(path).ok();
    }
}
