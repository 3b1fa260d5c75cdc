// ── NDJSON producer boundary ──
//
// Traffic events arrive one JSON object per line on stdin or from a file.
// A reader task parses lines into a bounded channel; a single consumer
// task drains it in order into whatever sink the caller supplies (the
// agent's EventLog, or the hub's local aggregator).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use stargaze_core::{Protocol, TrafficEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Stdin,
    File(PathBuf),
}

impl InputSource {
    /// `-` means stdin.
    pub fn from_path(path: &Path) -> Self {
        if path.as_os_str() == "-" {
            Self::Stdin
        } else {
            Self::File(path.to_path_buf())
        }
    }
}

/// One producer line. Only `sourceIp` and `protocol` are required; a
/// missing timestamp means "now".
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProducerLine {
    source_ip: String,
    #[serde(default)]
    dest_port: Option<u16>,
    protocol: Protocol,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    bytes: u64,
}

pub fn parse_line(line: &str, now_ms: i64) -> Option<TrafficEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<ProducerLine>(line) {
        Ok(p) => Some(TrafficEvent {
            source_ip: p.source_ip,
            dest_port: p.dest_port,
            protocol: p.protocol,
            timestamp: p.timestamp.unwrap_or(now_ms),
            bytes: p.bytes,
        }),
        Err(e) => {
            debug!(error = %e, "dropping malformed producer line");
            None
        }
    }
}

/// Reader and consumer tasks for one input.
pub struct Ingest {
    reader: JoinHandle<()>,
    consumer: JoinHandle<u64>,
}

impl Ingest {
    /// Start reading `source` into `sink`. `queue` bounds the events in
    /// flight between the two tasks.
    pub fn spawn<F>(source: InputSource, queue: usize, cancel: CancellationToken, sink: F) -> Self
    where
        F: FnMut(TrafficEvent) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(queue.max(1));

        let reader = tokio::spawn(async move {
            let result = match &source {
                InputSource::Stdin => {
                    read_lines(BufReader::new(tokio::io::stdin()), &tx, &cancel).await
                }
                InputSource::File(path) => match tokio::fs::File::open(path).await {
                    Ok(file) => read_lines(BufReader::new(file), &tx, &cancel).await,
                    Err(e) => Err(e),
                },
            };
            if let Err(e) = result {
                warn!(source = ?source, error = %e, "event input failed");
            }
        });

        let consumer = tokio::spawn(consume(rx, sink));
        Self { reader, consumer }
    }

    /// Wait for the input to end and the queue to drain. Returns the
    /// number of events delivered to the sink.
    pub async fn finished(self) -> u64 {
        if let Err(e) = self.reader.await {
            warn!(error = %e, "event reader task ended abnormally");
        }
        match self.consumer.await {
            Ok(delivered) => delivered,
            Err(e) => {
                warn!(error = %e, "event consumer task ended abnormally");
                0
            }
        }
    }

    pub fn abort(&self) {
        self.reader.abort();
        self.consumer.abort();
    }
}

async fn read_lines<R>(
    reader: R,
    tx: &mpsc::Sender<TrafficEvent>,
    cancel: &CancellationToken,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            debug!("event input reached end of stream");
            return Ok(());
        };
        if let Some(event) = parse_line(&line, chrono::Utc::now().timestamp_millis()) {
            if tx.send(event).await.is_err() {
                return Ok(());
            }
        }
    }
}

async fn consume<F>(mut rx: mpsc::Receiver<TrafficEvent>, mut sink: F) -> u64
where
    F: FnMut(TrafficEvent),
{
    let mut delivered = 0_u64;
    while let Some(event) = rx.recv().await {
        sink(event);
        delivered += 1;
    }
    info!(delivered, "event input closed");
    delivered
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[test]
    fn parses_producer_lines() {
        let ev = parse_line(
            r#"{"sourceIp":"8.8.8.8","destPort":53,"protocol":"udp","timestamp":5,"bytes":80}"#,
            99,
        )
        .unwrap();
        assert_eq!(ev.protocol, Protocol::Udp);
        assert_eq!(ev.timestamp, 5);
        assert_eq!(ev.dest_port, Some(53));

        let ev = parse_line(r#"{"sourceIp":"1.1.1.1","protocol":"GRE"}"#, 99).unwrap();
        assert_eq!(ev.protocol, Protocol::Other);
        assert_eq!(ev.timestamp, 99);
        assert_eq!(ev.bytes, 0);
    }

    #[test]
    fn malformed_lines_are_dropped() {
        assert!(parse_line("", 0).is_none());
        assert!(parse_line("   ", 0).is_none());
        assert!(parse_line("{not json", 0).is_none());
        assert!(parse_line(r#"{"protocol":"TCP"}"#, 0).is_none());
        assert!(parse_line(r#"{"sourceIp":"1.1.1.1","protocol":"TCP","destPort":70000}"#, 0).is_none());
    }

    #[test]
    fn dash_means_stdin() {
        assert_eq!(InputSource::from_path(Path::new("-")), InputSource::Stdin);
        assert_eq!(
            InputSource::from_path(Path::new("events.ndjson")),
            InputSource::File("events.ndjson".into())
        );
    }

    #[tokio::test]
    async fn file_input_is_delivered_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..50 {
            writeln!(
                file,
                r#"{{"sourceIp":"10.0.{i}.1","protocol":"TCP","timestamp":{i}}}"#
            )
            .unwrap();
        }
        writeln!(file, "garbage").unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let ingest = Ingest::spawn(
            InputSource::File(file.path().to_path_buf()),
            4,
            CancellationToken::new(),
            move |ev| sink.lock().unwrap().push(ev.timestamp),
        );

        assert_eq!(ingest.finished().await, 50);
        let seen = seen.lock().unwrap();
        assert_eq!(*seen, (0..50).collect::<Vec<i64>>());
    }

    fn one_line_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"sourceIp":"10.0.0.1","protocol":"UDP","timestamp":1}}"#).unwrap();
        file
    }

    #[tokio::test]
    async fn aborted_ingest_finishes_with_nothing_delivered() {
        let file = one_line_file();
        let ingest = Ingest::spawn(
            InputSource::File(file.path().to_path_buf()),
            4,
            CancellationToken::new(),
            |_| {},
        );
        ingest.abort();
        assert_eq!(ingest.finished().await, 0);
    }

    #[tokio::test]
    async fn panicking_sink_does_not_hang_finished() {
        let file = one_line_file();
        let ingest = Ingest::spawn(
            InputSource::File(file.path().to_path_buf()),
            4,
            CancellationToken::new(),
            |_| panic!("sink failed"),
        );
        assert_eq!(ingest.finished().await, 0);
    }
}
