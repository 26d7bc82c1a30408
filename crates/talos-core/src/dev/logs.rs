//! Log fan-in for dev service output.

use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::Local;
use console::{Color, style};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::debug;

const PALETTE: [Color; 6] = [
    Color::Cyan,
    Color::Green,
    Color::Yellow,
    Color::Magenta,
    Color::Blue,
    Color::Red,
];

/// Stable color for the service at `index` in start order.
pub fn color_for(index: usize) -> Color {
    PALETTE[index % PALETTE.len()]
}

/// Serialized writer shared by every reader task.
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl LogSink {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    pub fn write_line(&self, line: &str) {
        if let Ok(mut w) = self.inner.lock() {
            let _ = writeln!(w, "{line}");
            let _ = w.flush();
        }
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LogSink")
    }
}

/// Per-service line prefix.
#[derive(Debug, Clone)]
pub struct LogPrefix {
    pub key: String,
    pub color: Color,
}

impl LogPrefix {
    pub fn new(key: &str, index: usize) -> Self {
        Self {
            key: key.to_string(),
            color: color_for(index),
        }
    }

    pub fn format(&self, line: &str) -> String {
        format!(
            "{} {} {line}",
            style(Local::now().format("%H:%M:%S")).dim(),
            style(format!("[{}]", self.key)).fg(self.color).bold(),
        )
    }
}

/// Copy `reader` line by line into `sink` until EOF.
pub fn spawn_reader<R>(reader: R, stream: &'static str, prefix: LogPrefix, sink: LogSink) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = match std::str::from_utf8(&buf) {
                        Ok(text) => text.trim_end_matches(['\n', '\r']).to_string(),
                        Err(_) => format!("[Binary output on {stream}]"),
                    };
                    sink.write_line(&prefix.format(&line));
                }
                Err(e) => {
                    debug!(service = %prefix.key, stream, error = %e, "Log stream closed");
                    break;
                }
            }
        }
    })
}
