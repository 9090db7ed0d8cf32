//! Line-delimited JSON transport
//!
//! A chat bridge process writes one `InboundMessage` JSON object per line to our
//! stdin and reads `{"to", "text"}` objects back from stdout, one per chunk.

use crate::error::Result;
use crate::message::InboundMessage;
use crate::relay::{Outcome, RelayEngine};
use crate::reply::ReplySink;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// One outbound chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub to: String,
    pub text: String,
}

/// Output stream shared by every in-flight message
pub type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

pub fn shared_writer<W: AsyncWrite + Send + Unpin + 'static>(writer: W) -> SharedWriter {
    Arc::new(Mutex::new(Box::new(writer)))
}

/// Reply sink that writes chunks for one chat as JSON lines
pub struct JsonLineSink {
    target: String,
    writer: SharedWriter,
}

impl JsonLineSink {
    pub fn new(target: &str, writer: SharedWriter) -> Self {
        Self {
            target: target.to_string(),
            writer,
        }
    }
}

#[async_trait]
impl ReplySink for JsonLineSink {
    async fn say(&self, text: &str) -> Result<()> {
        let mut line = serde_json::to_vec(&OutboundMessage {
            to: self.target.clone(),
            text: text.to_string(),
        })?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Parse one input line. Blank lines yield None.
pub fn parse_line(line: &str) -> Result<Option<InboundMessage>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line)?))
}

/// Counters reported when the input stream closes
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ServeStats {
    pub received: usize,
    pub malformed: usize,
    pub replied: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Read messages until EOF, handling each one on its own task
pub async fn serve<R>(engine: Arc<RelayEngine>, reader: R, writer: SharedWriter) -> Result<ServeStats>
where
    R: AsyncBufRead + Unpin,
{
    serve_with_clock(engine, reader, writer, || Utc::now().date_naive()).await
}

/// Like `serve`, with the quota day of each message taken from `today`
pub async fn serve_with_clock<R, C>(
    engine: Arc<RelayEngine>,
    reader: R,
    writer: SharedWriter,
    today: C,
) -> Result<ServeStats>
where
    R: AsyncBufRead + Unpin,
    C: Fn() -> NaiveDate,
{
    let mut stats = ServeStats::default();
    let mut tasks = JoinSet::new();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let msg = match parse_line(&line) {
            Ok(Some(msg)) => msg,
            Ok(None) => continue,
            Err(e) => {
                warn!("Ignoring malformed input line: {}", e);
                stats.malformed += 1;
                continue;
            }
        };
        stats.received += 1;

        let date = today();
        let engine = Arc::clone(&engine);
        let sink = JsonLineSink::new(msg.reply_target(), Arc::clone(&writer));
        tasks.spawn(async move {
            let result = engine.handle_on(&msg, date, &sink).await;
            if let Err(e) = &result {
                error!("Failed to deliver reply to {}: {}", msg.reply_target(), e);
            }
            result
        });

        // Reap finished tasks so the set does not grow without bound
        while let Some(done) = tasks.try_join_next() {
            tally(&mut stats, done);
        }
    }

    debug!("Input closed, waiting for {} in-flight message(s)", tasks.len());
    while let Some(done) = tasks.join_next().await {
        tally(&mut stats, done);
    }

    info!(
        received = stats.received,
        replied = stats.replied,
        skipped = stats.skipped,
        failed = stats.failed,
        malformed = stats.malformed,
        "Transport closed"
    );
    Ok(stats)
}

fn tally(
    stats: &mut ServeStats,
    done: std::result::Result<Result<Outcome>, tokio::task::JoinError>,
) {
    match done {
        Ok(Ok(Outcome::Skipped(_))) => stats.skipped += 1,
        Ok(Ok(_)) => stats.replied += 1,
        Ok(Err(_)) => stats.failed += 1,
        Err(e) => {
            error!("Message task panicked: {}", e);
            stats.failed += 1;
        }
    }
}
