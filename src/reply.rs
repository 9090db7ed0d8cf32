//! Reply segmentation and ordered delivery

use crate::error::Result;
use async_trait::async_trait;

/// Anything that accepts outbound text: a private contact or a group room
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn say(&self, text: &str) -> Result<()>;
}

/// Split `text` into consecutive chunks of at most `max_size` characters.
///
/// Empty input yields a single empty chunk so the caller still sends one message.
pub fn segment(text: &str, max_size: usize) -> Vec<String> {
    let max_size = max_size.max(1);
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars
        .chunks(max_size)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Send chunks in order, each one only after the previous send completed
pub async fn deliver(chunks: &[String], sink: &dyn ReplySink) -> Result<()> {
    for chunk in chunks {
        sink.say(chunk).await?;
    }
    Ok(())
}

/// Segment and deliver in one step
pub async fn reply(sink: &dyn ReplySink, text: &str, max_size: usize) -> Result<()> {
    let chunks = segment(text, max_size);
    tracing::debug!("Replying with {} chunk(s)", chunks.len());
    deliver(&chunks, sink).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<String>>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl ReplySink for Recorder {
        async fn say(&self, text: &str) -> Result<()> {
            let mut sent = self.sent.lock().unwrap();
            if self.fail_after == Some(sent.len()) {
                return Err(Error::Io(std::io::Error::other("pipe closed")));
            }
            sent.push(text.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_empty_text_single_empty_chunk() {
        assert_eq!(segment("", 500), vec![String::new()]);
    }

    #[test]
    fn test_exact_multiple() {
        let text = "a".repeat(1500);
        let chunks = segment(&text, 500);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() == 500));
    }

    #[test]
    fn test_short_last_chunk() {
        assert_eq!(segment("abcdefg", 3), vec!["abc", "def", "g"]);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let chunks = segment("你好世界", 3);
        assert_eq!(chunks, vec!["你好世", "界"]);
    }

    #[test]
    fn test_zero_size_treated_as_one() {
        assert_eq!(segment("ab", 0), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_deliver_in_order() {
        let sink = Recorder::default();
        reply(&sink, "abcdefg", 3).await.unwrap();
        assert_eq!(*sink.sent.lock().unwrap(), vec!["abc", "def", "g"]);
    }

    #[tokio::test]
    async fn test_deliver_stops_on_error() {
        let sink = Recorder {
            fail_after: Some(1),
            ..Default::default()
        };
        let result = reply(&sink, "abcdefg", 3).await;
        assert!(result.is_err());
        assert_eq!(*sink.sent.lock().unwrap(), vec!["abc"]);
    }
}
