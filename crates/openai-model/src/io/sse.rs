use super::{Chunks, ChunksError};

#[derive(Debug)]
pub enum Error {
    Chunks(ChunksError),
    InvalidUtf8,
}

/// Reads the `data` payloads of server-sent events from a chunk stream.
///
/// Only the subset used by chat-completions endpoints is handled: `data`
/// fields (joined with `\n` when an event has several), comment lines and
/// other fields are skipped, and both LF and CRLF line endings are accepted.
pub struct Sse {
    buf: Vec<u8>,
    chunks: Chunks,
    exhausted: bool,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: Vec::new(),
            chunks,
            exhausted: false,
        }
    }

    /// Returns the payload of the next event, or `None` once the stream has
    /// ended. A trailing event without its blank line is dropped.
    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            if let Some(data) = self.take_event()? {
                return Ok(Some(data));
            }
            if self.exhausted {
                return Ok(None);
            }
            match self.chunks.next_chunk().await.map_err(Error::Chunks)? {
                Some(bytes) => self.buf.extend_from_slice(&bytes),
                None => self.exhausted = true,
            }
        }
    }

    fn take_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            let Some((block_len, consumed)) = find_event_end(&self.buf) else {
                return Ok(None);
            };
            let block: Vec<u8> = self.buf.drain(..consumed).collect();
            let block = std::str::from_utf8(&block[..block_len])
                .map_err(|_| Error::InvalidUtf8)?;

            let mut data: Option<String> = None;
            for line in block.lines() {
                let line = line.strip_suffix('\r').unwrap_or(line);
                let Some(value) = line.strip_prefix("data:") else {
                    // Comments, `event`, `id` and `retry` are not needed.
                    continue;
                };
                let value = value.strip_prefix(' ').unwrap_or(value);
                match &mut data {
                    Some(data) => {
                        data.push('\n');
                        data.push_str(value);
                    }
                    None => data = Some(value.to_owned()),
                }
            }
            if let Some(data) = data {
                return Ok(Some(data));
            }
        }
    }
}

/// Finds the first blank line. Returns the length of the event block and
/// the number of bytes to consume including the separator.
fn find_event_end(buf: &[u8]) -> Option<(usize, usize)> {
    let mut idx = 0;
    while idx < buf.len() {
        if buf[idx] == b'\n' {
            let rest = &buf[idx + 1..];
            if rest.starts_with(b"\n") {
                return Some((idx, idx + 2));
            }
            if rest.starts_with(b"\r\n") {
                return Some((idx, idx + 3));
            }
        }
        idx += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(chunks: Chunks) -> Vec<String> {
        let mut sse = Sse::new(chunks);
        let mut events = vec![];
        while let Some(event) = sse.next_event().await.unwrap() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_normal_events() {
        let chunks = Chunks::from_canned([
            b"data: {\"a\":1}\n\n".as_slice(),
            b"data: [DONE]\n\n".as_slice(),
        ]);
        assert_eq!(collect(chunks).await, ["{\"a\":1}", "[DONE]"]);
    }

    #[tokio::test]
    async fn test_split_across_chunks() {
        let chunks = Chunks::from_canned([
            b"da".as_slice(),
            b"ta: hel".as_slice(),
            b"lo\n".as_slice(),
            b"\ndata: bye\n\n".as_slice(),
        ]);
        assert_eq!(collect(chunks).await, ["hello", "bye"]);
    }

    #[tokio::test]
    async fn test_crlf_and_comments() {
        let chunks = Chunks::from_canned([
            b": keep-alive\r\n\r\nevent: message\r\ndata: hi\r\n\r\n".as_slice(),
        ]);
        assert_eq!(collect(chunks).await, ["hi"]);
    }

    #[tokio::test]
    async fn test_multi_line_data() {
        let chunks = Chunks::from_canned([b"data: a\ndata: b\n\n".as_slice()]);
        assert_eq!(collect(chunks).await, ["a\nb"]);
    }

    #[tokio::test]
    async fn test_incomplete_event_is_dropped() {
        let chunks = Chunks::from_canned([b"data: hello\n".as_slice()]);
        assert!(collect(chunks).await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_utf8() {
        let chunks = Chunks::from_canned([b"data: \xff\xfe\n\n".as_slice()]);
        let mut sse = Sse::new(chunks);
        assert!(matches!(sse.next_event().await, Err(Error::InvalidUtf8)));
    }
}
