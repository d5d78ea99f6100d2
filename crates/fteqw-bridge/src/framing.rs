//! Line framing for the server's byte output
//!
//! The OS delivers the child's stdout/stderr in arbitrary chunks; this
//! splits the stream into discrete lines regardless of where the chunk
//! boundaries fall. A partial trailing line is carried over until the
//! next chunk, or flushed at stream end.

/// Incremental line splitter with a carry-over buffer.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: String,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and take the complete lines it yields.
    ///
    /// Lines end at `\n`, with a preceding `\r` stripped. Empty lines
    /// are dropped. Engine output is single-byte text; each chunk is
    /// decoded lossily.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(chunk));

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let mut line: String = self.pending.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Flush the carried partial line, if any. Called at stream end.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_in_chunks(data: &[u8], chunk_size: usize) -> Vec<String> {
        let mut framer = LineFramer::new();
        let mut lines = Vec::new();
        for chunk in data.chunks(chunk_size) {
            lines.extend(framer.push(chunk));
        }
        lines.extend(framer.finish());
        lines
    }

    #[test]
    fn test_single_chunk() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"Server listening\nmap e1m1\n");

        assert_eq!(lines, vec!["Server listening", "map e1m1"]);
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn test_chunk_boundary_independence() {
        let data = b"ServerSpawn\nCouldn't exec autoexec.cfg\n3 packets dropped\npartial tail";
        let whole = frame_in_chunks(data, data.len());

        for chunk_size in [1, 2, 3, 7, 16, 64] {
            assert_eq!(
                frame_in_chunks(data, chunk_size),
                whole,
                "chunk size {chunk_size} changed the framing"
            );
        }
        assert_eq!(whole.last().map(String::as_str), Some("partial tail"));
    }

    #[test]
    fn test_crlf_terminators() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"line one\r\nline two\nline three\r\n");

        assert_eq!(lines, vec!["line one", "line two", "line three"]);
    }

    #[test]
    fn test_crlf_split_across_chunks() {
        let mut framer = LineFramer::new();
        let mut lines = framer.push(b"line one\r");
        assert!(lines.is_empty());
        lines.extend(framer.push(b"\nline two\n"));

        assert_eq!(lines, vec!["line one", "line two"]);
    }

    #[test]
    fn test_partial_line_carried_over() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"no newline yet").is_empty());
        let lines = framer.push(b", now complete\nnext");

        assert_eq!(lines, vec!["no newline yet, now complete"]);
        assert_eq!(framer.finish(), Some("next".to_string()));
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn test_empty_lines_dropped() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"a\n\n\r\nb\n");

        assert_eq!(lines, vec!["a", "b"]);
    }
}
