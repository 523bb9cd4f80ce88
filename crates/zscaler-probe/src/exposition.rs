//! Prometheus text exposition key lookup.
//!
//! Scans an exposition stream line by line and returns the value of the
//! first sample whose first whitespace-delimited token equals the key.
//! Matching is literal: `node_cpu` and `node_cpu{cpu="cpu0"}` are distinct
//! keys, and label order matters. `#` lines are not special-cased; they
//! simply never equal a key.
//!
//! The scanner is incremental so a response body can be fed frame by frame
//! without buffering it whole.

use std::io::BufRead;

use bytes::Buf;
use http_body_util::BodyExt;
use hyper::body::Body;
use tracing::{debug, trace};

use crate::error::{BoxError, ProbeError, ProbeResult};

/// Lines longer than this are discarded unread.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Match a single exposition line against `key`.
///
/// Returns `Ok(Some(value))` on a match, `Ok(None)` when the line does not
/// match (or matches without a value token), and `Err(Parse)` when the
/// matched value is not a float (`Err(OutOfRange)` when it overflows f64).
pub fn match_line(line: &str, key: &str) -> ProbeResult<Option<f64>> {
    let mut tokens = line.split_whitespace();
    match tokens.next() {
        Some(first) if first == key => {}
        _ => return Ok(None),
    }

    let Some(token) = tokens.next() else {
        debug!(key, "key matched a line without a value, continuing");
        return Ok(None);
    };

    let value = token.parse::<f64>().map_err(|source| ProbeError::Parse {
        key: key.to_string(),
        token: token.to_string(),
        source,
    })?;

    // Decimal literals too large for f64 parse to infinity.
    if value.is_infinite() && !is_infinity_literal(token) {
        return Err(ProbeError::OutOfRange {
            key: key.to_string(),
            token: token.to_string(),
        });
    }
    Ok(Some(value))
}

fn is_infinity_literal(token: &str) -> bool {
    let unsigned = token.strip_prefix(['+', '-']).unwrap_or(token);
    unsigned.eq_ignore_ascii_case("inf") || unsigned.eq_ignore_ascii_case("infinity")
}

/// Incremental line splitter bound to one key.
///
/// Feed it arbitrary byte chunks; it reassembles lines across chunk
/// boundaries and stops at the first match.
#[derive(Debug)]
pub struct KeyScanner<'k> {
    key: &'k str,
    pending: Vec<u8>,
    /// Set while skipping the tail of an over-long line.
    discarding: bool,
    lines: u64,
}

impl<'k> KeyScanner<'k> {
    pub fn new(key: &'k str) -> Self {
        Self {
            key,
            pending: Vec::new(),
            discarding: false,
            lines: 0,
        }
    }

    /// Number of complete lines inspected so far.
    pub fn lines_scanned(&self) -> u64 {
        self.lines
    }

    /// Feed the next chunk of the stream.
    ///
    /// Returns `Ok(Some(value))` as soon as a line matches.
    pub fn feed(&mut self, chunk: &[u8]) -> ProbeResult<Option<f64>> {
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            rest = &tail[1..];

            if self.discarding {
                self.discarding = false;
                continue;
            }

            let found = if self.pending.is_empty() {
                self.scan_line(head)?
            } else {
                let mut line = std::mem::take(&mut self.pending);
                line.extend_from_slice(head);
                self.scan_line(&line)?
            };
            if found.is_some() {
                return Ok(found);
            }
        }

        if !self.discarding {
            self.pending.extend_from_slice(rest);
            if self.pending.len() > MAX_LINE_BYTES {
                debug!(
                    key = self.key,
                    limit = MAX_LINE_BYTES,
                    "discarding over-long exposition line"
                );
                self.pending.clear();
                self.discarding = true;
            }
        }
        Ok(None)
    }

    /// Signal end of stream: scans an unterminated final line, then
    /// reports `NotFound` if nothing matched.
    pub fn finish(mut self) -> ProbeResult<f64> {
        if !self.discarding && !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            if let Some(value) = self.scan_line(&line)? {
                return Ok(value);
            }
        }
        debug!(key = self.key, lines = self.lines, "key not found in exposition");
        Err(ProbeError::NotFound {
            key: self.key.to_string(),
        })
    }

    fn scan_line(&mut self, raw: &[u8]) -> ProbeResult<Option<f64>> {
        self.lines += 1;
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = String::from_utf8_lossy(raw);
        let found = match_line(&line, self.key)?;
        if let Some(value) = found {
            trace!(key = self.key, line = self.lines, value, "key matched");
        }
        Ok(found)
    }
}

/// Find the value for `key` in a blocking reader.
pub fn find_value<R: BufRead>(mut reader: R, key: &str) -> ProbeResult<f64> {
    let mut scanner = KeyScanner::new(key);
    loop {
        let chunk = reader.fill_buf()?;
        if chunk.is_empty() {
            return scanner.finish();
        }
        let len = chunk.len();
        if let Some(value) = scanner.feed(chunk)? {
            return Ok(value);
        }
        reader.consume(len);
    }
}

/// Find the value for `key` in a streaming HTTP body.
///
/// Frames are scanned as they arrive and reading stops at the first match.
/// Body read errors are reported as transport failures against `url`.
pub async fn find_value_in_body<B>(mut body: B, key: &str, url: &str) -> ProbeResult<f64>
where
    B: Body + Unpin,
    B::Error: Into<BoxError>,
{
    let mut scanner = KeyScanner::new(key);
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| ProbeError::transport(url, e))?;
        // Trailers carry no samples.
        let Ok(mut data) = frame.into_data() else {
            continue;
        };
        while data.has_remaining() {
            let chunk = data.chunk();
            let len = chunk.len();
            if let Some(value) = scanner.feed(chunk)? {
                return Ok(value);
            }
            data.advance(len);
        }
    }
    scanner.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeErrorKind;

    fn lookup(text: &str, key: &str) -> ProbeResult<f64> {
        find_value(text.as_bytes(), key)
    }

    #[test]
    fn exact_token_match_only() {
        let text = "foo_metric 1.0\nfoo_metric{label=\"x\"} 2.0\n";
        assert_eq!(lookup(text, "foo_metric").unwrap(), 1.0);
        assert_eq!(lookup(text, "foo_metric{label=\"x\"}").unwrap(), 2.0);
    }

    #[test]
    fn labelled_key_does_not_match_bare_line() {
        let text = "foo_metric 1.0\n";
        let err = lookup(text, "foo_metric{label=\"x\"}").unwrap_err();
        assert_eq!(err.kind(), ProbeErrorKind::NotFound);
    }

    #[test]
    fn first_match_wins() {
        let text = "dup_metric 5.0\nother 1\ndup_metric 9.0\n";
        assert_eq!(lookup(text, "dup_metric").unwrap(), 5.0);
    }

    #[test]
    fn missing_key_is_not_found() {
        let text = "# HELP a thing\na 1\nb 2\n";
        let err = lookup(text, "missing_key").unwrap_err();
        assert_eq!(err.kind(), ProbeErrorKind::NotFound);
        assert!(err.to_string().contains("missing_key"));
    }

    #[test]
    fn malformed_value_is_parse_error() {
        let text = "bad_metric not_a_number\nbad_metric 3\n";
        let err = lookup(text, "bad_metric").unwrap_err();
        assert_eq!(err.kind(), ProbeErrorKind::Parse);
    }

    #[test]
    fn whitespace_runs_and_tabs() {
        assert_eq!(lookup("padded_metric    3.5\n", "padded_metric").unwrap(), 3.5);
        assert_eq!(lookup("padded_metric\t\t3.5\n", "padded_metric").unwrap(), 3.5);
        assert_eq!(lookup("  padded_metric \t 3.5  \n", "padded_metric").unwrap(), 3.5);
    }

    #[test]
    fn key_without_value_keeps_scanning() {
        let text = "lonely_metric\nlonely_metric 4.25\n";
        assert_eq!(lookup(text, "lonely_metric").unwrap(), 4.25);

        let err = lookup("lonely_metric\n", "lonely_metric").unwrap_err();
        assert_eq!(err.kind(), ProbeErrorKind::NotFound);
    }

    #[test]
    fn timestamp_column_is_ignored() {
        let text = "http_requests_total{code=\"200\"} 1027 1395066363000\n";
        assert_eq!(
            lookup(text, "http_requests_total{code=\"200\"}").unwrap(),
            1027.0
        );
    }

    #[test]
    fn special_float_values() {
        let text = "up +Inf\ndown -Inf\nunknown NaN\nsci 1.5e3\nneg -1\n";
        assert_eq!(lookup(text, "up").unwrap(), f64::INFINITY);
        assert_eq!(lookup(text, "down").unwrap(), f64::NEG_INFINITY);
        assert!(lookup(text, "unknown").unwrap().is_nan());
        assert_eq!(lookup(text, "sci").unwrap(), 1500.0);
        assert_eq!(lookup(text, "neg").unwrap(), -1.0);
    }

    #[test]
    fn overflowing_literal_is_rejected() {
        let err = lookup("big 1e400\n", "big").unwrap_err();
        assert!(matches!(err, ProbeError::OutOfRange { ref token, .. } if token == "1e400"));
        assert_eq!(err.kind(), ProbeErrorKind::Parse);

        let err = lookup("small -1e400\n", "small").unwrap_err();
        assert_eq!(err.kind(), ProbeErrorKind::Parse);

        assert_eq!(lookup("spelled +Infinity\n", "spelled").unwrap(), f64::INFINITY);
        assert_eq!(lookup("lower -inf\n", "lower").unwrap(), f64::NEG_INFINITY);
    }

    #[test]
    fn crlf_line_endings() {
        let text = "a 1\r\nb 2\r\n";
        assert_eq!(lookup(text, "b").unwrap(), 2.0);
    }

    #[test]
    fn unterminated_last_line_is_scanned() {
        assert_eq!(lookup("a 1\nlast 7", "last").unwrap(), 7.0);
    }

    #[test]
    fn comment_lines_never_match_metric_keys() {
        let text = "# TYPE node_load1 gauge\nnode_load1 0.42\n";
        assert_eq!(lookup(text, "node_load1").unwrap(), 0.42);
    }

    #[test]
    fn empty_input_is_not_found() {
        assert_eq!(lookup("", "x").unwrap_err().kind(), ProbeErrorKind::NotFound);
        assert_eq!(
            lookup("\n\n   \n", "x").unwrap_err().kind(),
            ProbeErrorKind::NotFound
        );
    }

    #[test]
    fn lines_split_across_chunks() {
        let text = b"alpha 1\nnode_cpu{cpu=\"cpu1\"} 67.89\nomega 3\n";
        for split in 1..text.len() {
            let mut scanner = KeyScanner::new("node_cpu{cpu=\"cpu1\"}");
            let (a, b) = text.split_at(split);
            let found = match scanner.feed(a).unwrap() {
                Some(v) => v,
                None => match scanner.feed(b).unwrap() {
                    Some(v) => v,
                    None => scanner.finish().unwrap(),
                },
            };
            assert_eq!(found, 67.89, "split at {split}");
        }
    }

    #[test]
    fn scanner_stops_at_first_match() {
        let mut scanner = KeyScanner::new("b");
        let found = scanner.feed(b"a 1\nb 2\nc 3\n").unwrap();
        assert_eq!(found, Some(2.0));
        assert_eq!(scanner.lines_scanned(), 2);
    }

    #[test]
    fn over_long_line_is_discarded() {
        let mut scanner = KeyScanner::new("target");
        let filler = vec![b'x'; MAX_LINE_BYTES + 10];
        assert_eq!(scanner.feed(&filler).unwrap(), None);
        assert_eq!(scanner.feed(b"yyy\ntarget 5\n").unwrap(), Some(5.0));
    }

    #[test]
    fn invalid_utf8_does_not_abort_scan() {
        let mut text = b"junk \xff\xfe 1\n".to_vec();
        text.extend_from_slice(b"good 2\n");
        assert_eq!(find_value(&text[..], "good").unwrap(), 2.0);
    }

    #[tokio::test]
    async fn body_frames_are_scanned() {
        let body = http_body_util::Full::new(bytes::Bytes::from_static(
            b"# HELP node_cpu cpu time\nnode_cpu{cpu=\"cpu0\",mode=\"idle\"} 123.45\n",
        ));
        let value = find_value_in_body(body, "node_cpu{cpu=\"cpu0\",mode=\"idle\"}", "test://")
            .await
            .unwrap();
        assert_eq!(value, 123.45);
    }
}
