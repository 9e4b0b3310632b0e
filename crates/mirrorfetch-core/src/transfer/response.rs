//! Response head tracking and the status → write-mode decision.

/// Status line and length of the response currently being received.
///
/// Fed from curl's header callback one line at a time. Every status line resets the
/// state, so after a redirect chain only the final response is described.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct ResponseHead {
    pub status: u32,
    pub content_length: Option<u64>,
}

impl ResponseHead {
    pub fn feed(&mut self, raw: &[u8]) {
        let Ok(line) = std::str::from_utf8(raw) else {
            return;
        };
        let line = line.trim();
        if line.starts_with("HTTP/") {
            *self = Self {
                status: line
                    .split_whitespace()
                    .nth(1)
                    .and_then(|code| code.parse().ok())
                    .unwrap_or(0),
                content_length: None,
            };
            return;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                self.content_length = value.trim().parse().ok();
            }
        }
    }

    /// Size of the complete file as far as this response tells us; 0 when unknown.
    pub fn total_bytes(&self, mode: BodyMode, offset: u64) -> u64 {
        match (mode, self.content_length) {
            (_, None) => 0,
            (BodyMode::Append, Some(len)) => offset + len,
            (_, Some(len)) => len,
        }
    }
}

/// How a successful body is written to the part file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BodyMode {
    /// 206: continue after the bytes already on disk.
    Append,
    /// Nothing on disk yet; write from 0.
    Fresh,
    /// Partial file on disk but the server ignored the range: discard and write from 0.
    Restart,
}

/// What to do with a response given the resume offset that was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Reply {
    AlreadyComplete,
    Write(BodyMode),
    Reject(u32),
}

pub(super) fn classify(status: u32, offset: u64) -> Reply {
    match status {
        416 if offset > 0 => Reply::AlreadyComplete,
        206 if offset > 0 => Reply::Write(BodyMode::Append),
        200..=299 if offset > 0 => Reply::Write(BodyMode::Restart),
        200..=299 => Reply::Write(BodyMode::Fresh),
        other => Reply::Reject(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head_of(lines: &[&str]) -> ResponseHead {
        let mut head = ResponseHead::default();
        for line in lines {
            head.feed(format!("{line}\r\n").as_bytes());
        }
        head
    }

    #[test]
    fn reads_status_and_length() {
        let head = head_of(&["HTTP/1.1 206 Partial Content", "Content-Length: 900", ""]);
        assert_eq!(head.status, 206);
        assert_eq!(head.content_length, Some(900));
    }

    #[test]
    fn redirect_resets_head() {
        let head = head_of(&[
            "HTTP/1.1 302 Found",
            "Location: https://cdn.example.com/x",
            "Content-Length: 12",
            "",
            "HTTP/2 200",
            "content-type: application/octet-stream",
        ]);
        assert_eq!(head.status, 200);
        assert_eq!(head.content_length, None);
    }

    #[test]
    fn total_depends_on_mode() {
        let head = head_of(&["HTTP/1.1 206 Partial Content", "Content-Length: 600"]);
        assert_eq!(head.total_bytes(BodyMode::Append, 400), 1000);
        assert_eq!(head.total_bytes(BodyMode::Restart, 400), 600);
        assert_eq!(ResponseHead::default().total_bytes(BodyMode::Fresh, 0), 0);
    }

    #[test]
    fn classification_table() {
        assert_eq!(classify(416, 100), Reply::AlreadyComplete);
        assert_eq!(classify(416, 0), Reply::Reject(416));
        assert_eq!(classify(206, 100), Reply::Write(BodyMode::Append));
        assert_eq!(classify(206, 0), Reply::Write(BodyMode::Fresh));
        assert_eq!(classify(200, 100), Reply::Write(BodyMode::Restart));
        assert_eq!(classify(200, 0), Reply::Write(BodyMode::Fresh));
        assert_eq!(classify(404, 0), Reply::Reject(404));
        assert_eq!(classify(503, 50), Reply::Reject(503));
    }
}
