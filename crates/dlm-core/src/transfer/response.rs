//! Response head parsing and length/offset resolution.

use super::TransferError;

/// Status and length headers of the final response (after redirects).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u32,
    /// `Content-Length` of this response body.
    pub content_length: Option<u64>,
    /// First byte `a` from `Content-Range: bytes a-b/total`.
    pub range_start: Option<u64>,
    /// Total from `Content-Range: bytes a-b/total`, if present and numeric.
    pub range_total: Option<u64>,
}

/// Parse raw header lines. Each `HTTP/` status line starts a new response, so
/// only the last one in a redirect chain is kept.
pub(crate) fn parse_head(lines: &[String]) -> ResponseHead {
    let mut head = ResponseHead::default();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            head = ResponseHead {
                status: line
                    .split_whitespace()
                    .nth(1)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
                ..ResponseHead::default()
            };
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                head.content_length = value.parse::<u64>().ok();
            } else if name.eq_ignore_ascii_case("content-range") {
                let (span, total) = value.rsplit_once('/').unwrap_or((value, ""));
                head.range_total = total.trim().parse::<u64>().ok();
                head.range_start = span
                    .trim()
                    .strip_prefix("bytes")
                    .and_then(|s| s.trim().split_once('-'))
                    .and_then(|(a, _)| a.trim().parse::<u64>().ok());
            }
        }
    }
    head
}

/// Where writing starts and how long the whole resource is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    /// Byte offset of the first body byte in the destination file.
    pub offset: u64,
    pub content_length: u64,
    /// The server ignored our range; existing bytes must be discarded.
    pub restarted: bool,
}

/// Accept 200/206 with a positive total length.
///
/// `range_start` is the offset we asked for (None = whole resource);
/// `known_length` is the total recorded by an earlier run. A 206 that starts
/// at byte 0 is treated like a 200; one that starts anywhere else but the
/// requested offset is refused.
pub(crate) fn resolve(
    head: &ResponseHead,
    range_start: Option<u64>,
    known_length: u64,
) -> Result<Resolved, TransferError> {
    let resolved = match (head.status, range_start) {
        (206, Some(start)) => match head.range_start {
            Some(0) if start > 0 => Resolved {
                offset: 0,
                content_length: head.range_total.unwrap_or(known_length),
                restarted: true,
            },
            Some(got) if got != start => {
                return Err(TransferError::RangeMismatch {
                    requested: start,
                    got,
                })
            }
            _ => Resolved {
                offset: start,
                content_length: head.range_total.unwrap_or(known_length),
                restarted: false,
            },
        },
        (206, None) => Resolved {
            offset: 0,
            content_length: head.range_total.or(head.content_length).unwrap_or(0),
            restarted: false,
        },
        (200, start) => Resolved {
            offset: 0,
            content_length: head.content_length.unwrap_or(0),
            restarted: start.is_some(),
        },
        (status, _) => return Err(TransferError::Http(status)),
    };
    if resolved.content_length == 0 {
        return Err(TransferError::NoContentLength);
    }
    Ok(resolved)
}
