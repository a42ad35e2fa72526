//! Line Framing
//!
//! Every request begins with a command line terminated by `\n`, normally
//! written as `\r\n`. Both forms are accepted. A line longer than
//! [`MAX_LINE_LENGTH`] is rejected instead of being silently cut, so a key or
//! numeric field can never be truncated by the reader.

use crate::protocol::parser::{ParseError, ReadError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Longest accepted command line, excluding the terminator
pub const MAX_LINE_LENGTH: usize = 2048;

/// Reads one command line into `line`, without its terminator.
///
/// Returns `Ok(false)` if the peer closed the connection cleanly before
/// sending anything.
pub async fn read_line<R>(reader: &mut R, line: &mut Vec<u8>) -> Result<bool, ReadError>
where
    R: AsyncBufRead + Unpin,
{
    line.clear();

    // Room for the longest line plus "\r\n"
    let limit = MAX_LINE_LENGTH as u64 + 2;
    let n = (&mut *reader).take(limit).read_until(b'\n', line).await?;

    if n == 0 {
        return Ok(false);
    }

    if line.last() != Some(&b'\n') {
        if n as u64 >= limit {
            return Err(ParseError::LineTooLong {
                max: MAX_LINE_LENGTH,
            }
            .into());
        }
        return Err(ReadError::UnexpectedEof);
    }

    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }

    if line.len() > MAX_LINE_LENGTH {
        return Err(ParseError::LineTooLong {
            max: MAX_LINE_LENGTH,
        }
        .into());
    }

    Ok(true)
}
