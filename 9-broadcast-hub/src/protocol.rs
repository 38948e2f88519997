//! Newline-delimited text protocol spoken with clients.
//!
//! Clients send raw lines. Every server line is built by one of the
//! formatting helpers below so the exact wording lives in one place.

use std::{fmt::Display, io};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::session::SessionId;

const LINE_ENDINGS: &[char] = &['\n', '\r'];

pub const SERVER_FULL: &str = "server is full";
pub const SHUTTING_DOWN: &str = "server shutting down";

pub fn greeting(id: &SessionId) -> String {
    format!("You are {id}")
}

/// Roster notice sent to a newcomer. Names are joined with `", "` and the
/// list carries no trailing separator, so the line ends at the last name
/// rather than with a dangling `", "`.
pub fn membership<I, N>(names: I) -> String
where
    I: IntoIterator<Item = N>,
    N: Display,
{
    let names: Vec<String> = names.into_iter().map(|name| name.to_string()).collect();
    format!(
        "The number of current clients: {},  List of Current clients: {}",
        names.len(),
        names.join(", ")
    )
}

pub fn chat(sender: &SessionId, text: &str) -> String {
    format!("{sender}: {text}")
}

pub fn arrived(id: &SessionId) -> String {
    format!("{id} has arrived")
}

pub fn left(id: &SessionId) -> String {
    format!("{id} has left")
}

/// Reads one line, without its terminator. `Ok(None)` means end of stream.
///
/// Bytes that are not valid UTF-8 are replaced rather than failing the read.
pub async fn read_line<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let bytes = reader.read_until(b'\n', &mut buf).await?;
    if bytes == 0 {
        return Ok(None);
    }

    let line = String::from_utf8_lossy(&buf);
    Ok(Some(line.trim_end_matches(LINE_ENDINGS).to_string()))
}

pub async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
