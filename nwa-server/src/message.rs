use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    error::CommandError,
    frame::{BINARY_MARKER, encode_binary},
};

/// A reply sent to a client.
///
/// Text replies use the envelope `\n` + `key:value\n`* + `\n`; binary replies
/// reuse the request framing (`0x00`, big-endian length, payload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(Vec<(String, String)>),
    Binary(Vec<u8>),
}

impl Reply {
    /// The empty envelope used to acknowledge lifecycle commands and writes.
    pub fn ack() -> Self {
        Reply::Text(Vec::new())
    }

    pub fn fields<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Reply::Text(
            fields
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    pub fn error(err: &CommandError) -> Self {
        Reply::fields([("error", err.kind().as_str().to_string()), ("reason", err.to_string())])
    }

    /// First value recorded under `key`, for text replies.
    pub fn get(&self, key: &str) -> Option<&str> {
        match self {
            Reply::Text(fields) => fields
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.as_str()),
            Reply::Binary(_) => None,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) -> io::Result<()> {
        match self {
            Reply::Text(fields) => {
                out.push(b'\n');
                for (key, value) in fields {
                    out.extend_from_slice(key.as_bytes());
                    out.push(b':');
                    out.extend_from_slice(value.as_bytes());
                    out.push(b'\n');
                }
                out.push(b'\n');
                Ok(())
            }
            Reply::Binary(payload) => encode_binary(payload, out)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err)),
        }
    }
}

/// Reads one reply, or `None` if the peer closed the stream first.
pub async fn read_reply<R>(reader: &mut R) -> io::Result<Option<Reply>>
where
    R: AsyncBufRead + Unpin,
{
    let mut marker = [0u8; 1];
    match reader.read_exact(&mut marker).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }

    match marker[0] {
        BINARY_MARKER => {
            let len = reader.read_u32().await? as usize;
            let mut payload = vec![0; len];
            reader.read_exact(&mut payload).await?;
            Ok(Some(Reply::Binary(payload)))
        }
        b'\n' => read_fields(reader).await.map(|fields| Some(Reply::Text(fields))),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected reply marker {other:#04x}"),
        )),
    }
}

async fn read_fields<R>(reader: &mut R) -> io::Result<Vec<(String, String)>>
where
    R: AsyncBufRead + Unpin,
{
    let mut fields = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed inside a reply",
            ));
        }

        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            return Ok(fields);
        }

        let (key, value) = trimmed.split_once(':').unwrap_or((trimmed, ""));
        fields.push((key.to_string(), value.to_string()));
    }
}

/// Sends a command line, appending the newline terminator.
pub async fn write_command<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = Vec::with_capacity(line.len() + 1);
    encoded.extend_from_slice(line.as_bytes());
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await
}

/// Sends `payload` as a binary frame.
pub async fn write_binary<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = Vec::new();
    Reply::Binary(payload.to_vec()).encode(&mut encoded)?;
    writer.write_all(&encoded).await?;
    writer.flush().await
}
