use std::net::SocketAddr;

use anyhow::{Context, Result, bail};
use tokio::{
    io::BufReader,
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};
use tracing::info;

use crate::{
    cli::QueryArgs,
    message::{Reply, read_reply, write_binary, write_command},
};

/// Minimal protocol client, used by the `query` subcommand and the tests.
pub struct NwaClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl NwaClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("failed to connect to {addr}"))?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
        })
    }

    pub async fn send_command(&mut self, line: &str) -> Result<()> {
        write_command(&mut self.writer, line).await?;
        Ok(())
    }

    pub async fn send_binary(&mut self, payload: &[u8]) -> Result<()> {
        write_binary(&mut self.writer, payload).await?;
        Ok(())
    }

    pub async fn read_reply(&mut self) -> Result<Reply> {
        match read_reply(&mut self.reader).await? {
            Some(reply) => Ok(reply),
            None => bail!("server closed the connection"),
        }
    }

    /// Sends a command and waits for its reply.
    pub async fn command(&mut self, line: &str) -> Result<Reply> {
        self.send_command(line).await?;
        self.read_reply().await
    }

    /// Sends `bcore_write` plus its payload and returns every reply up to the
    /// closing acknowledgement.
    pub async fn write_memory(
        &mut self,
        region: &str,
        spans: &[(usize, usize)],
        payload: &[u8],
    ) -> Result<Vec<Reply>> {
        self.send_command(&format!("bcore_write {region};{}", join_spans(spans)))
            .await?;
        self.send_binary(payload).await?;

        let mut replies = Vec::new();
        loop {
            let reply = self.read_reply().await?;
            let done = reply == Reply::ack();
            replies.push(reply);
            if done {
                return Ok(replies);
            }
        }
    }

    pub async fn read_memory(&mut self, region: &str, spans: &[(usize, usize)]) -> Result<Reply> {
        self.command(&format!("core_read {region};{}", join_spans(spans)))
            .await
    }
}

fn join_spans(spans: &[(usize, usize)]) -> String {
    spans
        .iter()
        .map(|(offset, len)| format!("${offset:X};{len}"))
        .collect::<Vec<_>>()
        .join(";")
}

/// Runs one `query` invocation and prints the reply to stdout.
pub async fn run(args: QueryArgs) -> Result<()> {
    let mut client = NwaClient::connect(args.server).await?;
    info!("connected to {}", args.server);

    let line = args.command.join(" ");
    client.send_command(&line).await?;
    if let Some(payload) = &args.payload {
        client.send_binary(&decode_hex(payload)?).await?;
    }

    loop {
        let reply = client.read_reply().await?;
        print!("{}", render(&reply));
        // A binary frame is answered by an optional error and then the bare acknowledgement.
        if args.payload.is_none() || reply == Reply::ack() {
            return Ok(());
        }
    }
}

fn render(reply: &Reply) -> String {
    match reply {
        Reply::Text(fields) if fields.is_empty() => "ok\n".to_string(),
        Reply::Text(fields) => fields
            .iter()
            .map(|(key, value)| format!("{key}:{value}\n"))
            .collect(),
        Reply::Binary(payload) => payload
            .chunks(16)
            .map(|row| format!("{}\n", hex::encode(row)))
            .collect(),
    }
}

/// Parses a hex string such as `aabbccdd` or `aa bb cc dd`.
pub fn decode_hex(text: &str) -> Result<Vec<u8>> {
    let digits: String = text.split_whitespace().collect();
    hex::decode(&digits).with_context(|| format!("invalid hex payload '{text}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_hex_with_or_without_spaces() {
        assert_eq!(decode_hex("aabbccdd").expect("hex"), vec![0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(decode_hex("01 02 ff").expect("hex"), vec![1, 2, 0xFF]);
        assert!(decode_hex("abc").is_err());
        assert!(decode_hex("zz").is_err());
    }

    #[test]
    fn spans_render_as_hex_offsets() {
        assert_eq!(join_spans(&[(0x10, 4), (0, 2)]), "$10;4;$0;2");
    }

    #[test]
    fn renders_replies_for_terminals() {
        assert_eq!(render(&Reply::ack()), "ok\n");
        assert_eq!(render(&Reply::fields([("state", "paused")])), "state:paused\n");
        assert_eq!(render(&Reply::Binary(vec![0xDE, 0xAD])), "dead\n");
        assert_eq!(render(&Reply::Binary(vec![0; 17])), format!("{}\n00\n", "00".repeat(16)));
    }
}
