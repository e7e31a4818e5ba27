//! Server network layer handling TCP connections and per-connection tasks

use crate::connection::{Connection, Event, Outbound};
use crate::handler::{IdleTimeouts, ProtocolHandler};
use crate::matchmaker::Matchmaker;
use log::{debug, error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::Instant;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Runtime settings for a [`Server`]
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub timeouts: IdleTimeouts,
    /// Longest accepted line in bytes, terminator excluded.
    pub max_line_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            timeouts: IdleTimeouts::default(),
            max_line_length: 256,
        }
    }
}

/// Accepts clients and wires each one to its reader, writer and driver task
pub struct Server {
    listener: TcpListener,
    matchmaker: Arc<Matchmaker>,
    config: ServerConfig,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, BoxError> {
        let listener = TcpListener::bind(&config.addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            matchmaker: Arc::new(Matchmaker::new()),
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, BoxError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn matchmaker(&self) -> Arc<Matchmaker> {
        Arc::clone(&self.matchmaker)
    }

    /// Main accept loop. Only returns if the task is dropped.
    pub async fn run(self) -> Result<(), BoxError> {
        info!(
            "Server started successfully (timeouts {:?}, max line {} bytes)",
            self.config.timeouts, self.config.max_line_length
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => self.spawn_connection(stream, peer),
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {}: {}", peer, e);
        }

        let (conn, channels) = Connection::new(peer);
        let (read_half, write_half) = stream.into_split();

        tokio::spawn(read_lines(
            Arc::clone(&conn),
            BufReader::new(read_half),
            self.config.max_line_length,
        ));
        tokio::spawn(write_lines(Arc::clone(&conn), write_half, channels.outbound));

        let handler = ProtocolHandler::new(conn, Arc::clone(&self.matchmaker), self.config.timeouts);
        tokio::spawn(drive(handler, channels.mailbox));
    }
}

/// Reads one `\n`-terminated line, stripping an optional `\r`.
///
/// Returns `Ok(None)` at end of stream. A line longer than `max_line_length`
/// or one that is not valid UTF-8 is an `InvalidData` error.
pub async fn read_frame<R>(reader: &mut R, max_line_length: usize) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let limit = max_line_length as u64 + 2;
    let mut buf = Vec::new();

    let read = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if read == 0 {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if read as u64 == limit {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("line exceeds {} bytes", max_line_length),
        ));
    }

    if buf.len() > max_line_length {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("line exceeds {} bytes", max_line_length),
        ));
    }

    String::from_utf8(buf)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Reader task: posts every decoded line, then `Closed` once the stream ends,
/// fails, or the connection is closed locally.
async fn read_lines<R>(conn: Arc<Connection>, mut reader: R, max_line_length: usize)
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = conn.closed() => break,
            frame = read_frame(&mut reader, max_line_length) => frame,
        };

        match frame {
            Ok(Some(line)) => {
                if conn.post(Event::Line(line)).is_err() {
                    break;
                }
            }
            Ok(None) => {
                debug!("Client {} closed its stream", conn.id());
                break;
            }
            Err(e) => {
                warn!("Read from client {} failed: {}", conn.id(), e);
                break;
            }
        }
    }

    conn.close();
    let _ = conn.post(Event::Closed);
}

/// Writer task: flushes queued text until a close is requested.
async fn write_lines<W>(
    conn: Arc<Connection>,
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = outbound.recv().await {
        match message {
            Outbound::Text(text) => {
                if let Err(e) = writer.write_all(text.as_bytes()).await {
                    warn!("Write to client {} failed: {}", conn.id(), e);
                    conn.close();
                    break;
                }
            }
            Outbound::Close => break,
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown of client {} failed: {}", conn.id(), e);
    }
}

/// Driver task: the connection's execution context. Mailbox events and idle
/// timeouts reach the handler strictly one at a time.
async fn drive(mut handler: ProtocolHandler, mut mailbox: mpsc::UnboundedReceiver<Event>) {
    handler.on_connect();

    loop {
        let deadline = handler.idle_deadline();
        tokio::select! {
            biased;

            event = mailbox.recv() => match event {
                Some(Event::Closed) | None => break,
                Some(event) => handler.on_event(event),
            },
            _ = idle(deadline) => handler.on_idle_timeout(),
        }
    }

    handler.on_disconnect();

    // Work that was already queued still runs; anything later is refused.
    mailbox.close();
    while let Ok(event) = mailbox.try_recv() {
        handler.on_event(event);
    }
    debug!("Driver for client {} finished", handler.connection().id());
}

async fn idle(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rps_shared::messages;
    use tokio_test::io::Builder;

    fn test_peer() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.addr, "127.0.0.1:8080");
        assert_eq!(config.max_line_length, 256);
        assert_eq!(config.timeouts.in_match, Duration::from_secs(120));
        assert!(config.addr.parse::<SocketAddr>().is_ok());
    }

    #[tokio::test]
    async fn test_read_frame_strips_terminators() {
        let mock = Builder::new().read(b"alice\r\nrock\n").build();
        let mut reader = BufReader::new(mock);

        assert_eq!(read_frame(&mut reader, 16).await.unwrap(), Some("alice".to_string()));
        assert_eq!(read_frame(&mut reader, 16).await.unwrap(), Some("rock".to_string()));
        assert_eq!(read_frame(&mut reader, 16).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_frame_split_across_reads() {
        let mock = Builder::new().read(b"sci").read(b"ssors\r").read(b"\n").build();
        let mut reader = BufReader::new(mock);

        assert_eq!(read_frame(&mut reader, 16).await.unwrap(), Some("scissors".to_string()));
    }

    #[tokio::test]
    async fn test_read_frame_line_at_limit() {
        let mock = Builder::new().read(b"12345678\r\n12345678\n").build();
        let mut reader = BufReader::new(mock);

        assert_eq!(read_frame(&mut reader, 8).await.unwrap(), Some("12345678".to_string()));
        assert_eq!(read_frame(&mut reader, 8).await.unwrap(), Some("12345678".to_string()));
    }

    #[tokio::test]
    async fn test_read_frame_rejects_long_line() {
        let mock = Builder::new().read(b"this line is far too long\n").build();
        let mut reader = BufReader::new(mock);

        let err = read_frame(&mut reader, 8).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_read_frame_rejects_bad_utf8() {
        let mock = Builder::new().read(&[0x66, 0xff, 0xfe, b'\n']).build();
        let mut reader = BufReader::new(mock);

        let err = read_frame(&mut reader, 16).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_read_frame_unterminated_tail() {
        let mock = Builder::new().read(b"paper").build();
        let mut reader = BufReader::new(mock);

        assert_eq!(read_frame(&mut reader, 16).await.unwrap(), Some("paper".to_string()));
        assert_eq!(read_frame(&mut reader, 16).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reader_posts_lines_then_closed() {
        let (conn, mut channels) = Connection::new(test_peer());
        let mock = Builder::new().read(b"alice\r\n/help\r\n").build();

        read_lines(Arc::clone(&conn), BufReader::new(mock), 16).await;

        assert!(matches!(channels.mailbox.recv().await, Some(Event::Line(l)) if l == "alice"));
        assert!(matches!(channels.mailbox.recv().await, Some(Event::Line(l)) if l == "/help"));
        assert!(matches!(channels.mailbox.recv().await, Some(Event::Closed)));
        assert!(!conn.is_active());
    }

    #[tokio::test]
    async fn test_writer_flushes_text_before_close() {
        let (conn, channels) = Connection::new(test_peer());
        let mock = Builder::new().write(b"Bye!\r\n").build();

        conn.send("Bye!\r\n");
        conn.close();
        conn.send("dropped\r\n");

        write_lines(Arc::clone(&conn), mock, channels.outbound).await;
    }

    /// Collects outbound text until the connection queues its close.
    async fn text_until_close(outbound: &mut mpsc::UnboundedReceiver<Outbound>) -> String {
        let mut text = String::new();
        loop {
            match tokio::time::timeout(Duration::from_secs(600), outbound.recv()).await {
                Ok(Some(Outbound::Text(t))) => text.push_str(&t),
                Ok(Some(Outbound::Close)) => return text,
                other => panic!("Expected close after idle timeout, got {:?}", other),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_fires_idle_timeout() {
        let (conn, channels) = Connection::new(test_peer());
        let handler = ProtocolHandler::new(
            Arc::clone(&conn),
            Arc::new(Matchmaker::new()),
            IdleTimeouts::default(),
        );
        let mut outbound = channels.outbound;
        let started = Instant::now();
        let driver = tokio::spawn(drive(handler, channels.mailbox));

        let text = text_until_close(&mut outbound).await;
        assert!(text.starts_with(messages::WELCOME));
        assert!(text.ends_with(messages::TIMEOUT_NICKNAME));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(180) && elapsed < Duration::from_secs(181));

        conn.post(Event::Closed).unwrap();
        tokio::time::timeout(Duration::from_secs(2), driver)
            .await
            .expect("driver did not stop")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_input_restarts_idle_countdown() {
        let (conn, channels) = Connection::new(test_peer());
        let handler = ProtocolHandler::new(
            Arc::clone(&conn),
            Arc::new(Matchmaker::new()),
            IdleTimeouts::default(),
        );
        let mut outbound = channels.outbound;
        let started = Instant::now();
        let driver = tokio::spawn(drive(handler, channels.mailbox));

        tokio::time::sleep(Duration::from_secs(100)).await;
        conn.post(Event::Line("/help".to_string())).unwrap();

        let text = text_until_close(&mut outbound).await;
        assert!(text.contains(messages::HELP));
        assert!(text.ends_with(messages::TIMEOUT_NICKNAME));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(280) && elapsed < Duration::from_secs(281));

        conn.post(Event::Closed).unwrap();
        driver.await.unwrap();
    }
}
