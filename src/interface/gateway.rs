//! Per-connection session gateway
//!
//! Frames the inbound byte stream into command lines for the switch and
//! writes the switch's events back out. The gateway never touches switch
//! state itself.

use super::protocol::{self, ClientCommand};
use crate::application::event::SwitchEvent;
use crate::application::sink::{ChannelSink, EventSink};
use crate::application::switch::Switch;
use crate::domain::shared::error::SwitchError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::SubscriberNumber;
use crate::infrastructure::metrics;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info, warn};

/// How long queued events may take to drain after the reader is done
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Events queued for one handset before it counts as not reading
const OUTBOUND_QUEUE: usize = 256;

/// Gateway
///
/// One per connected handset.
pub struct Gateway {
    switch: Arc<Switch>,
    sink: Arc<ChannelSink>,
    number: Option<SubscriberNumber>,
}

impl Gateway {
    /// Serve one connection until it closes, then unregister its subscriber.
    pub async fn serve<S, P>(switch: Arc<Switch>, stream: S, peer: P)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
        P: Display + Send + Sync + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (sink, rx) = ChannelSink::new(OUTBOUND_QUEUE);
        let overflow = sink.overflow();
        let mut write_task = tokio::spawn(write_loop(writer, rx));

        let mut gateway = Gateway {
            switch,
            sink: Arc::new(sink),
            number: None,
        };

        let mut reader = BufReader::new(reader);
        // Survives cancelled reads, so a partial line is never lost.
        let mut buf = Vec::new();
        let mut writer_done = false;
        let mut stalled = false;
        loop {
            tokio::select! {
                read = reader.read_until(b'\n', &mut buf) => match read {
                    Ok(0) => {
                        debug!("Connection closed by {}", peer);
                        break;
                    }
                    Ok(_) => {
                        gateway.handle_line(&buf).await;
                        buf.clear();
                    }
                    Err(e) => {
                        warn!("Failed to read from {}: {}", peer, e);
                        break;
                    }
                },
                _ = overflow.notified() => {
                    warn!("Outbound queue for {} is full, hanging up", peer);
                    stalled = true;
                    break;
                }
                _ = &mut write_task => {
                    debug!("Writer for {} stopped", peer);
                    writer_done = true;
                    break;
                }
            }
        }

        if let Some(number) = gateway.number.take() {
            info!("Subscriber {} ({}) disconnected", number, peer);
            gateway.switch.unregister(&number).await;
        }

        // The switch no longer holds the sink, so dropping ours ends the writer.
        drop(gateway);
        if writer_done {
            return;
        }
        if stalled {
            write_task.abort();
        } else if tokio::time::timeout(FLUSH_TIMEOUT, &mut write_task).await.is_err() {
            warn!("Timed out flushing events to {}", peer);
            write_task.abort();
        }
    }

    async fn handle_line(&mut self, raw: &[u8]) {
        let command = match protocol::decode_line(raw).and_then(protocol::parse_line) {
            Ok(Some(command)) => command,
            Ok(None) => return,
            Err(e) => {
                debug!("Rejected line {:?}: {}", String::from_utf8_lossy(raw), e);
                metrics::record_command_rejected(e.kind());
                self.reply_error(e.to_string());
                return;
            }
        };

        if let Err(e) = self.execute(command).await {
            debug!("Command {:?} rejected: {}", String::from_utf8_lossy(raw), e);
            metrics::record_command_rejected(e.kind());
            self.reply_error(e.to_string());
        }
    }

    async fn execute(&mut self, command: ClientCommand) -> Result<()> {
        match command {
            ClientCommand::Connect => self.connect().await,
            ClientCommand::Pickup => self.switch.pickup(self.registered()?).await,
            ClientCommand::Hangup => self.switch.hangup(self.registered()?).await,
            ClientCommand::Dial(target) => self.switch.dial(self.registered()?, &target).await,
            ClientCommand::Message(text) => self.switch.relay(self.registered()?, &text).await,
        }
    }

    fn registered(&self) -> Result<&SubscriberNumber> {
        self.number.as_ref().ok_or(SwitchError::NotRegistered)
    }

    async fn connect(&mut self) -> Result<()> {
        if self.number.is_some() {
            return Err(SwitchError::AlreadyRegistered);
        }
        let number = self.switch.register(self.sink.clone()).await;
        self.number = Some(number);
        Ok(())
    }

    fn reply_error(&self, reason: String) {
        // A full sink raises the overflow signal; a closed one means the
        // writer is gone. The read loop handles both.
        let _ = self.sink.deliver(SwitchEvent::Error(reason));
    }
}

/// Single writer per connection, so lines never interleave.
async fn write_loop<W>(mut writer: W, mut rx: Receiver<SwitchEvent>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = rx.recv().await {
        let line = match protocol::encode(&event) {
            Ok(line) => line,
            Err(e) => {
                error!("{}", e);
                continue;
            }
        };
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    writer.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExchangeConfig;
    use tokio::io::{AsyncBufReadExt, DuplexStream, Lines};
    use tokio::time::timeout;
    use tokio_test::assert_ok;

    struct Handset {
        lines: Lines<BufReader<tokio::io::ReadHalf<DuplexStream>>>,
        writer: tokio::io::WriteHalf<DuplexStream>,
    }

    impl Handset {
        async fn send(&mut self, line: &str) {
            self.send_bytes(format!("{line}\n").as_bytes()).await;
        }

        async fn send_bytes(&mut self, bytes: &[u8]) {
            assert_ok!(self.writer.write_all(bytes).await);
        }

        /// Next line that is not a roster snapshot
        async fn next(&mut self) -> String {
            loop {
                let line = timeout(Duration::from_secs(2), self.lines.next_line())
                    .await
                    .expect("timed out waiting for a line")
                    .unwrap()
                    .expect("connection closed");
                if !line.starts_with("SUBSCRIBERS:") {
                    return line;
                }
            }
        }
    }

    fn attach(switch: &Arc<Switch>) -> Handset {
        let (client, server) = tokio::io::duplex(4096);
        tokio::spawn(Gateway::serve(switch.clone(), server, "test"));
        let (reader, writer) = tokio::io::split(client);
        Handset {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn wait_for_subscribers(switch: &Switch, count: usize) {
        timeout(Duration::from_secs(2), async {
            while switch.subscriber_count().await != count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("subscriber count never settled");
    }

    fn switch() -> Arc<Switch> {
        Arc::new(Switch::new(ExchangeConfig {
            max_connections: 2,
            number_length: 3,
        }))
    }

    #[tokio::test]
    async fn test_connect_assigns_number() {
        let switch = switch();
        let mut phone = attach(&switch);

        phone.send("CONNECT").await;
        assert_eq!(phone.next().await, "ASSIGNED:001");
        assert_eq!(phone.next().await, "STATE:Idle");
    }

    #[tokio::test]
    async fn test_commands_before_connect_are_rejected() {
        let switch = switch();
        let mut phone = attach(&switch);

        phone.send("PICKUP").await;
        assert_eq!(phone.next().await, "ERROR:not registered");
        phone.send("BOGUS").await;
        assert_eq!(phone.next().await, "ERROR:unknown command: BOGUS");

        // Connection stays usable
        phone.send("CONNECT").await;
        assert_eq!(phone.next().await, "ASSIGNED:001");
    }

    #[tokio::test]
    async fn test_second_connect_is_rejected() {
        let switch = switch();
        let mut phone = attach(&switch);

        phone.send("CONNECT").await;
        assert_eq!(phone.next().await, "ASSIGNED:001");
        assert_eq!(phone.next().await, "STATE:Idle");
        phone.send("CONNECT").await;
        assert_eq!(phone.next().await, "ERROR:already registered");
        assert_eq!(switch.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn test_roster_line_is_json() {
        let switch = switch();
        let mut phone = attach(&switch);
        phone.send("CONNECT").await;

        let mut roster = None;
        for _ in 0..3 {
            let line = timeout(Duration::from_secs(2), phone.lines.next_line())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let Some(json) = line.strip_prefix("SUBSCRIBERS:") {
                roster = Some(json.to_string());
                break;
            }
        }
        let value: serde_json::Value = serde_json::from_str(&roster.unwrap()).unwrap();
        assert_eq!(value[0]["number"], "001");
        assert_eq!(value[0]["state"], "Idle");
    }

    #[tokio::test]
    async fn test_disconnect_unregisters() {
        let switch = switch();
        let mut a = attach(&switch);
        let mut b = attach(&switch);
        a.send("CONNECT").await;
        assert_eq!(a.next().await, "ASSIGNED:001");
        b.send("CONNECT").await;
        assert_eq!(b.next().await, "ASSIGNED:002");

        a.send("PICKUP").await;
        a.send("DIAL:002").await;
        assert_eq!(b.next().await, "STATE:Idle");
        assert_eq!(b.next().await, "INCOMING_CALL:001");
        assert_eq!(b.next().await, "STATE:Ringing");

        drop(a);
        assert_eq!(b.next().await, "CALL_ENDED");
        assert_eq!(b.next().await, "STATE:Idle");

        wait_for_subscribers(&switch, 1).await;
        assert_eq!(switch.active_call_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_keeps_session() {
        let switch = switch();
        let mut phone = attach(&switch);
        phone.send("CONNECT").await;
        assert_eq!(phone.next().await, "ASSIGNED:001");
        assert_eq!(phone.next().await, "STATE:Idle");

        phone.send_bytes(b"MESSAGE:\xff\xfe\n").await;
        assert_eq!(phone.next().await, "ERROR:malformed command");
        assert_eq!(switch.subscriber_count().await, 1);

        phone.send("PICKUP").await;
        assert_eq!(phone.next().await, "SIGNAL:ready");
        assert_eq!(phone.next().await, "STATE:Ready");
    }

    #[tokio::test]
    async fn test_line_split_across_writes_is_reassembled() {
        let switch = switch();
        let mut phone = attach(&switch);
        phone.send_bytes(b"CON").await;
        tokio::task::yield_now().await;
        phone.send_bytes(b"NECT\r\n").await;
        assert_eq!(phone.next().await, "ASSIGNED:001");
    }

    #[tokio::test]
    async fn test_handset_that_stops_reading_is_dropped() {
        let switch = switch();
        let mut deaf = attach(&switch);
        deaf.send("CONNECT").await;
        wait_for_subscribers(&switch, 1).await;

        let mut busy = attach(&switch);
        busy.send("CONNECT").await;
        assert_eq!(busy.next().await, "ASSIGNED:002");
        assert_eq!(busy.next().await, "STATE:Idle");

        // Every hangup broadcasts a roster to the deaf handset as well.
        let mut rounds = 0;
        while switch.subscriber_count().await == 2 {
            rounds += 1;
            assert!(rounds < 2000, "deaf handset was never dropped");
            busy.send("HANGUP").await;
            assert_eq!(busy.next().await, "STATE:Idle");
        }
        assert_eq!(switch.subscriber_count().await, 1);
        assert_eq!(switch.snapshot().await[0].number, "002");

        // Its connection is closed once the buffered lines are read.
        timeout(Duration::from_secs(2), async {
            while deaf.lines.next_line().await.unwrap().is_some() {}
        })
        .await
        .expect("deaf handset was never closed");

        busy.send("PICKUP").await;
        assert_eq!(busy.next().await, "SIGNAL:ready");
    }
}
