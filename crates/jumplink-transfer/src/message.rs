//! Text message exchange: the other `mode` a [`crate::service`] session
//! can run, alongside file transfer. A lighter-weight request/response
//! loop over the same MSG frames, with no handshake and no adaptive
//! chunking.

use jumplink_protocol::{Frame, FrameCodec, Transport};

use crate::error::TransferError;

const SENTINELS: [&str; 3] = ["exit", "quit", "bye"];

/// Server side of a message exchange: send a welcome line, then echo
/// every message received back to the sender until it sends one of
/// [`SENTINELS`] or closes the connection.
pub struct MessageServer<'a> {
    codec: &'a FrameCodec,
}

impl<'a> MessageServer<'a> {
    pub fn new(codec: &'a FrameCodec) -> Self {
        Self { codec }
    }

    pub fn run(&self, transport: &mut dyn Transport, welcome: &str) -> Result<(), TransferError> {
        self.codec.write(transport, &Frame::msg(welcome))?;

        loop {
            let frame = self.codec.read(transport)?;
            let message = frame.as_text()?;
            if message.is_empty() || SENTINELS.contains(&message.to_lowercase().as_str()) {
                return Ok(());
            }
            tracing::info!(%message, "received message");
            let echo = format!("Echo from local machine: {message}");
            self.codec.write(transport, &Frame::msg(echo))?;
        }
    }
}

/// Client side of a message exchange: read the server's welcome line,
/// send each of `messages` in turn collecting the echoed responses,
/// then send a sentinel to close the exchange cleanly.
pub struct MessageClient<'a> {
    codec: &'a FrameCodec,
}

impl<'a> MessageClient<'a> {
    pub fn new(codec: &'a FrameCodec) -> Self {
        Self { codec }
    }

    pub fn run(
        &self,
        transport: &mut dyn Transport,
        messages: &[String],
    ) -> Result<Vec<String>, TransferError> {
        let welcome = self.codec.read(transport)?;
        tracing::info!(welcome = %welcome.as_text()?, "connected to message server");

        let mut responses = Vec::with_capacity(messages.len());
        for message in messages {
            self.codec.write(transport, &Frame::msg(message.as_str()))?;
            let response = self.codec.read(transport)?;
            responses.push(response.as_text()?.to_string());
        }

        self.codec.write(transport, &Frame::msg("exit"))?;
        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jumplink_protocol::pipe_pair;

    #[test]
    fn server_echoes_messages_until_the_client_says_exit() {
        let codec = FrameCodec::default();
        let (mut client_transport, mut server_transport) = pipe_pair();

        let messages = vec!["hello".to_string(), "world".to_string()];
        std::thread::scope(|scope| {
            scope.spawn(|| {
                let server = MessageServer::new(&codec);
                server.run(&mut server_transport, "welcome").unwrap();
            });

            let client = MessageClient::new(&codec);
            let responses = client.run(&mut client_transport, &messages).unwrap();
            assert_eq!(
                responses,
                vec![
                    "Echo from local machine: hello".to_string(),
                    "Echo from local machine: world".to_string(),
                ]
            );
        });
    }

    #[test]
    fn an_empty_message_list_still_completes_the_handshake() {
        let codec = FrameCodec::default();
        let (mut client_transport, mut server_transport) = pipe_pair();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                let server = MessageServer::new(&codec);
                server.run(&mut server_transport, "hi").unwrap();
            });

            let client = MessageClient::new(&codec);
            let responses = client.run(&mut client_transport, &[]).unwrap();
            assert!(responses.is_empty());
        });
    }
}
