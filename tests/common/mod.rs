#![allow(dead_code)]

use pgconduit::protocol::backend::{
    AuthenticationMessage, BackendKeyData, CommandComplete, ParameterStatus, ReadyForQuery,
};
use pgconduit::{BackendMessage, Client, Opts, TransactionStatus};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};

/// Scripted server side of a connection.
pub struct MockServer<S = DuplexStream> {
    stream: S,
}

impl<S: AsyncRead + AsyncWrite + Unpin> MockServer<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Read an untagged startup packet and return its parameters.
    pub async fn read_startup(&mut self) -> Vec<(String, String)> {
        let len = self.stream.read_i32().await.unwrap() as usize;
        let mut body = vec![0; len - 4];
        self.stream.read_exact(&mut body).await.unwrap();
        assert_eq!(&body[..4], &196608_i32.to_be_bytes());

        let mut params = Vec::new();
        let mut parts = body[4..].split(|b| *b == 0).map(|s| String::from_utf8(s.to_vec()).unwrap());
        while let Some(name) = parts.next() {
            if name.is_empty() {
                break;
            }
            params.push((name, parts.next().unwrap()));
        }
        params
    }

    /// Read one tagged frontend message.
    pub async fn read_message(&mut self) -> (u8, Vec<u8>) {
        let tag = self.stream.read_u8().await.unwrap();
        let len = self.stream.read_i32().await.unwrap() as usize;
        let mut payload = vec![0; len - 4];
        self.stream.read_exact(&mut payload).await.unwrap();
        (tag, payload)
    }

    /// Read one message and check its tag.
    pub async fn expect(&mut self, tag: u8) -> Vec<u8> {
        let (actual, payload) = self.read_message().await;
        assert_eq!(actual as char, tag as char, "unexpected frontend message");
        payload
    }

    /// Read `tags.len()` messages and check their tags in order.
    pub async fn expect_all(&mut self, tags: &[u8]) {
        for &tag in tags {
            self.expect(tag).await;
        }
    }

    pub async fn send(&mut self, messages: &[BackendMessage]) {
        let mut buf = Vec::new();
        for msg in messages {
            msg.encode(&mut buf);
        }
        self.stream.write_all(&buf).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    /// Finish startup after authentication succeeded.
    pub async fn ready(&mut self, key: Option<BackendKeyData>) {
        let mut messages = vec![
            auth(AuthenticationMessage::Ok),
            parameter("server_version", "16.2"),
            parameter("client_encoding", "UTF8"),
        ];
        if let Some(key) = key {
            messages.push(BackendMessage::BackendKeyData(key));
        }
        messages.push(ready(TransactionStatus::Idle));
        self.send(&messages).await;
    }

    /// Trust-authenticated startup.
    pub async fn accept(&mut self, key: Option<BackendKeyData>) {
        self.read_startup().await;
        self.ready(key).await;
    }

    /// Answer a Query with a single command tag.
    pub async fn answer_command(&mut self, tag: &str, status: TransactionStatus) {
        self.expect(b'Q').await;
        self.send(&[complete(tag), ready(status)]).await;
    }

    /// Wait until the client side closes the stream.
    pub async fn expect_eof(&mut self) {
        let mut rest = Vec::new();
        self.stream.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty(), "trailing bytes: {:?}", rest);
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

pub fn key() -> BackendKeyData {
    BackendKeyData {
        process_id: 4242,
        secret_key: 777,
    }
}

pub fn auth(msg: AuthenticationMessage) -> BackendMessage {
    BackendMessage::Authentication(msg)
}

pub fn parameter(name: &str, value: &str) -> BackendMessage {
    BackendMessage::ParameterStatus(ParameterStatus {
        name: name.into(),
        value: value.into(),
    })
}

pub fn ready(status: TransactionStatus) -> BackendMessage {
    ReadyForQuery::message(status)
}

pub fn complete(tag: &str) -> BackendMessage {
    BackendMessage::CommandComplete(CommandComplete::from_tag(tag))
}

pub fn opts() -> Opts {
    Opts {
        user: "alice".into(),
        database: Some("app".into()),
        password: Some("pw".into()),
        ..Opts::default()
    }
}

/// Connected client plus the server end, with trust authentication.
pub async fn connect(key: Option<BackendKeyData>) -> (Client, MockServer) {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let mut server = MockServer::new(server_io);
    let (client, ()) = tokio::join!(
        Client::connect_with_stream(client_io, opts()),
        server.accept(key)
    );
    (client.unwrap(), server)
}
