//! Scripted in-process FTP server pieces shared by the integration
//! tests. Each test drives the client against an exact command/reply
//! dialogue; any unexpected command fails the server task and, through
//! `JoinHandle::await`, the test.
#![allow(dead_code)]

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Bind a listener on an ephemeral localhost port.
pub async fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Server side of a control connection.
pub struct MockCtrl {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl MockCtrl {
    pub fn new(stream: TcpStream) -> Self {
        let (rd, wr) = stream.into_split();
        Self {
            reader: BufReader::new(rd),
            writer: wr,
        }
    }

    /// Accept the next control connection and greet it.
    pub async fn accept(listener: &TcpListener, welcome: &str) -> Self {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ctrl = Self::new(stream);
        ctrl.send(welcome).await;
        ctrl
    }

    pub async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .unwrap();
    }

    /// Send several reply lines in one flush (multi-line replies).
    pub async fn send_lines(&mut self, lines: &[&str]) {
        let mut body = String::new();
        for line in lines {
            body.push_str(line);
            body.push_str("\r\n");
        }
        self.writer.write_all(body.as_bytes()).await.unwrap();
    }

    pub async fn recv(&mut self) -> String {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await.unwrap();
        assert!(n > 0, "client closed the control connection");
        line.trim_end().to_string()
    }

    /// Read the next command and assert it is exactly `expected`.
    pub async fn expect(&mut self, expected: &str) {
        let got = self.recv().await;
        assert_eq!(got, expected, "unexpected command from client");
    }

    /// The EPSV reply pointing at `port`.
    pub fn epsv_reply(port: u16) -> String {
        format!("229 Entering Extended Passive Mode (|||{}|)", port)
    }

    /// The PASV reply pointing at 127.0.0.1:`port`.
    pub fn pasv_reply(port: u16) -> String {
        format!(
            "227 Entering Passive Mode (127,0,0,1,{},{})",
            port / 256,
            port % 256
        )
    }
}
