//! Control-channel session behavior against a scripted server:
//! login, capability probing, path parsing, timeouts, teardown.

mod common;

use common::{bind, init_logs, MockCtrl};
use ftpkit::{FtpClient, FtpErrorKind};
use std::time::Duration;

#[tokio::test]
async fn connect_reads_multiline_welcome() {
    init_logs();
    let (listener, port) = bind().await;
    let server = tokio::spawn(async move {
        let mut ctrl = MockCtrl::accept(&listener, "220-Welcome to testd").await;
        ctrl.send("220 Ready").await;
    });

    let mut client = FtpClient::new();
    let welcome = client.connect("127.0.0.1", port).await.unwrap();
    assert_eq!(welcome.code, 220);
    assert_eq!(welcome.lines.len(), 2);
    server.await.unwrap();
}

#[tokio::test]
async fn login_sequence() {
    init_logs();
    let (listener, port) = bind().await;
    let server = tokio::spawn(async move {
        let mut ctrl = MockCtrl::accept(&listener, "220 hi").await;
        ctrl.expect("USER anonymous").await;
        ctrl.send("331 need pwd").await;
        ctrl.expect("PASS guest").await;
        ctrl.send("230 ok").await;
    });

    let mut client = FtpClient::new();
    client.connect("127.0.0.1", port).await.unwrap();
    let reply = client.login("anonymous", "guest").await.unwrap();
    assert_eq!(reply.code, 230);
    server.await.unwrap();
}

#[tokio::test]
async fn login_without_password_step() {
    init_logs();
    let (listener, port) = bind().await;
    let server = tokio::spawn(async move {
        let mut ctrl = MockCtrl::accept(&listener, "220 hi").await;
        ctrl.expect("USER anonymous").await;
        ctrl.send("230 already in").await;
    });

    let mut client = FtpClient::new();
    client.connect("127.0.0.1", port).await.unwrap();
    let reply = client.login("anonymous", "guest").await.unwrap();
    assert_eq!(reply.code, 230);
    server.await.unwrap();
}

#[tokio::test]
async fn login_rejects_account_demand() {
    init_logs();
    let (listener, port) = bind().await;
    let server = tokio::spawn(async move {
        let mut ctrl = MockCtrl::accept(&listener, "220 hi").await;
        ctrl.expect("USER corp").await;
        ctrl.send("332 Need account for login").await;
    });

    let mut client = FtpClient::new();
    client.connect("127.0.0.1", port).await.unwrap();
    let err = client.login("corp", "secret").await.unwrap_err();
    assert_eq!(err.kind, FtpErrorKind::Protocol);
    assert_eq!(err.code, Some(332));
    server.await.unwrap();
}

#[tokio::test]
async fn features_parses_and_caches() {
    init_logs();
    let (listener, port) = bind().await;
    let server = tokio::spawn(async move {
        let mut ctrl = MockCtrl::accept(&listener, "220 hi").await;
        ctrl.expect("FEAT").await;
        ctrl.send_lines(&["211-Features:", " MLSD", " SIZE", " UTF8", "211 End"])
            .await;
    });

    let mut client = FtpClient::new();
    client.connect("127.0.0.1", port).await.unwrap();

    let features = client.features().await.unwrap();
    assert_eq!(features.len(), 3);
    assert_eq!(features.get("MLSD").map(String::as_str), Some(""));
    assert_eq!(features.get("SIZE").map(String::as_str), Some(""));
    assert_eq!(features.get("UTF8").map(String::as_str), Some(""));
    server.await.unwrap();

    // Cached: no second FEAT goes over the wire (the script is done).
    let again = client.features().await.unwrap();
    assert_eq!(again.len(), 3);
}

#[tokio::test]
async fn features_tolerates_rejection() {
    init_logs();
    let (listener, port) = bind().await;
    let server = tokio::spawn(async move {
        let mut ctrl = MockCtrl::accept(&listener, "220 hi").await;
        ctrl.expect("FEAT").await;
        ctrl.send("502 Command not implemented").await;
    });

    let mut client = FtpClient::new();
    client.connect("127.0.0.1", port).await.unwrap();
    let features = client.features().await.unwrap();
    assert!(features.is_empty());
    server.await.unwrap();
}

#[tokio::test]
async fn pwd_parses_quoted_path() {
    init_logs();
    let (listener, port) = bind().await;
    let server = tokio::spawn(async move {
        let mut ctrl = MockCtrl::accept(&listener, "220 hi").await;
        ctrl.expect("PWD").await;
        ctrl.send("257 \"/home/user\" is current directory.").await;
        // Malformed reply: the operation fails but the session stays up.
        ctrl.expect("PWD").await;
        ctrl.send("257 bad").await;
        ctrl.expect("NOOP").await;
        ctrl.send("200 ok").await;
    });

    let mut client = FtpClient::new();
    client.connect("127.0.0.1", port).await.unwrap();

    assert_eq!(client.pwd().await.unwrap(), "/home/user");

    let err = client.pwd().await.unwrap_err();
    assert_eq!(err.kind, FtpErrorKind::Parse);

    client.noop().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn size_and_mdtm_parsing() {
    init_logs();
    let (listener, port) = bind().await;
    let server = tokio::spawn(async move {
        let mut ctrl = MockCtrl::accept(&listener, "220 hi").await;
        ctrl.expect("SIZE a.bin").await;
        ctrl.send("213 4096").await;
        ctrl.expect("MDTM a.bin").await;
        ctrl.send("213 20260101120000").await;
        ctrl.expect("SIZE b.bin").await;
        ctrl.send("213 many").await;
    });

    let mut client = FtpClient::new();
    client.connect("127.0.0.1", port).await.unwrap();

    assert_eq!(client.size("a.bin").await.unwrap(), 4096);
    let mtime = client.last_mod("a.bin").await.unwrap();
    assert_eq!(mtime.to_rfc3339(), "2026-01-01T12:00:00+00:00");

    let err = client.size("b.bin").await.unwrap_err();
    assert_eq!(err.kind, FtpErrorKind::Parse);
    server.await.unwrap();
}

#[tokio::test]
async fn rename_is_a_two_step_exchange() {
    init_logs();
    let (listener, port) = bind().await;
    let server = tokio::spawn(async move {
        let mut ctrl = MockCtrl::accept(&listener, "220 hi").await;
        ctrl.expect("RNFR old.txt").await;
        ctrl.send("350 Ready for destination").await;
        ctrl.expect("RNTO new.txt").await;
        ctrl.send("250 Renamed").await;
    });

    let mut client = FtpClient::new();
    client.connect("127.0.0.1", port).await.unwrap();
    let reply = client.rename("old.txt", "new.txt").await.unwrap();
    assert_eq!(reply.code, 250);
    server.await.unwrap();
}

#[tokio::test]
async fn leading_space_paths_are_made_absolute() {
    init_logs();
    let (listener, port) = bind().await;
    let server = tokio::spawn(async move {
        let mut ctrl = MockCtrl::accept(&listener, "220 hi").await;
        ctrl.expect("PWD").await;
        ctrl.send("257 \"/work\" is current directory.").await;
        ctrl.expect("CWD /work/ data").await;
        ctrl.send("250 ok").await;
        // No leading space: passes through untouched, no PWD round trip.
        ctrl.expect("CWD plain").await;
        ctrl.send("250 ok").await;
    });

    let mut client = FtpClient::new();
    client.connect("127.0.0.1", port).await.unwrap();
    client.cd(" data").await.unwrap();
    client.cd("plain").await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn default_settings_are_idempotent() {
    init_logs();
    let (listener, port) = bind().await;
    let server = tokio::spawn(async move {
        let mut ctrl = MockCtrl::accept(&listener, "220 hi").await;
        for _ in 0..2 {
            ctrl.expect("TYPE I").await;
            ctrl.send("200 ok").await;
            ctrl.expect("STRU F").await;
            ctrl.send("504 Not implemented for that parameter").await;
            ctrl.expect("OPTS UTF8 ON").await;
            ctrl.send("200 ok").await;
            ctrl.expect("OPTS MLST type;size;modify;unix.mode;unix.owner;unix.group;")
                .await;
            ctrl.send("501 what").await;
        }
    });

    let mut client = FtpClient::new();
    client.connect("127.0.0.1", port).await.unwrap();
    client.use_default_settings().await.unwrap();
    client.use_default_settings().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn close_poisons_the_session() {
    init_logs();
    let (listener, port) = bind().await;
    let server = tokio::spawn(async move {
        let mut ctrl = MockCtrl::accept(&listener, "220 hi").await;
        ctrl.expect("QUIT").await;
        ctrl.send("221 bye").await;
    });

    let mut client = FtpClient::new();
    client.connect("127.0.0.1", port).await.unwrap();
    client.close().await.unwrap();
    server.await.unwrap();

    let err = client.noop().await.unwrap_err();
    assert_eq!(err.kind, FtpErrorKind::Closed);
    let err = client.pwd().await.unwrap_err();
    assert_eq!(err.kind, FtpErrorKind::Closed);
}

#[tokio::test]
async fn idle_timeout_kills_the_session() {
    init_logs();
    let (listener, port) = bind().await;
    let server = tokio::spawn(async move {
        let mut ctrl = MockCtrl::accept(&listener, "220 hi").await;
        ctrl.expect("NOOP").await;
        // Say nothing; the client's idle timer must fire.
        tokio::time::sleep(Duration::from_millis(800)).await;
    });

    let mut client = FtpClient::new();
    client.set_timeout(Duration::from_millis(150));
    client.connect("127.0.0.1", port).await.unwrap();

    let err = client.noop().await.unwrap_err();
    assert_eq!(err.kind, FtpErrorKind::Timeout);

    // Fail-fast: the session is gone.
    let err = client.pwd().await.unwrap_err();
    assert_eq!(err.kind, FtpErrorKind::Closed);
    server.await.unwrap();
}
