//! End-to-end tests for the connection manager over in-memory transports.
//!
//! Tests cover:
//! - Registration sequence and send throttling on the wire
//! - Built-in PING handling and dispatch to handlers
//! - Rejoin and identification after the welcome numeric
//! - Keepalive ping and dead-link detection
//! - Reconnect cap, reconnect counter reset, permanent shutdown
//! - Handler errors and shutdowns in the middle of a read batch

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gorilla_sdk::client::{ConnectConfig, Connection, LinkState};
use gorilla_sdk::credentials::{NoCredentials, StaticCredentials};
use gorilla_sdk::dispatch::{Command, CommandKind, CommandRouter, Handler};
use gorilla_sdk::error::ClientError;
use gorilla_sdk::session::Session;
use gorilla_sdk::testing::ScriptedConnector;
use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf,
};
use tokio::sync::oneshot;
use tokio::time::Instant;

fn config() -> ConnectConfig {
    ConnectConfig {
        host: "irc.example.net".into(),
        port: 6667,
        nick: "GorillaBot".into(),
        ident: "gorilla".into(),
        realname: "Gorilla Bot".into(),
        channels: vec!["#home".into()],
        admins: vec!["GorillaWarfare".into()],
        ..ConnectConfig::default()
    }
}

struct Server {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl Server {
    fn new(stream: DuplexStream) -> Self {
        let (r, w) = tokio::io::split(stream);
        Self {
            lines: BufReader::new(r).lines(),
            writer: w,
        }
    }

    async fn expect(&mut self, line: &str) -> Instant {
        let got = self.lines.next_line().await.unwrap();
        assert_eq!(got.as_deref(), Some(line));
        Instant::now()
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(format!("{line}\r\n").as_bytes()).await.unwrap();
    }

    async fn expect_registration(&mut self) {
        self.expect("NICK GorillaBot").await;
        self.expect("USER gorilla irc.example.net * :Gorilla Bot").await;
        self.expect("PRIVMSG NickServ :ACC").await;
    }

    async fn expect_eof(&mut self) {
        assert_eq!(self.lines.next_line().await.unwrap(), None);
    }
}

fn connection(connector: &ScriptedConnector) -> Connection {
    Connection::with_connector(config(), Arc::new(NoCredentials), Arc::new(connector.clone()))
}

#[tokio::test(start_paused = true)]
async fn registration_lines_are_throttled() {
    let connector = ScriptedConnector::new();
    let mut server = Server::new(connector.accept());
    let mut conn = connection(&connector);
    let mut router = CommandRouter::default();
    let (stop, stopped) = oneshot::channel::<()>();

    let script = async move {
        let t1 = server.expect("NICK GorillaBot").await;
        let t2 = server.expect("USER gorilla irc.example.net * :Gorilla Bot").await;
        let t3 = server.expect("PRIVMSG NickServ :ACC").await;
        assert!(t2 - t1 >= Duration::from_secs(1));
        assert!(t3 - t2 >= Duration::from_secs(1));
        stop.send(()).unwrap();
        server.expect("QUIT").await;
        server.expect_eof().await;
    };

    let (result, ()) = tokio::join!(
        conn.run(&mut router, async {
            let _ = stopped.await;
        }),
        script
    );
    result.unwrap();
    assert_eq!(conn.state(), LinkState::Terminated);
    assert!(!conn.session().reconnect_allowed());
}

#[tokio::test(start_paused = true)]
async fn ping_is_answered_with_pong() {
    let connector = ScriptedConnector::new();
    let mut server = Server::new(connector.accept());
    let mut conn = connection(&connector);
    let mut router = CommandRouter::default();
    let (stop, stopped) = oneshot::channel::<()>();

    let script = async move {
        server.expect_registration().await;
        server.send("PING :server1").await;
        server.expect("PONG server1").await;
        stop.send(()).unwrap();
        server.expect("QUIT").await;
    };

    let (result, ()) = tokio::join!(
        conn.run(&mut router, async {
            let _ = stopped.await;
        }),
        script
    );
    result.unwrap();
}

#[tokio::test(start_paused = true)]
async fn malformed_lines_are_skipped() {
    let connector = ScriptedConnector::new();
    let mut server = Server::new(connector.accept());
    let mut conn = connection(&connector);
    let mut router = CommandRouter::default();
    let (stop, stopped) = oneshot::channel::<()>();

    let script = async move {
        server.expect_registration().await;
        server.writer.write_all(b"\xff\xfe bad\r\n\r\nPING :again\r\n").await.unwrap();
        server.expect("PONG again").await;
        stop.send(()).unwrap();
        server.expect("QUIT").await;
    };

    let (result, ()) = tokio::join!(
        conn.run(&mut router, async {
            let _ = stopped.await;
        }),
        script
    );
    result.unwrap();
}

#[tokio::test(start_paused = true)]
async fn welcome_identifies_and_joins_channels() {
    let connector = ScriptedConnector::new();
    let mut server = Server::new(connector.accept());
    let mut conn = Connection::with_connector(
        config(),
        Arc::new(StaticCredentials::new("pw")),
        Arc::new(connector.clone()),
    );
    let mut router = CommandRouter::default();
    let (stop, stopped) = oneshot::channel::<()>();

    let script = async move {
        server.expect_registration().await;
        server.send(":irc.example.net 001 GorillaBot :Welcome").await;
        server.expect("PRIVMSG NickServ :IDENTIFY GorillaBot pw").await;
        server.expect("JOIN #home").await;
        stop.send(()).unwrap();
        server.expect("QUIT").await;
    };

    let (result, ()) = tokio::join!(
        conn.run(&mut router, async {
            let _ = stopped.await;
        }),
        script
    );
    result.unwrap();
}

struct JoinPart;

#[async_trait]
impl Handler for JoinPart {
    async fn handle(
        &self,
        session: &mut Session,
        _channel: &str,
        _kind: CommandKind,
        command: &Command,
    ) -> anyhow::Result<()> {
        for chan in &command.args {
            if command.name == "join" {
                session.join(chan).await?;
            } else {
                session.part(chan).await?;
            }
        }
        Ok(())
    }
}

struct Shutoff;

#[async_trait]
impl Handler for Shutoff {
    async fn handle(
        &self,
        session: &mut Session,
        channel: &str,
        kind: CommandKind,
        _command: &Command,
    ) -> anyhow::Result<()> {
        assert_eq!(kind, CommandKind::Private);
        session.say("Shutting down.", channel).await?;
        session.shut_down(false).await;
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn handlers_join_part_and_shut_down() {
    let connector = ScriptedConnector::new();
    let mut server = Server::new(connector.accept());
    let mut conn = connection(&connector);
    let mut router = CommandRouter::default();
    let join_part: Arc<dyn Handler> = Arc::new(JoinPart);
    router
        .command("join", join_part.clone())
        .command("part", join_part)
        .command("emergencyshutoff", Arc::new(Shutoff));

    let script = async move {
        server.expect_registration().await;
        server.send(":alice!a@h PRIVMSG #home :!join #test").await;
        server.expect("JOIN #test").await;
        server.send(":alice!a@h PRIVMSG #home :!part #test").await;
        server.expect("PART #test").await;
        server.send(":bob!b@h PRIVMSG GorillaBot :emergencyshutoff").await;
        server.expect("PRIVMSG bob :Shutting down.").await;
        server.expect("QUIT").await;
        server.expect_eof().await;
    };

    let (result, ()) = tokio::join!(conn.run(&mut router, std::future::pending::<()>()), script);
    result.unwrap();
    assert_eq!(conn.state(), LinkState::Terminated);
    assert_eq!(conn.session().channels().iter().collect::<Vec<_>>(), ["#home"]);
    // Permanent shutdown: no reconnect attempt after the first connect.
    assert_eq!(connector.attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn shut_down_skips_rest_of_read_batch() {
    let connector = ScriptedConnector::new();
    let mut server = Server::new(connector.accept());
    let mut conn = connection(&connector);
    let mut router = CommandRouter::default();
    router
        .command("join", Arc::new(JoinPart))
        .command("emergencyshutoff", Arc::new(Shutoff));

    let script = async move {
        server.expect_registration().await;
        server
            .writer
            .write_all(
                b":bob!b@h PRIVMSG GorillaBot :emergencyshutoff\r\n\
                  :alice!a@h PRIVMSG #home :!join #late\r\n",
            )
            .await
            .unwrap();
        server.expect("PRIVMSG bob :Shutting down.").await;
        server.expect("QUIT").await;
        server.expect_eof().await;
    };

    let (result, ()) = tokio::join!(conn.run(&mut router, std::future::pending::<()>()), script);
    result.unwrap();
    assert!(!conn.session().channels().contains("#late"));
}

struct Failing;

#[async_trait]
impl Handler for Failing {
    async fn handle(
        &self,
        _session: &mut Session,
        _channel: &str,
        _kind: CommandKind,
        _command: &Command,
    ) -> anyhow::Result<()> {
        anyhow::bail!("handler blew up")
    }
}

#[tokio::test(start_paused = true)]
async fn handler_error_does_not_stop_receive_loop() {
    let connector = ScriptedConnector::new();
    let mut server = Server::new(connector.accept());
    let mut conn = connection(&connector);
    let mut router = CommandRouter::default();
    router.command("fail", Arc::new(Failing));
    let (stop, stopped) = oneshot::channel::<()>();

    let script = async move {
        server.expect_registration().await;
        server.send(":alice!a@h PRIVMSG #home :!fail").await;
        server.send("PING :x").await;
        server.expect("PONG x").await;
        stop.send(()).unwrap();
        server.expect("QUIT").await;
    };

    let (result, ()) = tokio::join!(
        conn.run(&mut router, async {
            let _ = stopped.await;
        }),
        script
    );
    result.unwrap();
    assert_eq!(connector.attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn quiet_link_is_pinged_then_dropped() {
    let connector = ScriptedConnector::new();
    let mut server = Server::new(connector.accept());
    let mut conn = connection(&connector);
    let mut router = CommandRouter::default();
    let (stop, stopped) = oneshot::channel::<()>();
    let start = Instant::now();

    let script = async move {
        server.expect_registration().await;
        let pinged = server.expect("PING irc.example.net").await;
        assert!(pinged - start > Duration::from_secs(150));
        assert!(pinged - start <= Duration::from_secs(160));
        let quit = server.expect("QUIT").await;
        assert!(quit - pinged > Duration::from_secs(60));
        server.expect_eof().await;
        stop.send(()).unwrap();
    };

    let (result, ()) = tokio::join!(
        conn.run(&mut router, async {
            let _ = stopped.await;
        }),
        script
    );
    // Dead link closes with retry; the interrupt then lands during the
    // reconnect wait.
    result.unwrap();
    assert_eq!(connector.attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn traffic_defers_keepalive_ping() {
    let connector = ScriptedConnector::new();
    let mut server = Server::new(connector.accept());
    let mut conn = connection(&connector);
    let mut router = CommandRouter::default();
    let (stop, stopped) = oneshot::channel::<()>();

    let script = async move {
        server.expect_registration().await;
        tokio::time::sleep(Duration::from_secs(100)).await;
        server.send(":irc.example.net NOTICE * :still here").await;
        let heard = Instant::now();
        let pinged = server.expect("PING irc.example.net").await;
        assert!(pinged - heard > Duration::from_secs(150));
        server.send(":irc.example.net PONG irc.example.net").await;
        stop.send(()).unwrap();
        server.expect("QUIT").await;
    };

    let (result, ()) = tokio::join!(
        conn.run(&mut router, async {
            let _ = stopped.await;
        }),
        script
    );
    result.unwrap();
}

#[tokio::test(start_paused = true)]
async fn initial_connect_failure_is_fatal() {
    let connector = ScriptedConnector::new();
    connector.refuse();
    let mut conn = connection(&connector);
    let mut router = CommandRouter::default();

    let err = conn
        .run(&mut router, std::future::pending::<()>())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Connect { ref addr, .. } if addr == "irc.example.net:6667"));
    assert_eq!(connector.attempts().len(), 1);
    assert_eq!(conn.state(), LinkState::Terminated);
}

#[tokio::test(start_paused = true)]
async fn reconnect_gives_up_after_five_attempts() {
    let connector = ScriptedConnector::new();
    drop(connector.accept());
    for _ in 0..10 {
        connector.refuse();
    }
    let mut conn = connection(&connector);
    let mut router = CommandRouter::default();

    let err = conn
        .run(&mut router, std::future::pending::<()>())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ReconnectExhausted { attempts: 5 }));
    assert_eq!(conn.state(), LinkState::Terminated);

    let attempts = connector.attempts();
    assert_eq!(attempts.len(), 6, "initial connect plus five reconnects");
    for pair in attempts.windows(2) {
        assert!(pair[1].0 - pair[0].0 >= Duration::from_secs(5));
    }
}

#[tokio::test(start_paused = true)]
async fn reconnect_rejoins_and_resets_counter() {
    let connector = ScriptedConnector::new();
    let mut first = Server::new(connector.accept());
    connector.refuse();
    let mut second = Server::new(connector.accept());
    let mut conn = connection(&connector);
    let mut router = CommandRouter::default();
    let (stop, stopped) = oneshot::channel::<()>();

    let script = async move {
        first.expect_registration().await;
        first.send(":irc.example.net 001 GorillaBot :Welcome").await;
        first.expect("JOIN #home").await;
        let dropped_at = Instant::now();
        drop(first);

        second.expect_registration().await;
        let back = Instant::now();
        assert!(back - dropped_at >= Duration::from_secs(10), "two 5s waits");
        second.send(":irc.example.net 001 GorillaBot :Welcome back").await;
        second.expect("JOIN #home").await;
        stop.send(()).unwrap();
        second.expect("QUIT").await;
    };

    let (result, ()) = tokio::join!(
        conn.run(&mut router, async {
            let _ = stopped.await;
        }),
        script
    );
    result.unwrap();
    assert_eq!(conn.reconnect_tries(), 0);
    assert_eq!(connector.attempts().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn server_dropping_before_welcome_still_counts_attempts() {
    let connector = ScriptedConnector::new();
    for _ in 0..20 {
        let mut server = Server::new(connector.accept());
        tokio::spawn(async move {
            server.expect_registration().await;
            server.send("ERROR :Closing Link: (K-lined)").await;
        });
    }
    let mut conn = connection(&connector);
    let mut router = CommandRouter::default();

    let err = conn
        .run(&mut router, std::future::pending::<()>())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ReconnectExhausted { attempts: 5 }));
    assert_eq!(connector.attempts().len(), 6, "initial connect plus five reconnects");
}
