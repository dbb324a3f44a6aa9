//! Common test utilities

#![allow(dead_code)]

use mailcore::email::{PassthroughFormatter, SmtpTransportFactory, TransportOptions};
use mailcore::host::{MemoryHost, MemorySink};
use mailcore::{HostContext, MailCoreService};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// How the fixture answers RCPT TO
#[derive(Debug, Clone)]
pub enum SmtpMode {
    Accept,
    /// Reply `550 <diagnostic>` to every recipient
    RejectRecipients(String),
}

/// One message accepted by the fixture
#[derive(Debug, Clone, Default)]
pub struct ReceivedMail {
    pub mail_from: String,
    pub rcpt_to: Vec<String>,
    pub data: String,
}

/// Minimal in-process SMTP server speaking just enough of RFC 5321 for lettre
pub struct SmtpFixture {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<ReceivedMail>>>,
    sessions: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl SmtpFixture {
    pub async fn start(mode: SmtpMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sessions = Arc::new(AtomicUsize::new(0));

        let task = {
            let received = received.clone();
            let sessions = sessions.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    sessions.fetch_add(1, Ordering::SeqCst);
                    let mode = mode.clone();
                    let received = received.clone();
                    tokio::spawn(async move {
                        let _ = serve_session(stream, mode, received).await;
                    });
                }
            })
        };

        Self {
            addr,
            received,
            sessions,
            task,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn received(&self) -> Vec<ReceivedMail> {
        self.received.lock().clone()
    }

    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

impl Drop for SmtpFixture {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_session(
    stream: TcpStream,
    mode: SmtpMode,
    received: Arc<Mutex<Vec<ReceivedMail>>>,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut current = ReceivedMail::default();

    writer.write_all(b"220 localhost ESMTP fixture\r\n").await?;

    while let Some(line) = lines.next_line().await? {
        let upper = line.to_ascii_uppercase();

        let reply: &[u8] = if upper.starts_with("EHLO") || upper.starts_with("HELO") {
            b"250 localhost\r\n"
        } else if upper.starts_with("MAIL FROM:") {
            current = ReceivedMail {
                mail_from: line[10..].trim().to_string(),
                ..Default::default()
            };
            b"250 OK\r\n"
        } else if upper.starts_with("RCPT TO:") {
            match &mode {
                SmtpMode::Accept => {
                    current.rcpt_to.push(line[8..].trim().to_string());
                    b"250 OK\r\n"
                }
                SmtpMode::RejectRecipients(diagnostic) => {
                    let reply = format!("550 {}\r\n", diagnostic);
                    writer.write_all(reply.as_bytes()).await?;
                    continue;
                }
            }
        } else if upper == "DATA" {
            writer
                .write_all(b"354 End data with <CR><LF>.<CR><LF>\r\n")
                .await?;
            while let Some(data_line) = lines.next_line().await? {
                if data_line == "." {
                    break;
                }
                current.data.push_str(&data_line);
                current.data.push('\n');
            }
            received.lock().push(std::mem::take(&mut current));
            b"250 OK queued\r\n"
        } else if upper == "RSET" || upper == "NOOP" {
            b"250 OK\r\n"
        } else if upper == "QUIT" {
            writer.write_all(b"221 Bye\r\n").await?;
            break;
        } else {
            b"502 Command not implemented\r\n"
        };

        writer.write_all(reply).await?;
    }

    Ok(())
}

/// Everything a lifecycle test needs to observe
pub struct TestExtension {
    pub host: Arc<MemoryHost>,
    pub sink: Arc<MemorySink>,
    pub service: MailCoreService,
}

pub fn transport_factory() -> Arc<SmtpTransportFactory> {
    Arc::new(SmtpTransportFactory::new(TransportOptions {
        timeout: Duration::from_secs(5),
        hello_name: None,
    }))
}

/// Start the extension against a plain (no TLS, no AUTH) relay on localhost
pub fn start_extension(port: u16) -> TestExtension {
    let host = Arc::new(MemoryHost::with_smtp("127.0.0.1", port, false, "", ""));
    let sink = Arc::new(MemorySink::new());

    let service = MailCoreService::init(
        HostContext {
            config_source: host.clone(),
            registry: host.clone(),
            sink: sink.clone(),
        },
        transport_factory(),
        Arc::new(PassthroughFormatter),
    )
    .unwrap();

    TestExtension {
        host,
        sink,
        service,
    }
}

pub fn mail_payload(to: &str) -> serde_json::Value {
    serde_json::json!({
        "from": "a@x.com",
        "to": to,
        "subject": "hi",
        "body": "text",
        "htmlBody": ""
    })
}
