use log::debug;
use mailin_embedded::{Handler, Server, SslConfig};
use std::{net::IpAddr, sync::Arc, time::Duration};
use tokio::{
    sync::watch::{self, error::RecvError, Receiver, Sender},
    time::timeout,
};

pub const SMTP_PORT: u16 = 4567;
pub const POISONED_SMTP_PORT: u16 = 4568;

const SERVER_NAME: &str = "contact-form.test";

#[derive(Clone)]
struct CapturingHandler(Vec<u8>, Arc<Sender<String>>);

impl Handler for CapturingHandler {
    fn data(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.0.extend(buf);
        Ok(())
    }

    fn data_end(&mut self) -> mailin_embedded::Response {
        let mail = String::from_utf8_lossy(&self.0).into_owned();
        self.0.clear();
        debug!("Captured mail:\n{mail}");
        let _ = self.1.send(mail);
        mailin_embedded::response::OK
    }

    fn auth_plain(
        &mut self,
        _authorization_id: &str,
        authentication_id: &str,
        _password: &str,
    ) -> mailin_embedded::Response {
        debug!("Accepting authentication as {authentication_id}");
        mailin_embedded::response::AUTH_OK
    }
}

/// An SMTP server on [`SMTP_PORT`] which keeps the last message it received. It runs until the
/// test process exits, so tests share one instance.
pub struct FakeSmtpServer(
    std::sync::Mutex<Option<Server<CapturingHandler>>>,
    tokio::sync::Mutex<Receiver<String>>,
);

impl FakeSmtpServer {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(String::new());
        let mut server = Server::new(CapturingHandler(Vec::new(), Arc::new(sender)));
        server
            .with_name(SERVER_NAME)
            .with_ssl(SslConfig::None)
            .unwrap()
            .with_addr(format!("127.0.0.1:{SMTP_PORT}"))
            .unwrap();
        Self(
            std::sync::Mutex::new(Some(server)),
            tokio::sync::Mutex::new(receiver),
        )
    }

    pub fn smtp_url() -> String {
        format!("smtp://127.0.0.1:{SMTP_PORT}")
    }

    /// Starts serving on a background thread. Later calls do nothing.
    pub fn start(&self) {
        if let Some(server) = self.0.lock().unwrap().take() {
            std::thread::spawn(move || {
                let _ = server.serve();
            });
        }
    }

    /// Waits for the next message to arrive and returns its raw content.
    pub async fn next_mail(&self) -> Result<String, RecvError> {
        let mut receiver = self.1.lock().await;
        receiver.changed().await?;
        let content = receiver.borrow_and_update().clone();
        Ok(content)
    }

    /// Discards a message left over from an earlier test.
    pub async fn flush(&self) {
        let mut receiver = self.1.lock().await;
        let _ = timeout(Duration::from_millis(100), receiver.changed()).await;
    }
}

impl Default for FakeSmtpServer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
struct RejectingHandler;

impl Handler for RejectingHandler {
    fn helo(&mut self, _ip: IpAddr, _domain: &str) -> mailin_embedded::Response {
        mailin_embedded::response::INTERNAL_ERROR
    }

    fn mail(&mut self, _ip: IpAddr, _domain: &str, _from: &str) -> mailin_embedded::Response {
        mailin_embedded::response::INTERNAL_ERROR
    }
}

/// Starts an SMTP server on [`POISONED_SMTP_PORT`] which refuses every message and returns its
/// URL. Safe to call more than once.
pub fn start_poisoned_smtp_server() -> String {
    static STARTED: std::sync::Once = std::sync::Once::new();
    STARTED.call_once(|| {
        let mut server = Server::new(RejectingHandler);
        server
            .with_name(SERVER_NAME)
            .with_ssl(SslConfig::None)
            .unwrap()
            .with_addr(format!("127.0.0.1:{POISONED_SMTP_PORT}"))
            .unwrap();
        std::thread::spawn(move || {
            let _ = server.serve();
        });
    });
    format!("smtp://127.0.0.1:{POISONED_SMTP_PORT}")
}
