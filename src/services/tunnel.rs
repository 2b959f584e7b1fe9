//! SSH local port forwarding.
//!
//! The tunnel is a child `ssh -N -L ...` process. The session owns that
//! process: [`TunnelSession::stop`] kills it, and dropping the session kills
//! it too, so every exit path releases the local port.

use std::net::{Ipv4Addr, SocketAddr};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::TunnelError;
use crate::models::TunnelConfig;

const CHECK_INTERVAL: Duration = Duration::from_millis(100);
const STDERR_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Forwarding session from `127.0.0.1:<local_bind_port>` to the database
/// port on the SSH host.
#[derive(Debug)]
pub struct TunnelSession {
    config: TunnelConfig,
    child: Option<Child>,
}

impl TunnelSession {
    /// Create an inactive session.
    pub fn new(config: TunnelConfig) -> Self {
        Self {
            config,
            child: None,
        }
    }

    /// Create and start a session in one step.
    pub async fn open(config: TunnelConfig) -> Result<Self, TunnelError> {
        let mut session = Self::new(config);
        session.start().await?;
        Ok(session)
    }

    pub fn local_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.config.local_bind_port))
    }

    /// True while the forwarding process is running.
    pub fn is_active(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Spawn the forwarder and wait until the local port accepts connections.
    ///
    /// On failure the forwarder is stopped before the error is returned.
    pub async fn start(&mut self) -> Result<(), TunnelError> {
        if self.is_active() {
            debug!(local = %self.local_addr(), "tunnel already active");
            return Ok(());
        }
        // Reap a forwarder that exited on its own.
        self.stop().await;

        ensure_port_free(self.local_addr()).await?;

        let child = Command::new(&self.config.ssh_binary)
            .args(self.ssh_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TunnelError::SpawnError {
                binary: self.config.ssh_binary.clone(),
                source,
            })?;

        info!(
            host = %self.config.host_name,
            ssh_port = self.config.port,
            local = %self.local_addr(),
            remote_port = self.config.db_port,
            "starting ssh tunnel"
        );
        self.child = Some(child);

        match self.wait_until_ready().await {
            Ok(()) => {
                info!(local = %self.local_addr(), "tunnel is active");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "tunnel failed to start");
                self.stop().await;
                Err(e)
            }
        }
    }

    /// Kill the forwarder. A no-op when the session is not running.
    pub async fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        match child.try_wait() {
            Ok(Some(status)) => debug!(%status, "ssh forwarder already exited"),
            _ => match child.kill().await {
                Ok(()) => info!(local = %self.local_addr(), "tunnel closed"),
                Err(e) => warn!(error = %e, "failed to kill ssh forwarder"),
            },
        }
    }

    async fn wait_until_ready(&mut self) -> Result<(), TunnelError> {
        let addr = self.local_addr();
        let deadline = Instant::now() + self.config.connect_timeout();

        loop {
            if let Some(child) = self.child.as_mut()
                && let Some(status) = child.try_wait()?
            {
                let stderr = read_stderr(child).await;
                return Err(TunnelError::Exited { status, stderr });
            }

            if TcpStream::connect(addr).await.is_ok() {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(TunnelError::Timeout(self.config.connect_timeout_secs));
            }
            sleep(CHECK_INTERVAL).await;
        }
    }

    /// Arguments for the ssh client, excluding the program name.
    pub fn ssh_args(&self) -> Vec<String> {
        let c = &self.config;
        let mut args: Vec<String> = vec![
            "-N".into(),
            "-o".into(),
            "BatchMode=yes".into(),
            "-o".into(),
            "ExitOnForwardFailure=yes".into(),
            "-o".into(),
            "LogLevel=ERROR".into(),
            "-o".into(),
            format!("ConnectTimeout={}", c.connect_timeout_secs.max(1)),
            "-o".into(),
            "ServerAliveInterval=30".into(),
            "-p".into(),
            c.port.to_string(),
            "-L".into(),
            format!("127.0.0.1:{}:127.0.0.1:{}", c.local_bind_port, c.db_port),
        ];
        if let Some(ref identity) = c.identity_file {
            args.push("-i".into());
            args.push(identity.clone());
        }
        args.push(c.destination());
        args
    }
}

impl Drop for TunnelSession {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}

async fn ensure_port_free(addr: SocketAddr) -> Result<(), TunnelError> {
    match TcpListener::bind(addr).await {
        Ok(listener) => {
            drop(listener);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            Err(TunnelError::PortInUse(addr.port()))
        }
        Err(e) => Err(TunnelError::IoError(e)),
    }
}

async fn read_stderr(child: &mut Child) -> String {
    let Some(mut stderr) = child.stderr.take() else {
        return String::new();
    };
    let mut buf = String::new();
    let _ = timeout(STDERR_READ_TIMEOUT, stderr.read_to_string(&mut buf)).await;
    buf.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sample_settings;

    // Tests that spawn processes run one at a time.
    static SPAWN_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

    async fn free_port() -> u16 {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        listener.local_addr().unwrap().port()
    }

    async fn config_with(binary: &str) -> TunnelConfig {
        let mut config = sample_settings().tunnel;
        config.ssh_binary = binary.to_string();
        config.local_bind_port = free_port().await;
        config.connect_timeout_secs = 1;
        config
    }

    #[tokio::test]
    async fn test_stop_never_started_is_noop() {
        let mut session = TunnelSession::new(sample_settings().tunnel);
        assert!(!session.is_active());
        session.stop().await;
        session.stop().await;
        assert!(!session.is_active());
    }

    #[test]
    fn test_ssh_args() {
        let mut config = sample_settings().tunnel;
        config.identity_file = Some("/home/me/.ssh/id_ed25519".to_string());
        let args = TunnelSession::new(config).ssh_args();

        assert_eq!(args.first().map(String::as_str), Some("-N"));
        assert!(args.contains(&"ExitOnForwardFailure=yes".to_string()));
        assert!(args.contains(&"ConnectTimeout=30".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "-p" && w[1] == "22"));
        assert!(
            args.windows(2)
                .any(|w| w[0] == "-L" && w[1] == "127.0.0.1:5433:127.0.0.1:5432")
        );
        assert!(
            args.windows(2)
                .any(|w| w[0] == "-i" && w[1] == "/home/me/.ssh/id_ed25519")
        );
        assert_eq!(args.last().map(String::as_str), Some("admin@bastion"));
    }

    #[tokio::test]
    async fn test_missing_ssh_binary() {
        let _guard = SPAWN_LOCK.lock().await;
        let mut session =
            TunnelSession::new(config_with("/nonexistent/bin/ssh-docingest").await);

        let err = session.start().await.unwrap_err();
        assert!(matches!(err, TunnelError::SpawnError { .. }));
        assert!(!session.is_active());
        session.stop().await;
    }

    #[tokio::test]
    async fn test_local_port_in_use() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let mut config = sample_settings().tunnel;
        config.local_bind_port = listener.local_addr().unwrap().port();

        let err = TunnelSession::open(config).await.unwrap_err();
        assert!(matches!(err, TunnelError::PortInUse(p) if p == listener.local_addr().unwrap().port()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_forwarder_exit_is_reported() {
        let _guard = SPAWN_LOCK.lock().await;
        // `false` ignores its arguments and exits 1, like ssh failing to reach a host.
        let mut session = TunnelSession::new(config_with("false").await);

        let err = session.start().await.unwrap_err();
        assert!(matches!(err, TunnelError::Exited { status, .. } if !status.success()));
        assert!(!session.is_active());
        session.stop().await;
        session.stop().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_establish_timeout_stops_forwarder() {
        use std::os::unix::fs::PermissionsExt;

        let _guard = SPAWN_LOCK.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-ssh");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut session = TunnelSession::new(config_with(script.to_str().unwrap()).await);
        let err = session.start().await.unwrap_err();
        assert!(matches!(err, TunnelError::Timeout(1)));
        assert!(!session.is_active());
    }

    // Stands in for ssh: listens on the local side of `-L` until killed.
    #[cfg(unix)]
    const LISTENING_FORWARDER: &str = r#"#!/usr/bin/env python3
import socket, sys, time
spec = sys.argv[sys.argv.index("-L") + 1]
port = int(spec.split(":")[1])
s = socket.socket()
s.bind(("127.0.0.1", port))
s.listen(16)
while True:
    time.sleep(60)
"#;

    #[cfg(unix)]
    async fn port_frees_up(port: u16) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await.is_ok() {
                return true;
            }
            sleep(CHECK_INTERVAL).await;
        }
        false
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_established_tunnel_lifecycle() {
        use std::os::unix::fs::PermissionsExt;

        let has_python = std::process::Command::new("python3")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success());
        if !has_python {
            eprintln!("python3 not available, skipping");
            return;
        }

        let _guard = SPAWN_LOCK.lock().await;
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-ssh");
        std::fs::write(&script, LISTENING_FORWARDER).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = config_with(script.to_str().unwrap()).await;
        config.connect_timeout_secs = 10;
        let port = config.local_bind_port;

        let mut session = TunnelSession::open(config.clone()).await.unwrap();
        assert!(session.is_active());
        // Starting again while active keeps the same forwarder.
        session.start().await.unwrap();
        assert!(session.is_active());

        let err = TunnelSession::open(config.clone()).await.unwrap_err();
        assert!(matches!(err, TunnelError::PortInUse(p) if p == port));

        session.stop().await;
        assert!(!session.is_active());
        assert!(port_frees_up(port).await);

        // Dropping a running session releases the port as well.
        let mut session = TunnelSession::open(config).await.unwrap();
        assert!(session.is_active());
        drop(session);
        assert!(port_frees_up(port).await);
    }
}
