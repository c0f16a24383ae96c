//! Wires config, tunnel, connection, progress, and transfer together
//! into the single sender run or receiver accept-loop the CLI drives.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};

use jumplink_config::{Config, Mode};
use jumplink_net::{ConnectionManager, Server};
use jumplink_progress::{ProgressBus, TracingObserver};
use jumplink_protocol::FrameCodec;
use jumplink_transfer::{FileTransferService, MessageClient, MessageServer, NetworkOptimizationMode};
use jumplink_tunnel::{Auth, TunnelManager, TunnelMode, TunnelSpec};

use crate::cli::Cli;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Stand-in test traffic for a message-mode sender, mirroring the
/// handful of probe messages the original ping-pong client sent.
const DEFAULT_TEST_MESSAGES: [&str; 3] = [
    "Test message 1 from client",
    "Test message 2 from client",
    "Test message 3 from client",
];

pub fn run(cli: Cli) -> Result<bool> {
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    let spec = build_tunnel_spec(&config)?;
    let mut tunnel = TunnelManager::new(spec);
    tunnel.establish().context("establishing ssh tunnel")?;

    let bus = ProgressBus::new();
    if config.progress.use_progress_observer {
        bus.register(Arc::new(TracingObserver));
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            info!("received interrupt signal, shutting down");
            shutdown.store(true, Ordering::SeqCst);
        })
        .context("installing SIGINT handler")?;
    }

    let result = match (config.mode, config.sender.enabled) {
        (Mode::File, true) => run_sender(&config, bus),
        (Mode::File, false) => run_receiver(&config, bus, shutdown),
        (Mode::Message, true) => run_message_sender(&config),
        (Mode::Message, false) => run_message_receiver(&config, shutdown),
    };

    tunnel.teardown();
    result
}

fn build_tunnel_spec(config: &Config) -> Result<TunnelSpec> {
    let auth = if config.ssh.use_password {
        Auth::Password {
            secret: config
                .ssh
                .password
                .clone()
                .context("ssh.use_password is set but ssh.password is missing")?,
        }
    } else {
        Auth::Key {
            identity_file: config
                .ssh
                .identity_file
                .clone()
                .context("ssh.identity_file is required for key auth")?,
        }
    };

    // A sender forwards its local port to the receiver's listening port,
    // reached from the jump host as "localhost" (the conventional setup
    // when sender and receiver each run their own local leg of the hop).
    // A receiver opens a reverse tunnel so the jump host can reach back
    // to the port it is listening on locally.
    let mode = if config.sender.enabled {
        TunnelMode::Forward {
            local_port: config.transfer.local_port,
            target_host: "localhost".to_string(),
            target_port: config.transfer.remote_port,
        }
    } else {
        TunnelMode::Reverse {
            target_port: config.transfer.remote_port,
            local_host: "localhost".to_string(),
            local_port: config.transfer.local_port,
        }
    };

    Ok(TunnelSpec {
        jump_host: config.ssh.jump_server.clone(),
        jump_user: config.ssh.jump_user.clone(),
        jump_port: config.ssh.jump_port,
        auth,
        mode,
    })
}

fn run_sender(config: &Config, bus: ProgressBus) -> Result<bool> {
    let path = config
        .sender
        .file
        .clone()
        .context("sender.enabled is set but sender.file is missing")?;

    let manager = ConnectionManager::default();
    let mut transport = manager
        .connect("127.0.0.1", config.transfer.local_port)
        .context("connecting to the tunneled local port")?;

    let mut service = FileTransferService::new(bus, NetworkOptimizationMode::default());
    match service.send_file(&path, &mut transport) {
        Ok(()) => {
            info!(path = %path.display(), "file sent successfully");
            Ok(true)
        }
        Err(err) => {
            error!(path = %path.display(), error = %err, "send failed");
            Ok(false)
        }
    }
}

fn run_message_sender(config: &Config) -> Result<bool> {
    let manager = ConnectionManager::default();
    let mut transport = manager
        .connect("127.0.0.1", config.transfer.local_port)
        .context("connecting to the tunneled local port")?;

    let codec = FrameCodec::default();
    let client = MessageClient::new(&codec);
    let messages: Vec<String> = DEFAULT_TEST_MESSAGES.iter().map(|s| s.to_string()).collect();
    match client.run(&mut transport, &messages) {
        Ok(responses) => {
            for response in &responses {
                info!(%response, "received echo");
            }
            Ok(true)
        }
        Err(err) => {
            error!(error = %err, "message exchange failed");
            Ok(false)
        }
    }
}

fn run_message_receiver(config: &Config, shutdown: Arc<AtomicBool>) -> Result<bool> {
    let server = Arc::new(
        Server::bind(config.transfer.local_port, 64 * 1024)
            .context("binding the receiver's local port")?,
    );

    let serve_handle = {
        let server = server.clone();
        std::thread::spawn(move || {
            server.serve(move |mut transport, peer| {
                let codec = FrameCodec::default();
                let handler = MessageServer::new(&codec);
                let welcome = format!("Hello from the local machine! Connection from {peer}.");
                if let Err(err) = handler.run(transport.as_mut(), &welcome) {
                    error!(%peer, error = %err, "message server handler failed");
                }
            });
        })
    };

    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }
    server.stop(SHUTDOWN_GRACE);
    let _ = serve_handle.join();
    Ok(true)
}

fn run_receiver(config: &Config, bus: ProgressBus, shutdown: Arc<AtomicBool>) -> Result<bool> {
    let out_dir: PathBuf = config
        .receiver
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));

    let server = Arc::new(
        Server::bind(config.transfer.local_port, 64 * 1024)
            .context("binding the receiver's local port")?,
    );

    let serve_handle = {
        let server = server.clone();
        std::thread::spawn(move || {
            server.serve(move |mut transport, peer| {
                let mut service =
                    FileTransferService::new(bus.clone(), NetworkOptimizationMode::default());
                match service.receive_file(&out_dir, transport.as_mut()) {
                    Ok(dest) => info!(%peer, path = %dest.display(), "file received"),
                    Err(err) => error!(%peer, error = %err, "receive failed"),
                }
            });
        })
    };

    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }
    server.stop(SHUTDOWN_GRACE);
    let _ = serve_handle.join();
    Ok(true)
}
