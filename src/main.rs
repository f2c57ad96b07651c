// src/main.rs - GRBL-compatible 4-axis CNC motion controller entry point
mod grbl;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use grbl::controller::Controller;
use grbl::settings_io::SettingsStore;
use grbl::transport::{FrameEvent, LineFramer};
use grbl4_mcu::fake::FakeMcu;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// GRBL-compatible 4-axis CNC motion controller.
#[derive(Parser, Debug)]
#[command(name = "grbl4-rs")]
struct Cli {
    /// Serial device to listen on (e.g. /dev/ttyACM0). Reads stdin/writes
    /// stdout instead when omitted, for bench testing without hardware.
    #[arg(long)]
    port: Option<String>,

    #[arg(long, default_value_t = 115_200)]
    baud: u32,

    #[arg(long, default_value = "grbl4_settings.toml")]
    settings: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let cli = Cli::parse();
    tracing::info!(settings = %cli.settings.display(), "loading settings");
    let store = SettingsStore::load(&cli.settings)?;
    let mut controller = Controller::new(store);
    let executor = controller.motion_mut().executor();

    let shutdown = Arc::new(AtomicBool::new(false));
    let isr_shutdown = Arc::clone(&shutdown);
    let isr_executor = Arc::clone(&executor);
    let isr_handle = std::thread::spawn(move || {
        let mut mcu = FakeMcu::new();
        mcu.enable_all();
        while !isr_shutdown.load(Ordering::Relaxed) {
            match isr_executor.period_us() {
                Some(period) => {
                    std::thread::sleep(std::time::Duration::from_micros(period.max(1.0) as u64));
                    isr_executor.on_pulse(&mut mcu);
                }
                None => std::thread::sleep(std::time::Duration::from_micros(200)),
            }
        }
    });

    tracing::info!("controller ready");
    let result = run_serial_loop(&cli, &mut controller).await;

    shutdown.store(true, Ordering::Relaxed);
    let _ = isr_handle.join();
    result
}

async fn run_serial_loop(
    cli: &Cli,
    controller: &mut Controller,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let mut framer = LineFramer::new();
    let mut tick_interval = tokio::time::interval(std::time::Duration::from_millis(1));
    let mut buf = [0u8; 256];

    match &cli.port {
        Some(path) => {
            tracing::info!(%path, baud = cli.baud, "opening serial port");
            let mut serial = serial2_tokio::SerialPort::open(path, cli.baud)?;
            loop {
                tokio::select! {
                    read = serial.read(&mut buf) => {
                        let n = read?;
                        if n == 0 {
                            break Ok(());
                        }
                        for event in framer.push_bytes(&buf[..n]) {
                            if let Some(line) = dispatch_event(controller, event) {
                                serial.write_all(line.as_bytes()).await?;
                            }
                        }
                    }
                    _ = tick_interval.tick() => controller.tick(),
                }
            }
        }
        None => {
            tracing::info!("no --port given, reading stdin / writing stdout");
            run_framed_loop(tokio::io::stdin(), tokio::io::stdout(), controller).await
        }
    }
}

fn dispatch_event(controller: &mut Controller, event: FrameEvent) -> Option<String> {
    match event {
        FrameEvent::Line(line) => {
            let responses = controller.handle_line(&line);
            Some(responses.join("\r\n") + "\r\n")
        }
        FrameEvent::Realtime(cmd) => controller.handle_realtime(cmd),
    }
}

/// The framing/tick loop shared by every transport: read bytes, feed them
/// through `framer`, dispatch whole lines and realtime bytes as they
/// complete, and tick the motion manager on its own period in between.
/// Generic over the reader/writer so the stdin/stdout transport and the
/// `#[tokio::test]` harness below can drive the same code a real serial
/// port uses.
async fn run_framed_loop<R, W>(
    mut reader: R,
    mut writer: W,
    controller: &mut Controller,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut framer = LineFramer::new();
    let mut tick_interval = tokio::time::interval(std::time::Duration::from_millis(1));
    let mut buf = [0u8; 256];
    loop {
        tokio::select! {
            read = reader.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    break Ok(());
                }
                for event in framer.push_bytes(&buf[..n]) {
                    if let Some(line) = dispatch_event(controller, event) {
                        writer.write_all(line.as_bytes()).await?;
                        writer.flush().await?;
                    }
                }
            }
            _ = tick_interval.tick() => controller.tick(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn framed_loop_replies_ok_over_a_duplex_pipe() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::load(dir.path().join("settings.toml")).unwrap();
        let mut controller = Controller::new(store);

        let (mut client, server) = tokio::io::duplex(256);
        let (server_r, server_w) = tokio::io::split(server);

        let task = tokio::spawn(async move {
            let mut controller = controller;
            let _ = run_framed_loop(server_r, server_w, &mut controller).await;
        });

        client.write_all(b"G1 X10 F600\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = tokio::time::timeout(std::time::Duration::from_secs(1), client.read(&mut buf))
            .await
            .expect("response timed out")
            .unwrap();
        assert_eq!(&buf[..n], b"ok\r\n");

        task.abort();
    }

    #[tokio::test]
    async fn framed_loop_reports_an_error_for_an_unsupported_command() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::load(dir.path().join("settings.toml")).unwrap();
        let mut controller = Controller::new(store);

        let (mut client, server) = tokio::io::duplex(256);
        let (server_r, server_w) = tokio::io::split(server);

        let task = tokio::spawn(async move {
            let mut controller = controller;
            let _ = run_framed_loop(server_r, server_w, &mut controller).await;
        });

        client.write_all(b"G99 X1\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = tokio::time::timeout(std::time::Duration::from_secs(1), client.read(&mut buf))
            .await
            .expect("response timed out")
            .unwrap();
        assert_eq!(&buf[..n], b"error:20\r\n");

        task.abort();
    }
}
