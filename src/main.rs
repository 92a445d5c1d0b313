//! ROM emulator controller: main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  BusWriter        MemFlash /        LogEventSink   SpinDelay / │
//! │  (BusPort)        PartitionFlash    (EventSink)    Ets         │
//! │  TcpTransport (rpc-io thread)       StdioTransport (console)   │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  EmulatorService: SignalChannel · ImageStore ·         │    │
//! │  │                   UpdateStore                          │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                 ▲ RpcEngine (per-source decoders)              │
//! └────────────────────────────────────────────────────────────────┘
//! ```

use anyhow::{Context, Result};
use log::{info, warn};

use romemu::adapters::bus::SharedMemory;
use romemu::adapters::log_sink::LogEventSink;
use romemu::adapters::stdio_transport::{StdioError, StdioTransport};
use romemu::adapters::tcp_transport::TcpTransport;
use romemu::adapters::time::{UptimeClock, bus_delay};
use romemu::app::ports::FlashPort;
use romemu::app::service::EmulatorService;
use romemu::config::EmulatorConfig;
use romemu::rpc::channels::NetworkLink;
use romemu::rpc::engine::RpcEngine;
use romemu::rpc::io_task;
use romemu::rpc::packet::Source;
use romemu::rpc::transport::Transport;
use romemu::signal::{Signal, SignalChannel};
use romemu::storage::update_store::{BootRegion, select_boot_region};
use romemu::storage::{ImageStore, UpdateStore};

// ── Flash ─────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
type Flash = romemu::adapters::flash::PartitionFlash;

#[cfg(not(target_os = "espidf"))]
type Flash = romemu::adapters::flash::MemFlash;

/// Data partition plus firmware regions A and B.
#[cfg(target_os = "espidf")]
fn open_flash() -> Result<(Flash, Flash, Flash)> {
    use romemu::adapters::flash::PartitionFlash;

    let data = PartitionFlash::open(c"romemu").map_err(romemu::Error::from)?;
    let a = PartitionFlash::open(c"ota_0").map_err(romemu::Error::from)?;
    let b = PartitionFlash::open(c"ota_1").map_err(romemu::Error::from)?;
    Ok((data, a, b))
}

/// Data partition plus firmware regions A and B.
#[cfg(not(target_os = "espidf"))]
fn open_flash() -> Result<(Flash, Flash, Flash)> {
    use romemu::adapters::flash::MemFlash;
    use romemu::storage::{BLOCK_SIZE, DATA_PARTITION_SIZE};

    const REGION_SIZE: usize = 256 * BLOCK_SIZE;
    info!("flash: in-memory simulation, contents are lost on exit");
    Ok((
        MemFlash::new(DATA_PARTITION_SIZE),
        MemFlash::new(REGION_SIZE),
        MemFlash::new(REGION_SIZE),
    ))
}

#[cfg(target_os = "espidf")]
fn restart() -> ! {
    info!("Restarting to activate the new firmware");
    // SAFETY: plain FFI call; it does not return.
    unsafe { esp_idf_svc::sys::esp_restart() }
}

#[cfg(not(target_os = "espidf"))]
fn restart() -> ! {
    info!("Restarting to activate the new firmware");
    std::process::exit(0)
}

fn init_logger() -> Result<()> {
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_logger::init()?;
    }
    #[cfg(not(target_os = "espidf"))]
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();
    Ok(())
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. Bootstrap ──────────────────────────────────────────
    init_logger()?;
    info!("romemu v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. Configuration ──────────────────────────────────────
    let config = EmulatorConfig::load().unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        EmulatorConfig::default()
    });

    // ── 3. Storage ────────────────────────────────────────────
    let (data, region_a, region_b) = open_flash()?;
    info!("Data partition: {} bytes", data.size());
    let images = match ImageStore::open(data) {
        Ok(store) => Some(store),
        Err(e) => {
            warn!("Image store unavailable ({}), menu will show the partition error", e);
            None
        }
    };

    let running = select_boot_region(&region_a, &region_b);
    info!("Firmware region {} is running", running);
    let (current, next) = match running {
        BootRegion::A => (region_a, region_b),
        BootRegion::B => (region_b, region_a),
    };
    let update = match UpdateStore::open(current, next) {
        Ok(update) => Some(update),
        Err(e) => {
            warn!("Firmware update unavailable ({})", e);
            None
        }
    };

    // ── 4. Bus and service ────────────────────────────────────
    // The reader half belongs to the real-time bus server, which lives
    // outside this crate; keep it alive for the lifetime of the process.
    let (bus_writer, _bus_reader) = SharedMemory::split(0xFF);
    let signal = SignalChannel::new(bus_writer, bus_delay());
    let mut sink = LogEventSink::new();
    let mut app = EmulatorService::new(config.clone(), signal, images, update);
    app.start(&mut sink);

    // ── 5. Transports ─────────────────────────────────────────
    let mut engine = RpcEngine::new();
    let mut network = NetworkLink::global();
    if config.enable_tcp {
        let tcp = TcpTransport::bind(config.tcp_port)
            .map_err(|_| romemu::Error::Transport("TCP bind failed"))?;
        io_task::spawn(tcp).context("spawning rpc-io thread")?;
    }
    let mut console = if config.enable_stdio {
        Some(StdioTransport::console().context("opening console")?)
    } else {
        None
    };

    info!("System ready. Entering control loop.");

    // ── 6. Control loop ───────────────────────────────────────
    let clock = UptimeClock::new();
    let idle = core::time::Duration::from_micros(u64::from(config.idle_sleep_us));
    let mut buf = [0u8; 256];

    loop {
        let now_ms = clock.uptime_ms();
        let mut activity = false;

        // Legacy CPU: signals and tunnelled packet bytes.
        match app.poll_bus(now_ms, &mut sink) {
            Signal::None => {}
            Signal::SerialByteFromLegacy(byte) => {
                engine.on_tunnel_byte(byte, &mut app, &mut sink);
                activity = true;
            }
            _ => activity = true,
        }

        // Network client (bytes arrive from the rpc-io thread).
        activity |= network.pump(&mut engine, &mut app, &mut sink);

        // USB console.
        let mut console_closed = false;
        if let Some(port) = console.as_mut() {
            match port.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    engine.feed_bytes(Source::Usb, &buf[..n], &mut app, &mut sink, |reply| {
                        if port.write(reply).and_then(|_| port.flush()).is_err() {
                            warn!("STDIO: reply write failed");
                        }
                    });
                    activity = true;
                }
                Err(StdioError::Closed) => console_closed = true,
                Err(e) => warn!("STDIO: {}", e),
            }
        }
        if console_closed {
            engine.reset_source(Source::Usb);
            console = None;
        }

        app.tick(now_ms, &mut sink);

        if app.restart_requested() {
            restart();
        }

        if !activity {
            std::thread::sleep(idle);
        }
    }
}
