//! btaudio - Bluetooth audio discovery daemon front-end.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use btaudio_bluetooth::{
    BusType, ChannelHandler, Discovery, DiscoveryConfig, DiscoveryEvent, HookKind,
};
use btaudio_core::SampleSpec;
use tracing::{error, info};

/// Command-line arguments
struct Args {
    rate: u32,
    channels: u8,
    /// Use the session bus instead of the system bus
    session: bool,
    debug: bool,
}

impl Default for Args {
    fn default() -> Self {
        let spec = SampleSpec::default();
        Self {
            rate: spec.rate,
            channels: spec.channels,
            session: false,
            debug: false,
        }
    }
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--rate" | "-r" => {
                let value = iter.next().context("--rate needs a value")?;
                args.rate = value.parse().with_context(|| format!("Invalid rate: {}", value))?;
            }
            "--channels" | "-c" => {
                let value = iter.next().context("--channels needs a value")?;
                args.channels = value
                    .parse()
                    .with_context(|| format!("Invalid channel count: {}", value))?;
            }
            "--session" => {
                args.session = true;
            }
            "--debug" | "-d" => {
                args.debug = true;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                print_help();
                bail!("Unknown argument: {}", arg);
            }
        }
    }

    Ok(args)
}

fn print_help() {
    println!("btaudio - Bluetooth audio discovery for BlueZ 4");
    println!();
    println!("Usage: btaudio [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -r, --rate HZ        Default sample rate (default: 44100)");
    println!("  -c, --channels N     Default channel count (default: 2)");
    println!("      --session        Connect to the session bus instead of the system bus");
    println!("  -d, --debug          Enable debug logging");
    println!("  -h, --help           Show this help message");
}

fn setup_logging(args: &Args) {
    let level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_max_level(level)
        .init();
}

fn describe(event: &DiscoveryEvent) {
    match event {
        DiscoveryEvent::DeviceConnectionChanged(device) => info!(
            "Device {} ({}) {}",
            device.display_name().unwrap_or("unnamed"),
            device.path,
            if device.any_audio_connected() {
                "connected"
            } else {
                "disconnected"
            }
        ),
        DiscoveryEvent::DeviceUuidAdded { device, uuid } => {
            info!("Device {} supports {}", device.path, uuid)
        }
        DiscoveryEvent::TransportStateChanged(t) => {
            info!("Transport {} ({}) is {}", t.path, t.profile, t.state)
        }
        DiscoveryEvent::TransportNrecChanged(t) => info!("Transport {} NREC {}", t.path, t.nrec),
        DiscoveryEvent::TransportMicrophoneGainChanged(t) => {
            info!("Transport {} microphone gain {}", t.path, t.microphone_gain)
        }
        DiscoveryEvent::TransportSpeakerGainChanged(t) => {
            info!("Transport {} speaker gain {}", t.path, t.speaker_gain)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;
    setup_logging(&args);

    let bus_type = if args.session {
        BusType::Session
    } else {
        BusType::System
    };
    let config = DiscoveryConfig::new()
        .with_rate_and_channels(args.rate, args.channels)?
        .with_bus_type(bus_type);

    info!(
        "Starting btaudio ({} Hz, {} channels)",
        config.sample_spec.rate, config.sample_spec.channels
    );

    let (handler, mut events) = ChannelHandler::new();
    let stop = Arc::new(AtomicBool::new(false));

    // Discovery blocks on the bus, so it gets its own thread.
    let worker_stop = Arc::clone(&stop);
    let worker = std::thread::spawn(move || -> btaudio_bluetooth::Result<()> {
        let mut discovery = Discovery::connect(config)?;
        for kind in HookKind::ALL {
            discovery.connect_hook(kind, handler.clone());
        }
        discovery.run_until(&worker_stop, Duration::from_millis(250))
    });

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => describe(&event),
                // Worker exited and dropped the handler.
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                stop.store(true, Ordering::Relaxed);
                break;
            }
        }
    }

    match worker.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("Discovery failed: {}", e);
            return Err(e.into());
        }
        Err(_) => bail!("Discovery thread panicked"),
    }

    info!("btaudio exiting");
    Ok(())
}
