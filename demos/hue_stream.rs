//! CLI application for driving Hue lights.
//!
//! This example connects to a bridge, lists its inventory, sets static
//! colours over the HTTP API or streams a colour cycle to an entertainment
//! group.
//!
//! Run with: cargo run --example hue_stream -- --help

use clap::{Parser, Subcommand};
use std::time::{Duration, Instant};
use hue_stream_rs::{
    Bridge, BridgeEndpoint, BridgeEvent, Color, DeviceConfig, Gamut, HueDevice,
};

#[derive(Parser)]
#[command(name = "hue-stream")]
#[command(about = "Drive Philips Hue lights from the command line", long_about = None)]
struct Cli {
    /// Host name or IP address of the bridge
    #[arg(short = 'H', long, global = true, default_value = "")]
    host: String,

    /// Whitelisted API username
    #[arg(short, long, global = true, default_value = "")]
    username: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Map an RGB colour into a model's gamut (no bridge needed)
    Map {
        red: u8,
        green: u8,
        blue: u8,
        /// Model id, e.g. LCT015
        #[arg(short, long, default_value = "LCT015")]
        model: String,
    },

    /// List the groups and lights known to the bridge
    Inventory,

    /// Set the same RGB colour on some lights over the HTTP API
    Color {
        red: u8,
        green: u8,
        blue: u8,
        /// Light ids to drive
        #[arg(short, long, num_args = 1.., required = true)]
        lights: Vec<u16>,
        /// Seconds to hold the colour before the lights are restored
        #[arg(short, long, default_value = "5")]
        seconds: u64,
    },

    /// Stream a colour cycle to an entertainment group
    Stream {
        /// Hex encoded client key
        #[arg(short, long)]
        client_key: String,
        /// Entertainment group id
        #[arg(short, long)]
        group: u16,
        /// Duration of the cycle in seconds
        #[arg(short, long, default_value = "10")]
        seconds: u64,
    },
}

/// Hue wheel colour for `phase` in `[0, 1)`.
fn wheel(phase: f64) -> Color {
    let h = (phase.fract() * 6.0) as u8;
    let f = ((phase.fract() * 6.0).fract() * 255.0) as u8;
    match h {
        0 => Color::rgb(255, f, 0),
        1 => Color::rgb(255 - f, 255, 0),
        2 => Color::rgb(0, 255, f),
        3 => Color::rgb(0, 255 - f, 255),
        4 => Color::rgb(f, 0, 255),
        _ => Color::rgb(255, 0, 255 - f),
    }
}

async fn wait_ready(
    device: &mut HueDevice,
    events: &mut tokio::sync::mpsc::UnboundedReceiver<BridgeEvent>,
) -> Result<(), Box<dyn std::error::Error>> {
    while !device.is_ready() {
        let event = tokio::time::timeout(Duration::from_secs(30), events.recv())
            .await?
            .ok_or("bridge event channel closed")?;
        if let BridgeEvent::TransportError(e) = &event {
            eprintln!("Bridge unreachable: {e}, retrying...");
        }
        device.handle_event(event).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Map {
            red,
            green,
            blue,
            model,
        } => {
            let gamut = Gamut::from_model_id(&model);
            let point = Color::rgb(red, green, blue).to_point(&gamut.triangle());
            println!("Model {model} uses gamut {gamut}");
            println!(
                "  x: {:.4}  y: {:.4}  brightness: {:.4}",
                point.x(),
                point.y(),
                point.brightness()
            );
        }

        Commands::Inventory => {
            let (bridge, _events) = Bridge::new(BridgeEndpoint::new(&cli.host, &cli.username));
            let inventory = bridge.fetch_inventory().await?;

            println!("Groups:");
            for (id, group) in &inventory.groups {
                println!("  {id:3}  {:20} {:14} lights {:?}", group.name, group.kind, group.light_ids());
            }
            println!("Lights:");
            for (id, light) in &inventory.lights {
                let gamut = Gamut::from_model_id(&light.model_id);
                println!("  {id:3}  {:20} {:8} gamut {gamut}", light.name, light.model_id);
            }
        }

        Commands::Color {
            red,
            green,
            blue,
            lights,
            seconds,
        } => {
            let (bridge, mut events) = Bridge::new(BridgeEndpoint::new(&cli.host, &cli.username));
            let config = DeviceConfig {
                light_ids: lights,
                ..Default::default()
            };
            let mut device = HueDevice::new(bridge.clone(), config)?;
            bridge.connect();
            wait_ready(&mut device, &mut events).await?;

            let colors = vec![Color::rgb(red, green, blue); device.light_ids().len()];
            device.write(&colors)?;
            println!("Holding RGB({red}, {green}, {blue}) on lights {:?}", device.light_ids());
            tokio::time::sleep(Duration::from_secs(seconds)).await;

            device.set_enabled(false).await?;
            // Give the restore commands time to leave.
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        Commands::Stream {
            client_key,
            group,
            seconds,
        } => {
            let endpoint = BridgeEndpoint::new(&cli.host, &cli.username)
                .with_client_key(&client_key)
                .with_group(group);
            let (bridge, mut events) = Bridge::new(endpoint);
            let config = DeviceConfig {
                streaming: true,
                ..Default::default()
            };
            let mut device = HueDevice::new(bridge.clone(), config)?;
            bridge.connect();
            wait_ready(&mut device, &mut events).await?;
            println!("Streaming to lights {:?} for {seconds}s", device.light_ids());

            let start = Instant::now();
            let total = Duration::from_secs(seconds);
            let count = device.light_ids().len();
            while start.elapsed() < total {
                while let Ok(event) = events.try_recv() {
                    device.handle_event(event).await?;
                }
                if !device.is_ready() {
                    eprintln!("Stream ended early");
                    break;
                }

                let phase = start.elapsed().as_secs_f64() / 5.0;
                let colors: Vec<Color> = (0..count)
                    .map(|i| wheel(phase + i as f64 / count as f64))
                    .collect();
                device.write(&colors)?;
                tokio::time::sleep(Duration::from_millis(20)).await;
            }

            device.set_enabled(false).await?;
            tokio::time::sleep(Duration::from_millis(500)).await;
            println!("Done");
        }
    }

    Ok(())
}
