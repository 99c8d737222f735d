use clap::Parser;
use korad_kontrol::web::{self, AppState};
use korad_kontrol::{monitor, Channel, KoradPowerSupply, PortSettings};
use log::{error, info, warn};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::time::Duration;

#[derive(Debug, Parser)]
#[clap(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
struct MyArguments {
    #[clap(short = 'p', long = "port_name", default_value = "/dev/ttyUSB0")]
    port_name: String,

    #[clap(short = 'r', long = "port_rate", default_value = "9600")]
    port_rate: u32,

    #[clap(short = 't', long = "timeout_ms", default_value = "1000")]
    timeout: u64,

    #[clap(
        short = 'c',
        long = "channels",
        num_args = 1..,
        default_values = ["1", "2", "3", "4"]
    )]
    channels: Vec<Channel>,

    #[clap(short = 'i', long = "poll_interval_s", default_value = "5")]
    poll_interval: u64,

    #[clap(short = 'l', long = "listen_port", default_value = "8080")]
    listen_port: u16,

    #[clap(short = 'v', long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // argument parser
    let args = MyArguments::parse();

    // init the logger, -v shows every command on the wire
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });
    if let Ok(filters) = env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();

    // port connection and first readings
    let settings = PortSettings {
        port_name: args.port_name.clone(),
        baud_rate: args.port_rate,
        timeout: Duration::from_millis(args.timeout),
        ..Default::default()
    };
    let channels = args.channels.clone();
    let (psu, data) = tokio::task::spawn_blocking(move || -> korad_kontrol::Result<_> {
        let psu = KoradPowerSupply::open(&settings)?;
        info!("Serial number: {}", psu.serial_number()?);
        let data = Mutex::new(monitor::initialize(&psu, &channels)?);
        if let Err(e) = monitor::poll_status(&psu, &data) {
            warn!("Status register not available: {}", e);
        }
        Ok((psu, data))
    })
    .await??;
    let psu = Arc::new(psu);
    let data = Arc::new(data);

    let running = Arc::new(AtomicBool::new(true));
    let pollers = monitor::spawn_pollers(
        Arc::clone(&psu),
        Arc::clone(&data),
        &args.channels,
        Duration::from_secs(args.poll_interval),
        Arc::clone(&running),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("quitting");
                if shutdown_tx.send(true).is_err() {
                    warn!("Server already stopped");
                }
            }
            Err(e) => {
                error!("Failed to listen for Ctrl-C: {}", e);
                // dropping the sender would stop the server
                std::future::pending::<()>().await;
            }
        }
        // a second Ctrl-C skips the clean up
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Forced exit");
            std::process::exit(130);
        }
    });

    let state = AppState::new(Arc::clone(&psu), Arc::clone(&data));
    let (addr, server) = warp::serve(web::routes(state, shutdown_rx.clone()))
        .bind_with_graceful_shutdown(
            ([0, 0, 0, 0], args.listen_port),
            web::wait_for_shutdown(shutdown_rx),
        );
    info!("Listening on http://{}", addr);
    server.await;

    running.store(false, Ordering::Relaxed);
    tokio::task::spawn_blocking(move || {
        for poller in pollers {
            if poller.join().is_err() {
                warn!("A poller panicked");
            }
        }
    })
    .await?;

    match Arc::try_unwrap(psu) {
        Ok(psu) => psu.disconnect(),
        Err(_) => warn!("Serial port still in use, closing on exit"),
    }
    Ok(())
}
