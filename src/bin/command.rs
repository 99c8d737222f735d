use clap::Parser;
use korad_kontrol::{KoradPowerSupply, PortSettings};
use std::error::Error;
use std::time::Duration;

#[derive(Debug, Parser)]
#[clap(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    arg_required_else_help = true,
)]
struct MyArguments {
    #[clap(
        value_name = "COMMAND",
        help = "send command (String), ex. \"VOUT1?\" or \"VSET1:5.000\"",
        required = true
    )]
    command: String,

    #[clap(short = 'p', long = "port_name", default_value = "/dev/ttyUSB0")]
    port_name: String,

    #[clap(short = 'r', long = "port_rate", default_value = "9600")]
    port_rate: u32,

    #[clap(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = MyArguments::parse();

    pretty_env_logger::formatted_builder()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .init();

    let settings = PortSettings {
        port_name: args.port_name,
        baud_rate: args.port_rate,
        open_delay: Duration::from_millis(100),
        ..Default::default()
    };
    let psu = KoradPowerSupply::open(&settings)?;

    let command = args.command.trim();
    println!("send command: {}", command);

    if command == "STATUS?" {
        let status = psu.status()?;
        println!("Result:");
        println!("{:#010b}", status.bits());
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else if command.ends_with('?') {
        let response = psu.query(command)?;
        println!("Result:");
        println!("{:?}", response);
    } else {
        psu.send_command(command)?;
    }

    psu.disconnect();
    Ok(())
}
