//! Stand-alone observation consumer: listens for one producer and prints
//! every message it receives.
//!
//! Usage: `oov [--port N] [--buffer-size B]`

use clap::Parser;
use log::error;
use rdevs::core::observation::stream::{NetStreamReader, StreamReader, DEFAULT_BUFFER_SIZE};
use rdevs::core::types::Time;
use rdevs::Value;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "oov")]
#[command(about = "Print the observation stream of a running simulation")]
struct Args {
    /// TCP port to listen on
    #[arg(long, default_value_t = 4000)]
    port: u16,

    /// Read buffer size in bytes
    #[arg(long = "buffer-size", default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,

    /// Keep accepting producers after a stream closes
    #[arg(long)]
    daemon: bool,
}

/// Prints one line per message
struct Printer;

impl StreamReader for Printer {
    fn on_parameter(
        &mut self,
        plugin: &str,
        location: &str,
        file: &str,
        parameter: Value,
        time: Time,
    ) {
        println!(
            "{} parameter plugin={} location={} file={} {}",
            time, plugin, location, file, parameter
        );
    }

    fn on_new_observable(
        &mut self,
        simulator: &str,
        _parent: &str,
        port: &str,
        view: &str,
        time: Time,
    ) {
        println!("{} new {}.{} in {}", time, simulator, port, view);
    }

    fn on_del_observable(
        &mut self,
        simulator: &str,
        _parent: &str,
        port: &str,
        view: &str,
        time: Time,
    ) {
        println!("{} del {}.{} in {}", time, simulator, port, view);
    }

    fn on_value(
        &mut self,
        simulator: &str,
        _parent: &str,
        port: &str,
        view: &str,
        time: Time,
        value: Option<Value>,
    ) {
        match value {
            Some(value) => println!("{} {} {}.{} = {}", time, view, simulator, port, value),
            None => println!("{} {} {}.{} missing", time, view, simulator, port),
        }
    }

    fn on_close(&mut self, time: Time) {
        println!("{} close", time);
    }
}

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let mut server = match NetStreamReader::bind(("0.0.0.0", args.port)) {
        Ok(server) => server,
        Err(e) => {
            error!("cannot listen on port {}: {}", args.port, e);
            process::exit(1);
        }
    };
    server.set_buffer_size(args.buffer_size);

    loop {
        match server.process(&mut Printer) {
            Ok(true) => {}
            Ok(false) => error!("producer disconnected before closing the stream"),
            Err(e) => {
                error!("{}", e);
                process::exit(1);
            }
        }
        if !args.daemon {
            break;
        }
    }
}
