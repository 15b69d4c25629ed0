use anyhow::Result;
use clap::{Arg, ArgAction, Command, value_parser};
use rocc_harness::net::utils::{host_port, parse_size};
use rocc_harness::report::ConnectionReport;
use rocc_harness::receiver::{DEFAULT_BIND_ADDR, ServeMode, SinkServer};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    rocc_harness::logging::init()?;

    let matches = Command::new("sink_server")
        .about("Accept TCP connections and discard everything they send")
        .arg(
            Arg::new("PORT")
                .required(true)
                .index(1)
                .value_parser(value_parser!(u16))
                .help("Port to listen on"),
        )
        .arg(
            Arg::new("bind")
                .long("bind")
                .default_value(DEFAULT_BIND_ADDR)
                .help("Local address to bind"),
        )
        .arg(
            Arg::new("backlog")
                .long("backlog")
                .default_value("5")
                .value_parser(value_parser!(u32))
                .help("Listen backlog"),
        )
        .arg(
            Arg::new("buffer")
                .long("buffer")
                .default_value("32KiB")
                .help("Bytes requested per read"),
        )
        .arg(
            Arg::new("concurrent")
                .long("concurrent")
                .action(ArgAction::SetTrue)
                .help("Drain each connection in its own task instead of one at a time"),
        )
        .arg(
            Arg::new("max_connections")
                .long("max-connections")
                .value_parser(value_parser!(usize))
                .help("Exit after serving this many connections"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print a JSON report for every finished connection"),
        )
        .get_matches();

    let port = *matches.get_one::<u16>("PORT").unwrap();
    let bind = host_port(matches.get_one::<String>("bind").unwrap(), port);
    let mode = if matches.get_flag("concurrent") {
        ServeMode::Concurrent
    } else {
        ServeMode::Sequential
    };
    let limit = matches.get_one::<usize>("max_connections").copied();
    let json = matches.get_flag("json");

    let backlog = *matches.get_one::<u32>("backlog").unwrap();
    let server = SinkServer::<TcpListener>::bind(&bind, backlog)
        .await?
        .with_buffer_bytes(parse_size(matches.get_one::<String>("buffer").unwrap())? as usize)
        .with_mode(mode);

    let on_report = |report: &ConnectionReport| {
        if json {
            match serde_json::to_string(report) {
                Ok(line) => println!("{}", line),
                Err(e) => error!("Could not encode report: {}", e),
            }
        }
    };

    tokio::select! {
        result = server.serve_with(limit, on_report) => {
            if let Err(e) = result {
                error!("Closing server: {:#}", e);
                return Err(e);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, closing server");
        }
    }
    Ok(())
}
