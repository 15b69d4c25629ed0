use anyhow::Result;
use clap::{Arg, ArgAction, Command, value_parser};
use rocc_harness::net::SocketTuning;
use rocc_harness::net::utils::parse_size;
use rocc_harness::sender::{
    AppLimitedSender, DEFAULT_CONGESTION, DEFAULT_PEER_ADDR, SenderConfig, TrafficPattern,
};
use std::env;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    rocc_harness::logging::init()?;

    let matches = Command::new("app_limited")
        .about("Send bursts of data separated by idle pauses")
        .arg(
            Arg::new("PORT")
                .required(true)
                .index(1)
                .value_parser(value_parser!(u16))
                .help("Port of the sink server"),
        )
        .arg(
            Arg::new("addr")
                .long("addr")
                .help("Address of the sink server [default: $PEER_HOSTNAME or 100.64.0.1]"),
        )
        .arg(
            Arg::new("congestion")
                .long("congestion")
                .default_value(DEFAULT_CONGESTION)
                .help("Congestion-control algorithm to request, empty to keep the system default"),
        )
        .arg(
            Arg::new("require_congestion")
                .long("require-congestion")
                .action(ArgAction::SetTrue)
                .help("Abort if the congestion-control algorithm cannot be selected"),
        )
        .arg(
            Arg::new("burst")
                .long("burst")
                .default_value("8MiB")
                .help("Bytes written per burst"),
        )
        .arg(
            Arg::new("chunk")
                .long("chunk")
                .default_value("1MiB")
                .help("Bytes handed to each write call"),
        )
        .arg(
            Arg::new("bursts")
                .long("bursts")
                .default_value("2")
                .value_parser(value_parser!(u32))
                .help("Number of bursts"),
        )
        .arg(
            Arg::new("pause_ms")
                .long("pause-ms")
                .default_value("2000")
                .value_parser(value_parser!(u64))
                .help("Idle time between bursts in milliseconds"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print the transfer report as JSON"),
        )
        .get_matches();

    let port = *matches.get_one::<u16>("PORT").unwrap();
    let addr = match matches.get_one::<String>("addr") {
        Some(addr) => addr.clone(),
        None => env::var("PEER_HOSTNAME").unwrap_or_else(|_| DEFAULT_PEER_ADDR.to_string()),
    };
    let congestion = matches.get_one::<String>("congestion").unwrap();
    let pattern = TrafficPattern::new(
        parse_size(matches.get_one::<String>("burst").unwrap())?,
        parse_size(matches.get_one::<String>("chunk").unwrap())? as usize,
        *matches.get_one::<u32>("bursts").unwrap(),
        Duration::from_millis(*matches.get_one::<u64>("pause_ms").unwrap()),
    )?;

    let config = SenderConfig {
        addr,
        port,
        tuning: SocketTuning {
            congestion: (!congestion.is_empty()).then(|| congestion.clone()),
            require_congestion: matches.get_flag("require_congestion"),
        },
        pattern,
    };
    let sender = AppLimitedSender::<TcpStream>::new(config);

    tokio::select! {
        result = sender.run() => {
            match result {
                Ok(report) => {
                    info!(
                        bytes = report.total_bytes,
                        mbps = %format!("{:.2}", report.throughput_mbps()),
                        "Transfer complete"
                    );
                    if matches.get_flag("json") {
                        println!("{}", serde_json::to_string(&report)?);
                    }
                }
                Err(e) => {
                    error!("Transfer aborted: {:#}", e);
                    return Err(e);
                }
            }
        }
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, closing connection");
        }
    }
    Ok(())
}
