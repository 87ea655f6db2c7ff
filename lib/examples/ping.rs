use color_eyre::eyre::Result;
use r_nettools::{
    network,
    ping::{PingOptions, PingSeries},
    scanners::{ScanMessage, Scanner},
};
use std::{env, sync::mpsc};

fn main() -> Result<()> {
    color_eyre::install()?;

    let target = env::args().nth(1).unwrap_or("127.0.0.1".to_string());
    let ip = network::resolve_target(&target)?;
    let (tx, rx) = mpsc::channel::<ScanMessage>();

    let series = PingSeries::builder()
        .target(ip)
        .options(PingOptions::default().with_ttl(64))
        .count(4u32)
        .notifier(tx)
        .build()?;

    let handle = series.scan()?;

    loop {
        let msg = rx.recv()?;

        match msg {
            ScanMessage::PingDone(aggregate) => {
                println!("{}", aggregate);
                break;
            }
            ScanMessage::PingResult(outcome) => match outcome.latency_ms {
                Some(ms) => println!("reply from {}: {:.3} ms", ip, ms),
                None => println!(
                    "no reply from {}: {}",
                    ip,
                    outcome.error.unwrap_or_default()
                ),
            },
            _ => {}
        }
    }

    handle.join()?;

    Ok(())
}
