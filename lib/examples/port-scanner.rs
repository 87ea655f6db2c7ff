use color_eyre::eyre::Result;
use r_nettools::{
    network,
    scanners::{Protocol, ScanMessage, Scanner, port_scanner::PortScanner},
    targets::ports::PortTargets,
};
use std::{env, sync::mpsc};

fn main() -> Result<()> {
    color_eyre::install()?;

    let target = env::args().nth(1).unwrap_or("127.0.0.1".to_string());
    let ip = network::resolve_target(&target)?;
    let port_targets = PortTargets::new(vec![
        "22".to_string(),
        "80".to_string(),
        "443".to_string(),
        "2000-9000".to_string(),
    ])?;
    let (tx, rx) = mpsc::channel::<ScanMessage>();

    let scanner = PortScanner::builder()
        .target(ip)
        .ports(port_targets)
        .protocol(Protocol::Tcp)
        .notifier(tx)
        .build()?;

    let handle = scanner.scan()?;

    loop {
        let msg = rx.recv()?;

        match msg {
            ScanMessage::PortsDone(open) => {
                println!("scanning complete");
                println!("open ports: {:?}", open);
                break;
            }
            ScanMessage::PortResult(result) if result.open => {
                println!("found open port: {}", result.port)
            }
            _ => {}
        }
    }

    handle.join()?;

    Ok(())
}
