use color_eyre::eyre::Result;
use r_nettools::scanners::{
    ScanMessage, Scanner, SubnetDevice, subnet_scanner::SubnetScanner,
};
use std::sync::mpsc;

fn main() -> Result<()> {
    color_eyre::install()?;

    let (tx, rx) = mpsc::channel::<ScanMessage>();

    let scanner = SubnetScanner::builder()
        .concurrency(64usize)
        .notifier(tx)
        .build()?;

    let handle = scanner.scan()?;

    let results: Vec<SubnetDevice> = loop {
        let msg = rx.recv()?;

        match msg {
            ScanMessage::DevicesDone(devices) => {
                println!("scanning complete");
                break devices;
            }
            ScanMessage::DeviceFound(device) => {
                println!("found device: {}", device.ip)
            }
            ScanMessage::Error(e) => println!("error: {}", e),
            _ => {}
        }
    };

    handle.join()?;

    println!("results: {:?}", results);

    Ok(())
}
