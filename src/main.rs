use log::info;
use node_bridge_service::Bridge;
use std::io::BufRead;
use std::thread;

mod config;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = config::obtain()?;
    info!("connecting to {}", config.rpc_endpoint);
    let bridge = Bridge::new(config)?;

    let headers = bridge.observed_headers();
    let consumer = thread::spawn(move || {
        // Ends once the bridge is shut down and the buffer is drained.
        while let Some(header) = headers.recv_blocking() {
            match header.block_number() {
                Ok(number) => info!("new head #{} {}", number, header.hash),
                Err(err) => info!("new head {} ({})", header.hash, err),
            }
        }
    });

    info!("press enter to stop");
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);

    bridge.shutdown();
    let report = bridge.status_report();
    info!(
        "relayed {} headers, {} failed subscribe attempts",
        report.headers_relayed, report.subscribe_failures
    );
    drop(bridge);

    if consumer.join().is_err() {
        anyhow::bail!("the header consumer panicked");
    }
    Ok(())
}
