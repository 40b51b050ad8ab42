//! Ping command - one liveness probe against the server.

use std::time::Duration;

use console::style;
use tokio::sync::oneshot;

use nc_core::config::AppConfig;
use nc_core::error::NcResult;
use nc_socket::Shutdown;

use crate::sink;

/// Run the ping command.
///
/// A missing pong is reported but is not an error: the server may simply
/// not implement the `ping` event.
pub async fn run(config: AppConfig, timeout: Duration) -> NcResult<()> {
    config.validate()?;
    let mut client = super::create_client(&config)?;

    let (pong_tx, pong_rx) = oneshot::channel();
    let mut pong_tx = Some(pong_tx);
    client.on_pong(move |_| {
        if let Some(tx) = pong_tx.take() {
            let _ = tx.send(());
        }
    });

    let connection = client.connect().await?;
    println!(
        "{} {} (sid {})",
        style("Connected").green().bold(),
        config.server.url,
        connection.sid
    );

    if let Err(e) = client.ping() {
        client.disconnect().await;
        return Err(e);
    }
    let stop = async {
        tokio::select! {
            _ = tokio::time::timeout(timeout, pong_rx) => {}
            _ = super::ctrl_c() => {}
        }
    };

    match client.wait(stop).await? {
        Shutdown::Interrupted => match client.last_round_trip() {
            Some(rtt) => println!(
                "{} pong in {:.1} ms",
                style("OK").green().bold(),
                rtt.as_secs_f64() * 1000.0
            ),
            None => println!(
                "{} no pong within {}s (liveness: {}); connection stayed open",
                style("WARN").yellow().bold(),
                timeout.as_secs(),
                client.liveness()
            ),
        },
        Shutdown::ServerClosed => println!("{} server closed the connection", style("FAIL").red().bold()),
        Shutdown::AuthRejected(message) => {
            sink::line(style(format!("Authentication failed: {message}")).red())
        }
    }

    Ok(())
}
