//! Fetch a URL to a local file with live progress output.
//!
//! Usage: transfer_demo <url> <destination> [expected-crc32]

use std::io::Write;

use rangefetch::{DownloadJob, ProgressObserver, Transfer, TransferConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let (Some(url), Some(destination)) = (args.next(), args.next()) else {
        eprintln!("usage: transfer_demo <url> <destination> [expected-crc32]");
        std::process::exit(2);
    };

    let mut job = DownloadJob::new(url, destination);
    if let Some(expected) = args.next() {
        job = job.with_expected_checksum(expected);
    }

    let observer: ProgressObserver = std::sync::Arc::new(|update| {
        let line = match (update.percentage, update.scaled_total) {
            (Some(pct), Some(total)) => format!(
                "{pct:5.1}% ({:.2}/{total:.2} {}) {}",
                update.scaled_read, update.unit, update.throughput
            ),
            _ => format!(
                "{:.2} {} {}",
                update.scaled_read, update.unit, update.throughput
            ),
        };
        print!("\r{line}        ");
        let _ = std::io::stdout().flush();
    });

    let transfer = Transfer::new(TransferConfig::default())?;
    let result = transfer.run(&job, Some(observer)).await?;
    println!(
        "\ndone: {} bytes in {:.1}s, crc32 {}",
        result.bytes_written,
        result.elapsed.as_secs_f64(),
        result.checksum
    );
    Ok(())
}
