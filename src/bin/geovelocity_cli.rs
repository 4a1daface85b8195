use std::net::IpAddr;
use std::path::PathBuf;
use structopt::StructOpt;

use geovelocity::config::Config;
use geovelocity::geolocation::{GeoIpService, GeoResolver};
use geovelocity::models::LoginEvent;
use geovelocity::persistence::{open_store, CallContext};

/// Geovelocity command line interface
#[derive(StructOpt, Debug)]
#[structopt(name = "geovelocity", about = "Impossible travel detection CLI")]
pub enum Cli {
    /// Generate a default configuration file
    Config {
        /// Output path for the configuration file
        #[structopt(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
    /// Show the stored logins of an account around a point in time
    Neighbors {
        /// Path to configuration file
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// Account to inspect
        #[structopt(short, long)]
        account: String,
        /// Unix timestamp in seconds
        #[structopt(short, long)]
        timestamp: i64,
    },
    /// Resolve an address against the configured geolocation databases
    Locate {
        /// Path to configuration file
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// IPv4 or IPv6 address
        #[structopt(short, long)]
        ip: IpAddr,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::from_args();

    match cli {
        Cli::Config { output } => {
            let config = Config::default();
            config.to_file(&output)?;
            println!("Default configuration written to: {:?}", output);
        }
        Cli::Neighbors {
            config,
            account,
            timestamp,
        } => {
            let config = Config::load(&config)?;
            let store = open_store(&config.storage)?;
            let ctx = CallContext::background();

            let preceding = store.preceding_access(&ctx, &account, timestamp).await?;
            let subsequent = store.subsequent_access(&ctx, &account, timestamp).await?;

            println!("Account {} at {}:\n", account, format_timestamp(timestamp));
            print_neighbor("Preceding", preceding.as_ref())?;
            print_neighbor("Subsequent", subsequent.as_ref())?;
            store.close().await?;
        }
        Cli::Locate { config, ip } => {
            let config = Config::load(&config)?;
            let service = GeoIpService::open(&config.geoip)?;

            let location = service.location(ip)?;
            let anonymity = service.anonymity(ip)?;
            println!("  Address: {}", ip);
            println!(
                "  Location: {:.4}, {:.4} (radius {} km)",
                location.latitude, location.longitude, location.accuracy_radius_km
            );
            if let Some(ref time_zone) = location.time_zone {
                println!("  Time zone: {}", time_zone);
            }
            println!("  Anonymous: {}", anonymity.is_anonymous());
        }
    }

    Ok(())
}

fn print_neighbor(label: &str, event: Option<&LoginEvent>) -> Result<(), serde_json::Error> {
    match event {
        Some(event) => {
            println!("{} ({}):", label, format_timestamp(event.timestamp));
            println!("{}\n", serde_json::to_string_pretty(event)?);
        }
        None => println!("{}: none\n", label),
    }
    Ok(())
}

fn format_timestamp(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}
