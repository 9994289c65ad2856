use anyhow::{Context, bail};
use oltlink::commands::OltQuery;
use oltlink::inventory::DeviceInventory;
use oltlink::session::{Credentials, SessionManager};
use std::env;
use std::process;

fn print_usage() {
    eprintln!(
        "Usage: OLT_PASSWORD=<password> cargo run --example olt_query -- <devices.csv> <olt-name> <username> [autofind | sn <serial> | desc <description>]"
    );
}

fn parse_query(args: &[String]) -> anyhow::Result<OltQuery> {
    match args.first().map(String::as_str) {
        None | Some("autofind") => Ok(OltQuery::Autofind),
        Some("sn") => Ok(OltQuery::BySerial(args[1..].join(" "))),
        Some("desc") => Ok(OltQuery::ByDescription(args[1..].join(" "))),
        Some(other) => bail!("unknown query '{other}'"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 || args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        process::exit(2);
    }

    let inventory = DeviceInventory::load(&args[1]);
    let olt = &args[2];
    let Some(address) = inventory.address(olt) else {
        let known = inventory.names().collect::<Vec<_>>().join(", ");
        bail!("no address known for '{olt}' (known devices: {known})");
    };

    let password = env::var("OLT_PASSWORD").context("OLT_PASSWORD is not set")?;
    let command = parse_query(&args[4..])?.to_command()?;

    let mut session = SessionManager::new(address, Credentials::new(args[3].as_str(), password));
    session
        .connect()
        .await
        .with_context(|| format!("connecting to {olt} ({address})"))?;

    let result = session.execute(&command).await;
    session.disconnect().await;

    let output = result.with_context(|| format!("running '{command}' on {olt}"))?;
    println!("{}", output.all);
    Ok(())
}
