//! qubesmgmt-ls: print the domains, labels and storage pools known to qubesd.
//!
//! Configuration comes from the environment (see `ClientConfig::from_env`).
//! Set `QUBESMGMT_LS_JSON=1` for one JSON document instead of a table.

use qubesmgmt::{ClientConfig, Properties, Qubes, Wrapper};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Serialize)]
struct DomainSummary {
    name: String,
    class: String,
    properties: Properties,
}

#[derive(Debug, Serialize)]
struct Listing {
    connection: String,
    domains: Vec<DomainSummary>,
    labels: Vec<String>,
    pools: Vec<String>,
}

async fn collect(app: &Qubes) -> qubesmgmt::Result<Listing> {
    let snapshot = app.domains.snapshot().await?;
    let mut domains = Vec::with_capacity(snapshot.len());
    for domain in app.domains.objects().await? {
        let name = domain.name();
        domains.push(DomainSummary {
            properties: snapshot.get(&name).cloned().unwrap_or_default(),
            class: domain.class().to_string(),
            name,
        });
    }

    Ok(Listing {
        connection: app.connection_type().to_string(),
        domains,
        labels: app.labels.keys().await?,
        pools: app.pools.keys().await?,
    })
}

fn print_table(listing: &Listing) {
    let width = listing
        .domains
        .iter()
        .map(|d| d.name.len())
        .max()
        .unwrap_or(4)
        .max(4);

    println!("{:<width$}  {:<12}  STATE", "NAME", "CLASS");
    for domain in &listing.domains {
        let state = domain.properties.get("state").map(String::as_str).unwrap_or("-");
        println!("{:<width$}  {:<12}  {}", domain.name, domain.class, state);
    }
    println!();
    println!("labels: {}", listing.labels.join(", "));
    println!("pools:  {}", listing.pools.join(", "));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the listing.
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("qubesmgmt=info".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ClientConfig::from_env();
    tracing::debug!(?config, "Configuration loaded");

    let app = Qubes::new(&config);
    let listing = collect(&app).await?;
    tracing::debug!(
        domains = listing.domains.len(),
        labels = listing.labels.len(),
        pools = listing.pools.len(),
        "Listing collected"
    );

    let json = std::env::var("QUBESMGMT_LS_JSON")
        .map(|v| v != "0" && v != "false")
        .unwrap_or(false);
    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
    } else {
        print_table(&listing);
    }
    Ok(())
}
