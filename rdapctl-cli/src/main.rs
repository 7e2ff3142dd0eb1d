mod output;
mod tree;

use std::time::Duration;

use clap::{Parser, Subcommand};
use rdapctl_core::{Client, RdapObject};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rdapctl")]
#[command(about = "RDAP lookups with IANA bootstrap resolution")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Emit JSON; pass --json=false for text output
    #[arg(long, global = true, default_value_t = true, action = clap::ArgAction::Set)]
    json: bool,

    /// For single-object commands: resolve immediate related objects
    /// (text mode only)
    #[arg(long, global = true)]
    walk: bool,

    /// TLD hint for entity lookups (e.g. "com")
    #[arg(long, global = true, default_value = "")]
    tld: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch domain RDAP
    Domain { fqdn: String },
    /// Fetch IP network RDAP
    Ip { ip_or_cidr: String },
    /// Fetch autnum RDAP
    Asn { asn: String },
    /// Fetch nameserver RDAP
    Ns { hostname: String },
    /// Fetch entity RDAP (use --tld as a hint)
    Entity { handle: String },
    /// Auto-detect and fetch RDAP (ASN/IP/domain/NS/entity)
    Lookup { query: String },
    /// Flush the RDAP graph reachable from a seed
    Tree {
        seed: String,
        /// Maximum recursion depth when walking the graph
        #[arg(long, default_value_t = 5)]
        max_depth: usize,
        /// Follow RDAP links[] to fetch additional objects (best-effort)
        #[arg(long)]
        follow_links: bool,
    },
}

/// Builds the client from `RDAPCTL_*` environment overrides.
fn client_from_env() -> Client {
    let mut client = Client::new();
    if let Ok(ua) = std::env::var("RDAPCTL_UA") {
        if !ua.is_empty() {
            client = client.with_user_agent(&ua);
        }
    }
    if let Ok(timeout) = std::env::var("RDAPCTL_TIMEOUT") {
        if let Ok(secs) = timeout.trim().parse::<u64>() {
            client = client.with_timeout(Duration::from_secs(secs));
        }
    }
    if let Ok(url) = std::env::var("RDAPCTL_DNS_BOOTSTRAP") {
        if !url.is_empty() {
            client = client.with_bootstrap_url(&url);
        }
    }
    if let Ok(url) = std::env::var("RDAPCTL_IP_BOOTSTRAP") {
        if !url.is_empty() {
            client = client.with_ip_bootstrap_url(&url);
        }
    }
    if let Ok(url) = std::env::var("RDAPCTL_ASN_BOOTSTRAP") {
        if !url.is_empty() {
            client = client.with_asn_bootstrap_url(&url);
        }
    }
    client
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let client = client_from_env();

    let object = match &cli.command {
        Commands::Domain { fqdn } => RdapObject::Domain(client.domain(fqdn).await?),
        Commands::Ip { ip_or_cidr } => RdapObject::IpNetwork(client.ip(ip_or_cidr).await?),
        Commands::Asn { asn } => RdapObject::Autnum(client.autnum(asn).await?),
        Commands::Ns { hostname } => RdapObject::Nameserver(client.nameserver(hostname).await?),
        Commands::Entity { handle } => RdapObject::Entity(client.entity(handle, &cli.tld).await?),
        Commands::Lookup { query } => client.lookup(query, &cli.tld).await?,
        Commands::Tree {
            seed,
            max_depth,
            follow_links,
        } => {
            let seed_object = client.lookup(seed, &cli.tld).await?;
            let graph = tree::flush(&client, seed_object, *max_depth, *follow_links).await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&graph)?);
            } else {
                tree::print_text(seed, *max_depth, *follow_links, &graph);
            }
            return Ok(());
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&object)?);
    } else {
        output::print_object(&client, &object, cli.walk).await;
    }
    Ok(())
}
