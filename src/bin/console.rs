use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use serde_json::{Map, Value};

use visitgate::client::{Delivery, EventEmitter, IdentityResolver, SystemContextProvider};
use visitgate::config::ClientConfig;
use visitgate::console::{AdminConsole, Lookup, VisitorView};
use visitgate::registry::AccessStatus;

const USAGE: &str = "usage:
  visitgate_console list
  visitgate_console show <id> [ip]
  visitgate_console set <id> <allow|force_login|block>
  visitgate_console track <event_type> [target_resource]";

#[tokio::main]
async fn main() -> Result<()> {
    visitgate::logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = ClientConfig::from_env()?;
    let console = AdminConsole::new(&config);

    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["list"] => list(&console).await,
        ["show", id] => show(&console, id, None).await,
        ["show", id, ip] => show(&console, id, Some(*ip)).await,
        ["set", id, status] => set(&console, id, status).await,
        ["track", event_type] => track(&config, event_type, "").await,
        ["track", event_type, target] => track(&config, event_type, target).await,
        _ => bail!(USAGE),
    }
}

async fn list(console: &AdminConsole) -> Result<()> {
    let visitors = console.list_visitors().await?;
    if visitors.is_empty() {
        println!("no visitors recorded");
        return Ok(());
    }
    println!("{:>5}  {:<38} {:<16} {:<12} {:>6}", "id", "visitor_id", "ip", "status", "events");
    for v in visitors {
        println!(
            "{:>5}  {:<38} {:<16} {:<12} {:>6}",
            v.id,
            v.visitor_id,
            v.ip_address.as_deref().unwrap_or("-"),
            v.access_status,
            v.event_count
        );
    }
    Ok(())
}

fn print_view(view: &VisitorView) {
    println!("visitor  {}", view.visitor_id);
    match &view.record {
        Lookup::Available(detail) => {
            let v = &detail.visitor;
            println!("status   {}", v.access_status);
            println!("ip       {}", v.ip_address.as_deref().unwrap_or("-"));
            println!("seen     {} .. {} ({} events)", v.first_seen, v.last_seen, v.event_count);
            for e in &detail.recent_events {
                println!("  {} {:<12} {} {}", e.timestamp, e.event_type, e.url, e.target_resource);
            }
        }
        Lookup::Unavailable(reason) => println!("record   unavailable ({})", reason),
    }
    match &view.geo {
        Lookup::Available(geo) => println!(
            "location {}, {}, {} [{}] org={} tz={}",
            geo.city.as_deref().unwrap_or("?"),
            geo.region.as_deref().unwrap_or("?"),
            geo.country_name.as_deref().unwrap_or("?"),
            match (geo.latitude, geo.longitude) {
                (Some(lat), Some(lon)) => format!("{:.4},{:.4}", lat, lon),
                _ => "?".to_string(),
            },
            geo.org.as_deref().unwrap_or("?"),
            geo.timezone.as_deref().unwrap_or("?"),
        ),
        Lookup::Unavailable(reason) => println!("location unavailable ({})", reason),
    }
    if let Some(device) = view.device() {
        println!(
            "device   {} / {}",
            device.os.as_deref().unwrap_or("?"),
            device.browser.as_deref().unwrap_or("?")
        );
    }
}

async fn show(console: &AdminConsole, id: &str, ip: Option<&str>) -> Result<()> {
    let view = match ip {
        Some(ip) => console.open_visitor(id, Some(ip)).await,
        None => console.open_recorded_visitor(id).await,
    };
    print_view(&view);
    Ok(())
}

async fn set(console: &AdminConsole, id: &str, status: &str) -> Result<()> {
    let target: AccessStatus = status.parse()?;
    let mut view = console.open_visitor(id, None).await;
    let feedback = console.change_status(&mut view, target).await;
    println!("{:?}", feedback);
    if !feedback.is_success() {
        return Err(anyhow!("status change failed"));
    }
    Ok(())
}

async fn track(config: &ClientConfig, event_type: &str, target: &str) -> Result<()> {
    let context = Arc::new(SystemContextProvider::new(config.user_agent.clone()));
    let identity = Arc::new(IdentityResolver::for_device(context.clone()));
    let emitter = EventEmitter::new(config, identity.clone(), context);

    let mut metadata = Map::new();
    metadata.insert("source".to_string(), Value::String("console".to_string()));
    match emitter.emit(event_type, metadata, target).await {
        Delivery::Delivered => println!("delivered as {}", identity.visitor_id().await),
        Delivery::Dropped(reason) => println!("dropped: {}", reason),
    }
    Ok(())
}
