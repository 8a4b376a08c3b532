// Publish an activity through the admin API

use anyhow::{Context, Result};
use docflow_feed_core::Event;
use docflow_feed_server::api::activities::CreateActivityRequest;
use serde_json::{Map, Value};

use crate::client::Client;
use crate::output::{print_field, OutputFormat};

pub async fn run(
    client: &Client,
    output: OutputFormat,
    event_type: &str,
    details: Option<&str>,
    tenant_id: Option<&str>,
) -> Result<()> {
    let request = CreateActivityRequest {
        event_type: event_type.to_string(),
        tenant_id: tenant_id.map(String::from),
        details: parse_details(details)?,
    };

    let event: Event = client.post("/api/admin/activities", &request).await?;

    if output.is_text() {
        print_field("ID", &event.id);
        print_field("Type", &event.event_type);
        print_field("Tenant", &event.tenant_id);
        print_field("Timestamp", &event.ts.to_rfc3339());
    } else {
        output.print_value(&event)?;
    }

    Ok(())
}

fn parse_details(details: Option<&str>) -> Result<Map<String, Value>> {
    let Some(raw) = details else {
        return Ok(Map::new());
    };
    let value: Value = serde_json::from_str(raw).context("--details must be valid JSON")?;
    match value {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("--details must be a JSON object"),
    }
}
