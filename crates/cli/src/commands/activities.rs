// List recent activities

use anyhow::Result;
use docflow_feed_server::api::activities::ActivityListResponse;

use crate::client::Client;
use crate::output::{print_table_header, print_table_row, OutputFormat};

pub async fn run(
    client: &Client,
    output: OutputFormat,
    limit: usize,
    tenant_id: Option<&str>,
) -> Result<()> {
    let mut path = format!("/api/admin/activities?limit={}", limit);
    if let Some(tenant) = tenant_id {
        path.push_str("&tenant_id=");
        path.push_str(tenant);
    }

    let response: ActivityListResponse = client.get(&path).await?;

    if !output.is_text() {
        return output.print_value(&response);
    }

    if response.activities.is_empty() {
        println!("No activities found.");
        return Ok(());
    }

    print_table_header(&[("TIME", 19), ("TYPE", 24), ("TENANT", 12), ("ID", 36)]);
    for event in &response.activities {
        let time = event.ts.format("%Y-%m-%d %H:%M:%S").to_string();
        print_table_row(&[
            (&time, 19),
            (&event.event_type, 24),
            (&event.tenant_id, 12),
            (&event.id, 36),
        ]);
    }
    println!(
        "\nShowing {} of {} activities",
        response.activities.len(),
        response.total
    );

    Ok(())
}
