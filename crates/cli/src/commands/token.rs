// Mint a development admin token
// Signs with the same secret the server validates against

use std::time::Duration;

use anyhow::Result;
use docflow_feed_server::TokenService;
use serde_json::json;

use crate::output::OutputFormat;

pub fn run(
    output: OutputFormat,
    secret: &str,
    role: &str,
    sub: &str,
    tenant_id: Option<&str>,
    ttl_secs: u64,
) -> Result<()> {
    let tokens = TokenService::new(secret, vec![role.to_string()]);
    let token = tokens.mint(sub, role, tenant_id, Duration::from_secs(ttl_secs))?;

    if output.is_text() {
        println!("{}", token);
    } else {
        output.print_value(&json!({
            "token": token,
            "role": role,
            "sub": sub,
            "tenant_id": tenant_id,
            "expires_in": ttl_secs,
        }))?;
    }

    Ok(())
}
