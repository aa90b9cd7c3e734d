use anyhow::Result;

use crate::api_client::{ApiClient, LbRuleResponse};
use crate::cli::OutputFormat;

// ── Health ──────────────────────────────────────────────────────────────

pub async fn cmd_health(client: &ApiClient, output: OutputFormat) -> Result<()> {
    let health = client.healthz().await?;

    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&health)?);
        return Ok(());
    }

    println!("Health: {}", health.status);
    Ok(())
}

// ── Metrics ─────────────────────────────────────────────────────────────

pub async fn cmd_metrics(client: &ApiClient) -> Result<()> {
    let text = client.metrics().await?;
    print!("{text}");
    Ok(())
}

// ── Agent Status ────────────────────────────────────────────────────────

pub async fn cmd_status(client: &ApiClient, output: OutputFormat) -> Result<()> {
    let status = client.get_status().await?;

    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("lbplane Agent Status");
    println!("  Version:        {}", status.version);
    println!("  Uptime:         {}", format_uptime(status.uptime_seconds));
    println!("  Cluster role:   {}", status.role);
    println!("  NAT/LB rules:   {}", status.lb_rules);
    println!("  Firewall rules: {}", status.fw_rules);
    println!("  Endpoint hosts: {}", status.ep_hosts);
    println!("  VIPs:           {}", status.vips);
    Ok(())
}

// ── NAT/LB ──────────────────────────────────────────────────────────────

pub async fn cmd_lb_list(client: &ApiClient, output: OutputFormat) -> Result<()> {
    let rules = client.list_lb_rules().await?;

    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&rules)?);
        return Ok(());
    }

    if rules.is_empty() {
        println!("No NAT/LB rules configured.");
        return Ok(());
    }

    println!(
        "{:>5}  {:<16}  {:<22}  {:<5}  {:>4}  {:<10}  {:<10}  {:<8}  {:>3}  {:>10}",
        "ID", "NAME", "SERVICE", "PROTO", "PREF", "SELECT", "MODE", "SYNC", "EPS", "PACKETS"
    );
    for rule in &rules {
        println!(
            "{:>5}  {:<16}  {:<22}  {:<5}  {:>4}  {:<10}  {:<10}  {:<8}  {:>3}  {:>10}",
            rule.id,
            dash_if_empty(&rule.name),
            format!("{}:{}", rule.vip, rule.port),
            rule.proto,
            rule.pref,
            rule.select,
            rule.mode,
            rule.sync,
            serving_summary(rule),
            rule.packets,
        );
    }

    println!("\n{} rule(s) total.", rules.len());
    Ok(())
}

pub async fn cmd_lb_get(client: &ApiClient, id: u32, output: OutputFormat) -> Result<()> {
    let rule = client.get_lb_rule(id).await?;

    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&rule)?);
        return Ok(());
    }

    println!("Rule {} {}", rule.id, dash_if_empty(&rule.name));
    println!("  Service:  {}:{}/{} pref {}", rule.vip, rule.port, rule.proto, rule.pref);
    println!("  Select:   {}", rule.select);
    println!("  Mode:     {}", rule.mode);
    println!("  Monitor:  {}", yes_no(rule.monitor));
    println!("  Sync:     {}", rule.sync);
    println!("  Endpoints:");
    for ep in &rule.endpoints {
        println!(
            "    {:<22}  weight {:>3}  {:<9}  serving {}",
            format!("{}:{}", ep.addr, ep.port),
            ep.weight,
            ep.state,
            yes_no(ep.serving),
        );
    }
    Ok(())
}

pub async fn cmd_lb_add(client: &ApiClient, json: &str, output: OutputFormat) -> Result<()> {
    let body = parse_json(json)?;
    let resp = client.create_lb_rule(&body).await?;

    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&resp)?);
        return Ok(());
    }

    println!("Rule {}: {}", resp.id, resp.outcome);
    Ok(())
}

pub async fn cmd_lb_delete(
    client: &ApiClient,
    vip: &str,
    port: u16,
    proto: &str,
    pref: u16,
) -> Result<()> {
    let key = serde_json::json!({ "vip": vip, "port": port, "proto": proto, "pref": pref });
    client.delete_lb_rule(&key).await?;
    println!("Service deleted: {vip}:{port}/{proto}");
    Ok(())
}

// ── Firewall ────────────────────────────────────────────────────────────

pub async fn cmd_firewall_list(client: &ApiClient, output: OutputFormat) -> Result<()> {
    let rules = client.list_fw_rules().await?;

    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&rules)?);
        return Ok(());
    }

    if rules.is_empty() {
        println!("No firewall rules configured.");
        return Ok(());
    }

    println!(
        "{:>5}  {:>4}  {:<8}  {:>8}  {:<6}  {:<8}  {:>10}  MATCH",
        "ID", "PREF", "ACTION", "MARK", "RECORD", "SYNC", "PACKETS"
    );
    for rule in &rules {
        println!(
            "{:>5}  {:>4}  {:<8}  {:>8}  {:<6}  {:<8}  {:>10}  {}",
            rule.id,
            rule.pref,
            rule.action,
            rule.mark,
            yes_no(rule.record),
            rule.sync,
            rule.packets,
            rule.tuple,
        );
    }

    println!("\n{} rule(s) total.", rules.len());
    Ok(())
}

pub async fn cmd_firewall_add(client: &ApiClient, json: &str, output: OutputFormat) -> Result<()> {
    let body = parse_json(json)?;
    let resp = client.create_fw_rule(&body).await?;

    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&resp)?);
        return Ok(());
    }

    println!("Firewall rule created: {}", resp.id);
    Ok(())
}

pub async fn cmd_firewall_delete(client: &ApiClient, json: &str) -> Result<()> {
    let body = parse_json(json)?;
    client.delete_fw_rule(&body).await?;
    println!("Firewall rule deleted.");
    Ok(())
}

// ── Endpoints / VIPs ────────────────────────────────────────────────────

pub async fn cmd_endpoints(client: &ApiClient, output: OutputFormat) -> Result<()> {
    let hosts = client.list_endpoints().await?;

    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&hosts)?);
        return Ok(());
    }

    if hosts.is_empty() {
        println!("No endpoint hosts registered.");
        return Ok(());
    }

    println!(
        "{:<32}  {:<8}  {:<9}  {:>4}  {:>5}  {:>8}  LAST ERROR",
        "HOST", "STATE", "MONITORED", "REFS", "SHARD", "INTERVAL"
    );
    for h in &hosts {
        println!(
            "{:<32}  {:<8}  {:<9}  {:>4}  {:>5}  {:>7}s  {}",
            h.key,
            h.state,
            yes_no(h.monitored),
            h.ref_count,
            h.shard,
            h.interval_secs,
            h.last_error.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

pub async fn cmd_vips(client: &ApiClient, output: OutputFormat) -> Result<()> {
    let list = client.list_vips().await?;

    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    println!("Cluster role: {}", list.role);
    if list.vips.is_empty() {
        println!("No VIPs in use.");
        return Ok(());
    }
    println!("{:<40}  {:<40}  {:>4}", "VIP", "ADVERTISED", "REFS");
    for v in &list.vips {
        println!("{:<40}  {:<40}  {:>4}", v.vip, v.advertised, v.ref_count);
    }
    Ok(())
}

pub async fn cmd_flush(client: &ApiClient, output: OutputFormat) -> Result<()> {
    let resp = client.delete_all_rules().await?;

    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&resp)?);
        return Ok(());
    }

    println!("{} rule(s) removed.", resp.removed);
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn parse_json(json: &str) -> Result<serde_json::Value> {
    serde_json::from_str(json).map_err(|e| anyhow::anyhow!("invalid JSON: {e}"))
}

/// `serving/total` endpoint count.
fn serving_summary(rule: &LbRuleResponse) -> String {
    let serving = rule.endpoints.iter().filter(|e| e.serving).count();
    format!("{serving}/{}", rule.endpoints.len())
}

fn dash_if_empty(s: &str) -> &str {
    if s.is_empty() { "-" } else { s }
}

fn yes_no(val: bool) -> &'static str {
    if val { "yes" } else { "no" }
}

fn format_uptime(seconds: u64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}
