//! Console rendering for client events.
//!
//! Formatting is kept separate from printing so the layouts can be tested.

use chrono::Local;
use console::style;
use serde_json::Value;

use nc_core::config::AppConfig;
use nc_core::constants::APP_NAME;
use nc_socket::{Connection, DisconnectReason, NotificationEvent};

const RULE_WIDTH: usize = 50;

/// Local wall-clock time used to prefix every printed line.
pub fn now_stamp() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

/// Print one timestamped status line.
pub fn line(message: impl std::fmt::Display) {
    println!("{} {message}", style(format!("[{}]", now_stamp())).dim());
}

/// Startup banner lines. The API key is always masked.
pub fn banner_lines(config: &AppConfig) -> Vec<String> {
    let rule = "=".repeat(40);
    let mut lines = vec![
        format!("{APP_NAME} v{}", nc_core::constants::APP_VERSION),
        rule.clone(),
        format!("Server URL: {}", config.server.url),
        format!("API Key: {}", config.auth.masked_api_key()),
        format!("User Email: {}", config.auth.email),
    ];
    if let Some(room) = &config.subscription.room {
        lines.push(format!("Room: {room}"));
    }
    lines.push(format!("Transports: {}", config.server.transports.join(", ")));
    lines.push(rule);
    lines
}

pub fn print_banner(config: &AppConfig) {
    for (i, text) in banner_lines(config).into_iter().enumerate() {
        if i == 0 {
            println!("{}", style(text).bold());
        } else {
            println!("{text}");
        }
    }
    println!();
}

pub fn print_missing_key_warning() {
    println!(
        "{} No API key set. Connection may be rejected if server requires authentication.",
        style("WARNING:").yellow().bold()
    );
    println!(
        "Set {} or pass --api-key to authenticate.",
        nc_core::constants::env::API_KEY
    );
    println!();
}

/// Block layout for one notification.
pub fn notification_lines(event: &NotificationEvent) -> Vec<String> {
    let mut lines = vec![
        "=== NOTIFICATION RECEIVED ===".to_string(),
        format!("  Type: {}", event.kind),
    ];
    if let Some(title) = event.display_title() {
        lines.push(format!("  Title: {title}"));
    }
    lines.push(format!("  Message: {}", event.message));
    if let Some(data) = event.data.as_ref().filter(|d| !is_empty_value(d)) {
        lines.push(format!("  Data: {data}"));
    }
    lines.push(format!(
        "  Timestamp: {}",
        event.timestamp.as_deref().unwrap_or("N/A")
    ));
    lines.push("=".repeat(RULE_WIDTH));
    lines
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

pub fn print_notification(event: &NotificationEvent) {
    let mut lines = notification_lines(event).into_iter();
    println!();
    if let Some(header) = lines.next() {
        line(style(header).cyan().bold());
    }
    for text in lines {
        println!("{text}");
    }
}

pub fn connected_message(connection: &Connection) -> String {
    format!(
        "Connected to server with SID: {} ({})",
        connection.sid, connection.transport
    )
}

pub fn disconnected_message(reason: &DisconnectReason) -> String {
    match reason {
        DisconnectReason::ClientRequested => "Disconnected from server".to_string(),
        other => format!("Disconnected from server: {other}"),
    }
}

/// Render an arbitrary event payload compactly; null renders as nothing.
pub fn payload_text(data: &Value) -> String {
    match data {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
