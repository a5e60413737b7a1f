use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;

use crate::commands::info::EnvironmentInfo;
use crate::environment::{ComponentSource, InstanceDescriptor, Multisite};
use crate::health::OverallStatus;
use crate::orchestrator::engine::ContainerDetails;

/// A line of `info --all`.
#[derive(Debug, Clone)]
pub enum ListRow {
    Ok(Box<EnvironmentInfo>),
    Failed { slug: String, reason: String },
}

pub fn use_color() -> bool {
    std::io::stdout().is_terminal()
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn print_indented(table: &Table) {
    println!();
    for line in table.to_string().lines() {
        println!("  {}", line);
    }
    println!();
}

pub fn status_text(status: OverallStatus, color: bool) -> String {
    if !color {
        return status.to_string();
    }
    match status {
        OverallStatus::Up => format!("{} {}", "\u{25cf}".green(), status.green()),
        OverallStatus::PartiallyUp => format!("{} {}", "\u{25cf}".yellow(), status.yellow()),
        OverallStatus::Down => format!("{} {}", "\u{25cf}".red(), status.red()),
    }
}

fn toggle(on: bool) -> String {
    if on { "enabled" } else { "disabled" }.to_string()
}

fn component(source: &ComponentSource) -> String {
    match source {
        ComponentSource::Local { dir } => format!("{} (local)", dir.display()),
        other => other.to_string(),
    }
}

/// Key/value rows describing a descriptor's configuration.
pub fn descriptor_rows(d: &InstanceDescriptor, domain: &str) -> Vec<(&'static str, String)> {
    let wordpress = match &d.wordpress.reference {
        Some(reference) if *reference != d.wordpress.tag => {
            format!("{} ({})", d.wordpress.tag, reference)
        }
        _ => d.wordpress.tag.clone(),
    };
    let multisite = match d.multisite {
        Multisite::Off => "no".to_string(),
        other => other.to_string(),
    };
    let media = match (d.media_proxy, &d.media_redirect_domain) {
        (true, Some(redirect)) => format!("enabled ({})", redirect),
        (on, _) => toggle(on),
    };

    let mut rows = vec![
        ("SLUG", d.slug.clone()),
        ("TITLE", d.title.clone()),
        ("SITE URL", format!("http://{}/", d.host(domain))),
    ];
    if let Some(url) = d.autologin_url(domain) {
        rows.push(("LOGIN URL", url));
    }
    rows.extend([
        ("PHP", d.php_version.clone()),
        ("WORDPRESS", wordpress),
        ("MULTISITE", multisite),
        ("MU PLUGINS", component(&d.mu_plugins)),
        ("APP CODE", component(&d.app_code)),
        ("ELASTICSEARCH", toggle(d.elasticsearch)),
        ("PHPMYADMIN", toggle(d.php_my_admin)),
        ("XDEBUG", toggle(d.xdebug)),
        ("MAILPIT", toggle(d.mail_catcher)),
        ("MEDIA PROXY", media),
    ]);
    if let Some(config) = &d.xdebug_config {
        rows.push(("XDEBUG CONFIG", config.clone()));
    }
    rows
}

fn key_value_table(rows: impl IntoIterator<Item = (&'static str, String)>) -> Table {
    let mut table = new_table();
    for (key, value) in rows {
        table.add_row(vec![Cell::new(key), Cell::new(value)]);
    }
    table
}

pub fn print_descriptor(descriptor: &InstanceDescriptor, domain: &str) {
    print_indented(&key_value_table(descriptor_rows(descriptor, domain)));
}

pub fn environment_table(info: &EnvironmentInfo, domain: &str, color: bool) -> Table {
    let mut rows = vec![
        ("STATUS", status_text(info.report.overall, color)),
        ("STATE", info.state.to_string()),
        ("LOCATION", info.location.display().to_string()),
    ];
    rows.extend(descriptor_rows(&info.descriptor, domain));

    let services: Vec<String> = info
        .report
        .urls
        .iter()
        .map(|u| {
            let mark = if u.healthy { "up" } else { "down" };
            format!("{} {} ({})", u.service, u.url, mark)
        })
        .collect();
    if !services.is_empty() {
        rows.push(("SERVICES", services.join("\n")));
    }
    key_value_table(rows)
}

pub fn print_environment(info: &EnvironmentInfo, domain: &str) {
    print_indented(&environment_table(info, domain, use_color()));
}

pub fn list_table(rows: &[ListRow], domain: &str, color: bool) -> Table {
    let mut table = new_table();
    table.set_header(vec![
        Cell::new("Slug"),
        Cell::new("Status").set_alignment(CellAlignment::Center),
        Cell::new("State"),
        Cell::new("URL"),
    ]);
    for row in rows {
        match row {
            ListRow::Ok(info) => table.add_row(vec![
                Cell::new(&info.descriptor.slug),
                Cell::new(status_text(info.report.overall, color)),
                Cell::new(info.state),
                Cell::new(format!("http://{}/", info.descriptor.host(domain))),
            ]),
            ListRow::Failed { slug, reason } => table.add_row(vec![
                Cell::new(slug),
                Cell::new("?"),
                Cell::new("unreadable"),
                Cell::new(reason),
            ]),
        };
    }
    table
}

pub fn print_list(rows: &[ListRow], domain: &str) {
    print_indented(&list_table(rows, domain, use_color()));
}

pub fn containers_table(containers: &[ContainerDetails]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Container", "Image", "State", "Started", "IP", "Ports"]);
    for c in containers {
        table.add_row(vec![
            c.name.clone(),
            c.image.clone(),
            if c.running { "running" } else { "stopped" }.to_string(),
            c.started_at.clone().unwrap_or_else(|| "-".to_string()),
            c.ip_addresses.join(", "),
            if c.ports.is_empty() {
                "-".to_string()
            } else {
                c.ports.join(", ")
            },
        ]);
    }
    table
}

pub fn print_containers(containers: &[ContainerDetails]) {
    if containers.is_empty() {
        println!("  No containers.");
        return;
    }
    print_indented(&containers_table(containers));
}
