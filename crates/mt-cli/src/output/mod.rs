//! Output formatting utilities for the CLI
//!
//! Tables for the service registry and colored status lines.

use std::collections::BTreeSet;

use tabled::{settings::Style, Table, Tabled};

use mt_core::{AddressSpec, ServiceRegistry};

/// Format the known services as an ASCII table
///
/// Services left out of the default plan are marked in the `DEFAULT`
/// column.
pub fn format_services(registry: &ServiceRegistry) -> String {
    if registry.is_empty() {
        return "No services configured".to_string();
    }

    #[derive(Tabled)]
    struct ServiceRow {
        #[tabled(rename = "SERVICE")]
        name: String,
        #[tabled(rename = "LOCAL")]
        local: String,
        #[tabled(rename = "REMOTE")]
        remote: String,
        #[tabled(rename = "DEFAULT")]
        default: &'static str,
    }

    let defaults: BTreeSet<&str> = registry.defaults().map(|(name, _)| name).collect();
    let rows: Vec<ServiceRow> = registry
        .names()
        .into_iter()
        .filter_map(|name| {
            let spec = registry.resolve(&name).ok()?;
            Some(ServiceRow {
                local: spec.bind_address(),
                remote: spec.remote_address(),
                default: if defaults.contains(name.as_str()) {
                    "yes"
                } else {
                    "no"
                },
                name,
            })
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// One line per planned tunnel, `local -> remote`
pub fn format_plan(plan: &[AddressSpec]) -> String {
    plan.iter()
        .map(|spec| format!("{} -> {}", spec.bind_address(), spec.remote_address()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red to stderr
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
///
/// Goes to stderr so command output on stdout stays machine readable.
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_services_table_marks_excluded() {
        let table = format_services(&ServiceRegistry::builtin());
        let cache_row = table
            .lines()
            .find(|line| line.contains(" cache "))
            .unwrap();
        assert!(cache_row.contains("no"));
        assert!(table.contains("SERVICE"));
    }

    #[test]
    fn test_empty_registry() {
        let registry = ServiceRegistry::new(Vec::new(), Vec::new());
        assert_eq!(format_services(&registry), "No services configured");
    }

    #[test]
    fn test_format_plan() {
        let plan = vec![
            AddressSpec::new(9004, "auth", 9004),
            AddressSpec::new(8080, "client", 80).with_bind_host("127.0.0.1"),
        ];
        assert_eq!(
            format_plan(&plan),
            "0.0.0.0:9004 -> auth:9004\n127.0.0.1:8080 -> client:80"
        );
    }
}
