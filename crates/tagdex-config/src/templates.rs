//! Configuration template for `tagdex init`.
//!
//! The template is stored as a valid TOML file and returned as a commented-out example
//! configuration, so a fresh file changes nothing until the user uncomments a line.

/// Configuration template (valid TOML).
const TEMPLATE: &str = include_str!("../templates/config.toml");

/// Returns the configuration template as a commented-out example.
pub fn config_template() -> String {
    let mut result = String::with_capacity(TEMPLATE.len() + TEMPLATE.lines().count() * 2);
    for line in TEMPLATE.lines() {
        if !line.is_empty() && !line.starts_with('#') {
            result.push_str("# ");
        }
        result.push_str(line);
        result.push('\n');
    }
    result
}
