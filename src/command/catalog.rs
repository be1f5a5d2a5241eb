//! Built-in fan command table
//!
//! 22F1 payloads are `00 <mode> 07`: Orcon-style fans with a 7-step scheme.

use ramses_shared::{CommandDefinition, Verb};

/// Feature id the built-in table is registered under
pub const BUILTIN_FEATURE: &str = "builtin_fan";

const FAN_COMMANDS: &[(&str, &str, Verb, &str, &str)] = &[
    ("fan_away", "22F1", Verb::Info, "000007", "Set fan to away"),
    ("fan_low", "22F1", Verb::Info, "000107", "Set fan speed low"),
    ("fan_medium", "22F1", Verb::Info, "000207", "Set fan speed medium"),
    ("fan_high", "22F1", Verb::Info, "000307", "Set fan speed high"),
    ("fan_auto", "22F1", Verb::Info, "000407", "Set fan to auto"),
    ("fan_auto_alt", "22F1", Verb::Info, "000507", "Set fan to auto (alternate)"),
    ("fan_boost", "22F1", Verb::Info, "000607", "Set fan to boost"),
    ("fan_off", "22F1", Verb::Info, "000707", "Turn fan off"),
    ("filter_reset", "10D0", Verb::Write, "00FF", "Reset filter change timer"),
    ("fan_request_mode", "22F1", Verb::Request, "00", "Request current fan mode"),
    ("fan_request_state", "31DA", Verb::Request, "00", "Request ventilation state"),
];

/// All built-in fan commands
pub fn fan_commands() -> impl Iterator<Item = (&'static str, CommandDefinition)> {
    FAN_COMMANDS
        .iter()
        .map(|&(name, code, verb, payload, description)| {
            (
                name,
                CommandDefinition::new(code, verb, payload).with_description(description),
            )
        })
}

/// Look up one built-in fan command
pub fn fan_command(name: &str) -> Option<CommandDefinition> {
    fan_commands().find(|(n, _)| *n == name).map(|(_, def)| def)
}
