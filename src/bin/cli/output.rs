//! Output formatting for ordering and translation results
//!
//! Formats results as human-readable text, JSON, or an SMT-LIB script

use std::fmt::Write;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    /// SMT-LIB v2 script (translation only)
    Smtlib,
}

/// Modifier order of one entity
#[derive(Debug, Clone, Serialize)]
pub struct OrderReport {
    pub file: String,
    pub entity: String,
    pub order: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModifierReport {
    pub name: String,
    pub constraints: Vec<String>,
    /// Syntax left untranslated
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub passthrough: Vec<String>,
}

/// Constraints of one step of one entity
#[derive(Debug, Clone, Serialize)]
pub struct TranslationReport {
    pub file: String,
    pub entity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_size: Option<String>,
    pub modifiers: Vec<ModifierReport>,
    #[serde(skip)]
    pub smtlib: String,
}

pub fn format_order(reports: &[OrderReport], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(reports),
        OutputFormat::Human | OutputFormat::Smtlib => format_order_human(reports),
    }
}

fn format_order_human(reports: &[OrderReport]) -> String {
    let mut output = String::new();
    for report in reports {
        let _ = writeln!(output, "{} ({})", report.entity, report.file);
        if report.order.is_empty() {
            output.push_str("  (no modifiers)\n");
        }
        for (position, name) in report.order.iter().enumerate() {
            let _ = writeln!(output, "  {:>3}. {}", position + 1, name);
        }
        output.push('\n');
    }
    output
}

pub fn format_translation(reports: &[TranslationReport], format: OutputFormat) -> String {
    match format {
        OutputFormat::Human => format_translation_human(reports),
        OutputFormat::Json => to_json(reports),
        OutputFormat::Smtlib => format_translation_smtlib(reports),
    }
}

fn format_translation_human(reports: &[TranslationReport]) -> String {
    let mut output = String::new();
    for report in reports {
        let _ = writeln!(output, "{} ({})", report.entity, report.file);
        if let Some(step_size) = &report.step_size {
            let _ = writeln!(output, "  step: {}", step_size);
        }
        for modifier in &report.modifiers {
            let _ = writeln!(output, "  {}", modifier.name);
            for constraint in &modifier.constraints {
                let _ = writeln!(output, "    {}", constraint);
            }
            for text in &modifier.passthrough {
                let _ = writeln!(output, "    untranslated: {}", text);
            }
        }
        output.push('\n');
    }

    let constraints: usize = reports
        .iter()
        .flat_map(|r| &r.modifiers)
        .map(|m| m.constraints.len())
        .sum();
    let _ = writeln!(
        output,
        "translated {} entities: {} modifiers, {} constraints",
        reports.len(),
        reports.iter().map(|r| r.modifiers.len()).sum::<usize>(),
        constraints
    );
    output
}

fn format_translation_smtlib(reports: &[TranslationReport]) -> String {
    let mut output = String::new();
    for report in reports {
        let _ = writeln!(output, "; {} ({})", report.entity, report.file);
        output.push_str(&report.smtlib);
        if !report.smtlib.ends_with('\n') {
            output.push('\n');
        }
    }
    output
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translation() -> TranslationReport {
        TranslationReport {
            file: "lamp.json".to_string(),
            entity: "lamp".to_string(),
            step_size: None,
            modifiers: vec![ModifierReport {
                name: "lamp.shine".to_string(),
                constraints: vec!["(= light_p1 (* 0.0 (/ 9.0 10.0)))".to_string()],
                passthrough: Vec::new(),
            }],
            smtlib: "(check-sat)\n".to_string(),
        }
    }

    #[test]
    fn test_order_human() {
        let reports = vec![OrderReport {
            file: "house.json".to_string(),
            entity: "house".to_string(),
            order: vec!["house.feed".to_string(), "house.heater".to_string()],
        }];
        let text = format_order(&reports, OutputFormat::Human);
        assert!(text.starts_with("house (house.json)\n"));
        assert!(text.contains("    1. house.feed\n"));
        assert!(text.contains("    2. house.heater\n"));
    }

    #[test]
    fn test_translation_human_summary() {
        let text = format_translation(&[translation()], OutputFormat::Human);
        assert!(text.contains("  lamp.shine\n    (= light_p1"));
        assert!(text.ends_with("translated 1 entities: 1 modifiers, 1 constraints\n"));
    }

    #[test]
    fn test_translation_json_skips_script() {
        let text = format_translation(&[translation()], OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value[0]["entity"], "lamp");
        assert_eq!(value[0]["modifiers"][0]["name"], "lamp.shine");
        assert!(value[0].get("smtlib").is_none());
        assert!(value[0].get("step_size").is_none());
        assert!(value[0]["modifiers"][0].get("passthrough").is_none());
    }

    #[test]
    fn test_translation_lists_untranslated_syntax() {
        let mut report = translation();
        report.modifiers[0].passthrough.push("log (dt)".to_string());

        let text = format_translation(&[report.clone()], OutputFormat::Human);
        assert!(text.contains("    untranslated: log (dt)\n"));

        let json: serde_json::Value =
            serde_json::from_str(&format_translation(&[report], OutputFormat::Json)).unwrap();
        assert_eq!(json[0]["modifiers"][0]["passthrough"][0], "log (dt)");
    }

    #[test]
    fn test_translation_smtlib() {
        let text = format_translation(&[translation()], OutputFormat::Smtlib);
        assert_eq!(text, "; lamp (lamp.json)\n(check-sat)\n");
    }
}
