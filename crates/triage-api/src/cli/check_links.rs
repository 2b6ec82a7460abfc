//! `triage check-links` -- run the reference validator by hand.

use std::io::Read;

use anyhow::Result;
use console::style;

use triage_infra::authority::HttpReferenceValidator;
use triage_types::validation::ReferenceVerdict;

/// Check each input. Inputs that look like a single URL get a verdict;
/// anything else is validated as answer text.
pub async fn check_links(validator: &HttpReferenceValidator, input: Vec<String>, json: bool) -> Result<bool> {
    let inputs = if input.is_empty() {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        vec![text]
    } else {
        input
    };

    let mut all_ok = true;
    let mut report = Vec::new();

    for item in inputs {
        let trimmed = item.trim();
        if is_single_url(trimmed) {
            let verdict = validator.validate_url(trimmed).await;
            all_ok &= verdict.is_acceptable();
            report.push(serde_json::json!({ "url": trimmed, "verdict": verdict }));
            if !json {
                println!("  {} {trimmed}", verdict_mark(verdict));
            }
        } else {
            let outcome = validator.validate(trimmed).await;
            all_ok &= !outcome.has_invalid();
            report.push(serde_json::json!({
                "checked": outcome.checked,
                "invalid": outcome.invalid_urls(),
            }));
            if !json {
                println!(
                    "  Checked {} link(s) on {}",
                    outcome.checked,
                    validator.support_domain()
                );
                for invalid in &outcome.invalid_references {
                    let anchor = invalid
                        .anchor_text
                        .as_deref()
                        .map(|a| format!(" ({a})"))
                        .unwrap_or_default();
                    println!("  {} {}{anchor}", style("✗").red(), invalid.url);
                }
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(all_ok)
}

fn is_single_url(s: &str) -> bool {
    (s.starts_with("http://") || s.starts_with("https://")) && !s.contains(char::is_whitespace)
}

fn verdict_mark(verdict: ReferenceVerdict) -> String {
    match verdict {
        ReferenceVerdict::Valid => format!("{}", style("✓").green()),
        ReferenceVerdict::Invalid => format!("{}", style("✗").red()),
        ReferenceVerdict::Unknown => format!("{}", style("?").yellow()),
    }
}
