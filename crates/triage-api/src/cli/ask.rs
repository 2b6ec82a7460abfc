//! `triage ask` -- run one cascade and render its events in the terminal.

use std::io::Write;

use anyhow::Result;
use console::style;
use futures_util::StreamExt;

use triage_types::cascade::{CascadeContext, CascadeRequest, CascadeResult, CascadeSource};
use triage_types::event::{CascadeEvent, ToolStatus};

use crate::state::AppState;

/// Options for a single question.
pub struct AskOptions {
    pub question: String,
    pub context: CascadeContext,
    pub no_stream: bool,
    pub json: bool,
    pub quiet: bool,
    pub verbose: bool,
}

pub async fn ask(state: &AppState, options: AskOptions) -> Result<()> {
    let mut config = state.orchestrator.config().clone();
    if options.no_stream {
        config.heavy_streaming_enabled = false;
    }

    let request = CascadeRequest {
        question: options.question,
        context: options.context,
        ..Default::default()
    };

    let mut events = std::pin::pin!(state.orchestrator.stream_with_config(request, config));
    let mut streamed = String::new();
    let mut result: Option<CascadeResult> = None;

    while let Some(event) = events.next().await {
        if options.json {
            if let CascadeEvent::Final { result: final_result } = event {
                result = Some(final_result);
            }
            continue;
        }

        match event {
            CascadeEvent::Progress { stage } => {
                if options.verbose {
                    eprintln!("  {}", style(format!("· {stage}")).dim());
                }
            }
            CascadeEvent::Acknowledgement { quick_reply, .. } => {
                if !options.quiet {
                    println!();
                    println!("  {}", style(&quick_reply.text).italic());
                    println!();
                }
            }
            CascadeEvent::Delta { text } => {
                streamed.push_str(&text);
                print!("{text}");
                std::io::stdout().flush()?;
            }
            CascadeEvent::Retry {
                attempt,
                invalid_references,
            } => {
                streamed.clear();
                println!();
                println!();
                println!(
                    "  {} Found {} unknown link(s), rewriting (attempt {attempt})...",
                    style("↻").yellow(),
                    invalid_references.len()
                );
                println!();
            }
            CascadeEvent::Tool {
                name,
                status: ToolStatus::Started,
                ..
            } => {
                if !options.quiet {
                    eprintln!("  {}", style(format!("⚙ {name}")).dim());
                }
            }
            CascadeEvent::Tool { .. } | CascadeEvent::Workflow { .. } => {}
            CascadeEvent::Final { result: final_result } => result = Some(final_result),
        }
    }

    let Some(result) = result else {
        anyhow::bail!("cascade ended without a result");
    };

    if options.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    render_result(&result, &streamed);
    Ok(())
}

fn render_result(result: &CascadeResult, streamed: &str) {
    // Streamed text differs from the final answer when links were stripped
    // or nothing was streamed at all.
    if streamed.trim() != result.answer {
        if !streamed.is_empty() {
            println!();
            println!();
            println!("  {}", style("── Final answer ──").dim());
        }
        println!("{}", result.answer);
    } else {
        println!();
    }

    if !result.buttons.is_empty() {
        println!();
        for button in &result.buttons {
            println!("  {} {}", style("▸").cyan(), button.label);
        }
    }

    let source = match result.source {
        CascadeSource::Router => style("router").green(),
        CascadeSource::Heavy => style("heavy").cyan(),
    };
    let mut summary = format!("{source} · router {}ms", result.timings.router_ms);
    if let Some(heavy_ms) = result.timings.heavy_ms {
        summary.push_str(&format!(
            " · heavy {heavy_ms}ms ({} attempt(s))",
            result.validation.heavy_attempts
        ));
    }
    summary.push_str(&format!(" · total {}ms", result.timings.total_ms));
    println!();
    println!("  {}", style(summary).dim());
    if !result.validation.stripped_references.is_empty() {
        println!(
            "  {} removed {} unverified link(s)",
            style("!").yellow(),
            result.validation.stripped_references.len()
        );
    }
}
