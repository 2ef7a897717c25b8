use crate::cmd::read_input;
use crate::config_path::load_config;
use crate::output::{print_json, print_table, truncate};
use actproto_core::render::vitals_line;
use actproto_core::{ParseResult, Processor, StrictOutcome};
use clap::ValueEnum;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Strict parse with fuzzy fallback
    Auto,
    /// Strict parse only; fail if it cannot be used
    Strict,
    /// Fuzzy parse only
    Fuzzy,
}

pub fn run(
    config: Option<&Path>,
    file: Option<&Path>,
    mode: ModeArg,
    json: bool,
) -> anyhow::Result<()> {
    let processor = Processor::new(load_config(config)?);
    let raw = read_input(file)?;
    let result = parse_with(&processor, &raw, mode)?;

    if json {
        return print_json(&result);
    }
    print_result(&result);
    Ok(())
}

fn parse_with(processor: &Processor, raw: &str, mode: ModeArg) -> anyhow::Result<ParseResult> {
    if mode == ModeArg::Auto {
        return Ok(processor.process(raw));
    }
    let prepared = processor.prepare(raw);
    let mut result = match mode {
        ModeArg::Strict => match processor.parse_strict(&prepared.text) {
            StrictOutcome::Success(r) => r,
            StrictOutcome::NeedsFallback(reason) => {
                anyhow::bail!("strict parse failed: {reason}")
            }
        },
        _ => processor.parse_fuzzy(&prepared.text),
    };
    let mut warnings = prepared.notes();
    warnings.append(&mut result.warnings);
    result.warnings = warnings;
    result.raw = raw.to_string();
    Ok(result)
}

fn print_result(result: &ParseResult) {
    println!(
        "mode: {}  confidence: {:.2}  batch: {}",
        result.mode,
        result.confidence,
        if result.is_batch { "yes" } else { "no" }
    );
    if let Some(line) = vitals_line(&result.vitals) {
        println!("vitals: {line}");
    }
    for thought in &result.thoughts {
        for line in thought.lines() {
            println!(">> {line}");
        }
    }

    println!();
    if result.actions.is_empty() {
        println!("No actions.");
    } else {
        let rows: Vec<Vec<String>> = result
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let params: Vec<String> = a
                    .parameters
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect();
                vec![
                    (i + 1).to_string(),
                    a.kind.clone(),
                    truncate(a.target.as_deref().unwrap_or("-"), 40),
                    a.depends_on.clone().unwrap_or_else(|| "-".to_string()),
                    truncate(&params.join(" "), 30),
                    a.content
                        .as_ref()
                        .map(|c| format!("{} line(s)", c.lines().count()))
                        .unwrap_or_else(|| "-".to_string()),
                    format!("{:.2}", a.confidence),
                ]
            })
            .collect();
        print_table(
            &["#", "KIND", "TARGET", "AFTER", "PARAMS", "CONTENT", "CONF"],
            &rows,
        );
    }

    for q in &result.questions {
        println!("? {q}");
    }
    for e in &result.errors {
        println!("! {e}");
    }
    if !result.warnings.is_empty() {
        println!();
        for w in &result.warnings {
            println!("warning: {w}");
        }
    }
}
