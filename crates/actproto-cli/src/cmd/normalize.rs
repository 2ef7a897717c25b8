use crate::cmd::read_input;
use crate::config_path::load_config;
use crate::output::print_json;
use actproto_core::Processor;
use std::path::Path;

pub fn run(config: Option<&Path>, file: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let processor = Processor::new(load_config(config)?);
    let raw = read_input(file)?;
    let result = processor.process(&raw);
    let text = result.to_protocol();

    if json {
        let value = serde_json::json!({
            "text": text,
            "mode": result.mode,
            "confidence": result.confidence,
            "warnings": result.warnings,
        });
        return print_json(&value);
    }

    for w in &result.warnings {
        tracing::info!("{w}");
    }
    println!("{text}");
    Ok(())
}
