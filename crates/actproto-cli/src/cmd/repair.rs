use crate::cmd::read_input;
use crate::config_path::load_config;
use crate::output::print_json;
use actproto_core::Processor;
use std::path::Path;

pub fn run(config: Option<&Path>, file: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let processor = Processor::new(load_config(config)?);
    let raw = read_input(file)?;
    let prepared = processor.prepare(&raw);

    if json {
        let corrections: Vec<String> = prepared.corrections.iter().map(|c| c.describe()).collect();
        let repairs: Vec<&str> = prepared.repairs.iter().map(|r| r.as_str()).collect();
        let value = serde_json::json!({
            "text": prepared.text,
            "converted": prepared.converted,
            "corrections": corrections,
            "repairs": repairs,
        });
        return print_json(&value);
    }

    for note in prepared.notes() {
        tracing::info!("{note}");
    }
    print!("{}", prepared.text);
    if !prepared.text.ends_with('\n') {
        println!();
    }
    Ok(())
}
