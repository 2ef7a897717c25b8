pub mod config;
pub mod normalize;
pub mod parse;
pub mod repair;

use anyhow::Context;
use std::io::Read;
use std::path::Path;

/// Read the model output from `file`, or stdin when absent or `-`.
/// Invalid UTF-8 is replaced rather than rejected.
pub fn read_input(file: Option<&Path>) -> anyhow::Result<String> {
    let bytes = match file {
        Some(path) if path != Path::new("-") => {
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?
        }
        _ => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
