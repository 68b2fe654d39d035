//! Shared CLI utilities: output rendering and confirmation prompts.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use anyhow::{bail, Context, Result};
use serde::Serialize;

use super::args::OutputFormat;

/// Render a serializable value to stdout in the selected format.
pub fn print_output<T: Serialize>(format: OutputFormat, value: &T) -> Result<()> {
    match format {
        OutputFormat::Yaml => {
            let rendered = serde_yaml::to_string(value)?;
            print!("{rendered}");
        }
        OutputFormat::Json => {
            let rendered = serde_json::to_string_pretty(value)?;
            println!("{rendered}");
        }
    }
    Ok(())
}

/// Ask the user to confirm a destructive action.
///
/// `--yes` skips the prompt; otherwise a `y`/`yes` line on stdin is
/// required.
pub fn confirm(question: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        print!("{} [y/n]: ", question.trim());
        std::io::stdout().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            bail!("standard input closed - provide --yes to confirm");
        }
        match line.trim().to_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => continue,
        }
    }
}

/// Parse repeated `KEY=VALUE` annotation arguments into a map. An empty
/// value is legal on edit paths, where it deletes the key.
pub fn parse_annotations(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("annotation '{pair}' is not in KEY=VALUE form"))?;
        out.insert(key.to_string(), value.to_string());
    }
    Ok(out)
}
