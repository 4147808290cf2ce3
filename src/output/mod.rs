use anyhow::Result;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::sources::TranscriptResult;

/// Save a resolved transcript to file
pub fn save_to_file(result: &TranscriptResult, path: &Path, format: &OutputFormat) -> Result<()> {
    let content = render(result, format)?;
    fs_err::write(path, content)?;
    Ok(())
}

/// Print a resolved transcript to the console
pub fn print_to_console(result: &TranscriptResult, format: &OutputFormat) -> Result<()> {
    println!("{}", render(result, format)?);
    Ok(())
}

fn render(result: &TranscriptResult, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(result.text.clone()),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(result)?),
    }
}
