use std::fmt::Write as FmtWrite;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use framefetch_lib::{ExtractError, ExtractionResponse};

use crate::cli::OutputFormat;

/// Write responses in the requested format. A single page yields one JSON
/// object, a batch yields an array in input order.
pub fn write_output(
    responses: &[ExtractionResponse],
    format: OutputFormat,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => write_json_output(responses, output.as_deref())?,
        OutputFormat::Pretty => write_pretty_output(responses, output.as_deref())?,
    };
    Ok(())
}

/// Render a failure that happened before any page ran and return exit code 2.
pub fn render_error(err: ExtractError, format: OutputFormat, output: Option<PathBuf>) -> ExitCode {
    let payload = err.to_payload();
    tracing::error!(category = ?payload.category, "{}", payload.message);
    let response = ExtractionResponse::failure(&err);

    match format {
        OutputFormat::Json => {
            let content = serde_json::to_string(&response)
                .unwrap_or_else(|_| "{\"success\":false}".into());
            if let Some(path) = output {
                if let Err(write_err) = std::fs::write(&path, &content) {
                    eprintln!("Failed to write error output: {}", write_err);
                    println!("{content}");
                }
            } else {
                println!("{content}");
            }
        }
        OutputFormat::Pretty => {
            let mut buf = String::new();
            writeln!(buf, "{} {}", color("[ERROR]", "31", true), payload.message).ok();
            if let Some(remediation) = &payload.remediation {
                writeln!(buf, "Hint: {}", remediation).ok();
            }
            eprint!("{buf}");
        }
    };

    // Exit code 2 is for errors before extraction; page failures use 1.
    ExitCode::from(2)
}

fn to_json(responses: &[ExtractionResponse], pretty: bool) -> serde_json::Result<String> {
    match (responses, pretty) {
        ([single], false) => serde_json::to_string(single),
        ([single], true) => serde_json::to_string_pretty(single),
        (batch, false) => serde_json::to_string(batch),
        (batch, true) => serde_json::to_string_pretty(batch),
    }
}

/// Write JSON output to file or stdout.
fn write_json_output(
    responses: &[ExtractionResponse],
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = to_json(responses, false)?;
    if let Some(path) = output {
        std::fs::write(path, content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Write pretty output to file or stdout.
fn write_pretty_output(responses: &[ExtractionResponse], output: Option<&Path>) -> io::Result<()> {
    let stdout_is_tty = std::io::stdout().is_terminal();
    let use_human = output.is_none() && stdout_is_tty;

    if use_human {
        let content = format_pretty(responses, true);
        print!("{content}");
        return Ok(());
    }

    // Non-tty or file output: keep JSON shape for pipelines/files.
    let content = to_json(responses, true).map_err(io::Error::other)?;
    if let Some(path) = output {
        std::fs::write(path, &content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Format responses for human consumption in a terminal. The base64 payload
/// is left out; only its size is shown.
pub fn format_pretty(responses: &[ExtractionResponse], colorize: bool) -> String {
    let mut buf = String::new();
    for response in responses {
        match (&response.data, &response.error) {
            (Some(data), _) => {
                writeln!(buf, "{} {}", color("[OK]", "32", colorize), data.pdf_url).ok();
                writeln!(buf, "Size: {} bytes", data.size).ok();
            }
            (None, error) => {
                let message = error.as_deref().unwrap_or("unknown failure");
                writeln!(buf, "{} {}", color("[FAIL]", "31", colorize), message).ok();
            }
        }
    }
    buf
}

fn color(text: &str, code: &str, enabled: bool) -> String {
    if enabled {
        format!("\u{1b}[{code}m{text}\u{1b}[0m")
    } else {
        text.to_string()
    }
}
