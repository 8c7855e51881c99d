use std::path::{Path, PathBuf};
use std::process::ExitCode;

use framefetch_lib::{
    CancellationToken, ExtractError, ExtractedDocument, ExtractionResponse, ExtractionService,
    PageRequest,
};
use tracing::{info, warn};

use crate::cli::ExtractArgs;
use crate::formatting::{render_error, write_output};
use crate::settings::{load_config, resolve_extract_settings};

/// Run the extract command.
pub async fn run_extract(config_path: Option<PathBuf>, args: ExtractArgs) -> ExitCode {
    let config = match load_config(config_path.as_deref()) {
        Ok(cfg) => resolve_extract_settings(cfg, &args),
        Err(err) => return render_error(err, args.format, args.output.clone()),
    };
    if let Err(err) = config.validate() {
        return render_error(err, args.format, args.output.clone());
    }

    let requests = match args
        .page_urls
        .iter()
        .map(|url| PageRequest::new(url.as_str()))
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(requests) => requests,
        Err(err) => return render_error(err, args.format, args.output.clone()),
    };

    let service = match ExtractionService::from_config(&config) {
        Ok(service) => service,
        Err(err) => return render_error(err, args.format, args.output.clone()),
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; cancelling in-flight extractions");
            on_interrupt.cancel();
        }
    });

    info!(
        pages = requests.len(),
        max_concurrent = config.max_concurrent_sessions,
        "starting extraction"
    );
    let results = service.extract_all_with_cancel(&requests, &cancel).await;

    if let Some(dir) = &args.save_dir {
        if let Err(err) = save_documents(dir, &results) {
            return render_error(err, args.format, args.output.clone());
        }
    }

    let responses: Vec<ExtractionResponse> =
        results.iter().map(ExtractionResponse::from_result).collect();
    if let Err(err) = write_output(&responses, args.format, args.output.clone()) {
        return render_error(ExtractError::internal(err.to_string()), args.format, args.output);
    }

    if responses.iter().all(|r| r.success) {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

/// Write each downloaded document to `dir/document-<n>.pdf`, `n` being the
/// page's position on the command line.
fn save_documents(
    dir: &Path,
    results: &[Result<ExtractedDocument, ExtractError>],
) -> Result<(), ExtractError> {
    std::fs::create_dir_all(dir).map_err(|e| {
        ExtractError::Config(format!("Failed to create save dir {}: {}", dir.display(), e))
    })?;
    for (index, result) in results.iter().enumerate() {
        if let Ok(document) = result {
            let path = dir.join(format!("document-{index}.pdf"));
            std::fs::write(&path, &document.document.bytes)?;
            info!(path = %path.display(), bytes = document.document.byte_length, "saved document");
        }
    }
    Ok(())
}
