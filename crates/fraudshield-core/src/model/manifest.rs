//! Required-file resolution against the hub's model listing

use serde::Deserialize;
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::model::session::DownloadSession;

/// Structural files every model needs besides its weights.
pub const STRUCTURAL_FILES: [&str; 3] = ["config.json", "tokenizer_config.json", "tokenizer.json"];

#[derive(Debug, Deserialize)]
struct RepoListing {
    #[serde(default)]
    siblings: Option<Vec<Sibling>>,
}

#[derive(Debug, Deserialize)]
struct Sibling {
    rfilename: String,
}

/// Resolve the exact set of remote file names required for one
/// (model, variant) acquisition.
///
/// Queries `{hub}/api/models/{model_id}` and keeps, in listing order, the
/// structural files plus the requested variant weight file. Network errors,
/// non-success statuses, and malformed listings all fail soft to an empty
/// list; callers treat that as "nothing to do". An empty `variant_file` or
/// an already-cancelled session short-circuits without any network call.
/// Only a cancellation observed mid-request raises, so callers can tell it
/// apart from the soft failure.
pub async fn required_files(
    http: &reqwest::Client,
    hub_base_url: &str,
    model_id: &str,
    variant_file: &str,
    session: &DownloadSession,
) -> Result<Vec<String>> {
    if variant_file.is_empty() || session.is_cancelled() {
        return Ok(Vec::new());
    }

    let url = format!("{hub_base_url}/api/models/{model_id}");
    debug!("Fetching model listing from {}", url);

    let response = tokio::select! {
        response = http.get(&url).send() => match response {
            Ok(response) => response,
            Err(e) => {
                error!("Error fetching file list for {}: {}", model_id, e);
                return Ok(Vec::new());
            }
        },
        _ = session.aborted() => return Err(Error::Cancelled),
    };

    if !response.status().is_success() {
        error!(
            "Failed to fetch model metadata for {}: HTTP {}",
            model_id,
            response.status()
        );
        return Ok(Vec::new());
    }

    let listing: RepoListing = tokio::select! {
        listing = response.json() => match listing {
            Ok(listing) => listing,
            Err(e) => {
                error!("Error fetching file list for {}: {}", model_id, e);
                return Ok(Vec::new());
            }
        },
        _ = session.aborted() => return Err(Error::Cancelled),
    };

    let Some(siblings) = listing.siblings else {
        error!("Invalid listing format for {}: missing siblings", model_id);
        return Ok(Vec::new());
    };

    let required: Vec<String> = siblings
        .into_iter()
        .map(|s| s.rfilename)
        .filter(|name| STRUCTURAL_FILES.contains(&name.as_str()) || name == variant_file)
        .collect();

    debug!("Required files for {}: {:?}", variant_file, required);
    Ok(required)
}
