use std::error::Error as StdError;
use std::io::ErrorKind;

use crate::model::ModelError;

fn error_chain_matches(
    err: &(dyn StdError + 'static),
    kind: ErrorKind,
    needle: &str,
) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(source) = current {
        if let Some(io_err) = source.downcast_ref::<std::io::Error>()
            && io_err.kind() == kind
        {
            return true;
        }

        if source.to_string().to_ascii_lowercase().contains(needle) {
            return true;
        }

        current = source.source();
    }

    false
}

fn error_chain_has_connection_refused(err: &(dyn StdError + 'static)) -> bool {
    error_chain_matches(err, ErrorKind::ConnectionRefused, "connection refused")
}

fn error_chain_has_timeout(err: &(dyn StdError + 'static)) -> bool {
    error_chain_matches(err, ErrorKind::TimedOut, "timed out")
}

/// Transport failures are provider faults: the request never got an answer.
pub(crate) fn provider_request_error(
    err: reqwest::Error,
    api_url: &str,
    timeout_secs: Option<u64>,
) -> ModelError {
    if err.is_timeout() || error_chain_has_timeout(&err) {
        let message = match timeout_secs {
            Some(secs) => format!(
                "Model request timed out after {secs}s while calling '{api_url}'. \
                 Increase MODEL_TIMEOUT_SECS or check model responsiveness."
            ),
            None => format!("Model request timed out while calling '{api_url}'."),
        };
        return ModelError::Provider(message);
    }

    if err.is_connect() {
        if error_chain_has_connection_refused(&err) {
            return ModelError::Provider(format!(
                "Connection refused by model API at '{api_url}'. \
                 Check GEMINI_BASE_URL and that the endpoint is reachable."
            ));
        }

        return ModelError::Provider(format!(
            "Failed to connect to model API at '{api_url}'. \
             Check GEMINI_BASE_URL and network connectivity."
        ));
    }

    ModelError::Provider(format!("Failed to call model API at '{api_url}': {err}"))
}
