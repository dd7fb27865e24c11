//! Solana Pay transaction-request links.
//!
//! A wallet scanning `solana:<link>` fetches metadata with `GET <link>` and
//! the transaction with `POST <link>`.

use solpay::{Reference, Selection};
use url::Url;
use url::form_urlencoded::byte_serialize;

use crate::types::REFERENCE_PARAM;

/// URI scheme of Solana Pay links.
pub const SOLANA_SCHEME: &str = "solana";

/// Encodes `endpoint` as a `solana:` transaction-request link.
///
/// The endpoint is percent-encoded in full so its own query survives.
#[must_use]
pub fn transaction_request_url(endpoint: &Url) -> String {
    let encoded: String = byte_serialize(endpoint.as_str().as_bytes()).collect();
    format!("{SOLANA_SCHEME}:{encoded}")
}

/// Appends `selection` and `reference` to `endpoint` as query pairs.
///
/// Existing query pairs on `endpoint` are kept.
#[must_use]
pub fn checkout_url(endpoint: &Url, selection: &Selection, reference: &Reference) -> Url {
    let mut url = endpoint.clone();
    {
        let mut query = url.query_pairs_mut();
        for (id, quantity) in selection.to_query_pairs() {
            query.append_pair(id, &quantity);
        }
        query.append_pair(REFERENCE_PARAM, &reference.to_string());
    }
    url
}
