//! Axum handlers for the transaction-request endpoint.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use solpay::{Address, Reference, Selection, ValidationError};
use std::str::FromStr;

use super::SharedState;
use super::error::ApiError;
use crate::types::{CheckoutMetadata, CheckoutRequest, CheckoutResponse, REFERENCE_PARAM};

/// `GET /api/checkout` - Merchant label and icon.
pub async fn get_checkout(State(state): State<SharedState>) -> Json<CheckoutMetadata> {
    Json(CheckoutMetadata {
        label: state.merchant.label.clone(),
        icon: state.merchant.icon.clone(),
    })
}

/// `POST /api/checkout` - Builds an unsigned transaction for the selection.
///
/// Product quantities and the reference arrive as query pairs; the buyer
/// account arrives in the JSON body.
///
/// # Errors
///
/// Returns 400 on malformed input and 500 if the transaction cannot be built.
pub async fn post_checkout(
    State(state): State<SharedState>,
    Query(params): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let (references, items): (Vec<_>, Vec<_>) = params
        .into_iter()
        .partition(|(key, _)| key == REFERENCE_PARAM);
    let selection = Selection::from_query_pairs(items)?;
    let reference = references
        .into_iter()
        .next()
        .and_then(|(_, value)| non_empty(value))
        .map(|value| parse_address::<Reference>(&value))
        .transpose()?;

    let request: CheckoutRequest = if body.is_empty() {
        CheckoutRequest::default()
    } else {
        serde_json::from_slice(&body)?
    };
    let account = request
        .account
        .and_then(non_empty)
        .map(|value| parse_address::<Address>(&value))
        .transpose()?;

    let built = state.engine.quote(&selection, reference, account).await?;
    let transaction = built.transaction.encode().map_err(solpay::CheckoutError::from)?;

    #[cfg(feature = "telemetry")]
    tracing::info!(
        reference = %built.intent.reference,
        amount = %built.intent.amount,
        "Issued payment transaction"
    );

    Ok(Json(CheckoutResponse {
        transaction,
        message: state.merchant.message.clone(),
    }))
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_address<T: FromStr>(value: &str) -> Result<T, ValidationError> {
    value
        .parse()
        .map_err(|_| ValidationError::InvalidAddress(value.to_owned()))
}
