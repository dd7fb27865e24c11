//! A [`TransactionSource`] that requests transactions from a remote
//! transaction-request endpoint over HTTP.
//!
//! The reply is untrusted; the checkout driver checks the reference and fee
//! payer before the buyer signs.

use async_trait::async_trait;
use http::StatusCode;
use reqwest::Client;
use solpay::checkout::{Order, TransactionSource};
use solpay::{CheckoutError, UnsignedTransaction};
use std::time::Duration;
use url::Url;

use crate::link::checkout_url;
use crate::types::{CheckoutMetadata, CheckoutRequest, CheckoutResponse, ErrorBody};

/// Errors that can occur while talking to a transaction-request endpoint.
#[derive(Debug, thiserror::Error)]
pub enum HttpSourceError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// HTTP transport error.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// JSON deserialization error.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The endpoint answered with a non-200 status.
    #[error("Unexpected HTTP status {status}: {context}: {message}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The `error` field of the body, or the raw body.
        message: String,
    },
    /// Failed to read response body.
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The transaction text does not decode.
    #[error("Invalid transaction: {0}")]
    Transaction(#[from] solpay::transaction::EncodingError),
}

impl From<HttpSourceError> for CheckoutError {
    fn from(err: HttpSourceError) -> Self {
        Self::Source(err.to_string())
    }
}

/// Calls a remote transaction-request endpoint.
#[derive(Clone, Debug)]
pub struct HttpTransactionSource {
    endpoint: Url,
    client: Client,
    timeout: Option<Duration>,
}

impl HttpTransactionSource {
    /// Creates a source for `endpoint`, the full URL of the endpoint.
    #[must_use]
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            client: Client::new(),
            timeout: None,
        }
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Uses a pre-configured reqwest client.
    #[must_use]
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// The endpoint URL.
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Sends `GET` to the endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`HttpSourceError`] if the request fails or the reply is not
    /// merchant metadata.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(name = "solpay.http_source.metadata", skip_all, err)
    )]
    pub async fn metadata(&self) -> Result<CheckoutMetadata, HttpSourceError> {
        let context = "GET checkout";
        let mut req = self.client.get(self.endpoint.clone());
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let response = req
            .send()
            .await
            .map_err(|e| HttpSourceError::Http { context, source: e })?;
        read_json(response, context).await
    }

    /// Sends `POST` for `order` and decodes the returned transaction.
    ///
    /// # Errors
    ///
    /// Returns [`HttpSourceError`] on transport failure, a non-200 status or
    /// an undecodable transaction.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(
            name = "solpay.http_source.request",
            skip_all,
            err,
            fields(reference = %order.reference)
        )
    )]
    pub async fn request(&self, order: &Order) -> Result<UnsignedTransaction, HttpSourceError> {
        let context = "POST checkout";
        let url = checkout_url(&self.endpoint, &order.selection, &order.reference);
        let body = CheckoutRequest {
            account: Some(order.buyer.to_string()),
        };
        let mut req = self.client.post(url).json(&body);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let response = req
            .send()
            .await
            .map_err(|e| HttpSourceError::Http { context, source: e })?;
        let reply: CheckoutResponse = read_json(response, context).await?;
        Ok(reply.transaction.decode()?)
    }
}

impl TryFrom<&str> for HttpTransactionSource {
    type Error = HttpSourceError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let url = Url::parse(value).map_err(|e| HttpSourceError::UrlParse {
            context: "Failed to parse endpoint url",
            source: e,
        })?;
        Ok(Self::new(url))
    }
}

#[async_trait]
impl TransactionSource for HttpTransactionSource {
    async fn request_transaction(
        &self,
        order: &Order,
    ) -> Result<UnsignedTransaction, CheckoutError> {
        Ok(self.request(order).await?)
    }
}

async fn read_json<R: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    context: &'static str,
) -> Result<R, HttpSourceError> {
    let status = response.status();
    if status == StatusCode::OK {
        return response
            .json::<R>()
            .await
            .map_err(|e| HttpSourceError::JsonDeserialization { context, source: e });
    }
    let text = response
        .text()
        .await
        .map_err(|e| HttpSourceError::ResponseBodyRead { context, source: e })?;
    let message = serde_json::from_str::<ErrorBody>(&text).map_or(text, |body| body.error);
    Err(HttpSourceError::HttpStatus {
        context,
        status,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_message::Hash;
    use solpay::builder::{compile, native_transfer_instruction, with_reference};
    use solpay::{Address, Reference, Selection};
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn order() -> Order {
        Order {
            selection: Selection::new().with("box-of-cookies", 2).unwrap(),
            reference: Reference::generate(),
            buyer: Address::new(*Reference::generate().pubkey()),
        }
    }

    fn transaction_for(order: &Order) -> UnsignedTransaction {
        let shop = *Reference::generate().pubkey();
        let ix = native_transfer_instruction(order.buyer.pubkey(), &shop, 100_000_000);
        compile(
            order.buyer.pubkey(),
            &with_reference(ix, &order.reference),
            &Hash::new_from_array([3; 32]),
        )
    }

    async fn source(server: &MockServer) -> HttpTransactionSource {
        HttpTransactionSource::try_from(format!("{}/api/checkout", server.uri()).as_str()).unwrap()
    }

    #[tokio::test]
    async fn test_request_decodes_transaction() {
        let server = MockServer::start().await;
        let order = order();
        let expected = transaction_for(&order);
        let reply = CheckoutResponse {
            transaction: expected.encode().unwrap(),
            message: "Thanks!".into(),
        };
        Mock::given(method("POST"))
            .and(path("/api/checkout"))
            .and(query_param("box-of-cookies", "2"))
            .and(query_param("reference", order.reference.to_string()))
            .and(body_json(serde_json::json!({ "account": order.buyer.to_string() })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&reply))
            .expect(1)
            .mount(&server)
            .await;

        let source = source(&server).await;
        let tx = source.request_transaction(&order).await.unwrap();
        assert_eq!(tx, expected);
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/checkout"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({ "error": "No account provided" })),
            )
            .mount(&server)
            .await;

        let source = source(&server).await;
        let err = source.request(&order()).await.unwrap_err();
        match err {
            HttpSourceError::HttpStatus {
                status, message, ..
            } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(message, "No account provided");
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[tokio::test]
    async fn test_garbage_transaction_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/checkout"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "transaction": "bm90IGEgdHJhbnNhY3Rpb24=",
                "message": "",
            })))
            .mount(&server)
            .await;

        let source = source(&server).await;
        let err = source.request_transaction(&order()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Source(_)));
    }

    #[tokio::test]
    async fn test_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/checkout"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "label": "Cookies Inc",
                "icon": "https://shop.example/icon.svg",
            })))
            .mount(&server)
            .await;

        let metadata = source(&server).await.metadata().await.unwrap();
        assert_eq!(metadata.label, "Cookies Inc");
    }
}
