use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInvoiceRequest {
    /// Amount in satoshis.
    pub tokens: u64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// Hex payment hash.
    pub id: String,
    /// Payable payment request handed to the client.
    pub request: String,
    /// Whether the invoice has settled.
    pub is_confirmed: bool,
}

/// Payment network interface.
///
/// `is_confirmed` is the only settlement signal the paywall trusts.
pub trait PaymentOracle: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn create_invoice(
        &self,
        request: CreateInvoiceRequest,
    ) -> impl Future<Output = Result<Invoice, Self::Error>> + Send;

    fn get_invoice(&self, id: &str) -> impl Future<Output = Result<Invoice, Self::Error>> + Send;
}
