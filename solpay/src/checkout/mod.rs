//! Checkout state machine and driver.
//!
//! ```text
//! Idle ─► AwaitingWallet ─► BuildingTransaction ─► AwaitingSignature
//!                                 ▲                      │
//!                                 └── anchor expired ────┤
//!                                                        ▼
//!               Confirmed ◄── Polling ◄── Broadcasting ◄─┘
//! ```
//!
//! Any live state may be cancelled. `Failed`, `Expired` and `Cancelled`
//! accept a reset back to `Idle`.

mod driver;
mod source;
mod state;

pub use driver::{Checkout, CheckoutConfig, CheckoutSession};
pub use source::{LocalTransactionSource, Order, TransactionSource};
pub use state::{CheckoutEvent, CheckoutStatus, InvalidTransition};
