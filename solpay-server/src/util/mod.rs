//! Process-level helpers.

pub mod keypair;
pub mod sig_down;

pub use keypair::{KeypairError, load_keypair};
pub use sig_down::SigDown;
