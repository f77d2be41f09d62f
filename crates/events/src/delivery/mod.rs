//! External delivery: SMTP mail transport and contact decryption.

pub mod crypto;
pub mod email;
