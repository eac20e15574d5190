//! Checksum codec for the hosted payment page.
//!
//! Both directions hash a pipe-delimited field list with SHA-512 and send the
//! lowercase hex digest. The ten user-defined (`udf1`..`udf10`) slots are
//! always empty. Fields are hashed exactly as transmitted.

use sha2::{Digest, Sha512};
use std::fmt;

/// Number of user-defined slots between the payer fields and the salt.
pub const UDF_SLOTS: usize = 10;

/// Merchant key and salt issued by the gateway.
#[derive(Clone, PartialEq, Eq)]
pub struct MerchantCredentials {
    pub key: String,
    pub salt: String,
}

impl MerchantCredentials {
    pub fn new(key: impl Into<String>, salt: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            salt: salt.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.key.is_empty() && !self.salt.is_empty()
    }
}

impl fmt::Debug for MerchantCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerchantCredentials")
            .field("key", &self.key)
            .field("salt", &"<redacted>")
            .finish()
    }
}

fn sha512_hex<'a>(fields: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha512::new();
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            hasher.update(b"|");
        }
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// `sha512(key|txnid|amount|productinfo|firstname|email|udf1..udf10|salt)`
pub fn compute_request_signature(
    merchant_key: &str,
    txn_id: &str,
    amount: &str,
    description: &str,
    payer_first_name: &str,
    payer_email: &str,
    salt: &str,
) -> String {
    let head = [
        merchant_key,
        txn_id,
        amount,
        description,
        payer_first_name,
        payer_email,
    ];
    sha512_hex(
        head.into_iter()
            .chain(std::iter::repeat("").take(UDF_SLOTS))
            .chain(std::iter::once(salt)),
    )
}

/// `sha512(salt|status|udf10..udf1|email|firstname|productinfo|amount|txnid|key)`
#[allow(clippy::too_many_arguments)]
pub fn compute_callback_signature(
    salt: &str,
    result_status: &str,
    payer_email: &str,
    payer_first_name: &str,
    description: &str,
    amount: &str,
    txn_id: &str,
    merchant_key: &str,
) -> String {
    let tail = [
        payer_email,
        payer_first_name,
        description,
        amount,
        txn_id,
        merchant_key,
    ];
    sha512_hex(
        [salt, result_status]
            .into_iter()
            .chain(std::iter::repeat("").take(UDF_SLOTS))
            .chain(tail),
    )
}

/// Recomputes the callback checksum and compares it with the one the gateway
/// sent. Hex case of `provided_signature` is ignored.
#[allow(clippy::too_many_arguments)]
pub fn verify_callback_signature(
    salt: &str,
    result_status: &str,
    payer_email: &str,
    payer_first_name: &str,
    description: &str,
    amount: &str,
    txn_id: &str,
    merchant_key: &str,
    provided_signature: &str,
) -> bool {
    let expected = compute_callback_signature(
        salt,
        result_status,
        payer_email,
        payer_first_name,
        description,
        amount,
        txn_id,
        merchant_key,
    );
    constant_time_eq(&expected, &provided_signature.trim().to_ascii_lowercase())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "GTKFFx";
    const SALT: &str = "eCwWELxi";

    #[test]
    fn request_signature_matches_reference_digest() {
        let sig = compute_request_signature(
            KEY,
            "TXN42",
            "236.00",
            "LuxeMart Order",
            "Asha",
            "asha@example.com",
            SALT,
        );
        assert_eq!(
            sig,
            "dc3a88d694f8827976a7691ce55fd7a9305ce40d6b6c658a08d0d3f04183ca7c00796e58d337a5139a0b3f61f8187ca972e3b3dda8ecfb5900932703d2a1b2fe"
        );
    }

    #[test]
    fn callback_signature_matches_reference_digest() {
        let sig = compute_callback_signature(
            SALT,
            "success",
            "asha@example.com",
            "Asha",
            "LuxeMart Order",
            "236.00",
            "TXN42",
            KEY,
        );
        assert_eq!(
            sig,
            "018e06c9052d9fd370655736d610c1fbaeccc36c65c3ebba9c310f9131a9f838958fe55b31753e2cb5c661b5470a034a8314f5b79ecc8a7228d15831a7de111a"
        );
    }

    #[test]
    fn verification_ignores_hex_case() {
        let sig = compute_callback_signature(
            SALT, "failure", "a@b.c", "A", "LuxeMart Order", "1.00", "TXN1", KEY,
        );
        assert!(verify_callback_signature(
            SALT,
            "failure",
            "a@b.c",
            "A",
            "LuxeMart Order",
            "1.00",
            "TXN1",
            KEY,
            &sig.to_uppercase(),
        ));
    }

    #[test]
    fn amounts_are_signed_verbatim() {
        let a = compute_request_signature(KEY, "T", "236", "P", "F", "e", SALT);
        let b = compute_request_signature(KEY, "T", "236.00", "P", "F", "e", SALT);
        assert_ne!(a, b);
    }

    #[test]
    fn empty_or_truncated_signature_fails() {
        let sig = compute_callback_signature(SALT, "success", "e", "f", "p", "1.00", "T", KEY);
        assert!(!verify_callback_signature(
            SALT, "success", "e", "f", "p", "1.00", "T", KEY, ""
        ));
        assert!(!verify_callback_signature(
            SALT,
            "success",
            "e",
            "f",
            "p",
            "1.00",
            "T",
            KEY,
            &sig[..64],
        ));
    }

    #[test]
    fn debug_output_redacts_salt() {
        let creds = MerchantCredentials::new(KEY, SALT);
        let printed = format!("{:?}", creds);
        assert!(printed.contains(KEY));
        assert!(!printed.contains(SALT));
    }
}
