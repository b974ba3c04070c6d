//! # Request and callback signatures
//!
//! Merchants authenticate order requests, and the gateway authenticates its callbacks, with a keyed MD5 digest over
//! the request parameters.
//!
//! ## Signing string
//!
//! 1. Drop the `sign` and `sign_type` fields, and any field whose value is empty.
//! 2. Sort the remaining fields by key, comparing raw bytes.
//! 3. Join them as `k=v` pairs separated by `&`. Values are used verbatim; they are *not* URL-encoded.
//! 4. Append the merchant secret key directly, with no separator.
//!
//! ```text
//!    money=10.00&name=Book&out_trade_no=A1&pid=1{secret_key}
//! ```
//!
//! The signature is the lowercase hex MD5 digest of that string.
use std::collections::BTreeMap;

use md5::{Digest, Md5};
use thiserror::Error;

pub const SIGN_TYPE_MD5: &str = "MD5";

const EXCLUDED_FIELDS: [&str; 2] = ["sign", "sign_type"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("The request is missing a signature")]
    MissingSignature,
    #[error("The signature does not match the request parameters")]
    Mismatch,
}

/// Builds the string that gets digested, *excluding* the secret key.
pub fn signing_string<I, K, V>(params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let params = params.into_iter().collect::<Vec<_>>();
    let sorted = params
        .iter()
        .map(|(k, v)| (k.as_ref(), v.as_ref()))
        .filter(|(k, v)| !v.is_empty() && !EXCLUDED_FIELDS.contains(k))
        .collect::<BTreeMap<&str, &str>>();
    sorted.into_iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&")
}

/// Signs `params` with the merchant secret `key`.
pub fn sign_params<I, K, V>(params: I, key: &str) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut hasher = Md5::new();
    hasher.update(signing_string(params).as_bytes());
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Recomputes the signature over `params` and compares it with `signature`.
pub fn verify_params<I, K, V>(params: I, key: &str, signature: &str) -> Result<(), SignatureError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    if signature.is_empty() {
        return Err(SignatureError::MissingSignature);
    }
    let expected = sign_params(params, key);
    if expected == signature {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;

    fn sample() -> Vec<(&'static str, &'static str)> {
        vec![
            ("pid", "1001"),
            ("type", "alipay"),
            ("out_trade_no", "20240101-0001"),
            ("notify_url", "http://shop.example/notify"),
            ("name", "VIP Membership"),
            ("money", "10.00"),
            ("param", ""),
            ("sign", "ignored"),
            ("sign_type", "MD5"),
        ]
    }

    #[test]
    fn signing_string_sorts_and_filters() {
        let s = signing_string(sample());
        assert_eq!(
            s,
            "money=10.00&name=VIP Membership&notify_url=http://shop.example/notify&out_trade_no=20240101-0001&\
             pid=1001&type=alipay"
        );
    }

    #[test]
    fn keys_sort_by_byte_value() {
        let s = signing_string([("b", "2"), ("B", "1"), ("a_c", "3"), ("ab", "4")]);
        assert_eq!(s, "B=1&a_c=3&ab=4&b=2");
    }

    #[test]
    fn known_digest() {
        // Only excluded and empty fields, so the digest input is just the key: md5("abc")
        let sig = sign_params([("sign", "x"), ("param", "")], "abc");
        assert_eq!(sig, "900150983cd24fb0d6963f7d28e17f72");
        let mut hasher = Md5::new();
        hasher.update(b"a=1&b=2key");
        assert_eq!(sign_params([("b", "2"), ("a", "1")], "key"), hex::encode(hasher.finalize()));
    }

    #[test]
    fn round_trip_and_tamper() {
        let params = sample();
        let sig = sign_params(params.clone(), "merchant-key");
        assert!(verify_params(params.clone(), "merchant-key", &sig).is_ok());
        // wrong key
        assert_eq!(verify_params(params.clone(), "merchant-kez", &sig), Err(SignatureError::Mismatch));
        // mutate a value
        let tampered =
            params.iter().map(|(k, v)| if *k == "money" { (*k, "10.01") } else { (*k, *v) }).collect::<Vec<_>>();
        assert_eq!(verify_params(tampered, "merchant-key", &sig), Err(SignatureError::Mismatch));
        // signature value itself is never part of the digest
        let resigned = params.iter().map(|(k, v)| if *k == "sign" { (*k, sig.as_str()) } else { (*k, *v) });
        assert!(verify_params(resigned, "merchant-key", &sig).is_ok());
    }

    #[test]
    fn empty_fields_do_not_change_the_signature() {
        let mut with_empty = HashMap::new();
        with_empty.insert("pid".to_string(), "1".to_string());
        with_empty.insert("param".to_string(), String::new());
        let without = [("pid", "1")];
        assert_eq!(sign_params(&with_empty, "k"), sign_params(without, "k"));
    }

    #[test]
    fn missing_signature() {
        assert_eq!(verify_params(sample(), "k", ""), Err(SignatureError::MissingSignature));
    }
}
