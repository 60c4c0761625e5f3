//! Request signing helpers shared by the authenticated adapters.

use anyhow::{anyhow, Result};
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Sha256, Sha512};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// API key + secret pair for one vendor account.
#[derive(Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: SecretString,
}

impl ApiCredentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: SecretString::new(api_secret.into()),
        }
    }

    pub fn sign_sha256(&self, message: &str) -> Result<String> {
        hmac_sha256_hex(self.api_secret.expose_secret().as_bytes(), message)
    }

    pub fn sign_sha512(&self, message: &str) -> Result<String> {
        hmac_sha512_hex(self.api_secret.expose_secret().as_bytes(), message)
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

pub fn hmac_sha256_hex(secret: &[u8], message: &str) -> Result<String> {
    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|e| anyhow!("HMAC key error: {e}"))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn hmac_sha512_hex(secret: &[u8], message: &str) -> Result<String> {
    let mut mac =
        HmacSha512::new_from_slice(secret).map_err(|e| anyhow!("HMAC key error: {e}"))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Milliseconds since the Unix epoch.
pub fn timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// `k=v&k=v` with URL-encoded values, in the given order.
pub fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Binance-style signed query: params + `timestamp`, then `signature`
/// computed over everything before it.
pub fn signed_query(
    creds: &ApiCredentials,
    params: &[(&str, String)],
    timestamp: i64,
) -> Result<String> {
    let mut all = params.to_vec();
    all.push(("timestamp", timestamp.to_string()));
    let query = encode_query(&all);
    let signature = creds.sign_sha256(&query)?;
    Ok(format!("{query}&signature={signature}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 4231 test case 2.
    const KEY: &[u8] = b"Jefe";
    const DATA: &str = "what do ya want for nothing?";

    #[test]
    fn test_hmac_sha256_rfc4231() {
        assert_eq!(
            hmac_sha256_hex(KEY, DATA).unwrap(),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_hmac_sha512_rfc4231() {
        assert_eq!(
            hmac_sha512_hex(KEY, DATA).unwrap(),
            "164b7a7bfcf819e2e395fbe73b56e0a387bd64222e831fd610270cd7ea2505549758bf75c05a994a6d034f65f8f0e6fdcaeab1a34d4a6b4b636e070a38bce737"
        );
    }

    #[test]
    fn test_binance_documented_signature() {
        let creds = ApiCredentials::new(
            "vmPUZE6mv9SD5VNHk4HlWFsOr6aKE2zvsw0MuIgwCIPy6utIco14y7Ju91duEh8A",
            "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j",
        );
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            creds.sign_sha256(query).unwrap(),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_signed_query_appends_timestamp_and_signature() {
        let creds = ApiCredentials::new("k", "s");
        let q = signed_query(&creds, &[("recvWindow", "5000".into())], 1_700_000_000_000).unwrap();
        assert!(q.starts_with("recvWindow=5000&timestamp=1700000000000&signature="));
        let expected = creds
            .sign_sha256("recvWindow=5000&timestamp=1700000000000")
            .unwrap();
        assert!(q.ends_with(&expected));
    }

    #[test]
    fn test_encode_query_escapes_values() {
        assert_eq!(
            encode_query(&[("a", "x y".into()), ("b", "1&2".into())]),
            "a=x%20y&b=1%262"
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = ApiCredentials::new("key", "topsecret");
        let dbg = format!("{creds:?}");
        assert!(!dbg.contains("topsecret"));
        assert!(dbg.contains("REDACTED"));
    }
}
