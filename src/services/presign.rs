//! AWS Signature Version 4 query-string presigning.
//!
//! The signature covers the method, the path-style URI, every query parameter
//! (including method-specific ones such as `partNumber`/`uploadId`) and the
//! `host` header. Payloads are left unsigned.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::{collections::BTreeMap, fmt::Write};

/// Longest validity S3 accepts for a presigned URL (7 days).
pub const MAX_EXPIRES_SECONDS: u64 = 604_800;

const SERVICE: &str = "s3";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PresignError {
    #[error("access key is required")]
    MissingAccessKey,
    #[error("secret key is required")]
    MissingSecretKey,
    #[error("bucket name is invalid")]
    InvalidBucket,
    #[error("object key is invalid")]
    InvalidKey,
    #[error("endpoint `{0}` is invalid")]
    InvalidEndpoint(String),
    #[error("expiry must be between 1 and {MAX_EXPIRES_SECONDS} seconds, got {0}")]
    InvalidExpiry(u64),
    #[error("signing key rejected")]
    InvalidSigningKey,
}

/// Signing credentials plus the endpoint URLs point at.
#[derive(Debug, Clone)]
pub struct Presigner {
    endpoint: String,
    region: String,
    access_key: String,
    secret_key: String,
}

impl Presigner {
    pub fn new(
        endpoint: &str,
        region: &str,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            region: region.to_string(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Presign `verb` on `bucket/key`, signing at the current time.
    pub fn presign(
        &self,
        verb: &str,
        bucket: &str,
        key: &str,
        expires_in_secs: u64,
        extra_params: &BTreeMap<String, String>,
    ) -> Result<String, PresignError> {
        self.presign_at(verb, bucket, key, expires_in_secs, extra_params, Utc::now())
    }

    /// Presign with an explicit signing time.
    pub fn presign_at(
        &self,
        verb: &str,
        bucket: &str,
        key: &str,
        expires_in_secs: u64,
        extra_params: &BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<String, PresignError> {
        if self.access_key.is_empty() {
            return Err(PresignError::MissingAccessKey);
        }
        if self.secret_key.is_empty() {
            return Err(PresignError::MissingSecretKey);
        }
        if bucket.is_empty() {
            return Err(PresignError::InvalidBucket);
        }
        let key = key.trim_start_matches('/');
        if key.is_empty() {
            return Err(PresignError::InvalidKey);
        }
        if expires_in_secs == 0 || expires_in_secs > MAX_EXPIRES_SECONDS {
            return Err(PresignError::InvalidExpiry(expires_in_secs));
        }
        let host = extract_host(&self.endpoint)?;

        let date = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let scope = format!("{}/{}/{}/aws4_request", date, self.region, SERVICE);

        let canonical_uri = uri_encode(&format!("/{}/{}", bucket, key), true);

        let mut params = extra_params.clone();
        params.insert("X-Amz-Algorithm".into(), "AWS4-HMAC-SHA256".into());
        params.insert(
            "X-Amz-Credential".into(),
            format!("{}/{}", self.access_key, scope),
        );
        params.insert("X-Amz-Date".into(), amz_date.clone());
        params.insert("X-Amz-Expires".into(), expires_in_secs.to_string());
        params.insert("X-Amz-SignedHeaders".into(), "host".into());
        let query = canonical_query(&params);

        let canonical_request = format!(
            "{}\n{}\n{}\nhost:{}\n\nhost\nUNSIGNED-PAYLOAD",
            verb, canonical_uri, query, host
        );
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );
        let signature = self.signature(&date, &string_to_sign)?;

        Ok(format!(
            "{}{}?{}&X-Amz-Signature={}",
            self.endpoint, canonical_uri, query, signature
        ))
    }

    fn signature(&self, date: &str, string_to_sign: &str) -> Result<String, PresignError> {
        let k_date = hmac_sha256(format!("AWS4{}", self.secret_key).as_bytes(), date.as_bytes())?;
        let k_region = hmac_sha256(&k_date, self.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, SERVICE.as_bytes())?;
        let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
        Ok(hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?))
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, PresignError> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(key).map_err(|_| PresignError::InvalidSigningKey)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Percent-encode per SigV4 rules; `/` is kept when encoding a path.
fn uri_encode(value: &str, keep_slash: bool) -> String {
    let mut out = String::with_capacity(value.len() * 3);
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if keep_slash => out.push('/'),
            _ => {
                let _ = write!(out, "%{:02X}", byte);
            }
        }
    }
    out
}

fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k, false), uri_encode(v, false)))
        .collect::<Vec<_>>()
        .join("&")
}

fn extract_host(endpoint: &str) -> Result<String, PresignError> {
    let without_scheme = endpoint
        .strip_prefix("http://")
        .or_else(|| endpoint.strip_prefix("https://"))
        .unwrap_or(endpoint);
    let host = without_scheme.split('/').next().unwrap_or_default();
    if host.is_empty() {
        return Err(PresignError::InvalidEndpoint(endpoint.to_string()));
    }
    Ok(host.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn presigner() -> Presigner {
        Presigner::new("http://localhost:9000/", "us-east-1", "access", "secret")
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn presigned_get_carries_sigv4_params() {
        let url = presigner()
            .presign_at("GET", "bucket", "backups/acme/site.tar.gz", 300, &BTreeMap::new(), at())
            .unwrap();

        assert!(url.starts_with("http://localhost:9000/bucket/backups/acme/site.tar.gz?"));
        assert!(url.contains("X-Amz-Algorithm=AWS4-HMAC-SHA256"));
        assert!(url.contains("X-Amz-Credential=access%2F20240115%2Fus-east-1%2Fs3%2Faws4_request"));
        assert!(url.contains("X-Amz-Date=20240115T120000Z"));
        assert!(url.contains("X-Amz-Expires=300"));
        assert!(url.contains("X-Amz-Signature="));
    }

    #[test]
    fn extra_params_are_signed_into_the_query() {
        let mut extra = BTreeMap::new();
        extra.insert("partNumber".to_string(), "3".to_string());
        extra.insert("uploadId".to_string(), "abc/def".to_string());
        let url = presigner()
            .presign_at("PUT", "bucket", "temp/x.gz", 600, &extra, at())
            .unwrap();
        assert!(url.contains("partNumber=3"));
        assert!(url.contains("uploadId=abc%2Fdef"));

        let plain = presigner()
            .presign_at("PUT", "bucket", "temp/x.gz", 600, &BTreeMap::new(), at())
            .unwrap();
        let sig = |u: &str| u.rsplit("X-Amz-Signature=").next().unwrap().to_string();
        assert_ne!(sig(&url), sig(&plain));
    }

    #[test]
    fn signing_is_deterministic_for_a_fixed_time() {
        let a = presigner()
            .presign_at("GET", "bucket", "k.gz", 60, &BTreeMap::new(), at())
            .unwrap();
        let b = presigner()
            .presign_at("GET", "bucket", "k.gz", 60, &BTreeMap::new(), at())
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_out_of_range_expiry() {
        let none = BTreeMap::new();
        assert_eq!(
            presigner().presign("GET", "bucket", "k", 0, &none),
            Err(PresignError::InvalidExpiry(0))
        );
        assert_eq!(
            presigner().presign("GET", "bucket", "k", MAX_EXPIRES_SECONDS + 1, &none),
            Err(PresignError::InvalidExpiry(MAX_EXPIRES_SECONDS + 1))
        );
    }

    #[test]
    fn rejects_missing_credentials() {
        let p = Presigner::new("http://localhost:9000", "us-east-1", "", "secret");
        assert_eq!(
            p.presign("GET", "bucket", "k", 60, &BTreeMap::new()),
            Err(PresignError::MissingAccessKey)
        );
    }
}
