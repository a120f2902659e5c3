//! AWS Signature Version 4 request signing

use hmac::{Hmac, Mac};
use hmac::digest::InvalidLength;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Long-lived or temporary AWS credentials
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub session_token: Option<&'a str>,
}

/// Everything that goes into one signature
#[derive(Debug, Clone, Copy)]
pub struct SigningInput<'a> {
    pub method: &'a str,
    /// Host as sent in the `Host` header (including a non-default port)
    pub host: &'a str,
    pub path: &'a str,
    pub content_type: &'a str,
    pub body: &'a [u8],
    pub region: &'a str,
    pub service: &'a str,
    /// `YYYYMMDDTHHMMSSZ`
    pub datetime: &'a str,
}

/// Header values to attach to the signed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub authorization: String,
    pub amz_date: String,
    pub content_sha256: String,
}

/// Current time in the SigV4 basic format
#[must_use]
pub fn amz_datetime_now() -> String {
    chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string()
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(key)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Result<Vec<u8>, InvalidLength> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// Sign a request without a query string
///
/// Signed headers are `content-type`, `host`, `x-amz-content-sha256`,
/// `x-amz-date` and, for temporary credentials, `x-amz-security-token`.
///
/// # Errors
///
/// Propagates HMAC key errors, which do not occur for SHA-256 keys.
pub fn sign(input: &SigningInput<'_>, credentials: &Credentials<'_>) -> Result<Signature, InvalidLength> {
    let date = input.datetime.get(..8).unwrap_or(input.datetime);
    let payload_hash = sha256_hex(input.body);

    let mut headers = vec![
        ("content-type", input.content_type.trim()),
        ("host", input.host),
        ("x-amz-content-sha256", payload_hash.as_str()),
        ("x-amz-date", input.datetime),
    ];
    if let Some(token) = credentials.session_token {
        headers.push(("x-amz-security-token", token));
    }
    headers.sort_by(|a, b| a.0.cmp(b.0));

    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{}\n{}\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}",
        input.method, input.path
    );

    let scope = format!("{date}/{}/{}/aws4_request", input.region, input.service);
    let string_to_sign = format!(
        "{ALGORITHM}\n{}\n{scope}\n{}",
        input.datetime,
        sha256_hex(canonical_request.as_bytes())
    );

    let key = signing_key(credentials.secret_access_key, date, input.region, input.service)?;
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

    Ok(Signature {
        authorization: format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            credentials.access_key_id
        ),
        amz_date: input.datetime.to_string(),
        content_sha256: payload_hash,
    })
}
