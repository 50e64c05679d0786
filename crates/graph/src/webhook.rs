//! Inbound webhook authentication.
//!
//! The platform signs each delivery with `HMAC-SHA256(app secret, raw body)`
//! and sends the digest in a header as `sha256=<hex>`. [`VerifiedReader`]
//! feeds every byte the consumer reads into the MAC, so a streaming decoder
//! can consume the body while the digest accumulates alongside.

use std::io::{self, Read};

use {
    hmac::{Hmac, Mac},
    sha2::Sha256,
    tracing::warn,
};

type HmacSha256 = Hmac<Sha256>;

/// Algorithm assumed when the header carries a bare digest.
pub const DEFAULT_ALGORITHM: &str = "sha256";

/// Length of a hex-encoded SHA-256 digest.
const SHA256_HEX_LEN: usize = 64;

/// Reasons a webhook delivery cannot be trusted.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("missing signature header")]
    Missing,

    #[error("malformed signature header: {0}")]
    Malformed(String),

    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("signature mismatch")]
    Mismatch,

    #[error("failed to read body: {0}")]
    Io(#[from] io::Error),
}

/// A claimed signature parsed from the request header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub algorithm: String,
    pub digest: Vec<u8>,
}

impl Signature {
    /// Parse `algorithm=hexdigest`. A value without `=` uses
    /// [`DEFAULT_ALGORITHM`].
    pub fn parse(header: Option<&str>) -> Result<Self, SignatureError> {
        let header = header.map(str::trim).filter(|h| !h.is_empty());
        let Some(header) = header else {
            return Err(SignatureError::Missing);
        };
        let (algorithm, hex_digest) = match header.split_once('=') {
            Some((algorithm, digest)) => (algorithm.trim().to_ascii_lowercase(), digest.trim()),
            None => (DEFAULT_ALGORITHM.to_string(), header),
        };
        if algorithm != DEFAULT_ALGORITHM {
            return Err(SignatureError::UnsupportedAlgorithm(algorithm));
        }
        if hex_digest.len() != SHA256_HEX_LEN {
            return Err(SignatureError::Malformed(format!(
                "expected {SHA256_HEX_LEN} hex characters, got {}",
                hex_digest.len()
            )));
        }
        let digest =
            hex::decode(hex_digest).map_err(|e| SignatureError::Malformed(e.to_string()))?;
        Ok(Self { algorithm, digest })
    }
}

/// Body reader that accumulates an HMAC over everything read through it.
pub struct VerifiedReader<R> {
    inner: R,
    mac: HmacSha256,
    expected: Vec<u8>,
    complete: bool,
}

impl<R: Read> VerifiedReader<R> {
    /// Wrap `body`, rejecting a missing, malformed or unsupported signature
    /// before any body byte is consumed.
    pub fn new(
        secret: &[u8],
        signature_header: Option<&str>,
        body: R,
    ) -> Result<Self, SignatureError> {
        let signature = Signature::parse(signature_header)?;
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| SignatureError::Malformed(e.to_string()))?;
        Ok(Self {
            inner: body,
            mac,
            expected: signature.digest,
            complete: false,
        })
    }

    /// Whether the underlying body has been read to EOF.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Drain whatever the consumer left unread, then compare digests.
    ///
    /// This is the only verification entry point: a body is trusted only if
    /// this returns `Ok(())`.
    pub fn verify_all(mut self) -> Result<(), SignatureError> {
        if !self.complete {
            io::copy(&mut self, &mut io::sink())?;
        }
        self.mac.verify_slice(&self.expected).map_err(|_| {
            warn!("webhook signature mismatch");
            SignatureError::Mismatch
        })
    }
}

impl<R: Read> Read for VerifiedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            if !buf.is_empty() {
                self.complete = true;
            }
        } else {
            self.mac.update(&buf[..n]);
        }
        Ok(n)
    }
}

/// Verify a fully buffered body.
pub fn verify_body(
    secret: &[u8],
    signature_header: Option<&str>,
    body: &[u8],
) -> Result<(), SignatureError> {
    VerifiedReader::new(secret, signature_header, body)?.verify_all()
}

/// Why a subscription handshake was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("unsupported hub.mode")]
    BadMode,
    #[error("missing hub.challenge")]
    MissingChallenge,
    #[error("verify token mismatch")]
    TokenMismatch,
}

/// Verify the platform's subscription handshake.
///
/// The platform sends a GET request with:
/// - `hub.mode=subscribe`
/// - `hub.verify_token=<your_verify_token>`
/// - `hub.challenge=<random_string>`
///
/// Returns the challenge to echo back verbatim.
pub fn verify_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    verify_token: &str,
) -> Result<String, HandshakeError> {
    if mode != Some("subscribe") {
        return Err(HandshakeError::BadMode);
    }
    let challenge = challenge.ok_or(HandshakeError::MissingChallenge)?;
    match token {
        Some(token) if !verify_token.is_empty() && constant_time_eq(token, verify_token) => {
            Ok(challenge.to_string())
        },
        _ => Err(HandshakeError::TokenMismatch),
    }
}

/// Constant-time string comparison.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}
