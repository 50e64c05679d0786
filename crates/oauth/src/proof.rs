//! Request signing proofs.
//!
//! Every authenticated Graph call carries `appsecret_proof`, an HMAC of the
//! access token keyed by the app secret. Proofs are computed once per token
//! and cached behind their own lock, never behind a registry lock.

use std::{collections::HashMap, sync::Mutex};

use {
    secrecy::{ExposeSecret, Secret},
    switchboard_graph::{RequestSigner, appsecret_proof},
};

/// `hex(HMAC-SHA256(secret, access_token))`.
#[must_use]
pub fn signing_proof(access_token: &str, secret: &str) -> String {
    appsecret_proof(secret, access_token)
}

/// Memoized signing proofs keyed by token value.
///
/// Unbounded: the number of distinct tokens is bounded by the number of
/// accounts, but grows if tokens rotate frequently.
pub struct SigningProofCache {
    app_secret: Secret<String>,
    proofs: Mutex<HashMap<String, String>>,
}

impl SigningProofCache {
    pub fn new(app_secret: Secret<String>) -> Self {
        Self {
            app_secret,
            proofs: Mutex::new(HashMap::new()),
        }
    }

    /// Proof for `access_token`, computing it on first use.
    pub fn proof(&self, access_token: &str) -> String {
        let mut proofs = self.proofs.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(proof) = proofs.get(access_token) {
            return proof.clone();
        }
        let proof = signing_proof(access_token, self.app_secret.expose_secret());
        proofs.insert(access_token.to_string(), proof.clone());
        proof
    }

    /// Number of cached proofs.
    pub fn len(&self) -> usize {
        self.proofs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RequestSigner for SigningProofCache {
    fn proof(&self, access_token: &str) -> String {
        SigningProofCache::proof(self, access_token)
    }
}

impl std::fmt::Debug for SigningProofCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningProofCache")
            .field("app_secret", &"[REDACTED]")
            .field("cached", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, std::sync::Arc};

    #[test]
    fn proof_is_hmac_of_token() {
        assert_eq!(
            signing_proof("EAAtoken", "app-secret"),
            "9f9f0867bc3df2d00cecd6aa6fb78e65b64c050401bd6ec5b84d98503d443d34"
        );
    }

    #[test]
    fn cache_computes_once_per_token() {
        let cache = SigningProofCache::new(Secret::new("app-secret".into()));
        assert!(cache.is_empty());
        let first = cache.proof("EAAtoken");
        let again = cache.proof("EAAtoken");
        assert_eq!(first, again);
        assert_eq!(cache.len(), 1);
        cache.proof("other");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn concurrent_signers_agree() {
        let cache = Arc::new(SigningProofCache::new(Secret::new("app-secret".into())));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || RequestSigner::proof(cache.as_ref(), "EAAtoken"))
            })
            .collect();
        for handle in handles {
            assert_eq!(
                handle.join().unwrap(),
                "9f9f0867bc3df2d00cecd6aa6fb78e65b64c050401bd6ec5b84d98503d443d34"
            );
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn debug_hides_secret() {
        let cache = SigningProofCache::new(Secret::new("app-secret".into()));
        assert!(!format!("{cache:?}").contains("app-secret"));
    }
}
