//! End-to-end token verification against a mock JWKS endpoint

mod common;

use std::time::Duration;

use common::*;
use serde_json::json;
use turnstile::{
    FixedClock, ProcessorConfig, SigningAlgorithm, TokenVerifier, VerificationFailure,
};

#[tokio::test]
async fn test_rs256_token_verifies_against_remote_jwks() {
    // GIVEN: a JWKS endpoint publishing the RSA key
    let jwks_server = MockJwksServer::start().await;
    jwks_server.serve(jwks(vec![rsa_jwk("rsa-1")])).await;
    let verifier = jwks_server.verifier(SigningAlgorithm::RS256);

    // WHEN: a token signed with the matching private key is processed
    let token = sign_rs256(Some("rsa-1"), &valid_claims("alice"));
    let claims = verifier
        .process(&token)
        .await
        .expect("Token should verify");

    // THEN: the claims are exposed
    assert_eq!(claims.subject(), Some("alice"));
    assert_eq!(claims.issuer(), ISSUER);
    assert_eq!(claims.audience().to_vec(), vec!["orders-api".to_string()]);
    assert_eq!(claims.expires_at().timestamp(), NOW + 600);
    assert_eq!(jwks_server.fetch_count().await, 1);
}

#[tokio::test]
async fn test_hs256_token_verifies_and_cache_is_reused() {
    let jwks_server = MockJwksServer::start().await;
    jwks_server.serve(jwks(vec![hmac_jwk("hmac-1")])).await;
    let verifier = jwks_server.verifier(SigningAlgorithm::HS256);

    for user in ["alice", "bob", "carol"] {
        let token = sign_hs256(Some("hmac-1"), &valid_claims(user));
        let claims = verifier.process(&token).await.expect("Token should verify");
        assert_eq!(claims.subject(), Some(user));
    }

    // One fetch serves every token while the key stays known
    assert_eq!(jwks_server.fetch_count().await, 1);
}

#[tokio::test]
async fn test_no_fetch_before_first_token() {
    let jwks_server = MockJwksServer::start().await;
    jwks_server.serve(jwks(vec![hmac_jwk("hmac-1")])).await;

    let verifier = jwks_server.verifier(SigningAlgorithm::HS256);

    assert!(!verifier.key_cache().is_populated());
    assert_eq!(jwks_server.fetch_count().await, 0);
}

#[tokio::test]
async fn test_key_rotation_triggers_single_refresh() {
    // GIVEN: the endpoint initially publishes only the old key
    let jwks_server = MockJwksServer::start().await;
    jwks_server.serve(jwks(vec![hmac_jwk("old")])).await;
    let verifier = jwks_server.verifier(SigningAlgorithm::HS256);

    let old_token = sign_hs256(Some("old"), &valid_claims("alice"));
    verifier
        .process(&old_token)
        .await
        .expect("Old key should verify");

    // WHEN: the issuer rotates in a new key and signs with it
    jwks_server
        .serve(jwks(vec![hmac_jwk("old"), hmac_jwk("new")]))
        .await;
    let new_token = sign_hs256(Some("new"), &valid_claims("bob"));
    let claims = verifier
        .process(&new_token)
        .await
        .expect("Rotated key should verify after refresh");

    // THEN: exactly one refresh happened
    assert_eq!(claims.subject(), Some("bob"));
    assert_eq!(jwks_server.fetch_count().await, 1);

    // AND: further tokens use the refreshed cache
    verifier
        .process(&new_token)
        .await
        .expect("Cached key should verify");
    verifier
        .process(&old_token)
        .await
        .expect("Old key is still published");
    assert_eq!(jwks_server.fetch_count().await, 1);
}

#[tokio::test]
async fn test_unknown_key_id_after_refresh_is_signature_invalid() {
    let jwks_server = MockJwksServer::start().await;
    jwks_server.serve(jwks(vec![hmac_jwk("hmac-1")])).await;
    let verifier = jwks_server.verifier(SigningAlgorithm::HS256);

    let token = sign_hs256(Some("never-published"), &valid_claims("mallory"));
    let failure = verifier
        .process(&token)
        .await
        .expect_err("Unknown key ID must be rejected");

    assert_eq!(failure, VerificationFailure::SignatureInvalid);
    // Initial fetch plus exactly one forced refresh
    assert_eq!(jwks_server.fetch_count().await, 2);
}

#[tokio::test]
async fn test_endpoint_failure_then_recovery() {
    // GIVEN: the JWKS endpoint is down
    let jwks_server = MockJwksServer::start().await;
    jwks_server.fail_with(500).await;
    let verifier = jwks_server.verifier(SigningAlgorithm::HS256);
    let token = sign_hs256(Some("hmac-1"), &valid_claims("alice"));

    // WHEN: a token arrives
    let failure = verifier
        .process(&token)
        .await
        .expect_err("Fetch failure must reject the token");

    // THEN: it is rejected as a key source problem and nothing is cached
    assert_eq!(failure, VerificationFailure::KeySourceUnavailable);
    assert!(!verifier.key_cache().is_populated());

    // WHEN: the endpoint recovers
    jwks_server.serve(jwks(vec![hmac_jwk("hmac-1")])).await;

    // THEN: the next token triggers a fresh fetch and verifies
    let claims = verifier
        .process(&token)
        .await
        .expect("Token should verify after recovery");
    assert_eq!(claims.subject(), Some("alice"));
    assert_eq!(jwks_server.fetch_count().await, 1);
}

#[tokio::test]
async fn test_invalid_document_is_key_source_unavailable() {
    let jwks_server = MockJwksServer::start().await;
    jwks_server.serve(json!({ "not_keys": [] })).await;
    let verifier = jwks_server.verifier(SigningAlgorithm::HS256);

    let token = sign_hs256(Some("hmac-1"), &valid_claims("alice"));
    assert_eq!(
        verifier.process(&token).await,
        Err(VerificationFailure::KeySourceUnavailable)
    );
}

#[tokio::test]
async fn test_algorithm_mismatch_is_signature_invalid() {
    // GIVEN: a verifier pinned to RS256 whose JWKS also publishes a shared secret
    let jwks_server = MockJwksServer::start().await;
    jwks_server
        .serve(jwks(vec![rsa_jwk("rsa-1"), hmac_jwk("hmac-1")]))
        .await;
    let verifier = jwks_server.verifier(SigningAlgorithm::RS256);

    // WHEN: an HS256 token is presented
    let token = sign_hs256(Some("hmac-1"), &valid_claims("mallory"));

    // THEN: the algorithm is not negotiable
    assert_eq!(
        verifier.process(&token).await,
        Err(VerificationFailure::SignatureInvalid)
    );
}

#[tokio::test]
async fn test_tampered_payload_is_signature_invalid() {
    let jwks_server = MockJwksServer::start().await;
    jwks_server.serve(jwks(vec![rsa_jwk("rsa-1")])).await;
    let verifier = jwks_server.verifier(SigningAlgorithm::RS256);

    let token = sign_rs256(Some("rsa-1"), &valid_claims("alice"));
    let forged = sign_rs256(Some("rsa-1"), &valid_claims("admin"));
    let mut parts: Vec<&str> = token.split('.').collect();
    parts[1] = forged.split('.').nth(1).expect("payload segment");
    let tampered = parts.join(".");

    assert_eq!(
        verifier.process(&tampered).await,
        Err(VerificationFailure::SignatureInvalid)
    );
}

#[tokio::test]
async fn test_claim_failures_are_claims_invalid() {
    let jwks_server = MockJwksServer::start().await;
    jwks_server.serve(jwks(vec![hmac_jwk("hmac-1")])).await;
    let verifier = jwks_server.verifier(SigningAlgorithm::HS256);

    let mut expired = valid_claims("alice");
    expired["exp"] = json!(NOW);

    let mut wrong_issuer = valid_claims("alice");
    wrong_issuer["iss"] = json!("https://issuer.example.com/");

    let mut not_yet_valid = valid_claims("alice");
    not_yet_valid["nbf"] = json!(NOW + 1);

    let mut no_expiry = valid_claims("alice");
    no_expiry
        .as_object_mut()
        .expect("claims object")
        .remove("exp");

    for claims in [expired, wrong_issuer, not_yet_valid, no_expiry] {
        let token = sign_hs256(Some("hmac-1"), &claims);
        assert_eq!(
            verifier.process(&token).await,
            Err(VerificationFailure::ClaimsInvalid),
            "claims {claims} should be rejected"
        );
    }
}

#[tokio::test]
async fn test_malformed_tokens_never_fetch_keys() {
    let jwks_server = MockJwksServer::start().await;
    jwks_server.serve(jwks(vec![hmac_jwk("hmac-1")])).await;
    let verifier = jwks_server.verifier(SigningAlgorithm::HS256);

    for token in ["", "abc", "a.b", "a.b.c.d", "!!!.???.###", "..."] {
        assert_eq!(
            verifier.process(token).await,
            Err(VerificationFailure::Malformed),
            "token {token:?} should be malformed"
        );
    }
    assert_eq!(jwks_server.fetch_count().await, 0);
}

#[tokio::test]
async fn test_slow_endpoint_hits_read_timeout() {
    // GIVEN: a read timeout shorter than the endpoint's response delay
    let jwks_server = MockJwksServer::start().await;
    jwks_server
        .serve_slowly(jwks(vec![hmac_jwk("hmac-1")]), Duration::from_secs(2))
        .await;
    let config = ProcessorConfig::builder(&jwks_server.jwks_url, ISSUER, SigningAlgorithm::HS256)
        .read_timeout_ms(100)
        .build()
        .expect("Invalid config");
    let verifier = TokenVerifier::builder(config)
        .clock(FixedClock::at_timestamp(NOW))
        .build()
        .expect("Failed to build verifier");

    // WHEN / THEN: the token is rejected instead of waiting
    let token = sign_hs256(Some("hmac-1"), &valid_claims("alice"));
    assert_eq!(
        verifier.process(&token).await,
        Err(VerificationFailure::KeySourceUnavailable)
    );
}

#[tokio::test]
async fn test_kidless_token_tries_compatible_keys() {
    let jwks_server = MockJwksServer::start().await;
    jwks_server
        .serve(jwks(vec![rsa_jwk("rsa-1"), hmac_jwk("hmac-1")]))
        .await;
    let verifier = jwks_server.verifier(SigningAlgorithm::HS256);

    let token = sign_hs256(None, &valid_claims("alice"));
    let claims = verifier
        .process(&token)
        .await
        .expect("Kid-less token should verify");

    assert_eq!(claims.subject(), Some("alice"));
}
