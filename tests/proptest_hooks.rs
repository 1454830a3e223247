//! Property-based testing for webhook intake primitives.
//!
//! Uses proptest to generate arbitrary inputs and verify invariants for
//! HMAC signature verification, secret encryption, resource-id
//! classification, and body parsing.

use std::collections::HashMap;

use proptest::prelude::*;
use reasonkit_hooks::crypto::SecretCipher;
use reasonkit_hooks::intake::parse_body;
use reasonkit_hooks::model::{ParsedBody, ResourceType};
use reasonkit_hooks::signature::{compute_signature, verify_signature};

// ============================================================================
// STRATEGIES
// ============================================================================

/// Strategy for generating shared secrets of realistic and unrealistic shape
pub fn arb_secret() -> impl Strategy<Value = String> {
    prop_oneof![
        "whsec_[a-zA-Z0-9]{8,64}",
        "[ -~]{1,64}",
        ".{1,32}",
    ]
}

/// Strategy for generating raw payload bytes
pub fn arb_payload() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

/// Strategy for generating resource ids with a known provider prefix,
/// paired with the type the classifier must assign
pub fn arb_prefixed_id() -> impl Strategy<Value = (String, ResourceType)> {
    (
        prop_oneof![
            Just(("tr", ResourceType::Payment)),
            Just(("ord", ResourceType::Order)),
            Just(("re", ResourceType::Refund)),
            Just(("sub", ResourceType::Subscription)),
            Just(("mdt", ResourceType::Mandate)),
            Just(("cst", ResourceType::Customer)),
        ],
        "[a-zA-Z0-9]{0,24}",
    )
        .prop_map(|((prefix, expected), suffix)| (format!("{}_{}", prefix, suffix), expected))
}

/// Strategy for generating content-type values, sensible and garbage alike
pub fn arb_content_type() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some("application/json".to_string())),
        Just(Some("application/json; charset=utf-8".to_string())),
        Just(Some("application/x-www-form-urlencoded".to_string())),
        Just(Some("text/plain".to_string())),
        ".{0,40}".prop_map(Some),
    ]
}

/// Strategy for flat string maps, used for form and JSON bodies
pub fn arb_flat_map() -> impl Strategy<Value = HashMap<String, String>> {
    prop::collection::hash_map("[a-z]{1,8}", "[a-zA-Z0-9]{0,16}", 0..5)
}

// ============================================================================
// SIGNATURE INVARIANTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn prop_signature_roundtrip(secret in arb_secret(), payload in arb_payload()) {
        let signature = compute_signature(&secret, &payload);
        prop_assert!(verify_signature(&secret, &payload, &signature),
            "a freshly computed signature must verify against its own inputs");
    }

    #[test]
    fn prop_signature_is_lowercase_hex_sha256(secret in arb_secret(), payload in arb_payload()) {
        let signature = compute_signature(&secret, &payload);
        prop_assert_eq!(signature.len(), 64, "HMAC-SHA256 is 32 bytes, 64 hex chars");
        prop_assert!(signature.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn prop_tampered_payload_fails_verification(
        secret in arb_secret(),
        payload in arb_payload(),
        extra in any::<u8>(),
    ) {
        let signature = compute_signature(&secret, &payload);
        let mut tampered = payload.clone();
        tampered.push(extra);
        prop_assert!(!verify_signature(&secret, &tampered, &signature));
    }

    #[test]
    fn prop_wrong_secret_fails_verification(
        secret in arb_secret(),
        other in arb_secret(),
        payload in arb_payload(),
    ) {
        prop_assume!(secret != other);
        let signature = compute_signature(&secret, &payload);
        prop_assert!(!verify_signature(&other, &payload, &signature));
    }

    #[test]
    fn prop_verify_is_total_over_junk_headers(
        secret in arb_secret(),
        payload in arb_payload(),
        junk in ".{0,130}",
    ) {
        // Arbitrary header values must fold to a bool, never a panic
        let _ = verify_signature(&secret, &payload, &junk);
        if junk.len() != 64 {
            prop_assert!(!verify_signature(&secret, &payload, &junk));
        }
    }

    // ========================================================================
    // Resource Classification Invariants
    // ========================================================================

    #[test]
    fn prop_classification_matches_prefix((id, expected) in arb_prefixed_id()) {
        prop_assert_eq!(ResourceType::from_resource_id(&id), expected);
    }

    #[test]
    fn prop_classification_is_total_and_deterministic(id in ".{0,64}") {
        let first = ResourceType::from_resource_id(&id);
        let second = ResourceType::from_resource_id(&id);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_unprefixed_ids_classify_unknown(id in "[a-zA-Z0-9]{0,32}") {
        // No underscore separator means no prefix to match
        prop_assert_eq!(ResourceType::from_resource_id(&id), ResourceType::Unknown);
    }

    // ========================================================================
    // Body Parsing Invariants
    // ========================================================================

    #[test]
    fn prop_parse_body_is_total(content_type in arb_content_type(), body in arb_payload()) {
        let _ = parse_body(content_type.as_deref(), &body);
    }

    #[test]
    fn prop_parse_json_object_preserves_fields(map in arb_flat_map()) {
        let raw = serde_json::to_vec(&map).unwrap();
        let parsed = parse_body(Some("application/json"), &raw);
        prop_assert_eq!(parsed, ParsedBody::Json(serde_json::to_value(&map).unwrap()));
    }

    #[test]
    fn prop_parse_form_preserves_pairs(map in arb_flat_map()) {
        let raw = map
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let parsed = parse_body(Some("application/x-www-form-urlencoded"), raw.as_bytes());
        prop_assert_eq!(parsed, ParsedBody::Form(map));
    }

    #[test]
    fn prop_form_id_field_extracts(id in "[a-z]{1,4}_[a-zA-Z0-9]{1,16}") {
        let raw = format!("id={}&livemode=true", id);
        let parsed = parse_body(Some("application/x-www-form-urlencoded"), raw.as_bytes());
        prop_assert_eq!(parsed.resource_id(), Some(id));
    }
}

// ============================================================================
// SECRET CIPHER INVARIANTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_cipher_roundtrip(key in ".{1,64}", plaintext in ".{0,256}") {
        let cipher = SecretCipher::new(&key).unwrap();
        let blob = cipher.encrypt(&plaintext).unwrap();
        prop_assert_eq!(cipher.decrypt(&blob).unwrap(), plaintext);
    }

    #[test]
    fn prop_cipher_output_is_randomized(key in ".{1,64}", plaintext in ".{0,128}") {
        let cipher = SecretCipher::new(&key).unwrap();
        let first = cipher.encrypt(&plaintext).unwrap();
        let second = cipher.encrypt(&plaintext).unwrap();
        // Fresh salt and nonce every call; equal blobs would leak equality
        prop_assert_ne!(&first, &second);
        prop_assert_eq!(cipher.decrypt(&first).unwrap(), plaintext.clone());
        prop_assert_eq!(cipher.decrypt(&second).unwrap(), plaintext);
    }

    #[test]
    fn prop_cipher_rejects_tampering(key in ".{1,64}", plaintext in ".{0,128}") {
        let cipher = SecretCipher::new(&key).unwrap();
        let blob = cipher.encrypt(&plaintext).unwrap();

        // Flip the leading character; the envelope no longer authenticates
        let flipped = if blob.starts_with('A') { "B" } else { "A" };
        let tampered = format!("{}{}", flipped, &blob[1..]);
        prop_assert!(cipher.decrypt(&tampered).is_err());
    }

    #[test]
    fn prop_cipher_rejects_wrong_key(
        key in "[a-z]{8,32}",
        other in "[A-Z]{8,32}",
        plaintext in ".{0,128}",
    ) {
        let cipher = SecretCipher::new(&key).unwrap();
        let wrong = SecretCipher::new(&other).unwrap();
        let blob = cipher.encrypt(&plaintext).unwrap();
        prop_assert!(wrong.decrypt(&blob).is_err());
    }

    #[test]
    fn prop_cipher_decrypt_is_total(key in ".{1,64}", junk in ".{0,200}") {
        // Arbitrary blobs must come back as errors, not panics
        let cipher = SecretCipher::new(&key).unwrap();
        let _ = cipher.decrypt(&junk);
    }
}
