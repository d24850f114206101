use crate::domain_model::RequestDigest;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Digest of a request payload.
///
/// The payload goes through `serde_json::Value` first, whose maps are ordered
/// by key, so two payloads that differ only in field order hash the same.
pub fn fingerprint<P: Serialize + ?Sized>(payload: &P) -> Result<RequestDigest, serde_json::Error> {
    let normalized = serde_json::to_value(payload)?;
    let bytes = serde_json::to_vec(&normalized)?;
    Ok(RequestDigest(hex::encode(Sha256::digest(&bytes))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn empty_object_matches_known_sha256() {
        let digest = fingerprint(&serde_json::json!({})).unwrap();
        assert_eq!(
            digest.0,
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn field_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"amount":10,"to":"b","from":"a"}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"from":"a","to":"b","amount":10}"#).unwrap();
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn different_payloads_differ() {
        let a = fingerprint(&serde_json::json!({"amt": 10})).unwrap();
        let b = fingerprint(&serde_json::json!({"amt": 11})).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.0.len(), 64);
    }
}
