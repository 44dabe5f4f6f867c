//! Serialization boundary between domain values and cache bytes.
//!
//! Entries are stored as JSON: self-describing, readable from `redis-cli`,
//! and every field exposed to callers round-trips.

use serde::{de::DeserializeOwned, Serialize};
use shutter_core::{CacheError, EntityKind};

use super::key::CacheKey;

/// Serialize a value of `kind` into cache bytes.
pub fn encode<T: Serialize>(kind: EntityKind, value: &T) -> Result<Vec<u8>, CacheError> {
    serde_json::to_vec(value).map_err(|e| CacheError::Serialization {
        kind,
        reason: e.to_string(),
    })
}

/// Deserialize cache bytes read from `key`.
pub fn decode<T: DeserializeOwned>(key: &CacheKey, bytes: &[u8]) -> Result<T, CacheError> {
    serde_json::from_slice(bytes).map_err(|e| CacheError::Deserialization {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shutter_core::{now, ContentType, Post, PostImage, PurchaseOption};

    #[test]
    fn test_post_round_trip_keeps_every_field() {
        let post = Post {
            id: 42,
            user_id: 3,
            caption: "hi".to_string(),
            content_type: ContentType::Feed,
            video_url: None,
            live_stream_url: None,
            location: Some("Lisbon".to_string()),
            images: vec![PostImage {
                image_url: "https://cdn/1.jpg".to_string(),
            }],
            purchase_options: vec![PurchaseOption {
                platform: "Amazon".to_string(),
                url: "https://amazon/item".to_string(),
            }],
            likes: vec![],
            comments: vec![],
            created_at: now(),
            updated_at: now(),
        };

        let bytes = encode(EntityKind::Post, &post).unwrap();
        let key = CacheKey::entity(EntityKind::Post, 42);
        let decoded: Post = decode(&key, &bytes).unwrap();
        assert_eq!(decoded, post);
    }

    #[test]
    fn test_decode_garbage_reports_key() {
        let key = CacheKey::entity(EntityKind::Post, 1);
        let err = decode::<Post>(&key, b"not json").unwrap_err();
        match err {
            CacheError::Deserialization { key, .. } => assert_eq!(key, "post:1"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
