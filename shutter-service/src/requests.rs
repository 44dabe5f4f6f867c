//! Request payloads accepted by the services.
//!
//! Wire shapes follow the public JSON API (camelCase). Validation turns a
//! payload into the typed value the service works with.

use serde::{Deserialize, Serialize};
use shutter_core::constants::{
    DEFAULT_PAGE, DEFAULT_PAGE_SIZE, MAX_COMMENT_LEN, MAX_PAGE_SIZE, MIN_PASSWORD_LEN,
};
use shutter_core::{ContentType, ShutterResult, User, UserRole};

use crate::validation::{
    parse_choice, validate_email, validate_max_len, validate_min_len, ValidateNonEmpty,
};

/// Account registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub name: String,
    /// `buyer` or `seller`
    pub role: String,
}

impl RegisterRequest {
    /// Check every field and parse the role.
    ///
    /// # Errors
    ///
    /// `ValidationError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> ShutterResult<UserRole> {
        self.username.validate_non_empty("username")?;
        self.email.validate_non_empty("email")?;
        validate_email(&self.email, "email")?;
        validate_min_len(&self.password, "password", MIN_PASSWORD_LEN)?;
        self.name.validate_non_empty("name")?;
        parse_choice(&self.role, "role", "buyer, seller", UserRole::parse)
    }
}

/// Login by email and password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> ShutterResult<()> {
        self.email.validate_non_empty("email")?;
        validate_email(&self.email, "email")?;
        self.password.validate_non_empty("password")
    }
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

/// New comment on a post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRequest {
    #[serde(default)]
    pub content: String,
}

impl CommentRequest {
    /// Content is required and at most `MAX_COMMENT_LEN` characters.
    pub fn validate(&self) -> ShutterResult<()> {
        self.content.validate_non_empty("content")?;
        validate_max_len(&self.content, "content", MAX_COMMENT_LEN)
    }
}

/// A purchase link attached to a new post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOptionRequest {
    pub platform: String,
    pub url: String,
}

/// Post creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    #[serde(default)]
    pub caption: String,
    /// `feed`, `reel` or `live`
    pub content_type: String,
    /// Feed posts only
    #[serde(default)]
    pub image_urls: Vec<String>,
    /// Required for reels
    #[serde(default)]
    pub video_url: Option<String>,
    /// Required for live posts
    #[serde(default)]
    pub live_stream_url: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub purchase_options: Vec<PurchaseOptionRequest>,
}

impl CreatePostRequest {
    /// Parse the content type and check that the matching media URL is set.
    pub fn validate(&self) -> ShutterResult<ContentType> {
        let content_type = parse_choice(
            &self.content_type,
            "contentType",
            "feed, reel, live",
            ContentType::parse,
        )?;
        match content_type {
            ContentType::Reel => self.video_url.validate_non_empty("videoUrl")?,
            ContentType::Live => self.live_stream_url.validate_non_empty("liveStreamUrl")?,
            ContentType::Feed => {}
        }
        for option in &self.purchase_options {
            option.platform.validate_non_empty("purchaseOptions.platform")?;
            option.url.validate_non_empty("purchaseOptions.url")?;
        }
        Ok(content_type)
    }
}

/// Pagination query for listings. Missing values take the defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ListQuery {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: Some(page),
            page_size: Some(page_size),
        }
    }

    /// `(page, page_size)` with defaults applied: page 0 becomes 1, size 0
    /// becomes the default and sizes above the maximum are capped.
    pub fn resolve(&self) -> (u32, u32) {
        let page = self.page.filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE);
        let page_size = self
            .page_size
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);
        (page, page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn register() -> RegisterRequest {
        RegisterRequest {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "secret1".to_string(),
            name: "Alice".to_string(),
            role: "seller".to_string(),
        }
    }

    #[test]
    fn test_register_validation() {
        assert_eq!(register().validate().unwrap(), UserRole::Seller);

        let short = RegisterRequest {
            password: "12345".to_string(),
            ..register()
        };
        assert!(short.validate().is_err());

        let bad_role = RegisterRequest {
            role: "admin".to_string(),
            ..register()
        };
        assert!(bad_role.validate().is_err());

        let bad_email = RegisterRequest {
            email: "alice.example.com".to_string(),
            ..register()
        };
        assert!(bad_email.validate().is_err());
    }

    #[test]
    fn test_login_validation_and_redaction() {
        let login = LoginRequest {
            email: "alice@example.com".to_string(),
            password: "secret1".to_string(),
        };
        assert!(login.validate().is_ok());
        assert!(!format!("{login:?}").contains("secret1"));

        let no_password = LoginRequest {
            password: " ".to_string(),
            ..login.clone()
        };
        assert!(no_password.validate().is_err());

        let bad_email = LoginRequest {
            email: "alice".to_string(),
            ..login
        };
        assert!(bad_email.validate().is_err());
    }

    #[test]
    fn test_comment_validation() {
        assert!(CommentRequest { content: "nice".to_string() }.validate().is_ok());
        assert!(CommentRequest::default().validate().is_err());
        let long = CommentRequest {
            content: "x".repeat(MAX_COMMENT_LEN + 1),
        };
        assert!(long.validate().is_err());
    }

    #[test]
    fn test_create_post_media_requirements() {
        let reel = CreatePostRequest {
            content_type: "reel".to_string(),
            ..Default::default()
        };
        assert!(reel.validate().is_err());

        let reel = CreatePostRequest {
            video_url: Some("https://cdn/v.mp4".to_string()),
            ..reel
        };
        assert_eq!(reel.validate().unwrap(), ContentType::Reel);

        let live = CreatePostRequest {
            content_type: "live".to_string(),
            live_stream_url: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(live.validate().is_err());

        let story = CreatePostRequest {
            content_type: "story".to_string(),
            ..Default::default()
        };
        assert!(story.validate().is_err());
    }

    #[test]
    fn test_list_query_defaults_and_cap() {
        assert_eq!(ListQuery::default().resolve(), (1, 10));
        assert_eq!(ListQuery::new(0, 0).resolve(), (1, 10));
        assert_eq!(ListQuery::new(3, 500).resolve(), (3, 100));
    }

    #[test]
    fn test_create_post_from_json() {
        let request: CreatePostRequest = serde_json::from_str(
            r#"{"contentType":"feed","imageUrls":["a.jpg"],"purchaseOptions":[{"platform":"shop","url":"u"}]}"#,
        )
        .unwrap();
        assert_eq!(request.image_urls, vec!["a.jpg"]);
        assert_eq!(request.validate().unwrap(), ContentType::Feed);
    }

    proptest! {
        #[test]
        fn prop_resolved_query_is_always_usable(page in any::<Option<u32>>(), size in any::<Option<u32>>()) {
            let (page, page_size) = ListQuery { page, page_size: size }.resolve();
            prop_assert!(page >= 1);
            prop_assert!((1..=MAX_PAGE_SIZE).contains(&page_size));
        }
    }
}
