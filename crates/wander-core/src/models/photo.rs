//! Photo reference model

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::now_millis;

use super::place::{LocalId, SyncStatus};

/// A photo reference attached to a place.
///
/// Only the reference (URI and caption) is synced; uploading the bytes is
/// handled elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    pub local_id: LocalId,
    pub server_id: Option<String>,
    /// Local identifier of the owning place
    pub place_id: LocalId,
    pub uri: String,
    pub caption: Option<String>,
    /// Display order within the place
    pub position: i64,
    pub sync_status: SyncStatus,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

impl Photo {
    /// Create a pending photo reference for a place
    pub fn new(place_id: LocalId, uri: impl AsRef<str>, caption: Option<String>) -> Result<Self> {
        let uri = uri.as_ref().trim().to_string();
        if uri.is_empty() {
            return Err(Error::InvalidInput("Photo uri cannot be empty".into()));
        }

        Ok(Self {
            local_id: LocalId::generate(),
            server_id: None,
            place_id,
            uri,
            caption: crate::util::normalize_text_option(caption),
            position: 0,
            sync_status: SyncStatus::Pending,
            created_at: now_millis(),
        })
    }

    /// Wire payload for a `create` action
    pub fn to_payload(&self) -> NewPhotoPayload {
        NewPhotoPayload {
            place_id: self.place_id.clone(),
            uri: self.uri.clone(),
            caption: self.caption.clone(),
        }
    }
}

/// `create` payload for a photo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPhotoPayload {
    pub place_id: LocalId,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_photo_new_trims_and_validates() {
        let place_id = LocalId::generate();
        let photo =
            Photo::new(place_id.clone(), "  file:///tmp/a.jpg ", Some("  ".into())).unwrap();
        assert_eq!(photo.uri, "file:///tmp/a.jpg");
        assert_eq!(photo.caption, None);
        assert_eq!(photo.place_id, place_id);
        assert_eq!(photo.sync_status, SyncStatus::Pending);

        assert!(Photo::new(place_id, " ", None).is_err());
    }

    #[test]
    fn test_photo_payload_shape() {
        let caption = Some("sunset".to_string());
        let photo = Photo::new(LocalId::from("p1"), "file:///a.jpg", caption).unwrap();
        let payload = serde_json::to_value(photo.to_payload()).unwrap();
        assert_eq!(
            payload,
            json!({"placeId": "p1", "uri": "file:///a.jpg", "caption": "sunset"})
        );
    }
}
