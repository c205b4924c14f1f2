//! Asset access and construction.
//!
//! Two storage layouts exist for attachments: the legacy layout keeps one
//! blob per image format, the unified layout keeps a single blob plus an
//! optional preview. [`AssetProxy`] is picked once when the message record
//! is constructed and presents one capability surface over both.
//!
//! [`AssetBuilder`] accumulates the typed asset fields (original, preview,
//! uploaded / not-uploaded) as partial updates arrive and materializes one
//! immutable [`AssetContent`] on build.

use serde::{Deserialize, Serialize};

use murmure_shared::crypto::EncryptionKeys;
use murmure_shared::protocol::{
    AssetContent, AssetOriginal, AssetPreview, AssetTransfer, NotUploadedReason,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageFormat {
    Preview,
    Medium,
}

/// Legacy layout: one blob per image format.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LegacyAssetData {
    pub preview_image: Option<Vec<u8>>,
    pub medium_image: Option<Vec<u8>>,
    pub download_requested: bool,
}

/// Unified layout: a single blob plus an optional preview.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnifiedAssetData {
    pub image: Option<Vec<u8>>,
    pub preview_image: Option<Vec<u8>>,
    pub download_requested: bool,
}

/// Capability surface over both asset storage layouts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AssetProxy {
    Legacy(LegacyAssetData),
    Unified(UnifiedAssetData),
}

impl AssetProxy {
    pub fn has_downloaded_image(&self) -> bool {
        match self {
            AssetProxy::Legacy(data) => data.medium_image.is_some(),
            AssetProxy::Unified(data) => data.image.is_some(),
        }
    }

    pub fn image_data(&self, format: ImageFormat) -> Option<&[u8]> {
        match (self, format) {
            (AssetProxy::Legacy(data), ImageFormat::Preview) => data.preview_image.as_deref(),
            (AssetProxy::Legacy(data), ImageFormat::Medium) => data.medium_image.as_deref(),
            (AssetProxy::Unified(data), ImageFormat::Preview) => data.preview_image.as_deref(),
            (AssetProxy::Unified(data), ImageFormat::Medium) => data.image.as_deref(),
        }
    }

    /// Flag the blob for download. The transfer itself is driven outside
    /// this crate; requesting twice is a no-op.
    pub fn request_download(&mut self) {
        match self {
            AssetProxy::Legacy(data) => data.download_requested = true,
            AssetProxy::Unified(data) => data.download_requested = true,
        }
    }

    pub fn download_requested(&self) -> bool {
        match self {
            AssetProxy::Legacy(data) => data.download_requested,
            AssetProxy::Unified(data) => data.download_requested,
        }
    }
}

/// Accumulates partial asset updates into one immutable record.
///
/// Uploaded and not-uploaded are mutually exclusive outcomes of the same
/// transfer; whichever arrives last wins, explicitly.
#[derive(Debug, Clone, Default)]
pub struct AssetBuilder {
    original: Option<AssetOriginal>,
    preview: Option<AssetPreview>,
    transfer: Option<AssetTransfer>,
}

impl AssetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn original(mut self, original: AssetOriginal) -> Self {
        self.original = Some(original);
        self
    }

    pub fn preview(mut self, preview: AssetPreview) -> Self {
        self.preview = Some(preview);
        self
    }

    pub fn uploaded(mut self, asset_id: String, keys: EncryptionKeys) -> Self {
        self.transfer = Some(AssetTransfer::Uploaded { asset_id, keys });
        self
    }

    pub fn not_uploaded(mut self, reason: NotUploadedReason) -> Self {
        self.transfer = Some(AssetTransfer::NotUploaded(reason));
        self
    }

    pub fn build(self) -> AssetContent {
        AssetContent {
            original: self.original,
            preview: self.preview,
            transfer: self.transfer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_layouts_answer_the_same_questions() {
        let legacy = AssetProxy::Legacy(LegacyAssetData {
            preview_image: Some(vec![1]),
            medium_image: Some(vec![2, 2]),
            download_requested: false,
        });
        let unified = AssetProxy::Unified(UnifiedAssetData {
            image: Some(vec![2, 2]),
            preview_image: Some(vec![1]),
            download_requested: false,
        });

        for proxy in [&legacy, &unified] {
            assert!(proxy.has_downloaded_image());
            assert_eq!(proxy.image_data(ImageFormat::Medium), Some(&[2u8, 2][..]));
            assert_eq!(proxy.image_data(ImageFormat::Preview), Some(&[1u8][..]));
        }
    }

    #[test]
    fn test_request_download_is_idempotent() {
        let mut proxy = AssetProxy::Unified(UnifiedAssetData::default());
        assert!(!proxy.download_requested());
        proxy.request_download();
        proxy.request_download();
        assert!(proxy.download_requested());
    }

    #[test]
    fn test_builder_last_transfer_outcome_wins() {
        let asset = AssetBuilder::new()
            .original(AssetOriginal {
                name: Some("photo.png".into()),
                size: 1024,
                mime_type: "image/png".into(),
            })
            .not_uploaded(NotUploadedReason::Failed)
            .uploaded("asset-key-1".into(), upload_keys())
            .build();

        assert!(matches!(
            asset.transfer,
            Some(AssetTransfer::Uploaded { .. })
        ));
        assert_eq!(asset.original.unwrap().size, 1024);
        assert!(asset.preview.is_none());
    }

    fn upload_keys() -> EncryptionKeys {
        let (_, keys) = EncryptionKeys::encrypt_sha256(b"blob").unwrap();
        keys
    }
}
