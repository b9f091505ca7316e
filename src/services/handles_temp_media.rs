//! Convenience methods for any media-owning entity, so hosts can write
//! `product.transfer_temp_media(&service, dto, "gallery", props)`.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::TempMediaResult;
use crate::models::{CustomProperties, MediaTransferDto, TempMediaTransferDto};
use crate::services::media_library::HasMedia;
use crate::services::transfer_service::MediaTransferService;

pub const PRODUCT_IMAGES_COLLECTION: &str = "product_images";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaUrl {
    pub id: String,
    pub url: String,
    pub original_name: String,
    pub order: i64,
}

#[async_trait]
pub trait HandlesTempMedia: HasMedia {
    async fn transfer_temp_media(
        &self,
        service: &MediaTransferService,
        dto: TempMediaTransferDto,
        collection_name: &str,
        custom_properties: CustomProperties,
    ) -> TempMediaResult<MediaTransferDto>;

    async fn transfer_temp_media_as_product_images(
        &self,
        service: &MediaTransferService,
        dto: TempMediaTransferDto,
    ) -> TempMediaResult<MediaTransferDto> {
        self.transfer_temp_media(service, dto, PRODUCT_IMAGES_COLLECTION, CustomProperties::new())
            .await
    }

    /// Permanent URLs of the transferred media, in collection order
    fn media_urls_from_transfer(&self, transfer: &MediaTransferDto) -> Vec<MediaUrl> {
        let mut urls: Vec<MediaUrl> = transfer
            .transferred_media
            .iter()
            .map(|m| MediaUrl {
                id: m.id.clone(),
                url: m.url.clone(),
                original_name: m.original_name.clone(),
                order: m.order,
            })
            .collect();
        urls.sort_by_key(|u| u.order);
        urls
    }
}

#[async_trait]
impl<T: HasMedia> HandlesTempMedia for T {
    async fn transfer_temp_media(
        &self,
        service: &MediaTransferService,
        dto: TempMediaTransferDto,
        collection_name: &str,
        custom_properties: CustomProperties,
    ) -> TempMediaResult<MediaTransferDto> {
        service
            .transfer_temp_media_to_model(self, dto, collection_name, custom_properties)
            .await
    }
}
