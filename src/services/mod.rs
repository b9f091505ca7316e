pub mod expiry_sweeper;
pub mod handles_temp_media;
pub mod media_library;
pub mod notifications;
pub mod staging;
pub mod temp_media_service;
pub mod temp_media_store;
pub mod transfer_service;
