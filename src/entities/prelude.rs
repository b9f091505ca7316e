pub use super::temp_media::Entity as TempMedia;
