pub mod prelude;

pub mod temp_media;
