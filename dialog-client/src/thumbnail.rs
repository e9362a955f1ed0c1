//! Photo previews for [`crate::Client::send_image_message`].

use std::path::Path;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageResult};

use crate::message::Thumbnail;

/// Height of the inline preview, in pixels.
pub(crate) const PREVIEW_HEIGHT: u32 = 100;
/// JPEG quality of the inline preview (0–100).
const PREVIEW_QUALITY: u8 = 5;

/// Full-size dimensions of an image plus its inline preview.
#[derive(Debug)]
pub(crate) struct Preview {
    pub(crate) width:  u32,
    pub(crate) height: u32,
    pub(crate) thumb:  Thumbnail,
}

/// Decode the image at `path` and build its preview.
///
/// Blocking: run it off the async workers.
pub(crate) fn build(path: &Path) -> ImageResult<Preview> {
    let image = image::open(path)?;
    let (width, height) = (image.width(), image.height());
    Ok(Preview { width, height, thumb: thumbnail(&image)? })
}

/// Scale `image` to [`PREVIEW_HEIGHT`] keeping the aspect ratio and encode
/// it as a low-quality JPEG data URI.
fn thumbnail(image: &DynamicImage) -> ImageResult<Thumbnail> {
    let scaled_width = (u64::from(image.width()) * u64::from(PREVIEW_HEIGHT))
        .div_ceil(u64::from(image.height().max(1)))
        .clamp(1, u64::from(u32::MAX)) as u32;
    let preview = image.resize_exact(scaled_width, PREVIEW_HEIGHT, FilterType::Triangle);

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(preview.to_rgb8());
    let mut jpeg = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, PREVIEW_QUALITY))?;

    Ok(Thumbnail {
        base64: format!("data:image/jpeg;base64,{}", STANDARD.encode(&jpeg)),
        width:  rgb.width(),
        height: rgb.height(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    #[test]
    fn preview_keeps_aspect_ratio() {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(400, 200));
        let thumb = thumbnail(&image).unwrap();
        assert_eq!((thumb.width, thumb.height), (200, PREVIEW_HEIGHT));

        let encoded = thumb.base64.strip_prefix("data:image/jpeg;base64,").unwrap();
        let decoded = image::load_from_memory(&STANDARD.decode(encoded).unwrap()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, PREVIEW_HEIGHT));
    }

    #[test]
    fn small_images_are_scaled_up() {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(10, 20));
        let thumb = thumbnail(&image).unwrap();
        assert_eq!((thumb.width, thumb.height), (50, PREVIEW_HEIGHT));
    }

    #[test]
    fn unreadable_file_is_an_error() {
        assert!(build(Path::new("/definitely/not/here.png")).is_err());
    }
}
