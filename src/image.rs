use std::{
    fmt,
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
};

static PREVIEW_SEQ: AtomicU64 = AtomicU64::new(0);

/// An image picked by the user, held in memory until it is sent.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageFile {
    /// File name reported in the multipart part.
    pub name: String,
    /// MIME type guessed from the file extension.
    pub mime: &'static str,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

impl ImageFile {
    /// Wraps in-memory bytes. The MIME type is guessed from `name`.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let mime = mime_from_name(&name);
        Self { name, mime, bytes }
    }

    /// Reads a file from disk. No content validation is done.
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("image")
            .to_string();
        Ok(Self::from_bytes(name, bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn mime_from_name(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

/// Local, non-persistent reference to the selected image, for display only.
///
/// Every call to [`PreviewUrl::for_image`] yields a distinct value, so a
/// front-end can tell a re-selection of the same file from the old one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreviewUrl(String);

impl PreviewUrl {
    pub fn for_image(image: &ImageFile) -> Self {
        let seq = PREVIEW_SEQ.fetch_add(1, Ordering::Relaxed);
        Self(format!("preview:{seq}/{}", image.name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PreviewUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn mime_follows_extension() {
        assert_eq!(ImageFile::from_bytes("a.JPG", vec![]).mime, "image/jpeg");
        assert_eq!(ImageFile::from_bytes("a.png", vec![]).mime, "image/png");
        assert_eq!(
            ImageFile::from_bytes("noext", vec![]).mime,
            "application/octet-stream"
        );
    }

    #[test]
    fn previews_are_distinct() {
        let image = ImageFile::from_bytes("dog.webp", vec![0]);
        let first = PreviewUrl::for_image(&image);
        let second = PreviewUrl::for_image(&image);
        assert_ne!(first, second);
        assert!(first.as_str().ends_with("/dog.webp"));
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cat.png");
        fs::write(&path, [9u8, 8, 7]).unwrap();

        let image = ImageFile::from_path(&path).unwrap();
        assert_eq!(image.bytes, vec![9, 8, 7]);
        assert_eq!(image.mime, "image/png");
        assert_eq!(image.name, "cat.png");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = ImageFile::from_path(dir.path().join("gone.png")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
