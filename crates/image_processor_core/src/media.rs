pub const VIDEO_EXTENSIONS: [&str; 6] = [".mp4", ".mov", ".avi", ".mkv", ".webm", ".wmv"];

pub const DEFAULT_JPEG_QUALITY: u8 = 75;
pub const TIFF_JPEG_QUALITY: u8 = 95;

const JPG_RENAME_SUFFIX: &str = "_lower_case.jpg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Tiff,
    Heic,
    Jpg,
    Jpeg,
    Png,
    Bmp,
    Unsupported(String),
}

impl MediaKind {
    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionTarget {
    pub key: String,
    pub quality: u8,
}

pub fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Everything before the final `/`, or an empty string at the bucket root.
pub fn parent_folder(key: &str) -> &str {
    key.rfind('/').map(|index| &key[..index]).unwrap_or("")
}

pub fn join_key(folder: &str, name: &str) -> String {
    if folder.is_empty() {
        name.to_string()
    } else if folder.ends_with('/') {
        format!("{folder}{name}")
    } else {
        format!("{folder}/{name}")
    }
}

/// Splits a file name into stem and extension (with its dot). Leading dots
/// belong to the stem, so `.hidden` has no extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    let body_start = name.len() - name.trim_start_matches('.').len();
    match name[body_start..].rfind('.') {
        Some(index) => name.split_at(body_start + index),
        None => (name, ""),
    }
}

pub fn extension_of(key: &str) -> String {
    split_extension(file_name(key)).1.to_ascii_lowercase()
}

pub fn classify_key(key: &str) -> MediaKind {
    let extension = extension_of(key);
    if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
        return MediaKind::Video;
    }
    match extension.as_str() {
        ".tif" | ".tiff" => MediaKind::Tiff,
        ".heic" => MediaKind::Heic,
        ".jpg" => MediaKind::Jpg,
        ".jpeg" => MediaKind::Jpeg,
        ".png" => MediaKind::Png,
        ".bmp" => MediaKind::Bmp,
        _ => MediaKind::Unsupported(extension),
    }
}

/// Key and quality the converted JPEG is stored under, next to the source.
pub fn conversion_target(key: &str) -> Option<ConversionTarget> {
    let (stem, _) = split_extension(file_name(key));
    let folder = parent_folder(key);
    let (name, quality) = match classify_key(key) {
        MediaKind::Video | MediaKind::Unsupported(_) => return None,
        MediaKind::Jpg => (format!("{stem}{JPG_RENAME_SUFFIX}"), DEFAULT_JPEG_QUALITY),
        MediaKind::Tiff => (format!("{stem}.jpg"), TIFF_JPEG_QUALITY),
        MediaKind::Heic | MediaKind::Jpeg | MediaKind::Png | MediaKind::Bmp => {
            (format!("{stem}.jpg"), DEFAULT_JPEG_QUALITY)
        }
    };
    Some(ConversionTarget {
        key: join_key(folder, &name),
        quality,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_lowercased_extension() {
        assert_eq!(classify_key("Trips/Paris/clip.MOV"), MediaKind::Video);
        assert_eq!(classify_key("Trips/Paris/scan.TIF"), MediaKind::Tiff);
        assert_eq!(classify_key("Trips/Paris/phone.HEIC"), MediaKind::Heic);
        assert_eq!(classify_key("a.jpeg"), MediaKind::Jpeg);
        assert_eq!(
            classify_key("notes.txt"),
            MediaKind::Unsupported(".txt".to_string())
        );
        assert_eq!(
            classify_key("Trips/.hidden"),
            MediaKind::Unsupported(String::new())
        );
    }

    #[test]
    fn splits_extension_like_a_path() {
        assert_eq!(split_extension("img.tar.png"), ("img.tar", ".png"));
        assert_eq!(split_extension(".hidden"), (".hidden", ""));
        assert_eq!(split_extension("..x.png"), ("..x", ".png"));
        assert_eq!(split_extension("plain"), ("plain", ""));
    }

    #[test]
    fn conversion_targets_follow_source_format() {
        assert_eq!(
            conversion_target("Trips/Paris/IMG_1.JPG"),
            Some(ConversionTarget {
                key: "Trips/Paris/IMG_1_lower_case.jpg".to_string(),
                quality: DEFAULT_JPEG_QUALITY,
            })
        );
        assert_eq!(
            conversion_target("Trips/scan.tiff"),
            Some(ConversionTarget {
                key: "Trips/scan.jpg".to_string(),
                quality: TIFF_JPEG_QUALITY,
            })
        );
        assert_eq!(
            conversion_target("root.png").map(|target| target.key),
            Some("root.jpg".to_string())
        );
        assert_eq!(conversion_target("Trips/clip.mp4"), None);
        assert_eq!(conversion_target("Trips/doc.pdf"), None);
    }

    #[test]
    fn parent_folder_and_join_are_inverse() {
        assert_eq!(parent_folder("a/b/c.jpg"), "a/b");
        assert_eq!(parent_folder("c.jpg"), "");
        assert_eq!(join_key("a/b", "c.jpg"), "a/b/c.jpg");
        assert_eq!(join_key("", "c.jpg"), "c.jpg");
        assert_eq!(join_key("a/", "c.jpg"), "a/c.jpg");
    }
}
