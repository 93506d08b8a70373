//! Upload extraction and validation.

use axum::body::Bytes;
use axum::extract::Multipart;
use tracing::{debug, info};

use crate::config::ALLOWED_EXTENSIONS;
use crate::error::{ApiError, NO_FILE_UPLOADED};

/// Multipart field carrying the image.
pub const IMAGE_FIELD: &str = "image";

/// A validated image upload.
#[derive(Debug)]
pub struct Upload {
    /// Filename as declared by the client.
    pub filename: String,
    /// Lowercased extension, guaranteed to be in [`ALLOWED_EXTENSIONS`].
    pub extension: String,
    pub bytes: Bytes,
}

impl Upload {
    /// Name to stage the upload under inside a workspace.
    pub fn staged_name(&self) -> String {
        staged_filename(&self.filename, &self.extension)
    }
}

/// Pull the `image` file field out of a multipart body.
///
/// Rejects before buffering the file when the field is missing, the filename
/// is empty or the extension is not allowed.
pub async fn read_image_field(multipart: &mut Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            debug!(field = ?field.name(), "Skipping multipart field");
            continue;
        }
        // A field without a filename is a plain form value, not a file.
        let Some(filename) = field.file_name().map(str::to_owned) else {
            continue;
        };
        if filename.is_empty() {
            return Err(ApiError::Validation("Empty filename".into()));
        }
        let Some(extension) = allowed_extension(&filename) else {
            return Err(ApiError::UnsupportedMedia("Unsupported file type".into()));
        };

        let bytes = field.bytes().await?;
        info!(filename = %filename, bytes = bytes.len(), "Upload received");
        return Ok(Upload {
            filename,
            extension,
            bytes,
        });
    }
    Err(ApiError::Validation(NO_FILE_UPLOADED.into()))
}

/// Lowercased extension of `filename` if it is in the allow-list.
pub fn allowed_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Reduce a client-supplied filename to a safe ASCII basename.
///
/// Path separators become spaces, non-ASCII characters are dropped,
/// whitespace runs collapse to `_`, anything outside `[A-Za-z0-9_.-]` is
/// removed and leading/trailing `.`/`_` are stripped.
pub fn secure_filename(name: &str) -> String {
    let spaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .filter(char::is_ascii)
        .collect();
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Sanitized filename that still ends in `.{extension}`, falling back to
/// `upload.{extension}` when sanitizing destroys the stem or extension.
pub fn staged_filename(original: &str, extension: &str) -> String {
    let safe = secure_filename(original);
    match safe.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.eq_ignore_ascii_case(extension) => safe,
        _ => format!("upload.{extension}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_is_case_insensitive_and_uses_last_suffix() {
        assert_eq!(allowed_extension("cat.PNG").as_deref(), Some("png"));
        assert_eq!(allowed_extension("archive.tar.jpeg").as_deref(), Some("jpeg"));
        assert_eq!(allowed_extension("photo.webp").as_deref(), Some("webp"));
        assert_eq!(allowed_extension("cat.txt"), None);
        assert_eq!(allowed_extension("png"), None);
        assert_eq!(allowed_extension("cat.png.exe"), None);
    }

    #[test]
    fn secure_filename_strips_paths_and_odd_characters() {
        assert_eq!(secure_filename("My cool movie.mov"), "My_cool_movie.mov");
        assert_eq!(secure_filename("../../../etc/passwd"), "etc_passwd");
        assert_eq!(secure_filename("C:\\Users\\me\\cat.png"), "C_Users_me_cat.png");
        assert_eq!(secure_filename("i contain cool \u{fc}ml\u{e4}uts.txt"), "i_contain_cool_mluts.txt");
        assert_eq!(secure_filename("..hidden.png"), "hidden.png");
    }

    #[test]
    fn staged_filename_keeps_a_usable_extension() {
        assert_eq!(staged_filename("cat.png", "png"), "cat.png");
        assert_eq!(staged_filename("../cat.PNG", "png"), "cat.PNG");
        assert_eq!(staged_filename("\u{732b}.png", "png"), "upload.png");
        assert_eq!(staged_filename(".png", "png"), "upload.png");
    }
}
