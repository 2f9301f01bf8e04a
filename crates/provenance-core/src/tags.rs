use serde::{Deserialize, Serialize};

pub const CONTENT_TYPE: &str = "Content-Type";
pub const ENCRYPTED_FILE_CONTENT_TYPE: &str = "Encrypted-File-Content-Type";
pub const IRYS_ENCRYPTED: &str = "Irys-Encrypted";

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Metadata attached to an upload. Order is preserved and names may repeat.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// First value recorded under `name`.
pub fn find<'a>(tags: &'a [Tag], name: &str) -> Option<&'a str> {
    tags.iter()
        .find(|t| t.name == name)
        .map(|t| t.value.as_str())
}

/// Tags for a ciphertext whose plaintext had `content_type`.
pub fn encrypted_upload_tags(content_type: &str) -> Vec<Tag> {
    vec![
        Tag::new(CONTENT_TYPE, OCTET_STREAM),
        Tag::new(ENCRYPTED_FILE_CONTENT_TYPE, content_type),
        Tag::new(IRYS_ENCRYPTED, "true"),
    ]
}

pub fn is_encrypted(tags: &[Tag]) -> bool {
    find(tags, IRYS_ENCRYPTED) == Some("true")
}

/// Content type a viewer should use: the original type for encrypted uploads.
pub fn display_content_type(tags: &[Tag]) -> Option<&str> {
    if is_encrypted(tags) {
        find(tags, ENCRYPTED_FILE_CONTENT_TYPE)
    } else {
        find(tags, CONTENT_TYPE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypted_tags_keep_original_type() {
        let tags = encrypted_upload_tags("image/png");
        assert_eq!(tags[0], Tag::new("Content-Type", "application/octet-stream"));
        assert!(is_encrypted(&tags));
        assert_eq!(display_content_type(&tags), Some("image/png"));
    }

    #[test]
    fn find_returns_first_of_repeated_names() {
        let tags = vec![Tag::new("App", "a"), Tag::new("App", "b")];
        assert_eq!(find(&tags, "App"), Some("a"));
        assert_eq!(find(&tags, "Missing"), None);
        assert!(!is_encrypted(&tags));
    }
}
