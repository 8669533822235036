//! Object key generation.
//!
//! Key format: `{uuid}/{sanitized_filename}`. The random component gives
//! concurrent uploads of the same display name distinct keys without any
//! uniqueness enforcement in the object store.

use uuid::Uuid;

const FALLBACK_FILENAME: &str = "file.bin";

/// Replace every character outside `[A-Za-z0-9._-]` with `_`; a blank name
/// becomes `file.bin`.
pub(crate) fn sanitize_filename(name: &str) -> String {
    if name.trim().is_empty() {
        return FALLBACK_FILENAME.to_string();
    }

    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub(crate) fn generate_object_key(original_filename: &str) -> String {
    format!("{}/{}", Uuid::new_v4(), sanitize_filename(original_filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_names_pass_through() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("a-b_c.1.txt"), "a-b_c.1.txt");
    }

    #[test]
    fn unsafe_characters_replaced() {
        assert_eq!(sanitize_filename("my report (v2).pdf"), "my_report__v2_.pdf");
        assert_eq!(sanitize_filename("dir/évil.txt"), "dir__vil.txt");
    }

    #[test]
    fn blank_names_get_a_placeholder() {
        assert_eq!(sanitize_filename(""), "file.bin");
        assert_eq!(sanitize_filename("   "), "file.bin");
    }

    #[test]
    fn key_embeds_a_uuid_and_the_sanitized_name() {
        let key = generate_object_key("report.pdf");
        let (prefix, name) = key.split_once('/').unwrap();
        assert!(prefix.parse::<Uuid>().is_ok());
        assert_eq!(name, "report.pdf");
    }

    #[test]
    fn keys_are_distinct_for_the_same_name() {
        let a = generate_object_key("report.pdf");
        let b = generate_object_key("report.pdf");
        assert_ne!(a, b);
    }
}
