//! Page Slugs

use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::error::{CoreError, Result};
use crate::store::Store;

const SUFFIX_LEN: usize = 6;
const MAX_ATTEMPTS: usize = 8;
const MAX_SLUG_LEN: usize = 64;

/// Lowercase ASCII alphanumerics joined by single hyphens.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }

    if slug.is_empty() { "page".into() } else { slug }
}

/// Whether a caller-supplied slug is already in canonical form
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty() && slug.len() <= MAX_SLUG_LEN && slugify(slug) == slug
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// Resolve the slug for a new or renamed page.
///
/// An explicit slug must be free. Without one, the slug is derived from the
/// title and disambiguated with a random suffix when taken.
pub async fn resolve_slug(store: &dyn Store, explicit: Option<&str>, title: &str) -> Result<String> {
    if let Some(slug) = explicit {
        if !is_valid_slug(slug) {
            return Err(CoreError::Validation(format!(
                "Slug must be lowercase letters, digits and single hyphens: {slug}"
            )));
        }
        if store.slug_exists(slug).await? {
            return Err(CoreError::Conflict(format!("Slug already in use: {slug}")));
        }
        return Ok(slug.to_string());
    }

    let base = slugify(title);
    if !store.slug_exists(&base).await? {
        return Ok(base);
    }

    for _ in 0..MAX_ATTEMPTS {
        let candidate = format!("{base}-{}", random_suffix());
        if !store.slug_exists(&candidate).await? {
            return Ok(candidate);
        }
    }

    Err(CoreError::Conflict(format!(
        "Could not derive a unique slug from: {title}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("My Great Course!"), "my-great-course");
        assert_eq!(slugify("  --Hello__World--  "), "hello-world");
        assert_eq!(slugify("Über 2024"), "ber-2024");
        assert_eq!(slugify("!!!"), "page");
    }

    #[test]
    fn test_slugify_is_deterministic() {
        assert_eq!(slugify("Launch Week"), slugify("Launch Week"));
    }

    #[test]
    fn test_valid_slug() {
        assert!(is_valid_slug("launch-week"));
        assert!(!is_valid_slug("Launch-Week"));
        assert!(!is_valid_slug("launch--week"));
        assert!(!is_valid_slug(""));
    }

    #[test]
    fn test_random_suffix_shape() {
        let suffix = random_suffix();
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
