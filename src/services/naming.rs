//! Naming codec for media object names and paths.
//!
//! Pure and deterministic — no I/O. Every other engine derives names and
//! paths through these functions so the same hotel always maps to the same
//! directories regardless of historical slug formatting drift.

use once_cell::sync::Lazy;
use regex::Regex;

/// Storage tier root for source-fidelity copies.
pub const ORIGINALS_TIER: &str = "originals";
/// Storage tier root for derived, web-optimized renditions.
pub const PUBLIC_TIER: &str = "public";

/// Target width embedded in public rendition names.
pub const PUBLIC_WIDTH: u32 = 1600;
/// Output format of public renditions.
pub const PUBLIC_FORMAT: &str = "webp";

/// One of the two parallel storage roots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    Originals,
    Public,
}

impl Tier {
    pub fn root(self) -> &'static str {
        match self {
            Tier::Originals => ORIGINALS_TIER,
            Tier::Public => PUBLIC_TIER,
        }
    }
}

/// Identifiers recovered from a stored file name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedMedia {
    pub external_id: String,
    /// 1-based position within the hotel's photo set. `None` for legacy
    /// names that never carried one.
    pub sequence: Option<u32>,
}

/// Normalize a raw slug into the canonical directory key.
///
/// Lowercases, collapses every run of non-alphanumeric characters into a
/// single hyphen, and trims leading/trailing hyphens. Idempotent:
/// `normalize_slug(normalize_slug(x)) == normalize_slug(x)`.
pub fn normalize_slug(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('-');
            }
            pending_sep = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Two-digit, zero-padded sequence label, e.g. `7 -> "07"`.
pub fn sequence_label(seq: u32) -> String {
    format!("{:02}", seq)
}

/// Canonical file name in the originals tier:
/// `{slug}_{externalId}_{NN}.{ext}`.
pub fn original_filename(slug: &str, external_id: &str, seq: u32, ext: &str) -> String {
    format!("{}_{}_{}.{}", slug, external_id, sequence_label(seq), ext)
}

/// Canonical file name in the public tier:
/// `{slug}_{externalId}_{NN}_{width}w.{format}`.
pub fn public_filename(slug: &str, external_id: &str, seq: u32, width: u32, format: &str) -> String {
    format!(
        "{}_{}_{}_{}w.{}",
        slug,
        external_id,
        sequence_label(seq),
        width,
        format
    )
}

/// Directory for a hotel within a tier, e.g. `public/aman-tokyo`.
pub fn tier_dir(tier: Tier, slug: &str) -> String {
    format!("{}/{}", tier.root(), slug)
}

/// Full object path in the originals tier.
pub fn original_path(slug: &str, file_name: &str) -> String {
    format!("{}/{}/{}", ORIGINALS_TIER, slug, file_name)
}

/// Full object path in the public tier.
pub fn public_path(slug: &str, file_name: &str) -> String {
    format!("{}/{}/{}", PUBLIC_TIER, slug, file_name)
}

/// Bare file name from an object path.
pub fn file_name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// File extension from a URL or path, lowercased, query string stripped.
/// Defaults to `jpg` when the source carries none.
pub fn extension_of(url: &str) -> String {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    match trimmed.rsplit('/').next().and_then(|name| {
        let (_, ext) = name.rsplit_once('.')?;
        (!ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .then(|| ext.to_ascii_lowercase())
    }) {
        Some(ext) => ext,
        None => "jpg".to_string(),
    }
}

// Oldest layout: `{externalId}-{timestamp}.{ext}`, no sequence.
static LEGACY_TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)-\d{6,}\.\w+$").unwrap());
// Interim layout: `{slug}__{externalId}__{NN}__variant.{ext}`.
static LEGACY_DOUBLE_UNDERSCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^.+?__(\d+)__(\d{1,2})__.+\.\w+$").unwrap());
// Current layout: `{slug}_{externalId}_{NN}[_{width}w].{ext}`.
static CANONICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^.+_(\d+)_(\d{2})(?:_\d+w)?\.\w+$").unwrap());

/// Recover `(external_id, sequence)` from a stored file name.
///
/// Tries each historical naming pattern in order, oldest first where the
/// grammar is unambiguous; the first match wins. Returns `None` when no
/// pattern matches so callers can report the file as unparseable instead
/// of silently dropping it.
pub fn parse_media_filename(name: &str) -> Option<ParsedMedia> {
    if let Some(caps) = LEGACY_TIMESTAMP.captures(name) {
        return Some(ParsedMedia {
            external_id: caps[1].to_string(),
            sequence: None,
        });
    }
    if let Some(caps) = LEGACY_DOUBLE_UNDERSCORE.captures(name) {
        return Some(ParsedMedia {
            external_id: caps[1].to_string(),
            sequence: caps[2].parse().ok(),
        });
    }
    if let Some(caps) = CANONICAL.captures(name) {
        return Some(ParsedMedia {
            external_id: caps[1].to_string(),
            sequence: caps[2].parse().ok(),
        });
    }
    None
}

/// Guess a MIME type from a file name extension.
pub fn content_type_for(name: &str) -> &'static str {
    match name.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_idempotent_and_deterministic() {
        let once = normalize_slug("  Aman   Tokyo / Ōtemachi ");
        assert_eq!(once, normalize_slug(&once));
        assert_eq!(normalize_slug("Aman-Tokyo"), "aman-tokyo");
        assert_eq!(normalize_slug("aman_tokyo"), "aman-tokyo");
        assert_eq!(normalize_slug("--aman--tokyo--"), "aman-tokyo");
    }

    #[test]
    fn builds_canonical_names() {
        assert_eq!(
            original_filename("aman-tokyo", "12345", 1, "jpg"),
            "aman-tokyo_12345_01.jpg"
        );
        assert_eq!(
            public_filename("aman-tokyo", "12345", 3, 1600, "webp"),
            "aman-tokyo_12345_03_1600w.webp"
        );
        assert_eq!(
            original_path("aman-tokyo", "aman-tokyo_12345_01.jpg"),
            "originals/aman-tokyo/aman-tokyo_12345_01.jpg"
        );
        assert_eq!(
            public_path("aman-tokyo", "x.webp"),
            "public/aman-tokyo/x.webp"
        );
    }

    #[test]
    fn round_trips_built_names() {
        for seq in [1u32, 2, 9, 10, 42, 99] {
            let original = original_filename("aman-tokyo", "12345", seq, "jpg");
            let parsed = parse_media_filename(&original).unwrap();
            assert_eq!(parsed.external_id, "12345");
            assert_eq!(parsed.sequence, Some(seq));

            let public = public_filename("aman-tokyo", "12345", seq, 1600, "webp");
            let parsed = parse_media_filename(&public).unwrap();
            assert_eq!(parsed.external_id, "12345");
            assert_eq!(parsed.sequence, Some(seq));
        }
    }

    #[test]
    fn parses_legacy_patterns_in_order() {
        // Oldest: external id + timestamp, no sequence.
        let parsed = parse_media_filename("98765-1577836800123.jpeg").unwrap();
        assert_eq!(parsed.external_id, "98765");
        assert_eq!(parsed.sequence, None);

        // Interim double-underscore layout.
        let parsed = parse_media_filename("aman-tokyo__12345__7__large.webp").unwrap();
        assert_eq!(parsed.external_id, "12345");
        assert_eq!(parsed.sequence, Some(7));

        // Unknown names are reported, not guessed at.
        assert_eq!(parse_media_filename("thumbnail.png"), None);
        assert_eq!(parse_media_filename("IMG 4021.jpg"), None);
    }

    #[test]
    fn extension_handles_queries_and_missing() {
        assert_eq!(extension_of("https://cdn.example.com/a/b.PNG?w=200"), "png");
        assert_eq!(extension_of("https://cdn.example.com/a/photo"), "jpg");
        assert_eq!(extension_of("https://cdn.example.com/a.b/photo.jpeg#f"), "jpeg");
    }

    #[test]
    fn content_types_cover_common_formats() {
        assert_eq!(content_type_for("a_01.jpg"), "image/jpeg");
        assert_eq!(content_type_for("a_01_1600w.webp"), "image/webp");
        assert_eq!(content_type_for("mystery.bin"), "application/octet-stream");
    }
}
