//! Name normalization for matching local chapters to remote ones.

use rslug::slugify;

/// Strip a leading scanlator tag such as `GroupName_` from a chapter name.
///
/// The tag is only removed when the segment after the first underscore looks
/// like a chapter marker (`ch...` or `prologue`) and the tag itself does not
/// contain the word "chapter".
pub fn strip_scanlator(name: &str) -> &str {
    let Some((group, rest)) = name.split_once('_') else {
        return name;
    };
    let marker = rest.split('_').next().unwrap_or(rest).to_lowercase();
    let looks_like_chapter = marker.starts_with("ch") || marker == "prologue";

    if looks_like_chapter && !group.to_lowercase().contains("chapter") {
        rest
    } else {
        name
    }
}

/// Comparison slug of a name. Underscores count as word separators.
pub fn slugify_name(name: &str) -> String {
    let words = name
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    slugify!(&words)
}

/// Slug of a local chapter pathName, scanlator tag removed.
pub fn chapter_slug(path_name: &str) -> String {
    slugify_name(strip_scanlator(path_name))
}
