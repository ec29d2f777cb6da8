use std::path::{Component, Path};

/// Computes the link that leads from one mirrored file to another
///
/// Both paths are relative to the output root. The result uses `/` separators
/// and percent-encodes each segment so it can be placed in an HTML attribute
/// or a CSS `url()`.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use sumi_mirror::mapping::relative_link;
///
/// let from = Path::new("example.org/docs/index.html");
/// let to = Path::new("example.org/css/site.css");
/// assert_eq!(relative_link(from, to), "../css/site.css");
/// ```
pub fn relative_link(from_file: &Path, to_file: &Path) -> String {
    let from_dir = from_file.parent().unwrap_or_else(|| Path::new(""));
    let relative = pathdiff::diff_paths(to_file, from_dir).unwrap_or_else(|| to_file.to_path_buf());

    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => {
                Some(urlencoding::encode(&name.to_string_lossy()).into_owned())
            }
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
