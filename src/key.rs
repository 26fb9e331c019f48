/// Map every maximal run of non-alphanumeric characters to a single
/// underscore, yielding a string that is safe both as a filename and as
/// an S3 key segment.
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_run = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}

/// Object key for a video: `author/title.mp4`, with the playlist title
/// as an extra path segment for playlist members. The layout is part of
/// the bucket's naming convention and must stay stable.
pub fn storage_key(author: &str, collection: Option<&str>, title: &str) -> String {
    match collection {
        Some(collection) => format!(
            "{}/{}/{}.mp4",
            sanitize(author),
            sanitize(collection),
            sanitize(title)
        ),
        None => format!("{}/{}.mp4", sanitize(author), sanitize(title)),
    }
}
