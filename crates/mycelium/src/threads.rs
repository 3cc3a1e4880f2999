//! Names for the threads the crate spawns.

/// Joins `prefix` and a caller-supplied label into a thread name.
///
/// Patch and service names may hold any string, but a thread name must not
/// contain NUL, so those bytes become U+FFFD.
pub(crate) fn thread_name(prefix: &str, label: &str) -> String {
    format!("{prefix}{}", label.replace('\0', "\u{fffd}"))
}
