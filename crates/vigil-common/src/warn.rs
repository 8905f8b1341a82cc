// warn.rs -- one-shot warnings for soft capacity limits

use std::collections::HashSet;

use parking_lot::Mutex;

static WARNED: Mutex<Option<HashSet<&'static str>>> = Mutex::new(None);

/// Log `msg` at warn level the first time `key` is seen; later calls
/// with the same key are silent. Capacity pressure is worth one line,
/// not one per frame.
pub fn warn_once(key: &'static str, msg: &str) {
    let mut warned = WARNED.lock();
    let set = warned.get_or_insert_with(HashSet::new);
    if set.insert(key) {
        log::warn!("{}", msg);
    }
}

/// True if `key` has already fired.
pub fn has_warned(key: &'static str) -> bool {
    WARNED
        .lock()
        .as_ref()
        .map(|s| s.contains(key))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warn_once_fires_once() {
        let _ = env_logger::builder().is_test(true).try_init();
        assert!(!has_warned("test-key-a"));
        warn_once("test-key-a", "first");
        assert!(has_warned("test-key-a"));
        // Second call is a no-op; nothing to assert beyond not panicking.
        warn_once("test-key-a", "second");
        assert!(has_warned("test-key-a"));
    }
}
