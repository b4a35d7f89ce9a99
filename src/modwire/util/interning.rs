//! String interning for the resolver vocabulary.
//!
//! Namespaces, package names, and directive values recur across every
//! capability and requirement in a resolve, so each distinct string is
//! stored once for the life of the process and handed out as a `Copy`
//! handle. Interned text is never freed; the vocabulary of a resolve is
//! small and the handles outlive every session.

use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;
use std::sync::Mutex;

lazy_static::lazy_static! {
    static ref POOL: Mutex<HashSet<&'static str>> = Mutex::new(HashSet::new());
}

/// A handle to a string in the process-wide intern pool.
///
/// Equality, ordering, and hashing go by content, so handles behave like
/// the strings they stand for wherever they are used as map keys or sort
/// keys; interning makes the copies free, not the comparisons magic.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InternedString {
    text: &'static str,
}

impl InternedString {
    pub fn new(text: &str) -> InternedString {
        let mut pool = POOL.lock().unwrap();
        if let Some(&interned) = pool.get(text) {
            return InternedString { text: interned };
        }
        let stored: &'static str = Box::leak(text.to_owned().into_boxed_str());
        pool.insert(stored);
        InternedString { text: stored }
    }

    pub fn as_str(&self) -> &'static str {
        self.text
    }
}

impl Deref for InternedString {
    type Target = str;

    fn deref(&self) -> &'static str {
        self.text
    }
}

impl Borrow<str> for InternedString {
    fn borrow(&self) -> &str {
        self.text
    }
}

impl PartialEq<str> for InternedString {
    fn eq(&self, other: &str) -> bool {
        self.text == other
    }
}

impl<'a> PartialEq<&'a str> for InternedString {
    fn eq(&self, other: &&str) -> bool {
        self.text == *other
    }
}

impl fmt::Debug for InternedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.text, f)
    }
}

impl fmt::Display for InternedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.text, f)
    }
}

#[cfg(test)]
mod tests {
    use super::InternedString;

    #[test]
    fn interning_shares_storage() {
        let a = InternedString::new("osgi.wiring.package");
        let b = InternedString::new("osgi.wiring.package");
        assert_eq!(a, b);
        assert!(std::ptr::eq(a.as_str(), b.as_str()));
    }

    #[test]
    fn handles_compare_like_their_text() {
        let alpha = InternedString::new("alpha");
        let beta = InternedString::new("beta");
        assert!(alpha < beta);
        assert_eq!(alpha, "alpha");
        assert_ne!(alpha, "beta");
    }
}
