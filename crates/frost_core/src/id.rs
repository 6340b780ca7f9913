//! Stable identifiers for render objects

use std::fmt;
use std::sync::Arc;

/// Stable opaque id of a blur region
///
/// Supplied by the UI layer when it attaches a destination surface; usually a
/// UUID string. Cheap to clone.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderObjectId(Arc<str>);

impl RenderObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(Arc::from(id.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RenderObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RenderObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RenderObjectId({})", self.0)
    }
}

impl From<&str> for RenderObjectId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RenderObjectId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_compare_by_content() {
        let a = RenderObjectId::from("toolbar");
        let b = RenderObjectId::new(String::from("toolbar"));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "toolbar");
        assert_ne!(a, RenderObjectId::from("sheet"));
    }
}
