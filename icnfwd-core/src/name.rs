use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hierarchical content name: an ordered sequence of opaque byte components.
///
/// Names compare by exact byte equality, component by component. The empty
/// name (zero components) is valid; it addresses the default route in the
/// FIB and prints as `/`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Name {
    pub components: Vec<Vec<u8>>,
}

impl Name {
    /// Create a new empty name
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Parse a name from a URI-style path (e.g., "/video/segment1").
    ///
    /// Empty path segments are skipped, so "/a//b" parses as "/a/b".
    pub fn from_uri(uri: &str) -> Result<Self, NameParseError> {
        if uri.is_empty() || uri == "/" {
            return Ok(Self::new());
        }
        if !uri.starts_with('/') {
            return Err(NameParseError::MissingLeadingSlash);
        }

        let mut name = Self::new();
        for component in uri[1..].split('/') {
            if !component.is_empty() {
                name.components.push(component.as_bytes().to_vec());
            }
        }
        Ok(name)
    }

    /// Append a component to the name
    pub fn append(&mut self, component: Vec<u8>) -> &mut Self {
        self.components.push(component);
        self
    }

    /// Append a string component to the name
    pub fn append_str(&mut self, component: &str) -> &mut Self {
        self.components.push(component.as_bytes().to_vec());
        self
    }

    /// Get a component by index
    pub fn component(&self, index: usize) -> Option<&[u8]> {
        self.components.get(index).map(|c| c.as_slice())
    }

    /// Number of components in the name
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Return the name formed by the first `length` components.
    pub fn prefix(&self, length: usize) -> Name {
        let end = std::cmp::min(length, self.components.len());
        Self {
            components: self.components[..end].to_vec(),
        }
    }

    /// True when every component of `self` matches the leading components
    /// of `other`. The empty name is a prefix of every name.
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        if self.components.len() > other.components.len() {
            return false;
        }
        self.components
            .iter()
            .zip(other.components.iter())
            .all(|(a, b)| a == b)
    }

    /// Render the name as a URI-style path. Components that are not valid
    /// UTF-8 are printed lossily; this form is for logs and diagnostics,
    /// not a wire format.
    pub fn to_uri(&self) -> String {
        if self.components.is_empty() {
            return "/".to_string();
        }

        let mut uri = String::new();
        for component in &self.components {
            uri.push('/');
            uri.push_str(&String::from_utf8_lossy(component));
        }
        uri
    }
}

impl Default for Name {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for Name {
    type Err = NameParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_uri(s)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameParseError {
    #[error("name must start with '/'")]
    MissingLeadingSlash,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_parse() {
        let name = Name::from_uri("/hello/world/test").unwrap();
        assert_eq!(name.component_count(), 3);
        assert_eq!(name.component(0).unwrap(), b"hello");
        assert_eq!(name.component(1).unwrap(), b"world");
        assert_eq!(name.component(2).unwrap(), b"test");
    }

    #[test]
    fn test_name_to_uri() {
        let name = Name::from_uri("/hello/world/test").unwrap();
        assert_eq!(name.to_uri(), "/hello/world/test");
        assert_eq!(name.to_string(), "/hello/world/test");
    }

    #[test]
    fn test_name_prefix() {
        let name = Name::from_uri("/hello/world/test").unwrap();
        let prefix = name.prefix(2);
        assert_eq!(prefix.component_count(), 2);
        assert_eq!(prefix.to_uri(), "/hello/world");
    }

    #[test]
    fn test_is_prefix_of() {
        let prefix = Name::from_uri("/hello/world").unwrap();
        let name = Name::from_uri("/hello/world/test").unwrap();
        let other = Name::from_uri("/hello/mars/test").unwrap();
        assert!(prefix.is_prefix_of(&name));
        assert!(prefix.is_prefix_of(&prefix));
        assert!(!prefix.is_prefix_of(&other));
        assert!(Name::new().is_prefix_of(&name));
        assert!(!name.is_prefix_of(&prefix));
    }

    #[test]
    fn test_empty_name() {
        let name = Name::from_uri("").unwrap();
        assert!(name.is_empty());
        assert_eq!(name.to_uri(), "/");
        let root = Name::from_uri("/").unwrap();
        assert_eq!(name, root);
    }

    #[test]
    fn test_missing_leading_slash() {
        assert_eq!(
            Name::from_uri("hello/world"),
            Err(NameParseError::MissingLeadingSlash)
        );
    }

    #[test]
    fn test_append() {
        let mut name = Name::from_uri("/a").unwrap();
        name.append_str("b").append(vec![0xff, 0x00]);
        assert_eq!(name.component_count(), 3);
        assert_eq!(name.component(2).unwrap(), &[0xff, 0x00]);
    }

    #[test]
    fn test_skips_empty_segments() {
        let name = Name::from_uri("/a//b/").unwrap();
        assert_eq!(name.to_uri(), "/a/b");
    }

    #[test]
    fn test_byte_equality() {
        let a = Name::from_uri("/cam/front").unwrap();
        let b = Name::from_uri("/cam/front").unwrap();
        let c = Name::from_uri("/cam/Front").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
