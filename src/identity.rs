use crate::utils::random_id;
use std::fmt;
use std::sync::Arc;

/// Opaque, process-unique identifier used as the routing key for every
/// signaling message this node sends.
///
/// Generated once when a node starts and shared by reference afterwards;
/// clones are cheap and always compare equal to the original.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(Arc<str>);

impl Identity {
    pub fn generate() -> Self {
        Self(Arc::from(random_id()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Identity {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_identities_differ() {
        assert_ne!(Identity::generate(), Identity::generate());
    }

    #[test]
    fn clone_is_stable() {
        let id = Identity::generate();
        let copy = id.clone();
        assert_eq!(id, copy);
        assert_eq!(id.as_str(), copy.as_str());
    }

    #[test]
    fn orders_lexicographically() {
        assert!(Identity::from("alpha") < Identity::from("beta"));
    }
}
