use std::collections::BTreeSet;
use std::fmt;

/// The set of operation names the hub will hand to a worker process.
///
/// Requests for names outside the catalogue are dropped without a reply.
pub trait CommandCatalogue: fmt::Debug + Send + Sync {
    fn contains(&self, name: &str) -> bool;

    fn names(&self) -> Vec<String>;
}

/// Fixed list of operation names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticCatalogue {
    names: BTreeSet<String>,
}

impl StaticCatalogue {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl CommandCatalogue for StaticCatalogue {
    fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    fn names(&self) -> Vec<String> {
        self.names.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_exact() {
        let catalogue = StaticCatalogue::new(["mkdir", "rm"]);
        assert!(catalogue.contains("mkdir"));
        assert!(!catalogue.contains("MKDIR"));
        assert!(!catalogue.contains("rename"));
        assert_eq!(catalogue.names(), vec!["mkdir", "rm"]);
    }
}
