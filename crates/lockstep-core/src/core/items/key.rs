use serde::{Deserialize, Serialize};
use std::fmt;

/// Owner of an item. Module-scoped items are cleared when their module is torn down.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Scope {
    Global,
    Module(String),
}

impl Scope {
    pub fn module(name: impl Into<String>) -> Self {
        Scope::Module(name.into())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => write!(f, "<global>"),
            Scope::Module(name) => write!(f, "{}", name),
        }
    }
}

/// Full address of an item. Keys order by scope first, then by name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub scope: Scope,
    pub name: String,
}

impl ItemKey {
    pub fn new(scope: Scope, name: impl Into<String>) -> Self {
        Self {
            scope,
            name: name.into(),
        }
    }

    pub fn global(name: impl Into<String>) -> Self {
        Self::new(Scope::Global, name)
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Scope::Global => write!(f, "{}", self.name),
            Scope::Module(module) => write!(f, "{}//{}", module, self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_order_by_scope_then_name() {
        let mut keys = vec![
            ItemKey::new(Scope::module("rdf"), "a"),
            ItemKey::global("z"),
            ItemKey::new(Scope::module("energy"), "b"),
            ItemKey::global("a"),
        ];
        keys.sort();
        let rendered: Vec<_> = keys.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["a", "z", "energy//b", "rdf//a"]);
    }
}
