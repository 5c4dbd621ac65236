//! Scope stacks for the four environment chains of the analyzer: user
//! identifiers, injected aliases, `partition` and `*`.

use std::collections::HashMap;

use super::context::Entity;

#[derive(Default)]
pub struct Scopes {
    /// Explicit declarations (generators, binds, function parameters).
    idn: Vec<HashMap<String, Entity>>,

    /// Attributes injected by anonymous generators and `into`; a name may be
    /// injected several times in one scope, which makes it ambiguous.
    alias: Vec<HashMap<String, Vec<Entity>>>,

    /// `partition`, defined on a `select` projection under a group by.
    partition: Vec<Option<Entity>>,

    /// `*`, defined on every `select` projection.
    star: Vec<Option<Entity>>,
}

pub enum Lookup {
    Found(Entity),
    Ambiguous,
    NotFound,
}

impl Scopes {
    pub fn push(&mut self) {
        self.idn.push(HashMap::new());
        self.alias.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        self.idn.pop();
        self.alias.pop();
    }

    /// Declares `name` in the innermost scope. Returns false when the scope
    /// already declares it, in which case both declarations are poisoned.
    pub fn declare(&mut self, name: &str, entity: Entity) -> bool {
        let scope = self.idn.last_mut().expect("no open scope");
        if scope.contains_key(name) {
            scope.insert(name.to_string(), Entity::Multiple);
            false
        } else {
            scope.insert(name.to_string(), entity);
            true
        }
    }

    pub fn declare_alias(&mut self, name: &str, entity: Entity) {
        let scope = self.alias.last_mut().expect("no open scope");
        scope.entry(name.to_string()).or_default().push(entity);
    }

    /// Searches the identifier chain innermost-first, then the alias chain.
    pub fn lookup(&self, name: &str) -> Lookup {
        for scope in self.idn.iter().rev() {
            if let Some(entity) = scope.get(name) {
                return Lookup::Found(entity.clone());
            }
        }
        for scope in self.alias.iter().rev() {
            match scope.get(name).map(|es| es.as_slice()) {
                Some([entity]) => return Lookup::Found(entity.clone()),
                Some([_, ..]) => return Lookup::Ambiguous,
                _ => {}
            }
        }
        Lookup::NotFound
    }

    pub fn push_partition(&mut self, entity: Option<Entity>) {
        self.partition.push(entity);
    }

    pub fn pop_partition(&mut self) {
        self.partition.pop();
    }

    pub fn partition_entity(&self) -> Option<&Entity> {
        self.partition.last().and_then(|e| e.as_ref())
    }

    pub fn push_star(&mut self, entity: Option<Entity>) {
        self.star.push(entity);
    }

    pub fn pop_star(&mut self) {
        self.star.pop();
    }

    pub fn star_entity(&self) -> Option<&Entity> {
        self.star.last().and_then(|e| e.as_ref())
    }
}
