use std::collections::HashMap;

use kiroku_api::{EntityId, Identified};

/// Id-keyed store of the latest fetched version of each entity.
///
/// Scoped to one screen: there is no eviction, entries only go away on
/// [`clear`](Self::clear).
#[derive(Debug, Clone)]
pub struct EntityCache<T> {
    entries: HashMap<EntityId, T>,
}

impl<T> Default for EntityCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EntityCache<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Upsert each pair; later values replace earlier ones.
    pub fn merge<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = (EntityId, T)>,
    {
        let items = items.into_iter();
        self.entries.reserve(items.size_hint().0);
        for (id, item) in items {
            self.entries.insert(id, item);
        }
    }

    pub fn merge_entities<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = T>,
        T: Identified,
    {
        self.merge(items.into_iter().map(|item| (item.entity_id().clone(), item)));
    }

    pub fn insert(&mut self, item: T)
    where
        T: Identified,
    {
        self.entries.insert(item.entity_id().clone(), item);
    }

    pub fn get(&self, id: &EntityId) -> Option<&T> {
        self.entries.get(id)
    }

    /// Look up several ids at once. Unknown ids are simply absent.
    pub fn get_many<'a, I>(&self, ids: I) -> HashMap<EntityId, &T>
    where
        I: IntoIterator<Item = &'a EntityId>,
    {
        ids.into_iter()
            .filter_map(|id| self.entries.get(id).map(|item| (id.clone(), item)))
            .collect()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Show {
        id: EntityId,
        title: &'static str,
    }

    impl Identified for Show {
        fn entity_id(&self) -> &EntityId {
            &self.id
        }
    }

    fn show(id: &str, title: &'static str) -> Show {
        Show {
            id: EntityId::new(id),
            title,
        }
    }

    #[test]
    fn test_last_write_wins() {
        let mut cache = EntityCache::new();
        cache.merge([(EntityId::new("A"), "v1")]);
        cache.merge([(EntityId::new("A"), "v2")]);
        assert_eq!(cache.get(&EntityId::new("A")), Some(&"v2"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_duplicate_within_one_merge() {
        let mut cache = EntityCache::new();
        cache.merge_entities(vec![show("1", "old"), show("2", "Mushishi"), show("1", "new")]);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&EntityId::new("1")).unwrap().title, "new");
    }

    #[test]
    fn test_get_many_skips_missing() {
        let mut cache = EntityCache::new();
        cache.merge_entities(vec![show("1", "Frieren"), show("2", "Mushishi")]);

        let ids = [EntityId::new("2"), EntityId::new("404"), EntityId::new("1")];
        let found = cache.get_many(&ids);
        assert_eq!(found.len(), 2);
        assert_eq!(found[&EntityId::new("2")].title, "Mushishi");
        assert!(!found.contains_key(&EntityId::new("404")));
    }

    #[test]
    fn test_clear() {
        let mut cache = EntityCache::new();
        cache.insert(show("1", "Frieren"));
        assert!(cache.contains(&EntityId::new("1")));

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&EntityId::new("1")), None);
    }
}
