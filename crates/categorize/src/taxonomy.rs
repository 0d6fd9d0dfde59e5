//! Category taxonomy: tree nodes, path↔id maps and the TTL cache that
//! amortizes rebuilding them from storage.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// One taxonomy tree node as stored. Roots have no parent.
#[derive(Debug, Clone)]
pub struct CategoryNode {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
}

/// The seeded taxonomy. Every prefix of every path is its own category.
pub const CATEGORY_PATHS: &[&[&str]] = &[
    &["покупки"],
    &["покупки", "продукти"],
    &["покупки", "продукти", "овочі"],
    &["покупки", "продукти", "фрукти"],
    &["покупки", "продукти", "молочні"],
    &["покупки", "продукти", "м'ясо та риба"],
    &["покупки", "продукти", "хліб"],
    &["покупки", "продукти", "консерви"],
    &["покупки", "продукти", "солодощі"],
    &["покупки", "продукти", "солодощі", "шоколад"],
    &["покупки", "продукти", "солодощі", "цукерки"],
    &["покупки", "продукти", "солодощі", "печиво"],
    &["покупки", "снеки"],
    &["покупки", "снеки", "чіпси"],
    &["покупки", "напої"],
    &["покупки", "напої", "вода"],
    &["покупки", "напої", "сік"],
    &["покупки", "алкоголь"],
    &["покупки", "алкоголь", "пиво"],
    &["покупки", "алкоголь", "вино"],
    &["покупки", "побут"],
    &["покупки", "побут", "пакети"],
    &["покупки", "побут", "серветки"],
    &["покупки", "інші"],
    &["покупки", "інші", "інші"],
];

// Parent-pointer walks stop after this many hops. A malformed tree with a
// cycle yields a truncated path instead of a hang.
const MAX_PATH_DEPTH: usize = 50;

const PATH_SEP: char = '\u{1f}';

fn path_key<'a, I: IntoIterator<Item = &'a str>>(path: I) -> String {
    let mut out = String::new();
    for (i, seg) in path.into_iter().enumerate() {
        if i > 0 {
            out.push(PATH_SEP);
        }
        out.push_str(seg);
    }
    out
}

/// Bidirectional path↔id mapping derived from the node table.
#[derive(Debug, Default, Clone)]
pub struct PathMaps {
    path_to_id: HashMap<String, i64>,
    id_to_path: HashMap<i64, Vec<String>>,
}

impl PathMaps {
    /// Build both maps by walking parent pointers from every node.
    pub fn build(nodes: &[CategoryNode]) -> PathMaps {
        let by_id: HashMap<i64, &CategoryNode> =
            nodes.iter().map(|n| (n.id, n)).collect();

        let mut maps = PathMaps::default();
        for node in nodes {
            let mut path = Vec::new();
            let mut cursor: Option<&CategoryNode> = Some(node);
            let mut guard = 0;
            while let Some(cur) = cursor {
                if guard >= MAX_PATH_DEPTH {
                    break;
                }
                path.push(cur.name.clone());
                guard += 1;
                cursor = cur.parent_id.and_then(|pid| by_id.get(&pid).copied());
            }
            path.reverse();
            maps.path_to_id
                .insert(path_key(path.iter().map(String::as_str)), node.id);
            maps.id_to_path.insert(node.id, path);
        }
        maps
    }

    pub fn id_for(&self, path: &[&str]) -> Option<i64> {
        self.path_to_id.get(&path_key(path.iter().copied())).copied()
    }

    pub fn path_for(&self, id: i64) -> Option<&[String]> {
        self.id_to_path.get(&id).map(Vec::as_slice)
    }
}

/// Wall-clock seam for the TTL cache.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Time-bounded holder for the built [`PathMaps`]. Callers ask for a fresh
/// copy; on a miss they load nodes from storage, build, and store back.
pub struct TaxonomyCache {
    ttl_secs: u64,
    clock: Arc<dyn Clock>,
    state: Mutex<Option<(u64, Arc<PathMaps>)>>,
}

pub const DEFAULT_TAXONOMY_TTL_SECS: u64 = 300;

impl TaxonomyCache {
    pub fn new(ttl_secs: u64, clock: Arc<dyn Clock>) -> TaxonomyCache {
        TaxonomyCache { ttl_secs, clock, state: Mutex::new(None) }
    }

    pub fn with_system_clock() -> TaxonomyCache {
        TaxonomyCache::new(DEFAULT_TAXONOMY_TTL_SECS, Arc::new(SystemClock))
    }

    /// The cached maps, or `None` when absent or older than the TTL.
    pub fn get(&self) -> Option<Arc<PathMaps>> {
        let state = self.state.lock().ok()?;
        let (built_at, maps) = state.as_ref()?;
        let now = self.clock.now_secs();
        if now.saturating_sub(*built_at) < self.ttl_secs {
            Some(Arc::clone(maps))
        } else {
            None
        }
    }

    /// Store freshly built maps, resetting the TTL window.
    pub fn store(&self, maps: PathMaps) -> Arc<PathMaps> {
        let maps = Arc::new(maps);
        if let Ok(mut state) = self.state.lock() {
            *state = Some((self.clock.now_secs(), Arc::clone(&maps)));
        }
        maps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn sample_nodes() -> Vec<CategoryNode> {
        vec![
            CategoryNode { id: 1, parent_id: None, name: "покупки".into() },
            CategoryNode { id: 2, parent_id: Some(1), name: "алкоголь".into() },
            CategoryNode { id: 3, parent_id: Some(2), name: "пиво".into() },
        ]
    }

    #[test]
    fn maps_resolve_both_directions() {
        let maps = PathMaps::build(&sample_nodes());
        assert_eq!(maps.id_for(&["покупки", "алкоголь", "пиво"]), Some(3));
        assert_eq!(
            maps.path_for(3).unwrap(),
            ["покупки", "алкоголь", "пиво"]
        );
        assert_eq!(maps.id_for(&["покупки", "алкоголь"]), Some(2));
        assert_eq!(maps.id_for(&["немає", "такого"]), None);
    }

    #[test]
    fn cyclic_parents_terminate() {
        let nodes = vec![
            CategoryNode { id: 1, parent_id: Some(2), name: "a".into() },
            CategoryNode { id: 2, parent_id: Some(1), name: "b".into() },
        ];
        let maps = PathMaps::build(&nodes);
        // The walk is truncated, not infinite.
        assert!(maps.path_for(1).unwrap().len() <= 50);
    }

    struct FakeClock(AtomicU64);

    impl Clock for FakeClock {
        fn now_secs(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn cache_expires_after_ttl() {
        let clock = Arc::new(FakeClock(AtomicU64::new(1_000)));
        let cache = TaxonomyCache::new(300, clock.clone());

        assert!(cache.get().is_none());
        cache.store(PathMaps::build(&sample_nodes()));
        assert!(cache.get().is_some());

        clock.0.store(1_299, Ordering::SeqCst);
        assert!(cache.get().is_some());

        clock.0.store(1_300, Ordering::SeqCst);
        assert!(cache.get().is_none());

        // Re-storing resets the window.
        cache.store(PathMaps::build(&sample_nodes()));
        assert!(cache.get().is_some());
    }
}
