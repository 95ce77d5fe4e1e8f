//! Cached collections of remote objects.
//!
//! A [`Collection`] holds the latest listing returned by qubesd (a
//! [`Snapshot`]) and the wrapper objects handed out so far. Wrappers live in
//! an arena keyed by a stable internal id; the name index is rebuilt from
//! each wrapper's live name on every refresh, so a renamed wrapper is
//! re-keyed instead of being dropped.
//!
//! Known limitation: qubesd exposes no identity beyond the name. An object
//! that is renamed away and whose old name is reused by a new object of the
//! same class in between two refreshes cannot be told apart from the
//! original; the wrapper is reused as long as its live name and class still
//! match the listing.

use crate::client::AdminClient;
use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Flat `key=value` properties of one listed object.
pub type Properties = BTreeMap<String, String>;

/// Name of the class discriminator property.
pub const CLASS_PROPERTY: &str = "class";

/// A local handle for one remote object.
pub trait Wrapper: Send + Sync + 'static {
    /// Current (live) name of the object.
    fn name(&self) -> String;

    /// Class name the wrapper was built for.
    fn class(&self) -> &str;
}

/// Constructor registered for a class name.
pub type Factory<W> = fn(AdminClient, String) -> W;

/// Closed mapping from class names to wrapper constructors.
pub struct ClassRegistry<W> {
    factories: HashMap<&'static str, Factory<W>>,
}

impl<W> ClassRegistry<W> {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register `factory` for `class`.
    pub fn register(mut self, class: &'static str, factory: Factory<W>) -> Self {
        self.factories.insert(class, factory);
        self
    }

    /// Whether `class` has a constructor.
    pub fn contains(&self, class: &str) -> bool {
        self.factories.contains_key(class)
    }

    /// Look up the constructor for `class`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownClass`] if nothing is registered for `class`.
    pub fn resolve(&self, class: &str) -> Result<Factory<W>> {
        self.factories
            .get(class)
            .copied()
            .ok_or_else(|| Error::UnknownClass(class.to_string()))
    }
}

impl<W> Default for ClassRegistry<W> {
    fn default() -> Self {
        Self::new()
    }
}

/// Parsed listing: object name to its properties.
///
/// Replaced wholesale on refresh, never mutated in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: BTreeMap<String, Properties>,
}

impl Snapshot {
    /// Parse a listing payload.
    ///
    /// One object per line: a name followed by whitespace-separated
    /// `key=value` tokens. A zero-length payload, or one made only of blank
    /// lines, is an empty listing; otherwise the payload must end with `\n`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for non-UTF-8 data, a missing final line
    /// terminator, a token without `=`, or a duplicated name.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| Error::Protocol(format!("listing is not UTF-8: {e}")))?;
        let mut entries = BTreeMap::new();

        if text.trim().is_empty() {
            return Ok(Self { entries });
        }
        if !text.ends_with('\n') {
            return Err(Error::Protocol("listing not terminated by newline".into()));
        }

        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let mut tokens = line.split_whitespace();
            let Some(name) = tokens.next() else {
                continue;
            };
            let mut props = Properties::new();
            for token in tokens {
                let (key, value) = token.split_once('=').ok_or_else(|| {
                    Error::Protocol(format!("malformed property {token:?} in line {line:?}"))
                })?;
                if key.is_empty() {
                    return Err(Error::Protocol(format!(
                        "empty property name in line {line:?}"
                    )));
                }
                props.insert(key.to_string(), value.to_string());
            }
            if entries.insert(name.to_string(), props).is_some() {
                return Err(Error::Protocol(format!("duplicate name {name:?} in listing")));
            }
        }

        Ok(Self { entries })
    }

    /// Whether `name` is listed.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Properties of `name`.
    pub fn get(&self, name: &str) -> Option<&Properties> {
        self.entries.get(name)
    }

    /// Listed names, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of listed objects.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the listing is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Stable identifier of a materialized wrapper within one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct ObjectId(u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Describes how a collection is listed and how its classes resolve.
pub struct CollectionSpec<W> {
    /// Listing method, e.g. `mgmt.vm.List`.
    pub list_method: &'static str,
    /// Class used when a listed object carries no `class` property. `None`
    /// makes the property mandatory.
    pub fixed_class: Option<&'static str>,
    /// Known classes.
    pub registry: ClassRegistry<W>,
}

struct CacheState<W> {
    snapshot: Option<Arc<Snapshot>>,
    objects: HashMap<ObjectId, Arc<W>>,
    index: HashMap<String, ObjectId>,
    next_id: u64,
}

impl<W> Default for CacheState<W> {
    fn default() -> Self {
        Self {
            snapshot: None,
            objects: HashMap::new(),
            index: HashMap::new(),
            next_id: 1,
        }
    }
}

/// Lazily refreshed, name-keyed view of one category of remote objects.
///
/// The cache is `Uncached` until first use; any query populates it with one
/// listing call. It stays `Cached` until [`clear_cache`](Self::clear_cache)
/// or a forced [`refresh`](Self::refresh). All state sits behind a single
/// lock held across the listing call and the reconciliation that follows.
pub struct Collection<W: Wrapper> {
    client: AdminClient,
    spec: CollectionSpec<W>,
    state: Mutex<CacheState<W>>,
}

impl<W: Wrapper> Collection<W> {
    /// Create an uncached collection.
    pub fn new(client: AdminClient, spec: CollectionSpec<W>) -> Self {
        Self {
            client,
            spec,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Listing method of this collection.
    pub fn list_method(&self) -> &'static str {
        self.spec.list_method
    }

    /// Whether a listing is currently cached.
    pub async fn is_cached(&self) -> bool {
        self.state.lock().await.snapshot.is_some()
    }

    /// Drop the cached listing. Materialized wrappers are kept and reconciled
    /// on the next refresh.
    pub async fn clear_cache(&self) {
        tracing::debug!(method = self.spec.list_method, "Clearing collection cache");
        self.state.lock().await.snapshot = None;
    }

    /// Fetch the listing unless one is cached and `force` is false.
    ///
    /// # Errors
    ///
    /// Propagates call errors unchanged; a malformed listing is
    /// [`Error::Protocol`]. On error the previous cache is left untouched.
    pub async fn refresh(&self, force: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        self.refresh_locked(&mut state, force).await.map(|_| ())
    }

    /// Names in the current listing.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let mut state = self.state.lock().await;
        let snapshot = self.refresh_locked(&mut state, false).await?;
        Ok(snapshot.names().map(str::to_string).collect())
    }

    /// Whether `name` is in the current listing.
    pub async fn contains(&self, name: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let snapshot = self.refresh_locked(&mut state, false).await?;
        Ok(snapshot.contains(name))
    }

    /// Listed properties of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `name` is not listed.
    pub async fn properties(&self, name: &str) -> Result<Properties> {
        let mut state = self.state.lock().await;
        let snapshot = self.refresh_locked(&mut state, false).await?;
        snapshot
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Current snapshot, refreshing first if uncached.
    pub async fn snapshot(&self) -> Result<Arc<Snapshot>> {
        let mut state = self.state.lock().await;
        self.refresh_locked(&mut state, false).await
    }

    /// Wrapper for `name`, reusing the existing instance when possible.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `name` is not listed and
    /// [`Error::UnknownClass`] if its class has no constructor.
    pub async fn get(&self, name: &str) -> Result<Arc<W>> {
        let mut state = self.state.lock().await;
        let snapshot = self.refresh_locked(&mut state, false).await?;
        self.materialize(&mut state, &snapshot, name)
    }

    /// Wrappers for every listed object, in name order.
    pub async fn objects(&self) -> Result<Vec<Arc<W>>> {
        let mut state = self.state.lock().await;
        let snapshot = self.refresh_locked(&mut state, false).await?;
        snapshot
            .names()
            .map(|name| self.materialize(&mut state, &snapshot, name))
            .collect()
    }

    async fn refresh_locked(
        &self,
        state: &mut CacheState<W>,
        force: bool,
    ) -> Result<Arc<Snapshot>> {
        if !force {
            if let Some(snapshot) = &state.snapshot {
                return Ok(Arc::clone(snapshot));
            }
        }

        let payload = self
            .client
            .call("dom0", self.spec.list_method, None, None)
            .await?;
        let snapshot = Snapshot::parse(&payload)?;
        self.check_classes(&snapshot)?;
        let snapshot = Arc::new(snapshot);

        state.snapshot = Some(Arc::clone(&snapshot));
        let evicted = reconcile(state, &snapshot, self.spec.fixed_class);
        tracing::debug!(
            method = self.spec.list_method,
            objects = snapshot.len(),
            materialized = state.objects.len(),
            evicted,
            "Collection refreshed"
        );
        Ok(snapshot)
    }

    fn check_classes(&self, snapshot: &Snapshot) -> Result<()> {
        for (name, props) in &snapshot.entries {
            match (props.get(CLASS_PROPERTY), self.spec.fixed_class) {
                (Some(class), Some(fixed)) if class != fixed => {
                    return Err(Error::Protocol(format!(
                        "{name}: class {class:?} in a collection of {fixed}"
                    )));
                }
                (None, None) => {
                    return Err(Error::Protocol(format!("{name}: missing class property")));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn materialize(
        &self,
        state: &mut CacheState<W>,
        snapshot: &Snapshot,
        name: &str,
    ) -> Result<Arc<W>> {
        let props = snapshot
            .get(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        if let Some(object) = state.index.get(name).and_then(|id| state.objects.get(id)) {
            return Ok(Arc::clone(object));
        }

        let class = class_of(props, self.spec.fixed_class)
            .ok_or_else(|| Error::Protocol(format!("{name}: missing class property")))?;
        let factory = self.spec.registry.resolve(class)?;
        let object = Arc::new(factory(self.client.clone(), name.to_string()));

        let id = ObjectId(state.next_id);
        state.next_id += 1;
        state.objects.insert(id, Arc::clone(&object));
        state.index.insert(name.to_string(), id);
        tracing::trace!(name = %name, class = %class, id = %id, "Materialized wrapper");
        Ok(object)
    }
}

fn class_of<'a>(props: &'a Properties, fixed: Option<&'a str>) -> Option<&'a str> {
    props.get(CLASS_PROPERTY).map(String::as_str).or(fixed)
}

/// Evict wrappers whose live name vanished or whose class changed, and rebuild
/// the name index from live names. Returns the number of evicted wrappers.
fn reconcile<W: Wrapper>(
    state: &mut CacheState<W>,
    snapshot: &Snapshot,
    fixed_class: Option<&str>,
) -> usize {
    let mut ids: Vec<ObjectId> = state.objects.keys().copied().collect();
    ids.sort();

    let mut index = HashMap::with_capacity(ids.len());
    let mut evicted = 0;
    for id in ids {
        let Some(object) = state.objects.get(&id) else {
            continue;
        };
        let live = object.name();
        let keep = match snapshot.get(&live).and_then(|p| class_of(p, fixed_class)) {
            None => {
                tracing::debug!(name = %live, "Object no longer listed, evicting");
                false
            }
            Some(class) if class != object.class() => {
                tracing::debug!(
                    name = %live,
                    old_class = %object.class(),
                    new_class = %class,
                    "Object class changed, evicting"
                );
                false
            }
            // Oldest wrapper wins if two claim the same live name.
            Some(_) => !index.contains_key(&live),
        };

        if keep {
            index.insert(live, id);
        } else {
            state.objects.remove(&id);
            evicted += 1;
        }
    }

    state.index = index;
    evicted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockTransport;
    use std::sync::RwLock;

    struct Thing {
        name: RwLock<String>,
        class: &'static str,
    }

    impl Thing {
        fn rename(&self, name: &str) {
            *self.name.write().unwrap() = name.to_string();
        }
    }

    impl Wrapper for Thing {
        fn name(&self) -> String {
            self.name.read().unwrap().clone()
        }

        fn class(&self) -> &str {
            self.class
        }
    }

    fn red(_: AdminClient, name: String) -> Thing {
        Thing {
            name: RwLock::new(name),
            class: "Red",
        }
    }

    fn blue(_: AdminClient, name: String) -> Thing {
        Thing {
            name: RwLock::new(name),
            class: "Blue",
        }
    }

    fn collection(mock: &Arc<MockTransport>) -> Collection<Thing> {
        Collection::new(
            mock.client(),
            CollectionSpec {
                list_method: "test.List",
                fixed_class: None,
                registry: ClassRegistry::new().register("Red", red).register("Blue", blue),
            },
        )
    }

    #[test]
    fn test_parse_listing() {
        let snapshot = Snapshot::parse(b"a class=Red x=1\nb class=Blue y=two=2\n").unwrap();
        assert_eq!(snapshot.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(snapshot.get("a").unwrap()["x"], "1");
        assert_eq!(snapshot.get("b").unwrap()["y"], "two=2");
    }

    #[test]
    fn test_parse_empty_listing() {
        assert!(Snapshot::parse(b"").unwrap().is_empty());
        assert!(Snapshot::parse(b"\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Snapshot::parse(b"a class=Red\nb novalue\n").unwrap_err().is_protocol());
        assert!(Snapshot::parse(b"a class=Red").unwrap_err().is_protocol());
        assert!(Snapshot::parse(b"a =x\n").unwrap_err().is_protocol());
        assert!(Snapshot::parse(b"a k=1\na k=2\n").unwrap_err().is_protocol());
        assert!(Snapshot::parse(&[0xff, b'\n']).unwrap_err().is_protocol());
    }

    #[test]
    fn test_registry_unknown_class() {
        let registry: ClassRegistry<Thing> = ClassRegistry::new().register("Red", red);
        assert!(registry.contains("Red"));
        assert!(matches!(registry.resolve("Green"), Err(Error::UnknownClass(c)) if c == "Green"));
    }

    #[tokio::test]
    async fn test_keys_match_listing() {
        let mock = MockTransport::new();
        mock.ok("test.List", "a class=Red x=1\nb class=Blue\n");
        let things = collection(&mock);

        assert!(!things.is_cached().await);
        assert_eq!(things.keys().await.unwrap(), vec!["a", "b"]);
        assert!(things.is_cached().await);
        assert!(things.contains("a").await.unwrap());
        assert!(!things.contains("c").await.unwrap());
        assert_eq!(things.properties("a").await.unwrap()["x"], "1");
    }

    #[tokio::test]
    async fn test_refresh_is_lazy() {
        let mock = MockTransport::new();
        mock.ok("test.List", "a class=Red\n");
        let things = collection(&mock);

        things.refresh(false).await.unwrap();
        things.refresh(false).await.unwrap();
        let _ = things.keys().await.unwrap();
        assert_eq!(mock.count("test.List"), 1);

        things.refresh(true).await.unwrap();
        assert_eq!(mock.count("test.List"), 2);

        things.clear_cache().await;
        assert!(!things.is_cached().await);
        let _ = things.contains("a").await.unwrap();
        assert_eq!(mock.count("test.List"), 3);
    }

    #[tokio::test]
    async fn test_identity_kept_while_class_unchanged() {
        let mock = MockTransport::new();
        mock.ok("test.List", "a class=Red\n");
        let things = collection(&mock);

        let first = things.get("a").await.unwrap();
        things.refresh(true).await.unwrap();
        let second = things.get("a").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_class_change_evicts() {
        let mock = MockTransport::new();
        mock.ok("test.List", "a class=Red\n");
        mock.ok("test.List", "a class=Blue\n");
        let things = collection(&mock);

        let first = things.get("a").await.unwrap();
        assert_eq!(first.class(), "Red");
        things.refresh(true).await.unwrap();
        let second = things.get("a").await.unwrap();
        assert_eq!(second.class(), "Blue");
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_vanished_object_evicted() {
        let mock = MockTransport::new();
        mock.ok("test.List", "a class=Red\n");
        mock.ok("test.List", "b class=Red\n");
        mock.ok("test.List", "a class=Red\nb class=Red\n");
        let things = collection(&mock);

        let first = things.get("a").await.unwrap();
        things.refresh(true).await.unwrap();
        assert!(matches!(things.get("a").await, Err(Error::NotFound(_))));
        things.refresh(true).await.unwrap();
        let again = things.get("a").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &again));
    }

    #[tokio::test]
    async fn test_rename_rekeys() {
        let mock = MockTransport::new();
        mock.ok("test.List", "old class=Red\n");
        mock.ok("test.List", "new class=Red\n");
        let things = collection(&mock);

        let object = things.get("old").await.unwrap();
        object.rename("new");
        things.refresh(true).await.unwrap();
        let renamed = things.get("new").await.unwrap();
        assert!(Arc::ptr_eq(&object, &renamed));
        assert!(matches!(things.get("old").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_missing_class_is_protocol_error() {
        let mock = MockTransport::new();
        mock.ok("test.List", "a x=1\n");
        let things = collection(&mock);

        assert!(things.keys().await.unwrap_err().is_protocol());
        assert!(!things.is_cached().await);
    }

    #[tokio::test]
    async fn test_unknown_class() {
        let mock = MockTransport::new();
        mock.ok("test.List", "a class=Green\n");
        let things = collection(&mock);

        assert!(things.contains("a").await.unwrap());
        assert!(matches!(things.get("a").await, Err(Error::UnknownClass(_))));
    }

    #[tokio::test]
    async fn test_connection_error_propagates() {
        let mock = MockTransport::new();
        let things = collection(&mock);

        assert!(things.refresh(false).await.unwrap_err().is_connection());
        assert!(!things.is_cached().await);
    }

    #[tokio::test]
    async fn test_objects_in_name_order() {
        let mock = MockTransport::new();
        mock.ok("test.List", "b class=Blue\na class=Red\n");
        let things = collection(&mock);

        let names: Vec<String> = things
            .objects()
            .await
            .unwrap()
            .iter()
            .map(|t| t.name())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_fixed_class_collection() {
        let mock = MockTransport::new();
        mock.ok("test.List", "red\nblue\n");
        let things = Collection::new(
            mock.client(),
            CollectionSpec {
                list_method: "test.List",
                fixed_class: Some("Red"),
                registry: ClassRegistry::new().register("Red", red),
            },
        );

        assert_eq!(things.get("blue").await.unwrap().class(), "Red");
        assert_eq!(things.keys().await.unwrap(), vec!["blue", "red"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_lists_once() {
        let mock = MockTransport::new();
        mock.ok("test.List", "x class=Red
");
        let things = Arc::new(collection(&mock));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let things = Arc::clone(&things);
                tokio::spawn(async move { things.get("x").await })
            })
            .collect();
        let mut fetched = Vec::new();
        for task in tasks {
            fetched.push(task.await.unwrap().unwrap());
        }

        assert_eq!(mock.count(things.list_method()), 1);
        assert!(fetched.iter().all(|thing| Arc::ptr_eq(thing, &fetched[0])));
    }
}
