// Dependency injection scopes
//
// A `Scope` is a string-keyed service locator with an optional parent. The
// application owns one root scope; every request gets a child of it, so
// request-lifetime instances never leak between requests.

use crate::Error;
use crate::logging::{debug, trace};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier a service is bound under
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(Cow<'static, str>);

impl ServiceId {
    pub const fn new(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Identifier built at runtime
    pub fn owned(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// Identifier derived from a type's name
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(Cow::Borrowed(std::any::type_name::<T>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ServiceId {
    fn from(name: &'static str) -> Self {
        Self::new(name)
    }
}

/// Well-known identifiers used by the dispatcher
pub mod ids {
    use super::ServiceId;

    /// Every controller is bound under this id, named by controller name
    pub const CONTROLLER: ServiceId = ServiceId::new("Controller");
    pub const AUTH_PROVIDER: ServiceId = ServiceId::new("AuthProvider");
    /// The current request's context
    pub const HTTP_CONTEXT: ServiceId = ServiceId::new("HttpContext");
}

/// How long a resolved instance lives
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifetime {
    /// A new instance for every resolution
    Transient,
    /// One instance per resolving scope (per request)
    Request,
    /// One instance for the binding's whole life
    Singleton,
}

type Instance = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn(&Scope) -> Result<Instance, Error> + Send + Sync>;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
struct Binding {
    serial: u64,
    name: Option<String>,
    lifetime: Lifetime,
    type_name: &'static str,
    factory: Factory,
    singleton: Arc<Mutex<Option<Instance>>>,
}

struct ScopeInner {
    parent: Option<Scope>,
    bindings: RwLock<HashMap<ServiceId, Vec<Binding>>>,
    request_cache: Mutex<HashMap<u64, Instance>>,
}

/// Cheap-clone handle to a dependency scope
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// Create a root scope
    pub fn new() -> Self {
        debug!("Creating new DI scope");
        Self::with_parent(None)
    }

    fn with_parent(parent: Option<Scope>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                parent,
                bindings: RwLock::new(HashMap::new()),
                request_cache: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Derive an isolated child scope.
    ///
    /// The child sees every binding of its ancestors; its own bindings shadow
    /// theirs and are invisible to them.
    pub fn create_child(&self) -> Scope {
        trace!("Creating child DI scope");
        Self::with_parent(Some(self.clone()))
    }

    pub fn parent(&self) -> Option<&Scope> {
        self.inner.parent.as_ref()
    }

    /// Start a binding for `id`
    pub fn bind<T: Send + Sync + 'static>(&self, id: impl Into<ServiceId>) -> BindingBuilder<'_, T> {
        BindingBuilder {
            scope: self,
            id: id.into(),
            name: None,
            lifetime: Lifetime::Transient,
            _marker: PhantomData,
        }
    }

    /// Drop this scope's bindings for `id` and start a new one
    pub fn rebind<T: Send + Sync + 'static>(
        &self,
        id: impl Into<ServiceId>,
    ) -> BindingBuilder<'_, T> {
        let id = id.into();
        if self.inner.bindings.write().remove(&id).is_some() {
            trace!(service = %id, "Removed previous bindings for rebind");
        }
        self.bind(id)
    }

    /// Remove this scope's bindings for `id`
    pub fn unbind(&self, id: &ServiceId) -> Result<(), Error> {
        match self.inner.bindings.write().remove(id) {
            Some(removed) => {
                debug!(service = %id, count = removed.len(), "Service unbound");
                Ok(())
            }
            None => Err(Error::ProviderNotFound(format!(
                "Could not unbind serviceIdentifier: {}",
                id
            ))),
        }
    }

    /// Whether any unnamed or named binding exists for `id` here or in an ancestor
    pub fn is_bound(&self, id: &ServiceId) -> bool {
        self.find_scope(|bindings| bindings.contains_key(id)).is_some()
    }

    /// Whether a binding with the given name exists for `id` here or in an ancestor
    pub fn is_bound_named(&self, id: &ServiceId, name: &str) -> bool {
        self.find_scope(|bindings| {
            bindings
                .get(id)
                .is_some_and(|list| list.iter().any(|b| b.name.as_deref() == Some(name)))
        })
        .is_some()
    }

    /// Resolve the unnamed binding for `id`
    pub fn resolve<T: Clone + Send + Sync + 'static>(&self, id: &ServiceId) -> Result<T, Error> {
        let binding = self.lookup(id, None)?;
        self.instantiate(id, &binding)
    }

    /// Resolve the binding for `id` carrying the given name
    pub fn resolve_named<T: Clone + Send + Sync + 'static>(
        &self,
        id: &ServiceId,
        name: &str,
    ) -> Result<T, Error> {
        let binding = self.lookup(id, Some(name))?;
        self.instantiate(id, &binding)
    }

    /// Resolve every binding for `id` in the nearest scope holding any
    pub fn resolve_all<T: Clone + Send + Sync + 'static>(
        &self,
        id: &ServiceId,
    ) -> Result<Vec<T>, Error> {
        let bindings = self
            .find_map(|bindings| bindings.get(id).cloned())
            .unwrap_or_default();

        bindings
            .iter()
            .map(|binding| self.instantiate(id, binding))
            .collect()
    }

    /// Number of bindings held by this scope itself
    pub fn binding_count(&self) -> usize {
        self.inner.bindings.read().values().map(Vec::len).sum()
    }

    /// Drop every request-lifetime instance cached in this scope
    pub fn release(&self) {
        let released = std::mem::take(&mut *self.inner.request_cache.lock());
        if !released.is_empty() {
            trace!(count = released.len(), "Released request-lifetime instances");
        }
    }

    fn insert(&self, id: ServiceId, binding: Binding) {
        debug!(
            service = %id,
            name = binding.name.as_deref().unwrap_or(""),
            lifetime = ?binding.lifetime,
            provider = binding.type_name,
            "Service bound"
        );
        self.inner
            .bindings
            .write()
            .entry(id)
            .or_default()
            .push(binding);
    }

    fn find_scope(
        &self,
        mut test: impl FnMut(&HashMap<ServiceId, Vec<Binding>>) -> bool,
    ) -> Option<Scope> {
        let mut current = Some(self);
        while let Some(scope) = current {
            if test(&*scope.inner.bindings.read()) {
                return Some(scope.clone());
            }
            current = scope.parent();
        }
        None
    }

    fn find_map<R>(
        &self,
        mut f: impl FnMut(&HashMap<ServiceId, Vec<Binding>>) -> Option<R>,
    ) -> Option<R> {
        let mut current = Some(self);
        while let Some(scope) = current {
            if let Some(found) = f(&*scope.inner.bindings.read()) {
                return Some(found);
            }
            current = scope.parent();
        }
        None
    }

    fn lookup(&self, id: &ServiceId, name: Option<&str>) -> Result<Binding, Error> {
        trace!(service = %id, name = name.unwrap_or(""), "Looking up binding");

        let candidates = self.find_map(|bindings| {
            let matching: Vec<Binding> = bindings
                .get(id)?
                .iter()
                .filter(|binding| binding.name.as_deref() == name)
                .cloned()
                .collect();
            (!matching.is_empty()).then_some(matching)
        });

        match candidates {
            None => Err(Error::ProviderNotFound(match name {
                Some(name) => format!("No matching bindings found for serviceIdentifier: {} named {}", id, name),
                None => format!("No matching bindings found for serviceIdentifier: {}", id),
            })),
            Some(mut matching) if matching.len() == 1 => Ok(matching.remove(0)),
            Some(matching) => Err(Error::DependencyInjection(format!(
                "Ambiguous match found for serviceIdentifier: {} ({} bindings)",
                id,
                matching.len()
            ))),
        }
    }

    fn instantiate<T: Clone + Send + Sync + 'static>(
        &self,
        id: &ServiceId,
        binding: &Binding,
    ) -> Result<T, Error> {
        let instance = match binding.lifetime {
            Lifetime::Transient => (binding.factory)(self)?,
            Lifetime::Singleton => {
                let cached = binding.singleton.lock().clone();
                match cached {
                    Some(instance) => instance,
                    None => {
                        let created = (binding.factory)(self)?;
                        binding
                            .singleton
                            .lock()
                            .get_or_insert(created)
                            .clone()
                    }
                }
            }
            Lifetime::Request => {
                let cached = self.inner.request_cache.lock().get(&binding.serial).cloned();
                match cached {
                    Some(instance) => instance,
                    None => {
                        let created = (binding.factory)(self)?;
                        self.inner
                            .request_cache
                            .lock()
                            .entry(binding.serial)
                            .or_insert(created)
                            .clone()
                    }
                }
            }
        };

        instance.downcast_ref::<T>().cloned().ok_or_else(|| {
            Error::DependencyInjection(format!(
                "{} is bound to {}, not {}",
                id,
                binding.type_name,
                std::any::type_name::<T>()
            ))
        })
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bindings = self.inner.bindings.read();
        let mut ids: Vec<&str> = bindings.keys().map(ServiceId::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("Scope")
            .field("services", &ids)
            .field("has_parent", &self.inner.parent.is_some())
            .finish()
    }
}

/// Fluent binding syntax returned by [`Scope::bind`]
#[must_use = "a binding is only registered by `to_factory` or `to_constant`"]
pub struct BindingBuilder<'a, T> {
    scope: &'a Scope,
    id: ServiceId,
    name: Option<String>,
    lifetime: Lifetime,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: Send + Sync + 'static> BindingBuilder<'a, T> {
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn in_singleton_scope(mut self) -> Self {
        self.lifetime = Lifetime::Singleton;
        self
    }

    pub fn in_request_scope(mut self) -> Self {
        self.lifetime = Lifetime::Request;
        self
    }

    pub fn in_transient_scope(mut self) -> Self {
        self.lifetime = Lifetime::Transient;
        self
    }

    /// Finish the binding with a factory called on the resolving scope
    pub fn to_factory<F>(self, factory: F)
    where
        F: Fn(&Scope) -> Result<T, Error> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |scope| {
            let instance: Instance = Arc::new(factory(scope)?);
            Ok(instance)
        });
        self.finish(factory);
    }

    /// Finish the binding with a fixed value; every resolution gets a clone
    pub fn to_constant(self, value: T)
    where
        T: Clone,
    {
        self.to_factory(move |_| Ok(value.clone()));
    }

    fn finish(self, factory: Factory) {
        let binding = Binding {
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            name: self.name,
            lifetime: self.lifetime,
            type_name: std::any::type_name::<T>(),
            factory,
            singleton: Arc::new(Mutex::new(None)),
        };
        self.scope.insert(self.id, binding);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const GREETER: ServiceId = ServiceId::new("Greeter");

    fn counting_factory(counter: Arc<AtomicUsize>) -> impl Fn(&Scope) -> Result<Arc<usize>, Error> {
        move |_: &Scope| Ok(Arc::new(counter.fetch_add(1, Ordering::SeqCst)))
    }

    #[test]
    fn test_resolve_constant() {
        let scope = Scope::new();
        scope.bind::<String>(GREETER).to_constant("hello".to_string());

        let value: String = scope.resolve(&GREETER).unwrap();
        assert_eq!(value, "hello");
        assert!(scope.is_bound(&GREETER));
    }

    #[test]
    fn test_unbound_is_provider_not_found() {
        let scope = Scope::new();
        let err = scope.resolve::<String>(&GREETER).unwrap_err();
        assert!(matches!(err, Error::ProviderNotFound(_)));
    }

    #[test]
    fn test_wrong_type_is_di_error() {
        let scope = Scope::new();
        scope.bind::<String>(GREETER).to_constant("hello".to_string());

        let err = scope.resolve::<u32>(&GREETER).unwrap_err();
        assert!(matches!(err, Error::DependencyInjection(_)));
    }

    #[test]
    fn test_named_bindings() {
        let scope = Scope::new();
        scope.bind::<u32>(GREETER).named("a").to_constant(1);
        scope.bind::<u32>(GREETER).named("b").to_constant(2);

        assert_eq!(scope.resolve_named::<u32>(&GREETER, "b").unwrap(), 2);
        assert!(scope.is_bound_named(&GREETER, "a"));
        assert!(!scope.is_bound_named(&GREETER, "c"));
        // Unnamed resolution ignores named bindings
        assert!(scope.resolve::<u32>(&GREETER).is_err());
    }

    #[test]
    fn test_ambiguous_unnamed_binding() {
        let scope = Scope::new();
        scope.bind::<u32>(GREETER).to_constant(1);
        scope.bind::<u32>(GREETER).to_constant(2);

        let err = scope.resolve::<u32>(&GREETER).unwrap_err();
        assert!(matches!(err, Error::DependencyInjection(_)));
        assert_eq!(scope.resolve_all::<u32>(&GREETER).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_lifetimes() {
        let scope = Scope::new();
        let counter = Arc::new(AtomicUsize::new(0));

        scope
            .bind::<Arc<usize>>("transient")
            .to_factory(counting_factory(counter.clone()));
        scope
            .bind::<Arc<usize>>("singleton")
            .in_singleton_scope()
            .to_factory(counting_factory(counter.clone()));
        scope
            .bind::<Arc<usize>>("request")
            .in_request_scope()
            .to_factory(counting_factory(counter.clone()));

        let transient = ServiceId::new("transient");
        let a: Arc<usize> = scope.resolve(&transient).unwrap();
        let b: Arc<usize> = scope.resolve(&transient).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));

        let singleton = ServiceId::new("singleton");
        let child = scope.create_child();
        let a: Arc<usize> = scope.resolve(&singleton).unwrap();
        let b: Arc<usize> = child.resolve(&singleton).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let request = ServiceId::new("request");
        let first = scope.create_child();
        let second = scope.create_child();
        let a: Arc<usize> = first.resolve(&request).unwrap();
        let b: Arc<usize> = first.resolve(&request).unwrap();
        let c: Arc<usize> = second.resolve(&request).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_child_shadows_parent() {
        let root = Scope::new();
        root.bind::<u32>(GREETER).to_constant(1);

        let child = root.create_child();
        child.bind::<u32>(GREETER).to_constant(2);

        assert_eq!(child.resolve::<u32>(&GREETER).unwrap(), 2);
        assert_eq!(root.resolve::<u32>(&GREETER).unwrap(), 1);
    }

    #[test]
    fn test_factory_resolves_from_initiating_scope() {
        let root = Scope::new();
        root.bind::<String>("Message")
            .to_factory(|scope| Ok(format!("hello {}", scope.resolve::<String>(&GREETER)?)));

        let child = root.create_child();
        child.bind::<String>(GREETER).to_constant("child".to_string());

        let message: String = child.resolve(&ServiceId::new("Message")).unwrap();
        assert_eq!(message, "hello child");
        assert!(root.resolve::<String>(&ServiceId::new("Message")).is_err());
    }

    #[test]
    fn test_rebind_and_unbind() {
        let scope = Scope::new();
        scope.bind::<u32>(GREETER).to_constant(1);
        scope.rebind::<u32>(GREETER).to_constant(5);
        assert_eq!(scope.resolve::<u32>(&GREETER).unwrap(), 5);
        assert_eq!(scope.binding_count(), 1);

        scope.unbind(&GREETER).unwrap();
        assert!(!scope.is_bound(&GREETER));
        assert!(scope.unbind(&GREETER).is_err());
    }

    #[test]
    fn test_release_clears_request_cache() {
        let scope = Scope::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scope
            .bind::<Arc<usize>>(GREETER)
            .in_request_scope()
            .to_factory(counting_factory(counter));

        let a: Arc<usize> = scope.resolve(&GREETER).unwrap();
        scope.release();
        let b: Arc<usize> = scope.resolve(&GREETER).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
