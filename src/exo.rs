//! Exo objects: remotables whose methods are checked against an
//! `InterfaceGuard` on every call.
//!
//! A class definition is shared by all its instances. Each instance owns
//! its state in a cohort; kits are cohorts with several facets over the
//! same state. All facets of an instance are minted together as sibling
//! remotables: each keeps one identity for the life of the instance, and
//! holding any facet keeps the rest alive. Facets point at the cohort; the
//! cohort never points back.

use core::cell::{Ref, RefCell, RefMut};
use core::fmt;
use std::any::Any;
use std::collections::BTreeMap;
use std::rc::Rc;

use log::{debug, trace};

use crate::error::ExoError;
use crate::interface::InterfaceGuard;
use crate::passable::{Passable, Remotable};

/// Wraps `target` as a remotable with the given interface name.
pub fn far<T: Any>(iface: &str, target: Rc<T>) -> Remotable {
    Remotable::with_target(iface, target)
}

pub type MethodFn<S> = Rc<dyn Fn(&ExoContext<'_, S>, &[Passable]) -> Result<Passable, ExoError>>;
type FinishFn<S> = Rc<dyn Fn(&ExoContext<'_, S>)>;

/// Method bodies by name.
pub struct MethodTable<S> {
    methods: BTreeMap<String, MethodFn<S>>,
}

impl<S> MethodTable<S> {
    pub fn new() -> Self {
        Self {
            methods: BTreeMap::new(),
        }
    }

    pub fn method<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(&ExoContext<'_, S>, &[Passable]) -> Result<Passable, ExoError> + 'static,
    {
        self.methods.insert(name.to_string(), Rc::new(body));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

impl<S> Default for MethodTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ExoClassOptions<S> {
    finish: Option<FinishFn<S>>,
}

impl<S> ExoClassOptions<S> {
    pub fn new() -> Self {
        Self { finish: None }
    }

    /// Runs once per instance, after its state and facets exist.
    pub fn finish<F>(mut self, finish: F) -> Self
    where
        F: Fn(&ExoContext<'_, S>) + 'static,
    {
        self.finish = Some(Rc::new(finish));
        self
    }
}

impl<S> Default for ExoClassOptions<S> {
    fn default() -> Self {
        Self::new()
    }
}

struct Facet<S> {
    name: Rc<str>,
    iface: Rc<str>,
    guard: Rc<InterfaceGuard>,
    methods: MethodTable<S>,
}

struct ClassDef<S> {
    label: Rc<str>,
    facets: Vec<Facet<S>>,
}

struct Cohort<S> {
    def: Rc<ClassDef<S>>,
    state: RefCell<S>,
}

trait Dispatch {
    fn invoke(
        self: Rc<Self>,
        facet: &str,
        this: &Exo,
        method: &str,
        args: &[Passable],
    ) -> Result<Passable, ExoError>;
}

struct FacetTarget {
    cohort: Rc<dyn Dispatch>,
    facet: Rc<str>,
    guard: Rc<InterfaceGuard>,
}

impl<S: 'static> Cohort<S> {
    fn new(def: Rc<ClassDef<S>>, state: S) -> Rc<Self> {
        Rc::new(Self {
            def,
            state: RefCell::new(state),
        })
    }

    /// One handle per facet, in definition order, minted as siblings.
    fn mint_all(self: &Rc<Self>) -> Vec<Exo> {
        let targets: Vec<Rc<FacetTarget>> = self
            .def
            .facets
            .iter()
            .map(|facet| {
                let cohort: Rc<dyn Dispatch> = self.clone();
                Rc::new(FacetTarget {
                    cohort,
                    facet: facet.name.clone(),
                    guard: facet.guard.clone(),
                })
            })
            .collect();
        let faces = self
            .def
            .facets
            .iter()
            .zip(&targets)
            .map(|(facet, target)| (facet.iface.clone(), target.clone() as Rc<dyn Any>));
        Remotable::siblings(faces)
            .into_iter()
            .zip(targets)
            .map(|(far, target)| Exo { far, target })
            .collect()
    }
}

impl<S: 'static> Dispatch for Cohort<S> {
    fn invoke(
        self: Rc<Self>,
        facet: &str,
        this: &Exo,
        method: &str,
        args: &[Passable],
    ) -> Result<Passable, ExoError> {
        let def = self.def.clone();
        let no_such_method = || ExoError::NoSuchMethod {
            label: def.label.clone(),
            method: method.to_string(),
        };
        let facet = def
            .facets
            .iter()
            .find(|f| &*f.name == facet)
            .ok_or_else(no_such_method)?;
        let body = facet.methods.methods.get(method).ok_or_else(no_such_method)?;
        let guard = facet.guard.get(method);
        if let Some(g) = guard {
            g.check_args(&facet.iface, method, args)?;
        }
        trace!("{}.{method} with {} args", facet.iface, args.len());
        let ctx = ExoContext { cohort: &self, this };
        let result = body(&ctx, args)?;
        if let Some(g) = guard {
            g.check_return(&facet.iface, method, &result)?;
        }
        Ok(result)
    }
}

/// What a method body sees: the instance state, the facet it was
/// invoked on, and (for kits) the sibling facets.
///
/// Holding a state borrow while invoking another method on the same
/// instance makes that call fail with `StateBusy`.
pub struct ExoContext<'a, S> {
    cohort: &'a Rc<Cohort<S>>,
    this: &'a Exo,
}

impl<S: 'static> ExoContext<'_, S> {
    /// Fails with `StateBusy` while an outer call on this instance holds
    /// the state mutably.
    pub fn state(&self) -> Result<Ref<'_, S>, ExoError> {
        self.cohort.state.try_borrow().map_err(|_| self.busy())
    }

    /// Fails with `StateBusy` while any outer call on this instance holds
    /// the state.
    pub fn state_mut(&self) -> Result<RefMut<'_, S>, ExoError> {
        self.cohort.state.try_borrow_mut().map_err(|_| self.busy())
    }

    fn busy(&self) -> ExoError {
        ExoError::StateBusy {
            label: self.cohort.def.label.clone(),
        }
    }

    pub fn this(&self) -> &Exo {
        self.this
    }

    /// Another facet of the same kit instance. Always the same handle the
    /// instance was made with, whether or not the caller still holds it.
    pub fn facet(&self, name: &str) -> Option<Exo> {
        let slot = self.cohort.def.facets.iter().position(|f| &*f.name == name)?;
        let far = self.this.far.sibling(slot)?;
        let target = far.target::<FacetTarget>()?;
        Some(Exo { far, target })
    }

    pub fn label(&self) -> &str {
        &self.cohort.def.label
    }
}

/// Handle to an exo instance (or one facet of a kit). Cloning shares the
/// same remotable identity.
#[derive(Clone)]
pub struct Exo {
    far: Remotable,
    target: Rc<FacetTarget>,
}

impl Exo {
    /// Checks the arguments against the method guard, runs the body, then
    /// checks the result.
    pub fn invoke(&self, method: &str, args: &[Passable]) -> Result<Passable, ExoError> {
        Rc::clone(&self.target.cohort).invoke(&self.target.facet, self, method, args)
    }

    pub fn interface(&self) -> &InterfaceGuard {
        &self.target.guard
    }

    pub fn label(&self) -> &str {
        self.far.iface()
    }

    pub fn to_remotable(&self) -> Remotable {
        self.far.clone()
    }

    pub fn from_passable(p: &Passable) -> Option<Exo> {
        let far = p.as_remotable()?;
        let target = far.target::<FacetTarget>()?;
        Some(Exo {
            far: far.clone(),
            target,
        })
    }
}

impl From<Exo> for Passable {
    fn from(exo: Exo) -> Self {
        Passable::Remotable(exo.far)
    }
}

impl PartialEq for Exo {
    fn eq(&self, other: &Self) -> bool {
        self.far == other.far
    }
}

impl Eq for Exo {}

impl fmt::Debug for Exo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exo")
            .field("label", &self.label())
            .field("id", &self.far.id())
            .finish()
    }
}

fn build_facet<S>(
    name: Rc<str>,
    iface: Rc<str>,
    guard: InterfaceGuard,
    methods: MethodTable<S>,
) -> Result<Facet<S>, ExoError> {
    guard.validate()?;
    for method in methods.names() {
        if guard.get(method).is_none() && !guard.is_sloppy() {
            return Err(ExoError::MethodNotGuarded {
                label: iface.clone(),
                interface: guard.name().to_string(),
                method: method.to_string(),
            });
        }
    }
    for method in guard.method_names() {
        if !methods.methods.contains_key(method) {
            return Err(ExoError::MissingMethod {
                label: iface.clone(),
                method: method.to_string(),
            });
        }
    }
    Ok(Facet {
        name,
        iface,
        guard: Rc::new(guard),
        methods,
    })
}

/// Maker for instances of one guarded class.
pub struct ExoClass<S, A> {
    def: Rc<ClassDef<S>>,
    init: Rc<dyn Fn(A) -> S>,
    finish: Option<FinishFn<S>>,
}

pub fn define_exo_class<S, A, I>(
    label: &str,
    guard: InterfaceGuard,
    init: I,
    methods: MethodTable<S>,
    options: ExoClassOptions<S>,
) -> Result<ExoClass<S, A>, ExoError>
where
    S: 'static,
    I: Fn(A) -> S + 'static,
{
    let label: Rc<str> = Rc::from(label);
    let facet = build_facet(Rc::from("self"), label.clone(), guard, methods)?;
    debug!("defined exo class {label:?}");
    Ok(ExoClass {
        def: Rc::new(ClassDef {
            label,
            facets: vec![facet],
        }),
        init: Rc::new(init),
        finish: options.finish,
    })
}

impl<S: 'static, A> ExoClass<S, A> {
    pub fn label(&self) -> &str {
        &self.def.label
    }

    pub fn make(&self, args: A) -> Exo {
        let cohort = Cohort::new(self.def.clone(), (self.init)(args));
        let exo = cohort.mint_all().swap_remove(0);
        if let Some(finish) = &self.finish {
            finish(&ExoContext {
                cohort: &cohort,
                this: &exo,
            });
        }
        exo
    }
}

/// Facets of one kit instance, by name.
#[derive(Clone, Debug)]
pub struct FacetKit {
    facets: BTreeMap<String, Exo>,
}

impl FacetKit {
    pub fn get(&self, name: &str) -> Option<&Exo> {
        self.facets.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Exo)> {
        self.facets.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.facets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facets.is_empty()
    }
}

/// Maker for kits: several facets sharing one state.
pub struct ExoClassKit<S, A> {
    def: Rc<ClassDef<S>>,
    init: Rc<dyn Fn(A) -> S>,
    finish: Option<FinishFn<S>>,
}

pub fn define_exo_class_kit<S, A, I>(
    label: &str,
    guards: BTreeMap<String, InterfaceGuard>,
    init: I,
    methods: BTreeMap<String, MethodTable<S>>,
    options: ExoClassOptions<S>,
) -> Result<ExoClassKit<S, A>, ExoError>
where
    S: 'static,
    I: Fn(A) -> S + 'static,
{
    let label: Rc<str> = Rc::from(label);
    if guards.is_empty() || !guards.keys().eq(methods.keys()) {
        return Err(ExoError::FacetMismatch {
            label,
            guards: guards.into_keys().collect(),
            methods: methods.into_keys().collect(),
        });
    }
    let mut facets = Vec::with_capacity(guards.len());
    for ((name, guard), (_, table)) in guards.into_iter().zip(methods) {
        let iface: Rc<str> = Rc::from(format!("{label} {name}"));
        facets.push(build_facet(Rc::from(name), iface, guard, table)?);
    }
    debug!("defined exo class kit {label:?} with {} facets", facets.len());
    Ok(ExoClassKit {
        def: Rc::new(ClassDef { label, facets }),
        init: Rc::new(init),
        finish: options.finish,
    })
}

impl<S: 'static, A> ExoClassKit<S, A> {
    pub fn label(&self) -> &str {
        &self.def.label
    }

    pub fn make(&self, args: A) -> FacetKit {
        let cohort = Cohort::new(self.def.clone(), (self.init)(args));
        let facets: BTreeMap<String, Exo> = self
            .def
            .facets
            .iter()
            .map(|f| f.name.to_string())
            .zip(cohort.mint_all())
            .collect();
        if let (Some(finish), Some(first)) = (&self.finish, facets.values().next()) {
            finish(&ExoContext {
                cohort: &cohort,
                this: first,
            });
        }
        FacetKit { facets }
    }
}

/// A single stateless guarded object.
pub fn make_exo(
    label: &str,
    guard: InterfaceGuard,
    methods: MethodTable<()>,
    options: ExoClassOptions<()>,
) -> Result<Exo, ExoError> {
    Ok(define_exo_class(label, guard, |()| (), methods, options)?.make(()))
}
