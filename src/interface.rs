//! Interface and method guards for exo objects.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::{ExoError, Result};
use crate::passable::Passable;
use crate::pattern::{assert_pattern, Pattern};

/// Argument and result shapes for one method.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodGuard {
    required: Vec<Pattern>,
    optional: Vec<Pattern>,
    rest: Option<Pattern>,
    returns: Pattern,
}

impl MethodGuard {
    /// A synchronous method taking exactly `args`, returning anything.
    pub fn call<I: IntoIterator<Item = Pattern>>(args: I) -> Self {
        Self {
            required: args.into_iter().collect(),
            optional: Vec::new(),
            rest: None,
            returns: Pattern::Any,
        }
    }

    /// Trailing arguments that may be omitted or passed as undefined.
    pub fn optional<I: IntoIterator<Item = Pattern>>(mut self, args: I) -> Self {
        self.optional = args.into_iter().collect();
        self
    }

    /// Any number of further arguments, each matching `patt`.
    pub fn rest(mut self, patt: Pattern) -> Self {
        self.rest = Some(patt);
        self
    }

    pub fn returns(mut self, patt: Pattern) -> Self {
        self.returns = patt;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.required
            .iter()
            .chain(&self.optional)
            .chain(&self.rest)
            .chain(core::iter::once(&self.returns))
            .try_for_each(assert_pattern)
    }

    fn arity(&self) -> String {
        let min = self.required.len();
        let max = min + self.optional.len();
        match (&self.rest, min == max) {
            (Some(_), _) => format!("at least {min}"),
            (None, true) => min.to_string(),
            (None, false) => format!("{min} to {max}"),
        }
    }

    pub(crate) fn check_args(&self, label: &Rc<str>, method: &str, args: &[Passable]) -> Result<(), ExoError> {
        let min = self.required.len();
        let max = min + self.optional.len();
        if args.len() < min || (self.rest.is_none() && args.len() > max) {
            return Err(ExoError::ArgCount {
                label: label.clone(),
                method: method.to_string(),
                expected: self.arity(),
                got: args.len(),
            });
        }
        for (index, arg) in args.iter().enumerate() {
            let ok = if index < min {
                self.required[index].matches(arg)
            } else if index < max {
                matches!(arg, Passable::Undefined) || self.optional[index - min].matches(arg)
            } else {
                self.rest.as_ref().is_some_and(|p| p.matches(arg))
            };
            if !ok {
                let expected = if index < min {
                    &self.required[index]
                } else if index < max {
                    &self.optional[index - min]
                } else {
                    self.rest.as_ref().unwrap_or(&Pattern::Any)
                };
                return Err(ExoError::ArgMismatch {
                    label: label.clone(),
                    method: method.to_string(),
                    index,
                    expected: expected.to_string(),
                    specimen: arg.to_string(),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn check_return(&self, label: &Rc<str>, method: &str, result: &Passable) -> Result<(), ExoError> {
        if self.returns.matches(result) {
            return Ok(());
        }
        Err(ExoError::ReturnMismatch {
            label: label.clone(),
            method: method.to_string(),
            expected: self.returns.to_string(),
            specimen: result.to_string(),
        })
    }
}

/// Named set of method guards. A sloppy interface lets methods without a
/// guard through unchecked; a strict one refuses to define them.
#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceGuard {
    name: Rc<str>,
    methods: BTreeMap<String, MethodGuard>,
    sloppy: bool,
}

impl InterfaceGuard {
    pub fn new(name: &str) -> Self {
        Self {
            name: Rc::from(name),
            methods: BTreeMap::new(),
            sloppy: false,
        }
    }

    pub fn method(mut self, name: &str, guard: MethodGuard) -> Self {
        self.methods.insert(name.to_string(), guard);
        self
    }

    pub fn sloppy(mut self, sloppy: bool) -> Self {
        self.sloppy = sloppy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_sloppy(&self) -> bool {
        self.sloppy
    }

    pub fn get(&self, method: &str) -> Option<&MethodGuard> {
        self.methods.get(method)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn validate(&self) -> Result<()> {
        self.methods.values().try_for_each(MethodGuard::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label() -> Rc<str> {
        Rc::from("Counter")
    }

    #[test]
    fn required_arguments_are_counted() {
        let g = MethodGuard::call([Pattern::Number]);
        assert!(g.check_args(&label(), "add", &[Passable::from(1)]).is_ok());
        match g.check_args(&label(), "add", &[]) {
            Err(ExoError::ArgCount { expected, got, .. }) => {
                assert_eq!(expected, "1");
                assert_eq!(got, 0);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(g
            .check_args(&label(), "add", &[Passable::from(1), Passable::from(2)])
            .is_err());
    }

    #[test]
    fn optional_arguments_accept_undefined() {
        let g = MethodGuard::call([Pattern::String]).optional([Pattern::Number]);
        let l = label();
        assert!(g.check_args(&l, "m", &[Passable::from("a")]).is_ok());
        assert!(g
            .check_args(&l, "m", &[Passable::from("a"), Passable::Undefined])
            .is_ok());
        assert!(matches!(
            g.check_args(&l, "m", &[Passable::from("a"), Passable::from("b")]),
            Err(ExoError::ArgMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn rest_arguments_are_each_checked() {
        let g = MethodGuard::call([]).rest(Pattern::Number);
        let l = label();
        assert!(g.check_args(&l, "sum", &[]).is_ok());
        assert!(g
            .check_args(&l, "sum", &[Passable::from(1), Passable::from(2), Passable::from(3)])
            .is_ok());
        assert!(g
            .check_args(&l, "sum", &[Passable::from(1), Passable::Null])
            .is_err());
    }

    #[test]
    fn return_shape_is_enforced() {
        let g = MethodGuard::call([]).returns(Pattern::Number);
        assert!(g.check_return(&label(), "get", &Passable::from(1)).is_ok());
        assert!(matches!(
            g.check_return(&label(), "get", &Passable::from("1")),
            Err(ExoError::ReturnMismatch { .. })
        ));
    }

    #[test]
    fn interface_validates_its_guards() {
        let good = InterfaceGuard::new("Good").method("m", MethodGuard::call([Pattern::Key]));
        assert!(good.validate().is_ok());
        let bad = InterfaceGuard::new("Bad").method("m", MethodGuard::call([Pattern::kind("nope")]));
        assert!(bad.validate().is_err());
        assert_eq!(good.method_names().collect::<Vec<_>>(), ["m"]);
    }
}
