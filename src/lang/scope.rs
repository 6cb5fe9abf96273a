use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::lang::ast::Identifier;
use crate::lang::eval::value::Value;
use crate::lang::functions::FUNCTIONS;

struct Frame {
    variables: HashMap<Identifier, Value>,
    parent: Option<Scope>,
}

/// One link in the chain of lexical scopes
///
/// Scopes are reference counted: a function value keeps its defining scope alive for as long
/// as the function itself is reachable. Children point at their parent, never the reverse.
#[derive(Clone)]
pub struct Scope(Rc<RefCell<Frame>>);

impl Scope {
    fn with_parent(parent: Option<Scope>) -> Self {
        Scope(Rc::new(RefCell::new(Frame {
            variables: HashMap::new(),
            parent,
        })))
    }

    /// Create the outermost scope, holding the built-in functions
    pub fn new_global() -> Self {
        let scope = Self::with_parent(None);
        for func in &*FUNCTIONS {
            scope.insert(Identifier(func.to_string()), Value::Builtin(*func));
        }

        scope
    }

    pub fn child(&self) -> Self {
        Self::with_parent(Some(self.clone()))
    }

    /// Resolve `ident`, walking outwards until some scope binds it
    pub fn get(&self, ident: &Identifier) -> Option<Value> {
        let mut scope = self.clone();
        loop {
            let parent = {
                let frame = scope.0.borrow();
                if let Some(val) = frame.variables.get(ident) {
                    return Some(val.clone());
                }

                frame.parent.clone()
            };

            scope = parent?;
        }
    }

    /// Create or rebind `ident` in this scope only
    pub fn insert(&self, ident: Identifier, val: Value) {
        self.0.borrow_mut().variables.insert(ident, val);
    }

    /// Drop every binding in this scope
    ///
    /// Closures stored in a scope hold the scope itself alive, so a scope has to be emptied
    /// explicitly before the reference cycle can be freed.
    pub fn clear(&self) {
        let variables = std::mem::take(&mut self.0.borrow_mut().variables);
        drop(variables);
    }
}

#[test]
fn test_shadowing() {
    let x = Identifier("x".to_string());
    let global = Scope::new_global();
    global.insert(x.clone(), Value::Integer(1));

    let inner = global.child();
    assert!(matches!(inner.get(&x), Some(Value::Integer(1))));

    inner.insert(x.clone(), Value::Integer(2));
    assert!(matches!(inner.get(&x), Some(Value::Integer(2))));
    assert!(matches!(global.get(&x), Some(Value::Integer(1))));

    assert!(inner.get(&Identifier("y".to_string())).is_none());
}

#[test]
fn test_builtins_bound() {
    let global = Scope::new_global();
    let inner = global.child().child();
    for name in vec!["print", "sum", "range", "str", "len"] {
        assert!(
            matches!(inner.get(&Identifier(name.to_string())), Some(Value::Builtin(_))),
            "{} missing",
            name
        );
    }
}

#[test]
fn test_late_binding() {
    let global = Scope::new_global();
    let inner = global.child();
    let y = Identifier("y".to_string());

    // A child created before the binding exists still sees it
    global.insert(y.clone(), Value::Integer(10));
    assert!(matches!(inner.get(&y), Some(Value::Integer(10))));

    global.clear();
    assert!(inner.get(&y).is_none());
}
