use std::fmt;
use std::rc::Rc;

use glint_events::NativeEvent;

use crate::engine::Engine;
use crate::error::ScriptResult;
use crate::proxy::ObjectHandle;
use crate::timer::OperationHandle;

type Body = dyn Fn(&mut Engine, Vec<Value>) -> ScriptResult<Vec<Value>>;

/// A script callable
#[derive(Clone)]
pub struct Function {
    name: Rc<str>,
    body: Rc<Body>,
}

impl Function {
    pub fn new<F>(name: impl Into<Rc<str>>, body: F) -> Self
    where
        F: Fn(&mut Engine, Vec<Value>) -> ScriptResult<Vec<Value>> + 'static,
    {
        Self {
            name: name.into(),
            body: Rc::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, engine: &mut Engine, args: Vec<Value>) -> ScriptResult<Vec<Value>> {
        (self.body)(engine, args)
    }

    /// Whether both values refer to the same callable
    pub fn ptr_eq(&self, other: &Function) -> bool {
        Rc::ptr_eq(&self.body, &other.body)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function: {}", self.name)
    }
}

/// A script value
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(Rc<str>),
    Function(Function),
    /// Proxy for a native GUI object
    Object(ObjectHandle),
    /// Handle to a scheduled asynchronous operation
    Operation(OperationHandle),
    /// Event data passed to callbacks
    Event(NativeEvent),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) | Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::Object(_) | Value::Operation(_) | Value::Event(_) => "userdata",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Truthiness: everything except nil and false
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectHandle> {
        match self {
            Value::Object(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_operation(&self) -> Option<&OperationHandle> {
        match self {
            Value::Operation(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_event(&self) -> Option<&NativeEvent> {
        match self {
            Value::Event(e) => Some(e),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

impl From<ObjectHandle> for Value {
    fn from(h: ObjectHandle) -> Self {
        Value::Object(h)
    }
}

impl From<OperationHandle> for Value {
    fn from(h: OperationHandle) -> Self {
        Value::Operation(h)
    }
}

impl From<NativeEvent> for Value {
    fn from(e: NativeEvent) -> Self {
        Value::Event(e)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Function(func) => write!(f, "{:?}", func),
            Value::Object(h) => write!(f, "{}", h),
            Value::Operation(h) => write!(f, "{}", h),
            Value::Event(e) => write!(f, "event: {} on {}", e.category(), e.target()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.truthy());
        assert!(!Value::from(false).truthy());
        assert!(Value::from(0i64).truthy());
        assert!(Value::from("").truthy());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Value::from(3.0).as_integer(), Some(3));
        assert_eq!(Value::from(3.5).as_integer(), None);
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert_eq!(Value::from(7i64).type_name(), "number");
        assert_eq!(Value::Nil.to_string(), "nil");
    }

    #[test]
    fn test_function_identity() {
        let f = Function::new("f", |_, _| Ok(vec![]));
        let g = Function::new("f", |_, _| Ok(vec![]));
        assert!(f.ptr_eq(&f.clone()));
        assert!(!f.ptr_eq(&g));
        assert_eq!(format!("{:?}", f), "function: f");
    }
}
