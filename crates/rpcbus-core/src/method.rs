use std::fmt;
use std::rc::Rc;

use rpcbus_socket::PeerId;
use rpcbus_value::Value;

use crate::context::BusContext;
use crate::status::Status;

/// Parameter direction marker in a method signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDirection {
    In = 1,
    Out = 2,
}

impl ParamDirection {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::In),
            2 => Some(Self::Out),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

/// Handle for answering one incoming call.
///
/// Pass it to [`BusContext::resolve`] or [`BusContext::reject`], now or
/// from a later callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Responder(pub(crate) u64);

/// One incoming call as seen by a method handler.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub responder: Responder,
    pub peer: PeerId,
    pub object: String,
    pub method: String,
    pub argument: Value,
}

/// Method handler.
///
/// Returning a non-[`Ok`](Status::Ok) status without having answered the
/// call rejects it with that status. Returning `Ok` leaves the call open
/// until the responder is used.
pub type Handler = Rc<dyn Fn(&mut BusContext, &Invocation) -> Status>;

/// A named, invokable method with an introspection signature.
#[derive(Clone)]
pub struct Method {
    name: String,
    signature: Value,
    handler: Handler,
}

impl Method {
    pub fn new(
        name: impl Into<String>,
        handler: impl Fn(&mut BusContext, &Invocation) -> Status + 'static,
    ) -> Self {
        Self::with_signature(name, Value::array(), handler)
    }

    /// Build a method from an existing signature array of
    /// `[direction, name, type]` triples.
    pub fn with_signature(
        name: impl Into<String>,
        signature: Value,
        handler: impl Fn(&mut BusContext, &Invocation) -> Status + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            signature,
            handler: Rc::new(handler),
        }
    }

    /// Declare an input parameter.
    pub fn param(self, name: &str, ty: &str) -> Self {
        self.declare(ParamDirection::In, name, ty)
    }

    /// Declare a return field.
    pub fn returns(self, name: &str, ty: &str) -> Self {
        self.declare(ParamDirection::Out, name, ty)
    }

    fn declare(mut self, direction: ParamDirection, name: &str, ty: &str) -> Self {
        let field = Value::Array(vec![
            Value::Int(direction as i64),
            Value::from(name),
            Value::from(ty),
        ]);
        match &mut self.signature {
            Value::Array(fields) => fields.push(field),
            other => *other = Value::Array(vec![field]),
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Value {
        &self.signature
    }

    pub fn handler(&self) -> Handler {
        Rc::clone(&self.handler)
    }

    /// Signature fields as `(direction, name, type)`, skipping malformed entries.
    pub fn params(&self) -> impl Iterator<Item = (ParamDirection, &str, &str)> {
        self.signature.children().iter().filter_map(signature_field)
    }
}

/// Decode one `[direction, name, type]` signature entry.
pub fn signature_field(field: &Value) -> Option<(ParamDirection, &str, &str)> {
    match field.children() {
        [direction, name, ty] => Some((
            ParamDirection::from_code(direction.as_int()?)?,
            name.as_str()?,
            ty.as_str()?,
        )),
        _ => None,
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}
