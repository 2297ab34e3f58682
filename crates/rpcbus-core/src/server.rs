//! The system object a bus server exposes to its clients.
//!
//! | Method               | Argument                  | Result                       |
//! |----------------------|---------------------------|------------------------------|
//! | `ubus.server.list`    | anything                  | `[name, methods]*` flat array |
//! | `ubus.server.publish` | `[object, method_table]`  | registered object name       |
//! | `ubus.server.call`    | `[object, method, args]`  | the inner method's result    |
//! | `ubus.server.nick`    | `[name]`                  | null                         |

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use rpcbus_value::Value;
use tracing::debug;

use crate::context::BusContext;
use crate::error::{BusError, Result};
use crate::method::{Invocation, Method};
use crate::object::Object;
use crate::request::Request;
use crate::status::Status;

pub const SERVER_OBJECT: &str = "/ubus/server";
pub const METHOD_LIST: &str = "ubus.server.list";
pub const METHOD_PUBLISH: &str = "ubus.server.publish";
pub const METHOD_CALL: &str = "ubus.server.call";
pub const METHOD_NICK: &str = "ubus.server.nick";

/// Forwarding objects created by `publish`: local name to (owner, object id).
type Published = Rc<RefCell<BTreeMap<String, (String, u32)>>>;

/// Registers the system object on a context.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusServer;

impl BusServer {
    /// Build the `/ubus/server` object.
    pub fn object() -> Result<Object> {
        let published = Published::default();
        Object::new(SERVER_OBJECT)
            .with_method(Method::new(METHOD_LIST, list).returns("objects", "a"))?
            .with_method(
                Method::new(METHOD_PUBLISH, move |ctx: &mut BusContext, inv: &Invocation| {
                    publish(ctx, inv, &published)
                })
                    .param("object", "s")
                    .param("methods", "t")
                    .returns("name", "s"),
            )?
            .with_method(
                Method::new(METHOD_CALL, call)
                    .param("object", "s")
                    .param("method", "s")
                    .param("args", "v"),
            )?
            .with_method(Method::new(METHOD_NICK, nick).param("name", "s"))
    }

    pub fn install(ctx: &mut BusContext) -> Result<()> {
        ctx.add_object(Self::object()?)?;
        Ok(())
    }
}

fn list(ctx: &mut BusContext, inv: &Invocation) -> Status {
    let mut listing = Vec::new();
    for object in ctx.objects().iter() {
        if object.name() == SERVER_OBJECT {
            continue;
        }
        listing.push(Value::from(object.name()));
        listing.push(object.serialize());
    }
    ctx.resolve(inv.responder, Value::Array(listing));
    Status::Ok
}

/// Register a forwarding object named `"/" + caller + object`.
///
/// Only the peer that published an object may replace it. Any other object
/// already registered under that name is left alone and the call is refused.
fn publish(ctx: &mut BusContext, inv: &Invocation, published: &Published) -> Status {
    if !inv.argument.validate("st") {
        return Status::InvalidArgument;
    }
    let Some(caller) = ctx
        .peers()
        .find_by_id(inv.peer)
        .and_then(|peer| peer.name())
        .map(str::to_string)
    else {
        return Status::PermissionDenied;
    };
    let (object_name, methods) = match inv.argument.children() {
        [object, methods] => (object.as_str().unwrap_or_default().to_string(), methods),
        _ => return Status::InvalidArgument,
    };

    let local_name = format!("/{caller}{object_name}");
    let mut object = Object::new(local_name.clone());
    for (method, signature) in methods.entries() {
        let forward = forwarder(caller.clone(), object_name.clone());
        if object
            .add_method(Method::with_signature(method, signature.clone(), forward))
            .is_err()
        {
            return Status::InvalidArgument;
        }
    }

    if let Some(existing) = ctx.objects().find(&local_name).map(Object::id) {
        let owned = matches!(
            published.borrow().get(&local_name),
            Some((owner, id)) if *owner == caller && *id == existing
        );
        if !owned {
            debug!(object = %local_name, caller = %caller, "publish refused, name taken");
            return Status::PermissionDenied;
        }
        ctx.remove_object(&local_name);
    }
    let id = match ctx.add_object(object) {
        Ok(id) => id,
        Err(_) => {
            published.borrow_mut().remove(&local_name);
            return Status::UnknownError;
        }
    };
    published
        .borrow_mut()
        .insert(local_name.clone(), (caller.clone(), id));
    debug!(object = %local_name, owner = %caller, "object published");
    ctx.resolve(inv.responder, Value::from(local_name));
    Status::Ok
}

fn forwarder(owner: String, object: String) -> impl Fn(&mut BusContext, &Invocation) -> Status {
    move |ctx: &mut BusContext, inv: &Invocation| {
        let responder = inv.responder;
        let request = Request::new(
            owner.as_str(),
            object.as_str(),
            inv.method.as_str(),
            inv.argument.clone(),
        )
            .on_resolve(move |ctx, value| {
                ctx.resolve(responder, value);
            })
            .on_reject(move |ctx, rejection| {
                ctx.reject_with(responder, rejection.payload);
            });
        ctx.send_request(request);
        Status::Ok
    }
}

/// Invoke a local method on behalf of the caller, answering through the
/// caller's responder.
fn call(ctx: &mut BusContext, inv: &Invocation) -> Status {
    if !inv.argument.validate("ssv") {
        return Status::InvalidArgument;
    }
    let [object, method, argument] = inv.argument.children() else {
        return Status::InvalidArgument;
    };
    let object = object.as_str().unwrap_or_default().to_string();
    let method = method.as_str().unwrap_or_default().to_string();

    let handler = match ctx.objects().find(&object) {
        None => return Status::NotFound,
        Some(found) => match found.find_method(&method) {
            None => return Status::MethodNotFound,
            Some(found) => found.handler(),
        },
    };
    let inner = Invocation {
        responder: inv.responder,
        peer: inv.peer,
        object,
        method,
        argument: argument.clone(),
    };
    handler(ctx, &inner)
}

fn nick(ctx: &mut BusContext, inv: &Invocation) -> Status {
    let name = match inv.argument.children() {
        [name] => name.as_str().unwrap_or_default(),
        _ => return Status::InvalidArgument,
    };
    if name.is_empty() {
        return Status::InvalidArgument;
    }
    match ctx.set_peer_name(inv.peer, name) {
        Ok(()) => {
            ctx.resolve(inv.responder, Value::Null);
            Status::Ok
        }
        Err(BusError::NameConflict { .. }) => Status::PermissionDenied,
        Err(_) => Status::NotFound,
    }
}

/// Build the request that publishes local object `object_name` on the
/// server known as `server`. Send it with [`BusContext::send_request`] or
/// [`BusContext::call_blocking`].
pub fn publish_object(ctx: &BusContext, server: &str, object_name: &str) -> Result<Request> {
    let object = ctx
        .objects()
        .find(object_name)
        .ok_or_else(|| BusError::UnknownObject(object_name.to_string()))?;
    let argument = Value::Array(vec![Value::from(object_name), object.serialize()]);
    Ok(Request::new(server, SERVER_OBJECT, METHOD_PUBLISH, argument))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::signature_field;

    #[test]
    fn test_system_object_methods() {
        let object = BusServer::object().unwrap();
        for method in [METHOD_LIST, METHOD_PUBLISH, METHOD_CALL, METHOD_NICK] {
            assert!(object.find_method(method).is_some(), "{method} missing");
        }
        let publish = object.find_method(METHOD_PUBLISH).unwrap();
        let fields: Vec<_> = publish
            .signature()
            .children()
            .iter()
            .filter_map(signature_field)
            .map(|(_, name, ty)| (name, ty))
            .collect();
        assert_eq!(fields, vec![("object", "s"), ("methods", "t"), ("name", "s")]);
    }

    #[test]
    fn test_argument_shapes() {
        let publish_arg = Value::Array(vec!["/obj".into(), Value::table()]);
        assert!(publish_arg.validate("st"));
        assert!(!Value::Array(vec!["/obj".into()]).validate("st"));
        assert!(Value::Array(vec!["/o".into(), "m".into(), Value::Null]).validate("ssv"));
        assert!(!Value::Array(vec!["/o".into(), 1.into(), Value::Null]).validate("ssv"));
    }
}
