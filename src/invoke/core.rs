use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use smallvec::{smallvec, SmallVec};

use crate::context::Context;
use crate::error::{BuildError, InvocationError};
use crate::message::{Message, RemotePacket};
use crate::session::{Event, Session};

/// Which method table a descriptor belongs to and which arguments it takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    /// Client-invoked: `(context, session, message)`
    Local,
    /// Node-invoked: `(context, payload)`
    Remote,
    /// Event subscriber: `(event)`
    Event,
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MethodKind::Local => "local",
            MethodKind::Remote => "remote",
            MethodKind::Event => "event",
        })
    }
}

/// Name and identity of a parameter or return type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag {
    pub name: &'static str,
    pub id: TypeId,
}

impl TypeTag {
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            name: type_name::<T>(),
            id: TypeId::of::<T>(),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Ordered type signature, inline for up to four entries.
pub type TypeList = SmallVec<[TypeTag; 4]>;

/// Arguments assembled by a worker for one call.
#[derive(Clone, Copy)]
pub enum Invocation<'a> {
    Local {
        ctx: &'a Context,
        session: &'a Arc<dyn Session>,
        message: &'a Message,
    },
    Remote {
        ctx: &'a Context,
        packet: &'a RemotePacket,
    },
    Event {
        event: &'a dyn Event,
    },
}

impl Invocation<'_> {
    #[must_use]
    pub fn kind(&self) -> MethodKind {
        match self {
            Invocation::Local { .. } => MethodKind::Local,
            Invocation::Remote { .. } => MethodKind::Remote,
            Invocation::Event { .. } => MethodKind::Event,
        }
    }
}

/// Type-erased method body.
pub type Callable = Arc<dyn Fn(Invocation<'_>) -> Result<(), InvocationError> + Send + Sync>;

/// Return values a handler method may produce.
///
/// Implemented for `()` and for `Result<(), E>` where `E` converts into
/// [`anyhow::Error`].
pub trait IntoHandlerResult: 'static {
    fn into_handler_result(self) -> anyhow::Result<()>;

    /// Return types recorded in the descriptor.
    fn return_types() -> TypeList;
}

impl IntoHandlerResult for () {
    fn into_handler_result(self) -> anyhow::Result<()> {
        Ok(())
    }

    fn return_types() -> TypeList {
        TypeList::new()
    }
}

impl<E> IntoHandlerResult for Result<(), E>
where
    E: Into<anyhow::Error> + 'static,
{
    fn into_handler_result(self) -> anyhow::Result<()> {
        self.map_err(Into::into)
    }

    fn return_types() -> TypeList {
        smallvec![TypeTag::of::<Result<(), E>>()]
    }
}

fn callable<F>(f: F) -> Callable
where
    F: Fn(Invocation<'_>) -> Result<(), InvocationError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn handler_error(method: &str, source: anyhow::Error) -> InvocationError {
    InvocationError::Handler {
        method: method.to_string(),
        source,
    }
}

fn mismatch(method: &str, expected: MethodKind, found: MethodKind) -> InvocationError {
    InvocationError::ArgumentMismatch {
        method: method.to_string(),
        expected,
        found,
    }
}

/// A registered handler method: signature plus type-erased callable.
///
/// Cheap to clone; executors hold descriptors by `Arc`.
#[derive(Clone)]
pub struct HandlerFn {
    name: Arc<str>,
    kind: MethodKind,
    params: TypeList,
    returns: TypeList,
    callable: Callable,
}

impl fmt::Debug for HandlerFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerFn")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

impl HandlerFn {
    /// Build a descriptor from its parts.
    ///
    /// The typed constructors below are the usual entry points; this is the
    /// single validation point they all go through.
    ///
    /// # Errors
    ///
    /// * [`BuildError::EmptyName`] - `name` is empty
    /// * [`BuildError::MissingCallable`] - no callable was supplied
    pub fn build(
        name: &str,
        kind: MethodKind,
        params: TypeList,
        returns: TypeList,
        callable: Option<Callable>,
    ) -> Result<Self, BuildError> {
        if name.is_empty() {
            return Err(BuildError::EmptyName);
        }
        let callable = callable.ok_or_else(|| BuildError::MissingCallable {
            name: name.to_string(),
        })?;

        Ok(Self {
            name: Arc::from(name),
            kind,
            params,
            returns,
            callable,
        })
    }

    /// Local method receiving the raw message.
    ///
    /// # Errors
    ///
    /// See [`HandlerFn::build`].
    pub fn local<F, R>(name: &str, f: F) -> Result<Self, BuildError>
    where
        F: Fn(&Context, &Arc<dyn Session>, &Message) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        let method = name.to_string();
        let body = callable(move |inv| match inv {
            Invocation::Local {
                ctx,
                session,
                message,
            } => f(ctx, session, message)
                .into_handler_result()
                .map_err(|e| handler_error(&method, e)),
            other => Err(mismatch(&method, MethodKind::Local, other.kind())),
        });

        Self::build(
            name,
            MethodKind::Local,
            smallvec![
                TypeTag::of::<Context>(),
                TypeTag::of::<Arc<dyn Session>>(),
                TypeTag::of::<Message>(),
            ],
            R::return_types(),
            Some(body),
        )
    }

    /// Local method receiving the message payload decoded from JSON as `T`.
    ///
    /// # Errors
    ///
    /// See [`HandlerFn::build`].
    pub fn local_typed<T, F, R>(name: &str, f: F) -> Result<Self, BuildError>
    where
        T: DeserializeOwned + 'static,
        F: Fn(&Context, &Arc<dyn Session>, T) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        let method = name.to_string();
        let body = callable(move |inv| match inv {
            Invocation::Local {
                ctx,
                session,
                message,
            } => {
                let data: T = message
                    .decode_data()
                    .map_err(|source| InvocationError::Decode {
                        method: method.clone(),
                        source,
                    })?;
                f(ctx, session, data)
                    .into_handler_result()
                    .map_err(|e| handler_error(&method, e))
            }
            other => Err(mismatch(&method, MethodKind::Local, other.kind())),
        });

        Self::build(
            name,
            MethodKind::Local,
            smallvec![
                TypeTag::of::<Context>(),
                TypeTag::of::<Arc<dyn Session>>(),
                TypeTag::of::<T>(),
            ],
            R::return_types(),
            Some(body),
        )
    }

    /// Remote method receiving the packet payload decoded from JSON as `T`.
    ///
    /// # Errors
    ///
    /// See [`HandlerFn::build`].
    pub fn remote<T, F, R>(name: &str, f: F) -> Result<Self, BuildError>
    where
        T: DeserializeOwned + 'static,
        F: Fn(&Context, T) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        let method = name.to_string();
        let body = callable(move |inv| match inv {
            Invocation::Remote { ctx, packet } => {
                let data: T = packet
                    .decode_data()
                    .map_err(|source| InvocationError::Decode {
                        method: method.clone(),
                        source,
                    })?;
                f(ctx, data)
                    .into_handler_result()
                    .map_err(|e| handler_error(&method, e))
            }
            other => Err(mismatch(&method, MethodKind::Remote, other.kind())),
        });

        Self::build(
            name,
            MethodKind::Remote,
            smallvec![TypeTag::of::<Context>(), TypeTag::of::<T>()],
            R::return_types(),
            Some(body),
        )
    }

    /// Remote method receiving the raw packet.
    ///
    /// # Errors
    ///
    /// See [`HandlerFn::build`].
    pub fn remote_raw<F, R>(name: &str, f: F) -> Result<Self, BuildError>
    where
        F: Fn(&Context, &RemotePacket) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        let method = name.to_string();
        let body = callable(move |inv| match inv {
            Invocation::Remote { ctx, packet } => f(ctx, packet)
                .into_handler_result()
                .map_err(|e| handler_error(&method, e)),
            other => Err(mismatch(&method, MethodKind::Remote, other.kind())),
        });

        Self::build(
            name,
            MethodKind::Remote,
            smallvec![TypeTag::of::<Context>(), TypeTag::of::<RemotePacket>()],
            R::return_types(),
            Some(body),
        )
    }

    /// Event subscriber receiving any event posted under its name.
    ///
    /// # Errors
    ///
    /// See [`HandlerFn::build`].
    pub fn event<F, R>(name: &str, f: F) -> Result<Self, BuildError>
    where
        F: Fn(&dyn Event) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        let method = name.to_string();
        let body = callable(move |inv| match inv {
            Invocation::Event { event } => f(event)
                .into_handler_result()
                .map_err(|e| handler_error(&method, e)),
            other => Err(mismatch(&method, MethodKind::Event, other.kind())),
        });

        Self::build(
            name,
            MethodKind::Event,
            smallvec![TypeTag::of::<dyn Event>()],
            R::return_types(),
            Some(body),
        )
    }

    /// Event subscriber for a concrete event type.
    ///
    /// An event of another type posted under the same name fails with
    /// [`InvocationError::EventType`].
    ///
    /// # Errors
    ///
    /// See [`HandlerFn::build`].
    pub fn event_typed<E, F, R>(name: &str, f: F) -> Result<Self, BuildError>
    where
        E: Event,
        F: Fn(&E) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        let method = name.to_string();
        let body = callable(move |inv| match inv {
            Invocation::Event { event } => {
                let typed = event.as_any().downcast_ref::<E>().ok_or_else(|| {
                    InvocationError::EventType {
                        method: method.clone(),
                        expected: type_name::<E>(),
                    }
                })?;
                f(typed)
                    .into_handler_result()
                    .map_err(|e| handler_error(&method, e))
            }
            other => Err(mismatch(&method, MethodKind::Event, other.kind())),
        });

        Self::build(
            name,
            MethodKind::Event,
            smallvec![TypeTag::of::<E>()],
            R::return_types(),
            Some(body),
        )
    }

    /// Call the method. Panics are not caught here; see the worker barrier.
    ///
    /// # Errors
    ///
    /// Whatever the method body or payload decoding reports.
    #[inline]
    pub fn invoke(&self, invocation: Invocation<'_>) -> Result<(), InvocationError> {
        (self.callable)(invocation)
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    #[must_use]
    pub fn params(&self) -> &[TypeTag] {
        &self.params
    }

    #[must_use]
    pub fn returns(&self) -> &[TypeTag] {
        &self.returns
    }
}
